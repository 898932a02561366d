//! Playback commands end to end against a mock device server

use std::sync::Arc;

use assert_matches::assert_matches;
use futures_util::StreamExt;
use handysync_device_client::{
    ClockSynchronizer, DeviceClient, DeviceError, DeviceMode, LocalClock, PlayOptions,
    PlaybackDispatcher,
};
use handysync_shared_config::DeviceConfig;
use handysync_test_utils::MockDeviceServer;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

struct FixedClock(f64);

impl LocalClock for FixedClock {
    fn now_ms(&self) -> f64 {
        self.0
    }
}

/// Dispatcher whose estimated device time is exactly 1_000_500
fn dispatcher_for(server: &MockDeviceServer) -> PlaybackDispatcher<FixedClock> {
    let config = DeviceConfig::new("test-app", "test-key").with_url(server.url());
    let client = DeviceClient::new(&config).unwrap();
    let clock = Arc::new(ClockSynchronizer::with_clock(
        client.clone(),
        FixedClock(1_000_000.0),
    ));
    clock.set_offset(500.0);
    PlaybackDispatcher::with_synchronizer(client, clock)
}

#[tokio::test]
async fn test_play_stamps_estimated_server_time() {
    let server = MockDeviceServer::start().await;
    server.mock_play_success(7).await;
    let dispatcher = dispatcher_for(&server);

    let state = dispatcher.play(1.234, PlayOptions::default()).await;

    assert_eq!(state.and_then(|s| s.play_state), Some(json!(1)));
    assert_eq!(
        server.last_json_body("/hssp/play").await,
        Some(json!({
            "start_time": 1234,
            "server_time": 1_000_500,
            "playback_rate": 1.0,
            "loop": false
        }))
    );
}

#[tokio::test]
async fn test_play_with_options() {
    let server = MockDeviceServer::start().await;
    server.mock_play_success(7).await;
    let dispatcher = dispatcher_for(&server);

    let options = PlayOptions {
        playback_rate: 1.5,
        looping: true,
    };
    assert!(dispatcher.play(0.0, options).await.is_some());

    let body = server.last_json_body("/hssp/play").await.unwrap();
    assert_eq!(body["playback_rate"], 1.5);
    assert_eq!(body["loop"], true);
    assert_eq!(body["start_time"], 0);
}

#[tokio::test]
async fn test_play_rejects_non_finite_time_without_request() {
    let server = MockDeviceServer::start().await;
    server.mock_play_success(7).await;
    let dispatcher = dispatcher_for(&server);

    assert!(dispatcher.play(f64::NAN, PlayOptions::default()).await.is_none());
    assert_eq!(server.calls_to("/hssp/play").await, 0);
}

#[tokio::test]
async fn test_setup_reports_stream_id() {
    let server = MockDeviceServer::start().await;
    server.mock_setup_success(42).await;
    let dispatcher = dispatcher_for(&server);

    assert!(dispatcher.setup("https://example.com/a.funscript").await);
    assert_eq!(
        server.last_json_body("/hssp/setup").await,
        Some(json!({"url": "https://example.com/a.funscript"}))
    );
}

#[tokio::test]
async fn test_setup_without_stream_id_is_false() {
    let server = MockDeviceServer::start().await;
    server.mock_setup_without_stream_id().await;
    let dispatcher = dispatcher_for(&server);

    assert!(!dispatcher.setup("https://example.com/a.funscript").await);
}

#[tokio::test]
async fn test_setup_transport_failure_is_false() {
    let config = DeviceConfig::new("test-app", "test-key").with_url("http://127.0.0.1:9");
    let dispatcher = PlaybackDispatcher::new(DeviceClient::new(&config).unwrap());

    assert!(!dispatcher.setup("https://example.com/a.funscript").await);
}

#[tokio::test]
async fn test_sync_video_time() {
    let server = MockDeviceServer::start().await;
    server.mock_sync_time(Some(3)).await;
    let dispatcher = dispatcher_for(&server);

    assert!(dispatcher.sync_video_time(10.0, 0.5).await);
    assert_eq!(
        server.last_json_body("/hssp/synctime").await,
        Some(json!({
            "current_time": 10_000,
            "server_time": 1_000_500,
            "filter": 0.5
        }))
    );
}

#[tokio::test]
async fn test_sync_video_time_clamps_filter() {
    let server = MockDeviceServer::start().await;
    server.mock_sync_time(Some(3)).await;
    let dispatcher = dispatcher_for(&server);

    assert!(dispatcher.sync_video_time(1.0, 7.0).await);
    let body = server.last_json_body("/hssp/synctime").await.unwrap();
    assert_eq!(body["filter"], 1.0);
}

#[tokio::test]
async fn test_sync_video_time_without_stream_id_is_false() {
    let server = MockDeviceServer::start().await;
    server.mock_sync_time(None).await;
    let dispatcher = dispatcher_for(&server);

    assert!(!dispatcher.sync_video_time(10.0, 0.5).await);
}

#[tokio::test]
async fn test_stop() {
    let server = MockDeviceServer::start().await;
    server.mock_stop_success(7).await;
    let dispatcher = dispatcher_for(&server);

    let state = dispatcher.stop().await.unwrap();
    assert!(state.has_stream_id());
    assert_eq!(server.calls_to("/hssp/stop").await, 1);
}

#[tokio::test]
async fn test_playback_state() {
    let server = MockDeviceServer::start().await;
    server
        .mock_hssp_state(json!({
            "play_state": 1,
            "current_time": 4200,
            "loop": true,
            "stream_id": 9,
            "firmware_extra": "kept"
        }))
        .await;
    let dispatcher = dispatcher_for(&server);

    let state = dispatcher.playback_state().await.unwrap();
    assert_eq!(state.current_time, Some(4200));
    assert_eq!(state.looping, Some(true));
    assert!(state.has_stream_id());
    assert_eq!(state.extra.get("firmware_extra"), Some(&json!("kept")));
}

#[tokio::test]
async fn test_reads_degrade_to_none_on_error_envelope() {
    let server = MockDeviceServer::start().await;
    server.mock_all_reads_error(4, false).await;
    let dispatcher = dispatcher_for(&server);

    assert!(dispatcher.device_info().await.is_none());
    assert!(dispatcher.mode().await.is_none());
    assert!(dispatcher.playback_state().await.is_none());
    assert!(dispatcher.stroke_settings().await.is_none());
    assert!(dispatcher.hstp_offset().await.is_none());
    assert!(!dispatcher.is_connected().await);
}

#[tokio::test]
async fn test_error_envelope_is_typed_on_client() {
    let server = MockDeviceServer::start().await;
    server.mock_api_error("GET", "/info", 4, false).await;
    let dispatcher = dispatcher_for(&server);

    let err = dispatcher.client().device_info().await.unwrap_err();
    assert!(err.is_disconnected());
    assert_matches!(err, DeviceError::Api(failure) if failure.code == 4);
}

#[tokio::test]
async fn test_settings_and_info() {
    let server = MockDeviceServer::start().await;
    server.mock_device_info("4.0.2").await;
    server.mock_mode(1).await;
    server.mock_connected(true).await;
    server.mock_hstp_offset(-40).await;
    server.mock_stroke_settings(0.0, 1.0).await;
    let dispatcher = dispatcher_for(&server);

    let info = dispatcher.device_info().await.unwrap();
    assert_eq!(info.fw_version.as_deref(), Some("4.0.2"));

    assert_eq!(dispatcher.mode().await.unwrap().kind(), DeviceMode::Hssp);
    assert_eq!(dispatcher.set_mode(1).await.unwrap().mode, 1);
    assert!(dispatcher.is_connected().await);
    assert_eq!(dispatcher.hstp_offset().await.unwrap().offset, -40);
    assert_eq!(dispatcher.set_hstp_offset(-40).await.unwrap().offset, -40);

    let stroke = dispatcher.set_stroke_settings(0.2, 0.8).await.unwrap();
    assert_eq!(stroke.min, 0.2);
    assert_eq!(stroke.max, 0.8);
}

#[tokio::test]
async fn test_invalid_stroke_settings_are_not_sent() {
    let server = MockDeviceServer::start().await;
    server.mock_stroke_settings(0.0, 1.0).await;
    let dispatcher = dispatcher_for(&server);

    assert!(dispatcher.set_stroke_settings(0.9, 0.1).await.is_none());
    assert_eq!(server.calls_to("/slider/stroke").await, 0);
}

#[tokio::test]
async fn test_connection_key_rotation_applies_to_next_command() {
    let server = MockDeviceServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/hssp/stop"))
        .and(header("X-Connection-Key", "rotated-key"))
        .and(header("Authorization", "Bearer test-app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"play_state": 2, "stream_id": 7}
        })))
        .expect(1)
        .mount(server.inner())
        .await;
    let dispatcher = dispatcher_for(&server);

    // Old key does not match the mounted mock
    assert!(dispatcher.stop().await.is_none());

    dispatcher.client().set_connection_key("rotated-key");
    assert!(dispatcher.stop().await.is_some());
    assert_eq!(server.calls_to("/hssp/stop").await, 2);
}

#[tokio::test]
async fn test_event_subscription() {
    let server = MockDeviceServer::start().await;
    server
        .mock_events(
            ": keepalive\n\
             event: device_status\n\
             data: {\"connected\":true}\n\n\
             event: mode_changed\n\
             data: {\"mode\":1}\n\n",
        )
        .await;
    let dispatcher = dispatcher_for(&server);

    let events: Vec<_> = dispatcher
        .client()
        .subscribe_events()
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    let first = events[0].as_ref().unwrap();
    assert_eq!(first.event, "device_status");
    assert_eq!(first.json(), Some(json!({"connected": true})));
    assert_eq!(events[1].as_ref().unwrap().event, "mode_changed");

    let request = &server.requests_to("/sse").await[0];
    let query: Vec<_> = request.url.query_pairs().collect();
    assert!(query.iter().any(|(k, v)| k == "ck" && v == "test-key"));
    assert!(query.iter().any(|(k, v)| k == "apikey" && v == "test-app"));
}

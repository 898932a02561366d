//! Mock device API server for testing clock sync and playback commands
//!
//! Provides a [`MockDeviceServer`] that simulates the device REST endpoints
//! without a real device or network access.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Responds with the local wall clock shifted by a fixed offset
///
/// Simulates a device whose clock runs `offset_ms` ahead of ours.
struct ShiftedClock {
    offset_ms: i64,
    delay: Option<Duration>,
}

impl Respond for ShiftedClock {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();

        let template =
            ResponseTemplate::new(200).set_body_json(json!({ "server_time": now_ms + self.offset_ms }));
        match self.delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

/// Mock device server for testing
///
/// This struct wraps a [`wiremock::MockServer`] and provides convenience methods
/// for mounting common device API responses.
///
/// # Example
///
/// ```rust,ignore
/// use handysync_test_utils::MockDeviceServer;
///
/// #[tokio::test]
/// async fn test_sync() {
///     let server = MockDeviceServer::start().await;
///     server.mock_server_clock(5_000).await;
///
///     // Point DeviceConfig::with_url at server.url()
/// }
/// ```
pub struct MockDeviceServer {
    server: MockServer,
}

impl MockDeviceServer {
    /// Start a new mock device server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get reference to the underlying mock server for custom mock setups
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    async fn mount_result(&self, http_method: &str, endpoint: &str, result: Value) {
        Mock::given(method(http_method))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": result })))
            .mount(&self.server)
            .await;
    }

    // ========== Server time ==========

    /// Mount a server clock running `offset_ms` ahead of the local clock
    pub async fn mock_server_clock(&self, offset_ms: i64) {
        Mock::given(method("GET"))
            .and(path("/servertime"))
            .respond_with(ShiftedClock {
                offset_ms,
                delay: None,
            })
            .mount(&self.server)
            .await;
    }

    /// Same as [`mock_server_clock`](Self::mock_server_clock) with a response delay
    pub async fn mock_slow_server_clock(&self, offset_ms: i64, delay_ms: u64) {
        Mock::given(method("GET"))
            .and(path("/servertime"))
            .respond_with(ShiftedClock {
                offset_ms,
                delay: Some(Duration::from_millis(delay_ms)),
            })
            .mount(&self.server)
            .await;
    }

    /// Mount a fixed server timestamp
    pub async fn mock_server_time(&self, server_time: i64) {
        Mock::given(method("GET"))
            .and(path("/servertime"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "server_time": server_time })),
            )
            .mount(&self.server)
            .await;
    }

    /// Mount a failing server time endpoint
    pub async fn mock_server_time_failure(&self, status_code: u16) {
        Mock::given(method("GET"))
            .and(path("/servertime"))
            .respond_with(ResponseTemplate::new(status_code).set_body_string("unavailable"))
            .mount(&self.server)
            .await;
    }

    // ========== HSSP ==========

    /// Mount a successful script setup returning `stream_id`
    pub async fn mock_setup_success(&self, stream_id: i64) {
        self.mount_result(
            "PUT",
            "/hssp/setup",
            json!({ "stream_id": stream_id, "play_state": 0 }),
        )
        .await;
    }

    /// Mount a setup response whose result has no stream id
    pub async fn mock_setup_without_stream_id(&self) {
        self.mount_result("PUT", "/hssp/setup", json!({})).await;
    }

    /// Mount a successful play command
    pub async fn mock_play_success(&self, stream_id: i64) {
        self.mount_result(
            "PUT",
            "/hssp/play",
            json!({
                "play_state": 1,
                "points": 120,
                "max_points": 4000,
                "current_point": 0,
                "current_time": 0,
                "loop": false,
                "playback_rate": 1.0,
                "first_point_time": 0,
                "last_point_time": 60000,
                "stream_id": stream_id
            }),
        )
        .await;
    }

    /// Mount a successful stop command
    pub async fn mock_stop_success(&self, stream_id: i64) {
        self.mount_result(
            "PUT",
            "/hssp/stop",
            json!({ "play_state": 2, "stream_id": stream_id }),
        )
        .await;
    }

    /// Mount a time resync response; `None` omits the stream id
    pub async fn mock_sync_time(&self, stream_id: Option<i64>) {
        let result = match stream_id {
            Some(id) => json!({ "stream_id": id }),
            None => json!({}),
        };
        self.mount_result("PUT", "/hssp/synctime", result).await;
    }

    /// Mount the playback state endpoint
    pub async fn mock_hssp_state(&self, state: Value) {
        self.mount_result("GET", "/hssp/state", state).await;
    }

    // ========== Settings and device info ==========

    /// Mount stroke settings read and an echoing write
    pub async fn mock_stroke_settings(&self, min: f64, max: f64) {
        self.mount_result("GET", "/slider/stroke", json!({ "min": min, "max": max }))
            .await;

        Mock::given(method("PUT"))
            .and(path("/slider/stroke"))
            .respond_with(|request: &Request| {
                let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
                ResponseTemplate::new(200).set_body_json(json!({ "result": body }))
            })
            .mount(&self.server)
            .await;
    }

    /// Mount device info
    pub async fn mock_device_info(&self, fw_version: &str) {
        self.mount_result(
            "GET",
            "/info",
            json!({
                "fw_version": fw_version,
                "fw_status": 0,
                "hw_model_no": 1,
                "hw_model_name": "H01",
                "session_id": "session-1"
            }),
        )
        .await;
    }

    /// Mount the mode endpoint (read and write)
    pub async fn mock_mode(&self, mode: u8) {
        self.mount_result("GET", "/mode", json!({ "mode": mode })).await;
        self.mount_result("PUT", "/mode", json!({ "mode": mode })).await;
    }

    /// Mount the connectivity endpoint
    pub async fn mock_connected(&self, connected: bool) {
        self.mount_result("GET", "/connected", json!({ "connected": connected }))
            .await;
    }

    /// Mount the HSTP offset endpoint (read and write)
    pub async fn mock_hstp_offset(&self, offset: i64) {
        self.mount_result("GET", "/hstp/offset", json!({ "offset": offset }))
            .await;
        self.mount_result("PUT", "/hstp/offset", json!({ "offset": offset }))
            .await;
    }

    // ========== Failures ==========

    /// Mount an error envelope for one endpoint
    pub async fn mock_api_error(
        &self,
        http_method: &str,
        endpoint: &str,
        code: i64,
        connected: bool,
    ) {
        Mock::given(method(http_method))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {
                    "code": code,
                    "name": "x",
                    "message": "y",
                    "connected": connected
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount the same error envelope on every read endpoint
    pub async fn mock_all_reads_error(&self, code: i64, connected: bool) {
        for endpoint in [
            "/info",
            "/mode",
            "/connected",
            "/hssp/state",
            "/slider/stroke",
            "/hstp/offset",
        ] {
            self.mock_api_error("GET", endpoint, code, connected).await;
        }
    }

    // ========== Events ==========

    /// Mount the event stream endpoint with a canned `text/event-stream` body
    pub async fn mock_events(&self, body: &str) {
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    // ========== Inspection ==========

    /// Requests received on one path, oldest first
    pub async fn requests_to(&self, endpoint: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == endpoint)
            .collect()
    }

    /// Number of requests received on one path
    pub async fn calls_to(&self, endpoint: &str) -> usize {
        self.requests_to(endpoint).await.len()
    }

    /// JSON body of the latest request on one path
    pub async fn last_json_body(&self, endpoint: &str) -> Option<Value> {
        self.requests_to(endpoint)
            .await
            .last()
            .and_then(|r| serde_json::from_slice(&r.body).ok())
    }
}

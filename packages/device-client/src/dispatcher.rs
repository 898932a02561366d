//! Latency-compensated playback commands
//!
//! The dispatcher stamps time-sensitive commands with the estimated device
//! clock and turns every failure into the neutral value of the operation
//! (`false` or `None`). Failures are logged, never retried.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::client::DeviceClient;
use crate::clock::{ClockSynchronizer, LocalClock, SystemClock};
use crate::error::{DeviceError, DeviceResult};
use crate::models::{
    DeviceInfo, HsspState, HstpOffset, ModeState, PlayRequest, StrokeSettings, SyncTimeRequest,
};

/// Playback options for [`PlaybackDispatcher::play`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    pub playback_rate: f64,
    pub looping: bool,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            playback_rate: 1.0,
            looping: false,
        }
    }
}

/// Convert a video position in seconds to whole milliseconds
pub fn seconds_to_millis(seconds: f64) -> DeviceResult<i64> {
    if !seconds.is_finite() {
        return Err(DeviceError::InvalidInput(format!(
            "video time must be finite, got {}",
            seconds
        )));
    }
    Ok((seconds * 1000.0).round() as i64)
}

/// Log a failed command and degrade to `None`
fn degrade<T>(operation: &'static str, result: DeviceResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                operation,
                error = %e,
                disconnected = e.is_disconnected(),
                "Device command failed"
            );
            None
        }
    }
}

/// Sends playback commands using a shared clock synchronizer
#[derive(Debug)]
pub struct PlaybackDispatcher<C = SystemClock> {
    client: DeviceClient,
    clock: Arc<ClockSynchronizer<DeviceClient, C>>,
}

impl<C> Clone for PlaybackDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl PlaybackDispatcher {
    /// Create a dispatcher with its own synchronizer over the same client
    pub fn new(client: DeviceClient) -> Self {
        let clock = Arc::new(ClockSynchronizer::new(client.clone()));
        Self { client, clock }
    }
}

impl<C: LocalClock> PlaybackDispatcher<C> {
    /// Create a dispatcher around an existing synchronizer
    pub fn with_synchronizer(
        client: DeviceClient,
        clock: Arc<ClockSynchronizer<DeviceClient, C>>,
    ) -> Self {
        Self { client, clock }
    }

    pub fn client(&self) -> &DeviceClient {
        &self.client
    }

    pub fn synchronizer(&self) -> &Arc<ClockSynchronizer<DeviceClient, C>> {
        &self.clock
    }

    /// Run a clock sync round with the configured sample count
    pub async fn sync_clock(&self) -> f64 {
        self.clock
            .sync_round(self.client.config().sync_samples)
            .await
    }

    /// Register a script; true iff the device assigned a stream id
    #[instrument(skip(self))]
    pub async fn setup(&self, script_url: &str) -> bool {
        degrade("setup", self.client.setup(script_url).await)
            .map(|state| state.has_stream_id())
            .unwrap_or(false)
    }

    async fn send_play(
        &self,
        video_time_seconds: f64,
        options: PlayOptions,
    ) -> DeviceResult<HsspState> {
        let request = PlayRequest {
            start_time: seconds_to_millis(video_time_seconds)?,
            server_time: self.clock.estimate_remote_time(),
            playback_rate: options.playback_rate,
            looping: options.looping,
        };
        debug!(
            start_time = request.start_time,
            server_time = request.server_time,
            "Sending play command"
        );
        self.client.play(&request).await
    }

    async fn send_sync_time(
        &self,
        video_time_seconds: f64,
        filter: f64,
    ) -> DeviceResult<HsspState> {
        let request = SyncTimeRequest {
            current_time: seconds_to_millis(video_time_seconds)?,
            server_time: self.clock.estimate_remote_time(),
            filter: filter.clamp(0.0, 1.0),
        };
        debug!(
            current_time = request.current_time,
            server_time = request.server_time,
            filter = request.filter,
            "Sending time resync"
        );
        self.client.sync_time(&request).await
    }

    /// Start playback at `video_time_seconds`
    #[instrument(skip(self))]
    pub async fn play(&self, video_time_seconds: f64, options: PlayOptions) -> Option<HsspState> {
        degrade("play", self.send_play(video_time_seconds, options).await)
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) -> Option<HsspState> {
        degrade("stop", self.client.stop().await)
    }

    /// Nudge the device toward the current video position
    ///
    /// `filter` is clamped to `0.0..=1.0`. True iff the device answered with
    /// a stream id.
    #[instrument(skip(self))]
    pub async fn sync_video_time(&self, video_time_seconds: f64, filter: f64) -> bool {
        let result = self.send_sync_time(video_time_seconds, filter).await;
        degrade("sync_video_time", result)
            .map(|state| state.has_stream_id())
            .unwrap_or(false)
    }

    pub async fn playback_state(&self) -> Option<HsspState> {
        degrade("playback_state", self.client.hssp_state().await)
    }

    pub async fn stroke_settings(&self) -> Option<StrokeSettings> {
        degrade("stroke_settings", self.client.stroke_settings().await)
    }

    #[instrument(skip(self))]
    pub async fn set_stroke_settings(&self, min: f64, max: f64) -> Option<StrokeSettings> {
        degrade(
            "set_stroke_settings",
            self.client
                .set_stroke_settings(&StrokeSettings { min, max })
                .await,
        )
    }

    pub async fn device_info(&self) -> Option<DeviceInfo> {
        degrade("device_info", self.client.device_info().await)
    }

    pub async fn mode(&self) -> Option<ModeState> {
        degrade("mode", self.client.mode().await)
    }

    pub async fn set_mode(&self, mode: u8) -> Option<ModeState> {
        degrade("set_mode", self.client.set_mode(mode).await)
    }

    /// Whether the device is online; false on any failure
    pub async fn is_connected(&self) -> bool {
        degrade("is_connected", self.client.connected().await).unwrap_or(false)
    }

    pub async fn hstp_offset(&self) -> Option<HstpOffset> {
        degrade("hstp_offset", self.client.hstp_offset().await)
    }

    pub async fn set_hstp_offset(&self, offset: i64) -> Option<HstpOffset> {
        degrade("set_hstp_offset", self.client.set_hstp_offset(offset).await)
    }
}

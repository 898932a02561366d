//! Typed HTTP client for the device REST API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use handysync_shared_config::DeviceConfig;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::clock::TimeSource;
use crate::error::{truncate_error_body, DeviceError, DeviceResult};
use crate::events::{self, EventSubscription};
use crate::models::{
    ApiEnvelope, ConnectedState, DeviceInfo, HsspState, HstpOffset, ModeRequest, ModeState,
    PlayRequest, ServerTimeResponse, SetupRequest, StrokeSettings, SyncTimeRequest,
};
use crate::session::{auth_headers, Session};

/// Maximum accepted script URL length
const MAX_SCRIPT_URL_LENGTH: usize = 2048;

/// Device API client
///
/// Every call returns the typed outcome; see
/// [`PlaybackDispatcher`](crate::PlaybackDispatcher) for the variant that
/// degrades failures to neutral values.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    /// HTTP client with connection pool
    http_client: Client,
    /// Configuration
    config: DeviceConfig,
    /// Session identity, shared by all clones
    session: Arc<Session>,
}

impl DeviceClient {
    /// Create a new device client from configuration
    pub fn new(config: &DeviceConfig) -> DeviceResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent("Handysync/1.0");

        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let http_client = builder.build().map_err(DeviceError::Http)?;
        Ok(Self::with_client(config, http_client))
    }

    /// Create a client with custom HTTP client (for testing)
    pub fn with_client(config: &DeviceConfig, http_client: Client) -> Self {
        Self {
            http_client,
            config: config.clone(),
            session: Arc::new(Session::new(&config.app_key, &config.connection_key)),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Get the session shared by this client and its clones
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Rotate the connection key; the next request uses the new key
    pub fn set_connection_key(&self, key: impl Into<String>) {
        self.session.set_connection_key(key);
    }

    /// Send a request and return the raw body with its status
    async fn send<B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> DeviceResult<(reqwest::StatusCode, String)>
    where
        B: Serialize + ?Sized,
    {
        let headers = auth_headers(&self.session.identity())?;

        debug!(method = %method, url = %url, "Sending device request");

        let mut request = self.http_client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeviceError::from_transport(e, &self.config.api_url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeviceError::from_transport(e, &self.config.api_url))?;

        debug!(status = status.as_u16(), body_len = text.len(), "Device response received");

        Ok((status, text))
    }

    /// Send a request and unwrap the `{result, error}` envelope
    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> DeviceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(path);
        let (status, text) = self.send(method, &url, body).await?;

        match serde_json::from_str::<ApiEnvelope<T>>(&text) {
            Ok(envelope) => envelope.into_result(),
            Err(_) if !status.is_success() => Err(DeviceError::Status {
                status: status.as_u16(),
                body: truncate_error_body(text),
            }),
            Err(e) => Err(DeviceError::Json(e)),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> DeviceResult<T> {
        self.call::<(), T>(Method::GET, path, None).await
    }

    async fn put<B, T>(&self, path: &str, body: Option<&B>) -> DeviceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(Method::PUT, path, body).await
    }

    /// Read the server clock in milliseconds
    pub async fn server_time(&self) -> DeviceResult<i64> {
        let url = self.config.server_time_url();
        let (status, text) = self.send::<()>(Method::GET, &url, None).await?;

        match serde_json::from_str::<ServerTimeResponse>(&text) {
            Ok(response) => response.into_timestamp(),
            Err(_) if !status.is_success() => Err(DeviceError::Status {
                status: status.as_u16(),
                body: truncate_error_body(text),
            }),
            Err(e) => Err(DeviceError::Json(e)),
        }
    }

    /// Register a script with the device
    pub async fn setup(&self, script_url: &str) -> DeviceResult<HsspState> {
        let script_url = script_url.trim();
        if script_url.is_empty() {
            return Err(DeviceError::InvalidInput(
                "script URL cannot be empty".to_string(),
            ));
        }
        if script_url.len() > MAX_SCRIPT_URL_LENGTH {
            return Err(DeviceError::InvalidInput(format!(
                "script URL too long (max {} characters)",
                MAX_SCRIPT_URL_LENGTH
            )));
        }

        self.put("hssp/setup", Some(&SetupRequest { url: script_url }))
            .await
    }

    /// Start playback
    pub async fn play(&self, request: &PlayRequest) -> DeviceResult<HsspState> {
        if !request.playback_rate.is_finite() || request.playback_rate <= 0.0 {
            return Err(DeviceError::InvalidInput(format!(
                "playback rate must be a positive number, got {}",
                request.playback_rate
            )));
        }
        self.put("hssp/play", Some(request)).await
    }

    /// Stop playback
    pub async fn stop(&self) -> DeviceResult<HsspState> {
        self.put::<(), _>("hssp/stop", None).await
    }

    /// Correct the device's notion of the current video position
    pub async fn sync_time(&self, request: &SyncTimeRequest) -> DeviceResult<HsspState> {
        if !(0.0..=1.0).contains(&request.filter) {
            return Err(DeviceError::InvalidInput(format!(
                "filter must be within 0.0..=1.0, got {}",
                request.filter
            )));
        }
        self.put("hssp/synctime", Some(request)).await
    }

    /// Current playback snapshot
    pub async fn hssp_state(&self) -> DeviceResult<HsspState> {
        self.get("hssp/state").await
    }

    /// Read the slider stroke limits
    pub async fn stroke_settings(&self) -> DeviceResult<StrokeSettings> {
        self.get("slider/stroke").await
    }

    /// Write the slider stroke limits
    pub async fn set_stroke_settings(
        &self,
        settings: &StrokeSettings,
    ) -> DeviceResult<StrokeSettings> {
        settings.validate()?;
        self.put("slider/stroke", Some(settings)).await
    }

    /// Firmware and hardware information
    pub async fn device_info(&self) -> DeviceResult<DeviceInfo> {
        self.get("info").await
    }

    /// Current operating mode
    pub async fn mode(&self) -> DeviceResult<ModeState> {
        self.get("mode").await
    }

    /// Switch operating mode
    pub async fn set_mode(&self, mode: u8) -> DeviceResult<ModeState> {
        self.put("mode", Some(&ModeRequest { mode })).await
    }

    /// Whether the device is online
    pub async fn connected(&self) -> DeviceResult<bool> {
        let state: ConnectedState = self.get("connected").await?;
        Ok(state.connected)
    }

    /// Device-side HSTP clock offset
    pub async fn hstp_offset(&self) -> DeviceResult<HstpOffset> {
        self.get("hstp/offset").await
    }

    /// Set the device-side HSTP clock offset
    pub async fn set_hstp_offset(&self, offset: i64) -> DeviceResult<HstpOffset> {
        self.put("hstp/offset", Some(&HstpOffset { offset })).await
    }

    /// Open the device event channel with the current session identity
    pub async fn subscribe_events(&self) -> DeviceResult<EventSubscription> {
        events::subscribe(&self.http_client, &self.config, &self.session.identity()).await
    }
}

#[async_trait]
impl TimeSource for DeviceClient {
    async fn server_time(&self) -> DeviceResult<i64> {
        DeviceClient::server_time(self).await
    }
}

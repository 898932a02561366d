//! Request and response models for the device API

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DeviceError, DeviceResult};

// ========== Envelope ==========

/// Structured failure reported by the device API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFailure {
    /// Numeric error code
    pub code: i64,
    /// Short error name
    #[serde(default)]
    pub name: String,
    /// Human readable message
    #[serde(default)]
    pub message: String,
    /// Whether the device was connected when the error occurred
    #[serde(default)]
    pub connected: bool,
    /// Optional diagnostic payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.code, self.name, self.message)
    }
}

/// Uniform response envelope: `{result?: T, error?: ApiFailure}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<ApiFailure>,
}

impl<T> ApiEnvelope<T> {
    /// Collapse the envelope into a single outcome
    ///
    /// An error always wins over a result; an envelope with neither is
    /// reported as [`DeviceError::MissingResult`].
    pub fn into_result(self) -> DeviceResult<T> {
        match (self.result, self.error) {
            (_, Some(failure)) => Err(DeviceError::Api(failure)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(DeviceError::MissingResult),
        }
    }
}

/// Server time answer; the timestamp may be bare or wrapped in `result`
#[derive(Debug, Deserialize)]
pub(crate) struct ServerTimeResponse {
    #[serde(default)]
    pub server_time: Option<i64>,
    #[serde(default)]
    pub result: Option<ServerTimeResult>,
    #[serde(default)]
    pub error: Option<ApiFailure>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerTimeResult {
    pub server_time: i64,
}

impl ServerTimeResponse {
    pub fn into_timestamp(self) -> DeviceResult<i64> {
        if let Some(failure) = self.error {
            return Err(DeviceError::Api(failure));
        }
        self.server_time
            .or(self.result.map(|r| r.server_time))
            .ok_or(DeviceError::MissingResult)
    }
}

// ========== Requests ==========

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SetupRequest<'a> {
    pub url: &'a str,
}

/// Body of an HSSP play command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayRequest {
    /// Script position to start from, in milliseconds
    pub start_time: i64,
    /// Estimated device clock at send time, in milliseconds
    pub server_time: i64,
    pub playback_rate: f64,
    #[serde(rename = "loop")]
    pub looping: bool,
}

/// Body of an HSSP time resync
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncTimeRequest {
    /// Current video position, in milliseconds
    pub current_time: i64,
    /// Estimated device clock at send time, in milliseconds
    pub server_time: i64,
    /// Blend coefficient in `0.0..=1.0`
    pub filter: f64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ModeRequest {
    pub mode: u8,
}

/// Slider stroke limits, each within `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeSettings {
    pub min: f64,
    pub max: f64,
}

impl StrokeSettings {
    pub fn validate(&self) -> DeviceResult<()> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(self.min) || !in_range(self.max) {
            return Err(DeviceError::InvalidInput(format!(
                "stroke limits must be within 0.0..=1.0 (min={}, max={})",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(DeviceError::InvalidInput(format!(
                "stroke min {} is greater than max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Device-side HSTP clock offset in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HstpOffset {
    pub offset: i64,
}

// ========== Snapshots ==========

/// Playback snapshot reported by the device
///
/// The device owns this state; unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HsspState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_point: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<i64>,
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub looping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_point_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_point_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HsspState {
    /// Whether the snapshot carries a usable stream identifier
    ///
    /// Null, `false`, zero and the empty string do not count.
    pub fn has_stream_id(&self) -> bool {
        match &self.stream_id {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

/// Firmware and hardware description of the device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fw_status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_model_no: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Operating mode of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Hamp,
    Hssp,
    Hdsp,
    Maintenance,
    Hstp,
    Other(u8),
}

impl DeviceMode {
    pub fn code(self) -> u8 {
        match self {
            DeviceMode::Hamp => 0,
            DeviceMode::Hssp => 1,
            DeviceMode::Hdsp => 2,
            DeviceMode::Maintenance => 3,
            DeviceMode::Hstp => 4,
            DeviceMode::Other(code) => code,
        }
    }
}

impl From<u8> for DeviceMode {
    fn from(code: u8) -> Self {
        match code {
            0 => DeviceMode::Hamp,
            1 => DeviceMode::Hssp,
            2 => DeviceMode::Hdsp,
            3 => DeviceMode::Maintenance,
            4 => DeviceMode::Hstp,
            other => DeviceMode::Other(other),
        }
    }
}

/// Mode snapshot as reported by the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeState {
    pub mode: u8,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModeState {
    pub fn kind(&self) -> DeviceMode {
        DeviceMode::from(self.mode)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConnectedState {
    pub connected: bool,
}

/// One server-sent event from the device event channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceEvent {
    /// Event name (`message` when the server sent none)
    pub event: String,
    /// Raw data lines joined with `\n`
    pub data: String,
    pub id: Option<String>,
}

impl DeviceEvent {
    /// Parse the data payload as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_result() {
        let envelope: ApiEnvelope<HsspState> =
            serde_json::from_value(json!({"result": {"stream_id": 42}})).unwrap();
        let state = envelope.into_result().unwrap();
        assert!(state.has_stream_id());
    }

    #[test]
    fn test_envelope_error_wins() {
        let envelope: ApiEnvelope<HsspState> = serde_json::from_value(json!({
            "result": {"stream_id": 1},
            "error": {"code": 4, "name": "x", "message": "y", "connected": false}
        }))
        .unwrap();
        match envelope.into_result() {
            Err(DeviceError::Api(failure)) => {
                assert_eq!(failure.code, 4);
                assert!(!failure.connected);
                assert!(failure.data.is_none());
            }
            other => panic!("Expected Api error, got: {:?}", other),
        }
    }

    #[test]
    fn test_envelope_empty_is_missing_result() {
        let envelope: ApiEnvelope<HsspState> = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(envelope.into_result(), Err(DeviceError::MissingResult)));
    }

    /// Same shape as the client's generic envelope decoding
    fn decode<T: serde::de::DeserializeOwned>(body: &str) -> DeviceResult<T> {
        serde_json::from_str::<ApiEnvelope<T>>(body)?.into_result()
    }

    #[test]
    fn test_envelope_decodes_payload_without_default() {
        let mode: ModeState = decode(r#"{"result": {"mode": 4}}"#).unwrap();
        assert_eq!(mode.kind(), DeviceMode::Hstp);

        let offset: HstpOffset = decode(r#"{"result": {"offset": -12}}"#).unwrap();
        assert_eq!(offset.offset, -12);

        assert!(matches!(
            decode::<ModeState>(r#"{"error": {"code": 4, "name": "x", "message": "y", "connected": true}}"#),
            Err(DeviceError::Api(_))
        ));
    }

    #[test]
    fn test_stream_id_truthiness() {
        let with = |v: Value| HsspState {
            stream_id: Some(v),
            ..Default::default()
        };
        assert!(!HsspState::default().has_stream_id());
        assert!(!with(Value::Null).has_stream_id());
        assert!(!with(json!(0)).has_stream_id());
        assert!(!with(json!("")).has_stream_id());
        assert!(with(json!(17)).has_stream_id());
        assert!(with(json!("abc")).has_stream_id());
    }

    #[test]
    fn test_play_request_serializes_loop_keyword() {
        let body = serde_json::to_value(PlayRequest {
            start_time: 1234,
            server_time: 99,
            playback_rate: 1.0,
            looping: true,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"start_time": 1234, "server_time": 99, "playback_rate": 1.0, "loop": true})
        );
    }

    #[test]
    fn test_hssp_state_keeps_unknown_fields() {
        let state: HsspState = serde_json::from_value(json!({
            "play_state": 1,
            "loop": false,
            "pause_on_starving": true
        }))
        .unwrap();
        assert_eq!(state.looping, Some(false));
        assert_eq!(state.extra.get("pause_on_starving"), Some(&json!(true)));
    }

    #[test]
    fn test_server_time_shapes() {
        let bare: ServerTimeResponse = serde_json::from_value(json!({"server_time": 1000})).unwrap();
        assert_eq!(bare.into_timestamp().unwrap(), 1000);

        let wrapped: ServerTimeResponse =
            serde_json::from_value(json!({"result": {"server_time": 2000}})).unwrap();
        assert_eq!(wrapped.into_timestamp().unwrap(), 2000);

        let empty: ServerTimeResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(empty.into_timestamp(), Err(DeviceError::MissingResult)));
    }

    #[test]
    fn test_stroke_settings_validation() {
        assert!(StrokeSettings { min: 0.1, max: 0.9 }.validate().is_ok());
        assert!(StrokeSettings { min: 0.9, max: 0.1 }.validate().is_err());
        assert!(StrokeSettings { min: -0.1, max: 0.5 }.validate().is_err());
        assert!(StrokeSettings { min: 0.0, max: 1.5 }.validate().is_err());
    }

    #[test]
    fn test_device_mode_codes() {
        assert_eq!(DeviceMode::from(1), DeviceMode::Hssp);
        assert_eq!(DeviceMode::Hstp.code(), 4);
        assert_eq!(DeviceMode::from(9), DeviceMode::Other(9));
    }
}

//! Session identity and per-request authentication headers

use std::fmt;
use std::sync::RwLock;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use crate::error::{DeviceError, DeviceResult};

/// Header carrying the device connection key
pub const CONNECTION_KEY_HEADER: &str = "X-Connection-Key";

/// Credentials of a device session at one point in time
#[derive(Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub app_key: String,
    pub connection_key: String,
}

impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("app_key", &"[REDACTED]")
            .field("connection_key", &"[REDACTED]")
            .finish()
    }
}

/// Live session whose connection key can be rotated
///
/// Requests snapshot the identity when they are built, so a rotation applies
/// to the next request without touching requests already in flight.
pub struct Session {
    app_key: String,
    connection_key: RwLock<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("app_key", &"[REDACTED]")
            .field("connection_key", &"[REDACTED]")
            .finish()
    }
}

impl Session {
    pub fn new(app_key: impl Into<String>, connection_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            connection_key: RwLock::new(connection_key.into()),
        }
    }

    /// Snapshot the current identity
    pub fn identity(&self) -> SessionIdentity {
        let connection_key = self
            .connection_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        SessionIdentity {
            app_key: self.app_key.clone(),
            connection_key,
        }
    }

    /// Replace the connection key for subsequent requests
    pub fn set_connection_key(&self, key: impl Into<String>) {
        let mut current = self
            .connection_key
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *current = key.into();
    }
}

/// Build the authentication headers for one request
pub fn auth_headers(identity: &SessionIdentity) -> DeviceResult<HeaderMap> {
    let connection_key = HeaderValue::from_str(&identity.connection_key)
        .map_err(|_| DeviceError::InvalidInput("connection key is not a valid header value".to_string()))?;

    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", identity.app_key))
        .map_err(|_| DeviceError::InvalidInput("application key is not a valid header value".to_string()))?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("x-connection-key"), connection_key);
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}

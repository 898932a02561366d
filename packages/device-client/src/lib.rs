//! Clock-synchronized playback control for HSSP devices
//!
//! This crate estimates the offset between the local clock and the device
//! server clock, then uses it to send latency-compensated playback commands
//! (setup, play, stop, time resync) over the device REST API.
//!
//! # Layers
//!
//! - [`DeviceClient`] - typed HTTP client; every call returns a [`DeviceResult`]
//! - [`ClockSynchronizer`] - owns the clock offset and runs sync rounds
//! - [`PlaybackDispatcher`] - stamps commands with the estimated device time and
//!   degrades failures to `false` / `None`
//!
//! # Thread Safety
//!
//! `DeviceClient` is `Clone + Send + Sync`; clones share the connection pool
//! and the session, so rotating the connection key on one clone affects all.
//!
//! # Example
//!
//! ```no_run
//! use handysync_device_client::{DeviceClient, PlayOptions, PlaybackDispatcher};
//! use handysync_shared_config::DeviceConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::from_env()?;
//! let dispatcher = PlaybackDispatcher::new(DeviceClient::new(&config)?);
//!
//! let offset = dispatcher.sync_clock().await;
//! println!("Device clock is {offset:.1}ms ahead");
//!
//! if dispatcher.setup("https://example.com/script.funscript").await {
//!     dispatcher.play(12.5, PlayOptions::default()).await;
//!     dispatcher.sync_video_time(14.0, 0.5).await;
//!     dispatcher.stop().await;
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod clock;
mod dispatcher;
mod error;
mod events;
mod models;
mod session;

pub use client::DeviceClient;
pub use clock::{aggregate, ClockSynchronizer, LocalClock, Sample, SystemClock, TimeSource};
pub use dispatcher::{seconds_to_millis, PlayOptions, PlaybackDispatcher};
pub use error::{DeviceError, DeviceResult};
pub use events::EventSubscription;
pub use models::{
    ApiEnvelope, ApiFailure, DeviceEvent, DeviceInfo, DeviceMode, HsspState, HstpOffset,
    ModeState, PlayRequest, StrokeSettings, SyncTimeRequest,
};
pub use session::{auth_headers, Session, SessionIdentity, CONNECTION_KEY_HEADER};

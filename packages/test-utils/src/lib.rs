//! Shared test utilities for Handysync workspace
//!
//! This crate provides a mock implementation of the device API for testing
//! without network access or a physical device.
//!
//! # Mock Services
//!
//! - [`MockDeviceServer`] - Mock device REST API (server time, HSSP, settings, events)
//!
//! # Example
//!
//! ```rust,ignore
//! use handysync_test_utils::MockDeviceServer;
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let device = MockDeviceServer::start().await;
//!     device.mock_setup_success(7).await;
//!
//!     // Use device.url() to configure your client
//! }
//! ```

mod device;

pub use device::MockDeviceServer;

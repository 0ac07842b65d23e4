//! # SMS Bridge
//!
//! Relays Slack channel messages to subscribers by SMS and posts text replies
//! back into the channel they name. Usable both as a standalone binary and as
//! a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! sms-bridge = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sms_bridge::bridge::BridgeSettings;
//! use sms_bridge::carrier::{DEFAULT_TWILIO_API_BASE, TwilioGateway};
//! use sms_bridge::chat::{DEFAULT_SLACK_API_BASE, SlackConnector};
//! use sms_bridge::server::{AppState, create_router};
//! use sms_bridge::store::{SqliteStore, TenantStore};
//!
//! let store = SqliteStore::new("./data/sms-bridge.db").unwrap();
//! store.initialize().unwrap();
//!
//! let timeout = Duration::from_secs(10);
//! let state = Arc::new(AppState::new(
//!     Arc::new(store),
//!     Arc::new(SlackConnector::new(DEFAULT_SLACK_API_BASE, timeout).unwrap()),
//!     Arc::new(TwilioGateway::new(DEFAULT_TWILIO_API_BASE, timeout).unwrap()),
//!     BridgeSettings::default(),
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `sms-bridge` binary. Disable with `default-features = false`.

pub mod bridge;
pub mod carrier;
pub mod chat;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;

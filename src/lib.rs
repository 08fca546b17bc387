//! Rust library for controlling Heatzy heaters through the Gizwits websocket API
//!
//! This library keeps an authenticated websocket session open with the Heatzy
//! cloud service. It supports:
//!
//! - Device discovery from the account's binding list
//! - Real-time state notifications, delivered to a callback
//! - Reading device state on demand
//! - Control commands (modes, lock, boost, derogation, raw instructions)
//! - Manual subscription when auto-subscribe is disabled
//!
//! # Quick Start
//!
//! ```no_run
//! use heatzy_ws::{Action, Auth, ConnectOptions, Mode, Notification, Session, SessionConfig};
//! use std::sync::Arc;
//!
//! # async fn run(auth: Arc<dyn Auth>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::new(auth, SessionConfig::default());
//!
//! // Connect, log in and start receiving notifications
//! session
//!     .connect(ConnectOptions::new().callback(|notification| {
//!         if let Notification::Device(device) = notification {
//!             println!("{:?} -> {:?}", device.name(), device.mode());
//!         }
//!     }))
//!     .await?;
//!
//! // Control a device
//! for did in session.devices().keys() {
//!     session.send_action(did, Action::SetMode(Mode::Eco)).await?;
//! }
//!
//! // Wait for the receive loop to end
//! if let Some(listener) = session.listener() {
//!     listener.await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Session**: connection lifecycle, login and outbound operations
//! - **Dispatch**: background receive loop, routes inbound frames by command
//! - **Connection**: websocket link, writer task and heartbeat
//! - **Device**: device records, models and control encoding
//! - **Protocol**: JSON frame structures
//! - **Auth**: token and binding-list collaborator

mod auth;
mod config;
mod connection;
mod device;
mod dispatch;
mod error;
mod listener;
mod protocol;
mod session;
mod state;

#[cfg(test)]
mod testing;

// Public exports
pub use auth::{Auth, Binding, Bindings, Token, BINDINGS_RESOURCE};
pub use config::{
    SessionConfig, APPLICATION_ID, WSS_PORT, WS_CLOSE_TIMEOUT, WS_HOST, WS_PATH, WS_PING_INTERVAL,
    WS_PORT,
};
pub use device::{
    all_warm, Action, Device, DeviceId, Devices, Family, Mode, Model, V1_TURN_OFF, V1_TURN_ON,
};
pub use error::{HeatzyError, Result};
pub use listener::{Callback, ConnectOptions, Listener, Notification};
pub use protocol::{ControlData, ControlPayload, DidRef, LoginData, Request};
pub use session::Session;

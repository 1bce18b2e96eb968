#![forbid(unsafe_code)]

//! Session orchestration for pulselink.
//!
//! [`NetworkController::start_session`] spawns a monitor task feeding network
//! samples and a worker task owning the transport. The worker walks the
//! session state machine (connect with protocol fallback, stream, degrade and
//! recover, reconnect with backoff) and publishes every observable change on
//! the event bus.

mod config;
mod controller;
mod error;
mod monitor;
mod registry;
mod worker;

pub use config::{ControllerOptions, SessionOptions};
pub use controller::{NetworkController, SessionHandle, TransportFactory};
pub use error::{SessionError, SessionResult};
pub use monitor::{Monitor, Probe};
pub use registry::SessionSnapshot;

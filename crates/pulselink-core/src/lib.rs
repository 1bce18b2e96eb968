//! Shared domain types for the pulselink streaming controller.
//!
//! Everything here is an immutable value type passed between the monitor,
//! estimator, controller and transport layers. No I/O, no async.

#![forbid(unsafe_code)]

mod estimate;
mod frame;
mod protocol;
mod quality;
mod sample;
mod state;

pub use estimate::{BandwidthEstimate, FusionWeights, InvalidWeights};
pub use frame::{SessionId, TransmissionFrame};
pub use protocol::Protocol;
pub use quality::QualityProfile;
pub use sample::{NetworkClass, NetworkSample, SampleHistory};
pub use state::SessionState;

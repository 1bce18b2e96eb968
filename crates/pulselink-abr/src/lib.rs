//! Bandwidth estimation and closed-loop quality control.
//!
//! Three sub-estimators (naive class lookup, adaptive weighted history,
//! learned offline-trained model) are fused into a single bandwidth
//! prediction. A hysteresis controller maps the prediction into a target
//! quality profile and bitrate, and a per-frame scheduler decides
//! transmit-or-drop against live transport backpressure.
//!
//! Everything in this crate is pure computation: no I/O, no async. The
//! session orchestrator owns the loop that feeds it.

#![forbid(unsafe_code)]

mod controller;
mod error;
mod estimator;
mod scheduler;
mod types;

pub use controller::{QualityAction, QualityController, QualityDecision};
pub use error::AbrError;
pub use estimator::{BandwidthEstimator, HybridEstimator, LearnedModel, naive_bandwidth_bps};
pub use scheduler::{DropReason, FrameScheduler, ScheduleDecision};
pub use types::AbrOptions;

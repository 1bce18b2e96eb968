//! Event surface of the streaming controller.
//!
//! Collaborators (UI, monitoring, logging) observe the core exclusively
//! through the bus: the core publishes and never blocks waiting on a
//! subscriber.

#![forbid(unsafe_code)]

mod bus;
mod event;

pub use bus::EventBus;
pub use event::{DropReason, ErrorEvent, Event, FrameEvent, QualityEvent, SessionEvent};

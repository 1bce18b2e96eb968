use std::time::Instant;

use bytes::Bytes;

/// Opaque identifier of one streaming session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One unit of payload (video/sensor chunk) handed to the frame scheduler.
///
/// Frames are never mutated: a dropped frame is discarded, not requeued.
#[derive(Clone, Debug)]
pub struct TransmissionFrame {
    /// Strictly monotonically increasing per session.
    pub seq: u64,
    pub captured_at: Instant,
    pub payload: Bytes,
    /// Priority frames carry clinically significant markers.
    pub priority: bool,
}

impl TransmissionFrame {
    pub fn new(seq: u64, payload: Bytes) -> Self {
        Self {
            seq,
            captured_at: Instant::now(),
            payload,
            priority: false,
        }
    }

    pub fn with_priority(mut self) -> Self {
        self.priority = true;
        self
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

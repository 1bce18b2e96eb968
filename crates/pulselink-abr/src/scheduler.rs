use std::time::Duration;

use pulselink_core::TransmissionFrame;

use crate::types::AbrOptions;

/// Why a frame was not transmitted.
///
/// Drops are a policy decision, not an error: stale physiological frames
/// have no value after their capture window and are never retried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DropReason {
    LatencyExceeded,
    BufferFull,
    ErrorBurst,
    /// Sequence number not greater than the last scheduled frame.
    StaleSequence,
    /// Submission queue overflowed before the scheduler saw the frame.
    QueueOverflow,
}

impl DropReason {
    /// Stable diagnostic label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LatencyExceeded => "latency-exceeded",
            Self::BufferFull => "buffer-full",
            Self::ErrorBurst => "error-burst",
            Self::StaleSequence => "stale-sequence",
            Self::QueueOverflow => "queue-overflow",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame verdict.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScheduleDecision {
    Transmit,
    Drop(DropReason),
}

/// Decides, per outgoing frame, whether to transmit or drop.
///
/// Rules are evaluated in order; the first match wins. The scheduler also
/// enforces strictly increasing sequence numbers: a frame is never
/// transmitted twice, and gaps are logged, never renumbered.
#[derive(Clone, Debug)]
pub struct FrameScheduler {
    opts: AbrOptions,
    last_seq: Option<u64>,
}

impl FrameScheduler {
    pub fn new(opts: AbrOptions) -> Self {
        Self {
            opts,
            last_seq: None,
        }
    }

    /// Schedule one frame against live transport state.
    ///
    /// `latency` is the current measured network latency, `buffer_fill` the
    /// transport send-buffer fill ratio in [0, 1], `recent_errors` the
    /// transport error count in the rolling window.
    pub fn schedule(
        &mut self,
        frame: &TransmissionFrame,
        latency: Duration,
        buffer_fill: f64,
        recent_errors: u32,
    ) -> ScheduleDecision {
        if let Some(last) = self.last_seq {
            if frame.seq <= last {
                tracing::warn!(seq = frame.seq, last, "stale frame sequence, dropping");
                return ScheduleDecision::Drop(DropReason::StaleSequence);
            }
            if frame.seq > last + 1 {
                // Gap means upstream drops; record it, never renumber.
                tracing::debug!(from = last, to = frame.seq, "sequence gap observed");
            }
        }
        self.last_seq = Some(frame.seq);

        if latency > self.opts.max_frame_latency {
            return ScheduleDecision::Drop(DropReason::LatencyExceeded);
        }
        if buffer_fill > self.opts.max_buffer_fill {
            return ScheduleDecision::Drop(DropReason::BufferFull);
        }
        if recent_errors > self.opts.max_recent_errors {
            return ScheduleDecision::Drop(DropReason::ErrorBurst);
        }
        ScheduleDecision::Transmit
    }

    /// Highest sequence number seen so far.
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }
}

#![forbid(unsafe_code)]

use std::time::Duration;

use pulselink_abr::QualityAction;
use pulselink_core::{Protocol, QualityProfile, SessionId, SessionState};

pub use pulselink_abr::DropReason;

/// Unified notification for the streaming controller.
///
/// Hierarchical: each concern has its own variant with a sub-enum.
#[derive(Clone, Debug)]
pub enum Event {
    Session(SessionEvent),
    Quality(QualityEvent),
    Frame(FrameEvent),
    Error(ErrorEvent),
}

/// Session lifecycle events.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// Authoritative state machine transition.
    StateChanged {
        session: SessionId,
        state: SessionState,
    },
    /// Transport handshake completed.
    Connected {
        session: SessionId,
        protocol: Protocol,
    },
    /// Active strategy switched mid-session.
    ProtocolSwitched {
        session: SessionId,
        from: Protocol,
        to: Protocol,
    },
    /// Reconnection attempt scheduled after connection loss.
    ReconnectAttempt {
        session: SessionId,
        attempt: u32,
        delay: Duration,
    },
    Stopped { session: SessionId },
    Failed { session: SessionId, error: String },
}

/// Quality control events.
#[derive(Clone, Debug)]
pub enum QualityEvent {
    /// Quality profile changed.
    ProfileApplied {
        session: SessionId,
        from: QualityProfile,
        to: QualityProfile,
        action: QualityAction,
    },
    /// Target bitrate adjusted without a level change.
    BitrateAdjusted {
        session: SessionId,
        target_bps: u64,
    },
    /// Fresh fused bandwidth estimate.
    EstimateUpdated {
        session: SessionId,
        bps: u64,
        confidence: f64,
    },
}

/// Per-frame events.
#[derive(Clone, Debug)]
pub enum FrameEvent {
    Transmitted {
        session: SessionId,
        seq: u64,
        bytes: usize,
    },
    Dropped {
        session: SessionId,
        seq: u64,
        reason: DropReason,
    },
}

/// Error surface. Capacity drops are not errors and live in `FrameEvent`.
#[derive(Clone, Debug)]
pub enum ErrorEvent {
    /// Transport-level failure; `recoverable` signals a retry in progress.
    Transport {
        session: SessionId,
        error: String,
        recoverable: bool,
    },
    /// Protocol handshake failed; the selector will be re-evaluated.
    Handshake {
        session: SessionId,
        protocol: Protocol,
        error: String,
    },
}

impl From<SessionEvent> for Event {
    fn from(e: SessionEvent) -> Self {
        Self::Session(e)
    }
}

impl From<QualityEvent> for Event {
    fn from(e: QualityEvent) -> Self {
        Self::Quality(e)
    }
}

impl From<FrameEvent> for Event {
    fn from(e: FrameEvent) -> Self {
        Self::Frame(e)
    }
}

impl From<ErrorEvent> for Event {
    fn from(e: ErrorEvent) -> Self {
        Self::Error(e)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn is_stopped(event: &SessionEvent) -> bool {
        matches!(event, SessionEvent::Stopped { session } if session.0 == 3)
    }

    fn is_state_changed(event: &SessionEvent) -> bool {
        matches!(
            event,
            SessionEvent::StateChanged {
                state: SessionState::Streaming,
                ..
            }
        )
    }

    #[rstest]
    #[case(SessionEvent::Stopped { session: SessionId(3) }, is_stopped)]
    #[case(
        SessionEvent::StateChanged {
            session: SessionId(1),
            state: SessionState::Streaming,
        },
        is_state_changed
    )]
    fn session_event_into_event(
        #[case] session_event: SessionEvent,
        #[case] check: fn(&SessionEvent) -> bool,
    ) {
        let event: Event = session_event.into();
        assert!(matches!(event, Event::Session(inner) if check(&inner)));
    }

    #[test]
    fn frame_event_into_event() {
        let event: Event = FrameEvent::Dropped {
            session: SessionId(1),
            seq: 42,
            reason: DropReason::LatencyExceeded,
        }
        .into();
        assert!(matches!(
            event,
            Event::Frame(FrameEvent::Dropped { seq: 42, .. })
        ));
    }

    #[test]
    fn error_event_into_event() {
        let event: Event = ErrorEvent::Handshake {
            session: SessionId(1),
            protocol: Protocol::Quic,
            error: "refused".into(),
        }
        .into();
        assert!(matches!(event, Event::Error(ErrorEvent::Handshake { .. })));
    }
}

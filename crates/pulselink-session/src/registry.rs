//! Session records and the registry.
//!
//! The registry is the single synchronization point for session metadata.
//! The lock is never held across I/O; diagnostics reads clone a snapshot.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use pulselink_core::{Protocol, QualityProfile, SessionId, SessionState};
use pulselink_events::{EventBus, SessionEvent};
use tracing::warn;

/// Mutable per-session record, owned by the registry.
#[derive(Clone, Debug)]
struct Session {
    id: SessionId,
    endpoint: String,
    protocol: Option<Protocol>,
    quality: QualityProfile,
    state: SessionState,
    created_at: Instant,
    bytes_sent: u64,
    frames_dropped: u64,
    reconnects: u32,
}

/// Point-in-time copy of a session's diagnostics.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub endpoint: String,
    pub protocol: Option<Protocol>,
    pub quality: QualityProfile,
    pub state: SessionState,
    pub created_at: Instant,
    pub bytes_sent: u64,
    pub frames_dropped: u64,
    pub reconnects: u32,
}

#[derive(Clone, Default)]
pub(crate) struct Registry {
    inner: Arc<Mutex<HashMap<SessionId, Session>>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, id: SessionId, endpoint: String, quality: QualityProfile) {
        self.lock().insert(
            id,
            Session {
                id,
                endpoint,
                protocol: None,
                quality,
                state: SessionState::Idle,
                created_at: Instant::now(),
                bytes_sent: 0,
                frames_dropped: 0,
                reconnects: 0,
            },
        );
    }

    /// Whether a non-terminal session already streams to this endpoint.
    pub(crate) fn endpoint_active(&self, endpoint: &str) -> bool {
        self.lock()
            .values()
            .any(|s| s.endpoint == endpoint && !s.state.is_terminal())
    }

    /// Apply a state transition, publishing the change.
    ///
    /// Invalid transitions are bugs in the orchestrator; they are surfaced
    /// loudly in debug builds and logged in release, never applied.
    pub(crate) fn set_state(&self, id: SessionId, next: SessionState, bus: &EventBus) -> bool {
        let applied = {
            let mut sessions = self.lock();
            let Some(session) = sessions.get_mut(&id) else {
                return false;
            };
            if !session.state.can_transition_to(next) {
                debug_assert!(
                    false,
                    "illegal session transition {} -> {next}",
                    session.state
                );
                warn!(%id, from = %session.state, to = %next, "illegal session transition ignored");
                return false;
            }
            session.state = next;
            true
        };
        if applied {
            bus.publish(SessionEvent::StateChanged { session: id, state: next });
        }
        applied
    }

    pub(crate) fn state(&self, id: SessionId) -> Option<SessionState> {
        self.lock().get(&id).map(|s| s.state)
    }

    pub(crate) fn set_protocol(&self, id: SessionId, protocol: Protocol) {
        if let Some(session) = self.lock().get_mut(&id) {
            session.protocol = Some(protocol);
        }
    }

    pub(crate) fn set_quality(&self, id: SessionId, quality: QualityProfile) {
        if let Some(session) = self.lock().get_mut(&id) {
            session.quality = quality;
        }
    }

    pub(crate) fn add_bytes(&self, id: SessionId, bytes: u64) {
        if let Some(session) = self.lock().get_mut(&id) {
            session.bytes_sent += bytes;
        }
    }

    pub(crate) fn add_drop(&self, id: SessionId) {
        if let Some(session) = self.lock().get_mut(&id) {
            session.frames_dropped += 1;
        }
    }

    pub(crate) fn add_reconnect(&self, id: SessionId) {
        if let Some(session) = self.lock().get_mut(&id) {
            session.reconnects += 1;
        }
    }

    pub(crate) fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub(crate) fn snapshot(&self, id: SessionId) -> Option<SessionSnapshot> {
        self.lock().get(&id).map(|s| SessionSnapshot {
            id: s.id,
            endpoint: s.endpoint.clone(),
            protocol: s.protocol,
            quality: s.quality,
            state: s.state,
            created_at: s.created_at,
            bytes_sent: s.bytes_sent,
            frames_dropped: s.frames_dropped,
            reconnects: s.reconnects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(id: SessionId) -> (Registry, EventBus) {
        let registry = Registry::default();
        registry.insert(id, "10.0.0.1:9000".into(), QualityProfile::Medium);
        (registry, EventBus::default())
    }

    #[test]
    fn insert_and_snapshot() {
        let (registry, _) = registry_with(SessionId(1));
        let snap = registry.snapshot(SessionId(1)).unwrap();
        assert_eq!(snap.state, SessionState::Idle);
        assert_eq!(snap.bytes_sent, 0);
        assert!(registry.snapshot(SessionId(99)).is_none());
    }

    #[test]
    fn valid_transition_applies_and_publishes() {
        let (registry, bus) = registry_with(SessionId(1));
        let mut rx = bus.subscribe();

        assert!(registry.set_state(SessionId(1), SessionState::Connecting, &bus));
        assert_eq!(registry.state(SessionId(1)), Some(SessionState::Connecting));
        assert!(matches!(
            rx.try_recv().unwrap(),
            pulselink_events::Event::Session(SessionEvent::StateChanged {
                state: SessionState::Connecting,
                ..
            })
        ));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "illegal session transition"))]
    fn invalid_transition_is_rejected() {
        let (registry, bus) = registry_with(SessionId(1));
        // Idle -> Streaming skips Connecting.
        let applied = registry.set_state(SessionId(1), SessionState::Streaming, &bus);
        assert!(!applied);
        assert_eq!(registry.state(SessionId(1)), Some(SessionState::Idle));
    }

    #[test]
    fn counters_accumulate() {
        let (registry, _) = registry_with(SessionId(1));
        registry.add_bytes(SessionId(1), 100);
        registry.add_bytes(SessionId(1), 50);
        registry.add_drop(SessionId(1));
        registry.add_reconnect(SessionId(1));

        let snap = registry.snapshot(SessionId(1)).unwrap();
        assert_eq!(snap.bytes_sent, 150);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.reconnects, 1);
    }

    #[test]
    fn endpoint_activity_ignores_terminal_sessions() {
        let (registry, bus) = registry_with(SessionId(1));
        assert!(registry.endpoint_active("10.0.0.1:9000"));
        assert!(!registry.endpoint_active("10.0.0.2:9000"));

        registry.set_state(SessionId(1), SessionState::Stopped, &bus);
        assert!(!registry.endpoint_active("10.0.0.1:9000"));
    }
}

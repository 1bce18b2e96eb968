//! Session orchestration entry point.
//!
//! [`NetworkController`] owns the registry and event bus; each started
//! session runs as a pair of tasks (monitor + worker) coordinated through
//! channels and a cancellation token.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use pulselink_abr::{DropReason, FrameScheduler, HybridEstimator, QualityController};
use pulselink_core::{SampleHistory, SessionId, TransmissionFrame};
use pulselink_events::{Event, EventBus, FrameEvent};
use pulselink_transport::{
    Protocol, ProtocolSelector, Transport, TransportOptions, TransportResult, build_transport,
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::{ControllerOptions, SessionOptions},
    error::{SessionError, SessionResult},
    monitor::{Monitor, Probe, run_monitor},
    registry::{Registry, SessionSnapshot},
    worker::SessionWorker,
};

/// Builds a transport strategy for a protocol. Injectable so tests can
/// substitute scripted transports.
pub type TransportFactory =
    Arc<dyn Fn(Protocol, TransportOptions) -> TransportResult<Box<dyn Transport>> + Send + Sync>;

/// Caller-side handle to a running session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: SessionId,
    frame_tx: mpsc::Sender<TransmissionFrame>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Orchestrates streaming sessions: lifecycle, transport selection,
/// adaptation, and diagnostics.
pub struct NetworkController {
    bus: EventBus,
    registry: Registry,
    factory: TransportFactory,
    next_id: AtomicU64,
}

impl Default for NetworkController {
    fn default() -> Self {
        Self::new(ControllerOptions::default())
    }
}

impl NetworkController {
    pub fn new(opts: ControllerOptions) -> Self {
        Self {
            bus: EventBus::new(opts.event_capacity),
            registry: Registry::default(),
            factory: Arc::new(build_transport),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the transport factory. Test seam.
    pub fn with_transport_factory(mut self, factory: TransportFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Subscribe to session, quality, frame, and error events.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Start a session toward `endpoint`, driven by `probe` measurements.
    ///
    /// Validation is synchronous; connection establishment happens on the
    /// spawned worker and is observable through events and [`Self::snapshot`].
    pub fn start_session<P: Probe + 'static>(
        &self,
        endpoint: impl Into<String>,
        opts: SessionOptions,
        probe: P,
    ) -> SessionResult<SessionHandle> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(SessionError::fatal("endpoint must be non-empty"));
        }
        opts.validate()?;
        if self.registry.endpoint_active(&endpoint) {
            return Err(SessionError::EndpointBusy(endpoint));
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry.insert(id, endpoint.clone(), opts.initial_quality);
        info!(session = %id, %endpoint, "session starting");

        let (frame_tx, frame_rx) = mpsc::channel(opts.frame_queue_capacity);
        let (sample_tx, sample_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let monitor = Monitor::new(probe, opts.probe_timeout);
        tokio::spawn(run_monitor(
            monitor,
            opts.sampling_interval,
            sample_tx,
            cancel.clone(),
        ));

        let worker = SessionWorker {
            id,
            endpoint,
            estimator: HybridEstimator::new(opts.abr.clone()),
            controller: QualityController::new(opts.abr.clone(), opts.initial_quality),
            scheduler: FrameScheduler::new(opts.abr.clone()),
            history: SampleHistory::new(opts.history_window),
            selector: ProtocolSelector::new(opts.selector_cooldown)
                .with_excluded(opts.excluded_protocols.iter().copied()),
            opts,
            registry: self.registry.clone(),
            bus: self.bus.clone(),
            factory: Arc::clone(&self.factory),
            frame_rx,
            sample_rx,
            cancel: cancel.clone(),
            degraded_since: None,
            recovered_cycles: 0,
            latest_rtt: Duration::ZERO,
        };
        tokio::spawn(worker.run());

        Ok(SessionHandle { id, frame_tx, cancel })
    }

    /// Hand a captured frame to the session.
    ///
    /// A full queue drops the frame (counted and published) rather than
    /// blocking the capture path.
    pub fn submit_frame(
        &self,
        handle: &SessionHandle,
        frame: TransmissionFrame,
    ) -> SessionResult<()> {
        if handle.cancel.is_cancelled() {
            return Err(SessionError::AlreadyStopped);
        }
        let seq = frame.seq;
        match handle.frame_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session = %handle.id, seq, "frame queue full, dropping");
                self.registry.add_drop(handle.id);
                self.bus.publish(FrameEvent::Dropped {
                    session: handle.id,
                    seq,
                    reason: DropReason::QueueOverflow,
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SessionError::AlreadyStopped),
        }
    }

    /// Request a graceful stop. Idempotent; repeated calls are no-ops.
    pub fn stop_session(&self, handle: &SessionHandle) -> SessionResult<()> {
        if !self.registry.contains(handle.id) {
            return Err(SessionError::UnknownSession(handle.id));
        }
        handle.cancel.cancel();
        Ok(())
    }

    /// Point-in-time diagnostics for a session.
    pub fn snapshot(&self, handle: &SessionHandle) -> Option<SessionSnapshot> {
        self.registry.snapshot(handle.id)
    }
}

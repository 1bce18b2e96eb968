//! Per-session task: owns the transport strategy and runs the control and
//! frame loops until the session stops or fails.

use std::time::Duration;

use pulselink_abr::{
    BandwidthEstimator, DropReason, FrameScheduler, HybridEstimator, QualityAction,
    QualityController, ScheduleDecision,
};
use pulselink_core::{
    NetworkClass, NetworkSample, SampleHistory, SessionId, SessionState, TransmissionFrame,
};
use pulselink_events::{ErrorEvent, EventBus, FrameEvent, QualityEvent, SessionEvent};
use pulselink_transport::{
    Protocol, ProtocolSelector, SelectionRequest, Transport, TransportError,
};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    config::SessionOptions, controller::TransportFactory, error::SessionError, registry::Registry,
};

enum RecoverOutcome {
    Resumed,
    Cancelled,
    Exhausted,
}

pub(crate) struct SessionWorker {
    pub(crate) id: SessionId,
    pub(crate) endpoint: String,
    pub(crate) opts: SessionOptions,
    pub(crate) registry: Registry,
    pub(crate) bus: EventBus,
    pub(crate) selector: ProtocolSelector,
    pub(crate) factory: TransportFactory,
    pub(crate) estimator: HybridEstimator,
    pub(crate) controller: QualityController,
    pub(crate) scheduler: FrameScheduler,
    pub(crate) history: SampleHistory,
    pub(crate) frame_rx: mpsc::Receiver<TransmissionFrame>,
    pub(crate) sample_rx: mpsc::Receiver<NetworkSample>,
    pub(crate) cancel: CancellationToken,
    pub(crate) degraded_since: Option<Instant>,
    pub(crate) recovered_cycles: u32,
    pub(crate) latest_rtt: Duration,
}

impl SessionWorker {
    pub(crate) async fn run(mut self) {
        let mut transport = match self.connect_phase().await {
            Ok(transport) => transport,
            Err(error) => {
                if self.cancel.is_cancelled() {
                    self.finish_stopped(None).await;
                } else {
                    self.fail(error.to_string());
                }
                return;
            }
        };

        self.registry
            .set_state(self.id, SessionState::Streaming, &self.bus);
        self.bus.publish(SessionEvent::Connected {
            session: self.id,
            protocol: transport.protocol(),
        });

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    self.finish_stopped(Some(&mut transport)).await;
                    break;
                }

                Some(sample) = self.sample_rx.recv() => {
                    self.on_sample(sample);
                }

                frame = self.frame_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if let Err(error) = self.handle_frame(frame, &mut transport).await {
                                debug!(session = %self.id, %error, "transport lost, recovering");
                                match self.recover(&mut transport).await {
                                    RecoverOutcome::Resumed => {}
                                    RecoverOutcome::Cancelled => {
                                        // Loop again; the cancel branch stops.
                                    }
                                    RecoverOutcome::Exhausted => break,
                                }
                            }
                        }
                        None => {
                            self.finish_stopped(Some(&mut transport)).await;
                            break;
                        }
                    }
                }
            }
        }

        trace!(session = %self.id, "session worker exited");
    }

    /// CONNECTING: select a protocol, connect with retry, fall back to the
    /// next protocol when the handshake is rejected.
    async fn connect_phase(&mut self) -> Result<Box<dyn Transport>, SessionError> {
        self.registry
            .set_state(self.id, SessionState::Connecting, &self.bus);

        let mut handshake_failures = 0u32;
        let mut first = true;
        loop {
            if self.cancel.is_cancelled() {
                return Err(SessionError::AlreadyStopped);
            }

            let protocol = match (first, self.opts.protocol_hint) {
                (true, Some(hint)) if !self.opts.excluded_protocols.contains(&hint) => hint,
                _ => self.selector.select(&self.selection_request(), Instant::now()),
            };
            first = false;

            let mut transport = match (self.factory)(protocol, self.opts.transport.clone()) {
                Ok(transport) => transport,
                Err(error) => {
                    // Unbuildable strategy counts as a rejected handshake.
                    handshake_failures += 1;
                    self.on_handshake_failure(protocol, &error);
                    if handshake_failures >= Protocol::ALL.len() as u32 {
                        return Err(SessionError::HandshakeExhausted {
                            attempts: handshake_failures,
                        });
                    }
                    continue;
                }
            };

            match self.connect_with_retry(transport.as_mut()).await {
                Ok(()) => {
                    self.registry.set_protocol(self.id, protocol);
                    info!(session = %self.id, %protocol, endpoint = %self.endpoint, "connected");
                    return Ok(transport);
                }
                Err(error) if error.is_handshake() => {
                    handshake_failures += 1;
                    self.on_handshake_failure(protocol, &error);
                    if handshake_failures >= Protocol::ALL.len() as u32 {
                        return Err(SessionError::HandshakeExhausted {
                            attempts: handshake_failures,
                        });
                    }
                }
                Err(error) => return Err(SessionError::Transport(error)),
            }
        }
    }

    /// Retries transient connect failures on the same protocol with
    /// exponential backoff. Handshake rejections are returned immediately
    /// for protocol fallback.
    async fn connect_with_retry(
        &self,
        transport: &mut dyn Transport,
    ) -> Result<(), TransportError> {
        let mut attempt = 0u32;
        loop {
            match transport.connect(&self.endpoint).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_handshake() => return Err(error),
                Err(error) => {
                    attempt += 1;
                    if attempt > self.opts.retry.max_retries {
                        return Err(TransportError::RetryExhausted {
                            attempts: self.opts.retry.max_retries,
                            source: Box::new(error),
                        });
                    }
                    self.bus.publish(ErrorEvent::Transport {
                        session: self.id,
                        error: error.to_string(),
                        recoverable: true,
                    });
                    let delay = self.opts.retry.delay_for_attempt(attempt);
                    warn!(session = %self.id, attempt, ?delay, %error, "connect failed, retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(error),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn on_handshake_failure(&mut self, protocol: Protocol, error: &TransportError) {
        warn!(session = %self.id, %protocol, %error, "handshake rejected, falling back");
        self.bus.publish(ErrorEvent::Handshake {
            session: self.id,
            protocol,
            error: error.to_string(),
        });
        self.selector.record_handshake_failure(protocol, Instant::now());
    }

    fn selection_request(&self) -> SelectionRequest {
        let class = self
            .history
            .latest()
            .map(|s| s.class)
            .unwrap_or(NetworkClass::Unknown);
        SelectionRequest {
            class,
            latency_budget: self.opts.latency_budget,
            reliability_target: self.opts.reliability_target,
            power_constrained: self.opts.power_constrained,
        }
    }

    /// One control cycle: estimate, decide quality, track degradation.
    fn on_sample(&mut self, sample: NetworkSample) {
        self.latest_rtt = sample.rtt;
        self.history.push(sample);
        let Some(estimate) = self.estimator.estimate(&self.history) else {
            return;
        };
        self.bus.publish(QualityEvent::EstimateUpdated {
            session: self.id,
            bps: estimate.bps,
            confidence: estimate.confidence,
        });

        let before = self.controller.profile();
        let decision = self.controller.on_estimate(&estimate);
        if decision.profile != before {
            self.registry.set_quality(self.id, decision.profile);
            self.bus.publish(QualityEvent::ProfileApplied {
                session: self.id,
                from: before,
                to: decision.profile,
                action: decision.action,
            });
        } else if decision.action == QualityAction::SoftReduce {
            self.bus.publish(QualityEvent::BitrateAdjusted {
                session: self.id,
                target_bps: decision.target_bitrate_bps,
            });
        }

        self.track_degradation(&sample, decision.profile.is_min(), decision.action);
    }

    /// STREAMING <-> DEGRADED bookkeeping. Degradation needs the bad signal
    /// sustained; recovery needs consecutive clean cycles.
    fn track_degradation(&mut self, sample: &NetworkSample, at_floor: bool, action: QualityAction) {
        let degraded_signal = at_floor || sample.loss_ratio > self.opts.degrade_loss_threshold;

        match self.registry.state(self.id) {
            Some(SessionState::Streaming) => {
                if degraded_signal {
                    let since = *self.degraded_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= self.opts.degrade_sustain {
                        self.registry
                            .set_state(self.id, SessionState::Degraded, &self.bus);
                        self.recovered_cycles = 0;
                    }
                } else {
                    self.degraded_since = None;
                }
            }
            Some(SessionState::Degraded) => {
                let degrading_action = matches!(
                    action,
                    QualityAction::StepDown | QualityAction::EmergencyDegrade
                );
                if !degraded_signal && !degrading_action {
                    self.recovered_cycles += 1;
                    if self.recovered_cycles >= self.opts.recover_cycles {
                        self.registry
                            .set_state(self.id, SessionState::Streaming, &self.bus);
                        self.degraded_since = None;
                        self.recovered_cycles = 0;
                    }
                } else {
                    self.recovered_cycles = 0;
                }
            }
            _ => {}
        }
    }

    /// Schedule and transmit one frame.
    ///
    /// The scheduler's latency input is the worse of the frame's queueing
    /// age and the last measured round-trip, so a fresh frame on a slow
    /// link is still dropped.
    ///
    /// Only connection-level failures propagate (to trigger recovery);
    /// everything else resolves to a transmit or a counted drop.
    async fn handle_frame(
        &mut self,
        frame: TransmissionFrame,
        transport: &mut Box<dyn Transport>,
    ) -> Result<(), TransportError> {
        let health = transport.health();
        let latency = frame.captured_at.elapsed().max(self.latest_rtt);
        match self
            .scheduler
            .schedule(&frame, latency, health.buffer_fill, health.recent_errors)
        {
            ScheduleDecision::Drop(reason) => {
                self.drop_frame(frame.seq, reason);
                Ok(())
            }
            ScheduleDecision::Transmit => match transport.send(&frame).await {
                Ok(()) => {
                    self.registry.add_bytes(self.id, frame.size() as u64);
                    self.bus.publish(FrameEvent::Transmitted {
                        session: self.id,
                        seq: frame.seq,
                        bytes: frame.size(),
                    });
                    Ok(())
                }
                Err(TransportError::QueueFull) => {
                    self.drop_frame(frame.seq, DropReason::BufferFull);
                    Ok(())
                }
                Err(TransportError::Timeout) => {
                    self.drop_frame(frame.seq, DropReason::LatencyExceeded);
                    Ok(())
                }
                Err(error) if error.is_retryable() => {
                    self.bus.publish(ErrorEvent::Transport {
                        session: self.id,
                        error: error.to_string(),
                        recoverable: true,
                    });
                    Err(error)
                }
                Err(error) => {
                    warn!(session = %self.id, seq = frame.seq, %error, "frame send failed");
                    self.bus.publish(ErrorEvent::Transport {
                        session: self.id,
                        error: error.to_string(),
                        recoverable: false,
                    });
                    self.drop_frame(frame.seq, DropReason::ErrorBurst);
                    Ok(())
                }
            },
        }
    }

    fn drop_frame(&self, seq: u64, reason: DropReason) {
        debug!(session = %self.id, seq, %reason, "frame dropped");
        self.registry.add_drop(self.id);
        self.bus.publish(FrameEvent::Dropped {
            session: self.id,
            seq,
            reason,
        });
    }

    /// RECOVERING: reconnect with exponential backoff, re-evaluating the
    /// protocol choice on every attempt. Switching strategies publishes
    /// `ProtocolSwitched` once the new transport connects.
    async fn recover(&mut self, transport: &mut Box<dyn Transport>) -> RecoverOutcome {
        self.registry
            .set_state(self.id, SessionState::Recovering, &self.bus);
        let _ = transport.close().await;
        let previous = transport.protocol();

        for attempt in 1..=self.opts.retry.max_retries {
            let delay = self.opts.retry.delay_for_attempt(attempt);
            self.bus.publish(SessionEvent::ReconnectAttempt {
                session: self.id,
                attempt,
                delay,
            });
            info!(session = %self.id, attempt, ?delay, "reconnecting");

            tokio::select! {
                _ = self.cancel.cancelled() => return RecoverOutcome::Cancelled,
                _ = sleep(delay) => {}
            }

            let protocol = self.selector.select(&self.selection_request(), Instant::now());
            if protocol != transport.protocol() {
                match (self.factory)(protocol, self.opts.transport.clone()) {
                    Ok(next) => *transport = next,
                    Err(error) => {
                        self.on_handshake_failure(protocol, &error);
                        continue;
                    }
                }
            }

            match transport.connect(&self.endpoint).await {
                Ok(()) => {
                    if transport.protocol() != previous {
                        self.registry.set_protocol(self.id, transport.protocol());
                        self.bus.publish(SessionEvent::ProtocolSwitched {
                            session: self.id,
                            from: previous,
                            to: transport.protocol(),
                        });
                    }
                    self.registry.add_reconnect(self.id);
                    self.degraded_since = None;
                    self.recovered_cycles = 0;
                    self.registry
                        .set_state(self.id, SessionState::Streaming, &self.bus);
                    self.bus.publish(SessionEvent::Connected {
                        session: self.id,
                        protocol: transport.protocol(),
                    });
                    return RecoverOutcome::Resumed;
                }
                Err(error) if error.is_handshake() => {
                    self.on_handshake_failure(transport.protocol(), &error);
                }
                Err(error) => {
                    self.bus.publish(ErrorEvent::Transport {
                        session: self.id,
                        error: error.to_string(),
                        recoverable: attempt < self.opts.retry.max_retries,
                    });
                }
            }
        }

        let error = SessionError::ReconnectExhausted {
            attempts: self.opts.retry.max_retries,
        };
        self.fail(error.to_string());
        RecoverOutcome::Exhausted
    }

    /// Terminal FAILED: the caller must start a new session.
    fn fail(&self, error: String) {
        warn!(session = %self.id, %error, "session failed");
        self.registry
            .set_state(self.id, SessionState::Failed, &self.bus);
        self.bus.publish(SessionEvent::Failed {
            session: self.id,
            error,
        });
        // Stops the monitor task and refuses further frames.
        self.cancel.cancel();
    }

    async fn finish_stopped(&mut self, transport: Option<&mut Box<dyn Transport>>) {
        if let Some(transport) = transport {
            // In-flight sends may complete; no new frames are accepted.
            let _ = transport.close().await;
        }
        self.registry
            .set_state(self.id, SessionState::Stopped, &self.bus);
        self.bus.publish(SessionEvent::Stopped { session: self.id });
        info!(session = %self.id, "session stopped");
    }
}

//! Configuration surface for sessions and the controller.

use std::time::Duration;

use pulselink_abr::AbrOptions;
use pulselink_core::{FusionWeights, Protocol, QualityProfile};
use pulselink_crypto::CipherContext;
use pulselink_transport::{RetryPolicy, TransportOptions};

use crate::error::SessionError;

/// Per-session tuning. Validated synchronously at `start_session`; invalid
/// values are fatal and abort before any connection attempt.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Cadence of the network condition monitor.
    pub sampling_interval: Duration,
    /// Deadline for one probe reading; a timeout yields a degraded sample.
    pub probe_timeout: Duration,
    /// Retained sample history (estimator input window).
    pub history_window: usize,
    pub abr: AbrOptions,
    pub transport: TransportOptions,
    /// Reconnect backoff schedule.
    pub retry: RetryPolicy,
    /// Loss ratio above which a cycle counts toward degradation.
    pub degrade_loss_threshold: f64,
    /// How long the degraded signal must persist before DEGRADED.
    pub degrade_sustain: Duration,
    /// Recovered control cycles required to leave DEGRADED.
    pub recover_cycles: u32,
    pub latency_budget: Duration,
    pub reliability_target: f64,
    pub power_constrained: bool,
    /// Pin the first connection attempt to a specific protocol.
    pub protocol_hint: Option<Protocol>,
    pub initial_quality: QualityProfile,
    /// Capacity of the frame submission queue; overflow drops frames.
    pub frame_queue_capacity: usize,
    /// Cooldown for protocols whose handshake failed.
    pub selector_cooldown: Duration,
    pub excluded_protocols: Vec<Protocol>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(1000),
            probe_timeout: Duration::from_millis(500),
            history_window: 10,
            abr: AbrOptions::default(),
            transport: TransportOptions::default(),
            retry: RetryPolicy::default(),
            degrade_loss_threshold: 0.3,
            degrade_sustain: Duration::from_secs(5),
            recover_cycles: 2,
            latency_budget: Duration::from_millis(150),
            reliability_target: 0.95,
            power_constrained: false,
            protocol_hint: None,
            initial_quality: QualityProfile::Medium,
            frame_queue_capacity: 256,
            selector_cooldown: Duration::from_secs(30),
            excluded_protocols: Vec::new(),
        }
    }
}

impl SessionOptions {
    pub fn with_fusion(mut self, fusion: FusionWeights) -> Self {
        self.abr = self.abr.with_fusion(fusion);
        self
    }

    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_latency_budget(mut self, budget: Duration) -> Self {
        self.latency_budget = budget;
        self
    }

    pub fn with_reliability_target(mut self, target: f64) -> Self {
        self.reliability_target = target;
        self
    }

    pub fn with_power_constrained(mut self, constrained: bool) -> Self {
        self.power_constrained = constrained;
        self
    }

    pub fn with_protocol_hint(mut self, protocol: Protocol) -> Self {
        self.protocol_hint = Some(protocol);
        self
    }

    pub fn with_initial_quality(mut self, quality: QualityProfile) -> Self {
        self.initial_quality = quality;
        self
    }

    pub fn with_cipher(mut self, cipher: CipherContext) -> Self {
        self.transport = self.transport.with_cipher(cipher);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_excluded_protocols<I: IntoIterator<Item = Protocol>>(
        mut self,
        protocols: I,
    ) -> Self {
        self.excluded_protocols = protocols.into_iter().collect();
        self
    }

    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.sampling_interval.is_zero() {
            return Err(SessionError::fatal("sampling interval must be non-zero"));
        }
        if self.probe_timeout.is_zero() {
            return Err(SessionError::fatal("probe timeout must be non-zero"));
        }
        if self.history_window == 0 {
            return Err(SessionError::fatal("history window must hold at least one sample"));
        }
        if !(self.reliability_target > 0.0 && self.reliability_target <= 1.0) {
            return Err(SessionError::fatal(format!(
                "reliability target {} outside (0, 1]",
                self.reliability_target
            )));
        }
        if !(0.0..=1.0).contains(&self.degrade_loss_threshold) {
            return Err(SessionError::fatal(format!(
                "degrade loss threshold {} outside [0, 1]",
                self.degrade_loss_threshold
            )));
        }
        if self.frame_queue_capacity == 0 {
            return Err(SessionError::fatal("frame queue capacity must be non-zero"));
        }
        if self.retry.max_retries == 0 {
            return Err(SessionError::fatal("retry budget must allow at least one attempt"));
        }
        let a = &self.abr;
        if !(a.step_up_utilization < a.soft_reduce_utilization
            && a.soft_reduce_utilization < a.step_down_utilization
            && a.step_down_utilization < a.emergency_utilization)
        {
            return Err(SessionError::fatal(
                "utilization thresholds must be strictly increasing",
            ));
        }
        Ok(())
    }
}

/// Controller-wide tuning.
#[derive(Clone, Debug)]
pub struct ControllerOptions {
    /// Event bus channel capacity.
    pub event_capacity: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SessionOptions::default().validate().is_ok());
    }

    #[rstest]
    #[case::zero_interval(SessionOptions {
        sampling_interval: Duration::ZERO,
        ..SessionOptions::default()
    })]
    #[case::zero_probe_timeout(SessionOptions {
        probe_timeout: Duration::ZERO,
        ..SessionOptions::default()
    })]
    #[case::empty_history(SessionOptions {
        history_window: 0,
        ..SessionOptions::default()
    })]
    #[case::reliability_above_one(SessionOptions {
        reliability_target: 1.5,
        ..SessionOptions::default()
    })]
    #[case::zero_queue(SessionOptions {
        frame_queue_capacity: 0,
        ..SessionOptions::default()
    })]
    #[case::no_retry_budget(SessionOptions {
        retry: RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(60)),
        ..SessionOptions::default()
    })]
    fn invalid_options_are_fatal(#[case] opts: SessionOptions) {
        let err = opts.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn unordered_utilization_thresholds_are_fatal() {
        let mut opts = SessionOptions::default();
        opts.abr.step_down_utilization = 0.4; // below soft_reduce
        assert!(opts.validate().unwrap_err().is_fatal());
    }

    #[test]
    fn builders_compose() {
        let opts = SessionOptions::default()
            .with_latency_budget(Duration::from_millis(80))
            .with_reliability_target(0.99)
            .with_protocol_hint(Protocol::Srt)
            .with_power_constrained(true);
        assert_eq!(opts.latency_budget, Duration::from_millis(80));
        assert_eq!(opts.protocol_hint, Some(Protocol::Srt));
        assert!(opts.power_constrained);
        assert!(opts.validate().is_ok());
    }
}

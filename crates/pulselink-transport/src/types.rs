use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use pulselink_core::Protocol;
use pulselink_crypto::CipherContext;
use tokio::time::Instant;

/// Reconnect backoff policy.
///
/// Attempt numbers start at 1; `delay_for_attempt(0)` is zero so the first
/// connect goes out immediately. With the defaults the delays are
/// 1s, 2s, 4s, 8s, 16s.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Per-attempt delay growth factor. Values below 1.0 are treated as 1.0.
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // Exponent is clamped so an overgrown factor saturates at max_delay
        // instead of overflowing.
        let factor = self
            .multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1).min(64) as i32);
        let delay = self.base_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Snapshot of a transport's delivery health, polled by the frame scheduler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransportHealth {
    pub connected: bool,
    /// Send-queue occupancy in `[0.0, 1.0]`.
    pub buffer_fill: f64,
    /// Send errors within the rolling error window.
    pub recent_errors: u32,
}

impl TransportHealth {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            buffer_fill: 0.0,
            recent_errors: 0,
        }
    }
}

/// Rolling window over send-error timestamps.
#[derive(Debug)]
pub(crate) struct ErrorWindow {
    window: Duration,
    errors: VecDeque<Instant>,
}

impl ErrorWindow {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            errors: VecDeque::new(),
        }
    }

    pub(crate) fn record(&mut self, at: Instant) {
        self.errors.push_back(at);
    }

    pub(crate) fn count(&mut self, now: Instant) -> u32 {
        while let Some(front) = self.errors.front() {
            if now.duration_since(*front) > self.window {
                self.errors.pop_front();
            } else {
                break;
            }
        }
        self.errors.len() as u32
    }
}

/// Configuration shared by all transport strategies.
#[derive(Clone, Debug)]
pub struct TransportOptions {
    /// Deadline for a single frame write.
    pub send_timeout: Duration,
    /// Deadline for the connect-time handshake exchange.
    pub handshake_timeout: Duration,
    /// Capacity of the in-transport send queue (stream strategies).
    pub queue_capacity: usize,
    /// Chunk size for chunked broadcast writes.
    pub chunk_size: usize,
    /// Width of the rolling send-error window.
    pub error_window: Duration,
    /// Payload cipher. Required when encryption is enabled for the protocol.
    pub cipher: Option<CipherContext>,
    /// Per-protocol encryption overrides; absent protocols use
    /// [`Protocol::encrypted_by_default`].
    pub encrypt_overrides: HashMap<Protocol, bool>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(250),
            handshake_timeout: Duration::from_secs(3),
            queue_capacity: 64,
            chunk_size: 4096,
            error_window: Duration::from_secs(10),
            cipher: None,
            encrypt_overrides: HashMap::new(),
        }
    }
}

impl TransportOptions {
    pub fn with_cipher(mut self, cipher: CipherContext) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_encryption(mut self, protocol: Protocol, enabled: bool) -> Self {
        self.encrypt_overrides.insert(protocol, enabled);
        self
    }

    pub fn encryption_enabled(&self, protocol: Protocol) -> bool {
        self.encrypt_overrides
            .get(&protocol)
            .copied()
            .unwrap_or_else(|| protocol.encrypted_by_default())
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case(0, Duration::ZERO)]
    #[case(1, Duration::from_secs(1))]
    #[case(2, Duration::from_secs(2))]
    #[case(3, Duration::from_secs(4))]
    #[case(4, Duration::from_secs(8))]
    #[case(5, Duration::from_secs(16))]
    #[case(20, Duration::from_secs(60))] // Capped at max_delay
    fn retry_policy_default_schedule(#[case] attempt: u32, #[case] expected: Duration) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(attempt), expected);
    }

    #[rstest]
    fn retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[rstest]
    #[case(1.0, 1, Duration::from_secs(1))]
    #[case(1.0, 5, Duration::from_secs(1))] // Flat schedule never grows
    #[case(3.0, 2, Duration::from_secs(3))]
    #[case(3.0, 3, Duration::from_secs(9))]
    #[case(0.5, 4, Duration::from_secs(1))] // Sub-1.0 clamps to flat
    fn retry_policy_custom_multiplier(
        #[case] multiplier: f64,
        #[case] attempt: u32,
        #[case] expected: Duration,
    ) {
        let policy = RetryPolicy::default().with_multiplier(multiplier);
        assert_eq!(policy.delay_for_attempt(attempt), expected);
    }

    #[rstest]
    fn error_window_prunes_old_entries() {
        let mut window = ErrorWindow::new(Duration::from_secs(10));
        let start = Instant::now();
        window.record(start);
        window.record(start + Duration::from_secs(5));
        window.record(start + Duration::from_secs(12));

        assert_eq!(window.count(start + Duration::from_secs(12)), 3);
        assert_eq!(window.count(start + Duration::from_secs(16)), 2);
        assert_eq!(window.count(start + Duration::from_secs(30)), 0);
    }

    #[rstest]
    #[case(Protocol::Srt, true)]
    #[case(Protocol::Quic, true)]
    #[case(Protocol::Udp, false)]
    #[case(Protocol::Tcp, false)]
    fn encryption_defaults_follow_protocol(#[case] protocol: Protocol, #[case] expected: bool) {
        let opts = TransportOptions::default();
        assert_eq!(opts.encryption_enabled(protocol), expected);
    }

    #[rstest]
    fn encryption_override_wins() {
        let opts = TransportOptions::default()
            .with_encryption(Protocol::Udp, true)
            .with_encryption(Protocol::Srt, false);
        assert!(opts.encryption_enabled(Protocol::Udp));
        assert!(!opts.encryption_enabled(Protocol::Srt));
    }

    #[rstest]
    fn queue_capacity_clamped_to_one() {
        let opts = TransportOptions::default().with_queue_capacity(0);
        assert_eq!(opts.queue_capacity, 1);
    }
}

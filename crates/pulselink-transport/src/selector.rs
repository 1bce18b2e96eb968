//! Protocol selection.
//!
//! Pure decision rules over the session's latency budget, reliability
//! target and network class, plus a cooldown on protocols whose handshake
//! recently failed so fallback never loops on a rejecting endpoint.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use pulselink_core::{NetworkClass, Protocol};
use tokio::time::Instant;
use tracing::{debug, info};

/// Inputs to one selection decision.
#[derive(Clone, Copy, Debug)]
pub struct SelectionRequest {
    pub class: NetworkClass,
    pub latency_budget: Duration,
    pub reliability_target: f64,
    pub power_constrained: bool,
}

impl SelectionRequest {
    pub fn new(class: NetworkClass) -> Self {
        Self {
            class,
            latency_budget: Duration::from_millis(150),
            reliability_target: 0.95,
            power_constrained: false,
        }
    }
}

/// Picks a protocol by priority rule, skipping protocols that are excluded
/// by configuration or cooling down after a handshake failure.
///
/// Each rule names a primary strategy and an alternate with the same
/// delivery character; when both are unavailable the decision falls through
/// to the next rule.
#[derive(Debug)]
pub struct ProtocolSelector {
    cooldown: Duration,
    excluded: HashSet<Protocol>,
    failures: HashMap<Protocol, Instant>,
}

impl Default for ProtocolSelector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ProtocolSelector {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            excluded: HashSet::new(),
            failures: HashMap::new(),
        }
    }

    pub fn with_excluded<I: IntoIterator<Item = Protocol>>(mut self, protocols: I) -> Self {
        self.excluded.extend(protocols);
        self
    }

    /// Puts a protocol on cooldown after its handshake was rejected.
    pub fn record_handshake_failure(&mut self, protocol: Protocol, now: Instant) {
        info!(%protocol, cooldown = ?self.cooldown, "protocol on cooldown after failed handshake");
        self.failures.insert(protocol, now);
    }

    fn available(&self, protocol: Protocol, now: Instant) -> bool {
        if self.excluded.contains(&protocol) {
            return false;
        }
        match self.failures.get(&protocol) {
            Some(failed_at) => now.duration_since(*failed_at) >= self.cooldown,
            None => true,
        }
    }

    fn first_available(&self, candidates: &[Protocol], now: Instant) -> Option<Protocol> {
        candidates.iter().copied().find(|p| self.available(*p, now))
    }

    pub fn select(&self, req: &SelectionRequest, now: Instant) -> Protocol {
        let rules: [(bool, &[Protocol]); 5] = [
            (
                req.latency_budget < Duration::from_millis(100) && !req.power_constrained,
                &[Protocol::Udp, Protocol::WebRtc],
            ),
            (
                req.latency_budget < Duration::from_millis(200) && req.reliability_target > 0.95,
                &[Protocol::Srt, Protocol::Quic],
            ),
            (
                req.class.is_high_bandwidth() && req.reliability_target > 0.99,
                &[Protocol::Rtmp, Protocol::Tcp],
            ),
            (
                req.reliability_target > 0.98,
                &[Protocol::Tcp, Protocol::Quic],
            ),
            (true, &[Protocol::Udp, Protocol::WebRtc, Protocol::Tcp]),
        ];

        for (applies, candidates) in rules {
            if !applies {
                continue;
            }
            if let Some(protocol) = self.first_available(candidates, now) {
                debug!(%protocol, class = ?req.class, "protocol selected");
                return protocol;
            }
        }

        // Every rule fell through; take anything not excluded, cooldown or
        // not, and as a last resort the default strategy.
        self.first_available(&Protocol::ALL, now)
            .or_else(|| {
                Protocol::ALL
                    .into_iter()
                    .find(|p| !self.excluded.contains(p))
            })
            .unwrap_or(Protocol::Udp)
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    fn req(
        class: NetworkClass,
        latency_ms: u64,
        reliability: f64,
        power_constrained: bool,
    ) -> SelectionRequest {
        SelectionRequest {
            class,
            latency_budget: Duration::from_millis(latency_ms),
            reliability_target: reliability,
            power_constrained,
        }
    }

    #[rstest]
    #[case::tight_latency(req(NetworkClass::Wifi, 50, 0.9, false), Protocol::Udp)]
    #[case::tight_latency_on_battery(req(NetworkClass::Lte, 50, 0.9, true), Protocol::Udp)]
    #[case::low_latency_reliable(req(NetworkClass::Lte, 150, 0.96, false), Protocol::Srt)]
    #[case::broadcast_grade(req(NetworkClass::Ethernet, 500, 0.995, false), Protocol::Rtmp)]
    #[case::reliable_on_cellular(req(NetworkClass::Lte, 500, 0.985, false), Protocol::Tcp)]
    #[case::default_rule(req(NetworkClass::ThreeG, 500, 0.9, false), Protocol::Udp)]
    fn decision_priority(#[case] request: SelectionRequest, #[case] expected: Protocol) {
        let selector = ProtocolSelector::default();
        assert_eq!(selector.select(&request, Instant::now()), expected);
    }

    #[rstest]
    fn power_constraint_defers_tight_latency_rule() {
        // 50 ms budget but power constrained: rule 1 does not apply and
        // rule 2 picks the encrypted ordered strategy.
        let selector = ProtocolSelector::default();
        let request = req(NetworkClass::Lte, 50, 0.96, true);
        assert_eq!(selector.select(&request, Instant::now()), Protocol::Srt);
    }

    #[rstest]
    fn cooldown_skips_failed_protocol_within_window() {
        let mut selector = ProtocolSelector::default();
        let now = Instant::now();
        let request = req(NetworkClass::Lte, 150, 0.96, false);
        assert_eq!(selector.select(&request, now), Protocol::Srt);

        selector.record_handshake_failure(Protocol::Srt, now);
        assert_eq!(selector.select(&request, now), Protocol::Quic);

        // Alternate fails too; falls through to the next applicable rule.
        selector.record_handshake_failure(Protocol::Quic, now);
        assert_eq!(selector.select(&request, now), Protocol::Udp);
    }

    #[rstest]
    fn cooldown_expires() {
        let mut selector = ProtocolSelector::new(Duration::from_secs(30));
        let now = Instant::now();
        let request = req(NetworkClass::Lte, 150, 0.96, false);

        selector.record_handshake_failure(Protocol::Srt, now);
        assert_eq!(selector.select(&request, now), Protocol::Quic);
        assert_eq!(
            selector.select(&request, now + Duration::from_secs(31)),
            Protocol::Srt
        );
    }

    #[rstest]
    fn excluded_protocols_are_never_selected() {
        let selector =
            ProtocolSelector::default().with_excluded([Protocol::Udp, Protocol::WebRtc]);
        let request = req(NetworkClass::Wifi, 50, 0.9, false);
        // Rule 1 candidates are both excluded; rule 5 falls through to TCP.
        assert_eq!(selector.select(&request, Instant::now()), Protocol::Tcp);
    }

    #[rstest]
    fn all_on_cooldown_still_yields_a_protocol() {
        let mut selector = ProtocolSelector::default();
        let now = Instant::now();
        for protocol in Protocol::ALL {
            selector.record_handshake_failure(protocol, now);
        }
        let request = req(NetworkClass::Wifi, 50, 0.9, false);
        // Nothing is available, but selection must still answer.
        assert_eq!(selector.select(&request, now), Protocol::Udp);
    }
}

//! Network condition monitoring.
//!
//! A platform [`Probe`] produces raw link readings; the [`Monitor`] bounds
//! each reading with a timeout so a wedged platform API degrades the sample
//! instead of stalling the control loop.

use std::time::Duration;

use async_trait::async_trait;
use pulselink_core::{NetworkClass, NetworkSample};
use tokio::{sync::mpsc, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};
#[cfg(test)]
use unimock::unimock;

/// Platform seam for link measurements (OS network APIs, modem stats).
#[cfg_attr(test, unimock(api = ProbeMock))]
#[async_trait]
pub trait Probe: Send + Sync {
    async fn sample(&self) -> NetworkSample;
}

/// Wraps a probe with a bounded per-reading timeout.
pub struct Monitor<P> {
    probe: P,
    timeout: Duration,
    last_class: NetworkClass,
}

impl<P: Probe> Monitor<P> {
    pub fn new(probe: P, timeout: Duration) -> Self {
        Self {
            probe,
            timeout,
            last_class: NetworkClass::Unknown,
        }
    }

    /// One bounded reading.
    ///
    /// A timed-out probe yields a degraded sample carrying the previously
    /// observed class and full loss, so the estimator reacts to the outage
    /// instead of starving.
    pub async fn sample(&mut self) -> NetworkSample {
        match timeout(self.timeout, self.probe.sample()).await {
            Ok(sample) => {
                self.last_class = sample.class;
                sample
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "probe timed out, emitting degraded sample");
                NetworkSample {
                    at: std::time::Instant::now(),
                    class: self.last_class,
                    throughput_bps: 0,
                    rtt: self.timeout,
                    signal_strength: 0.0,
                    loss_ratio: 1.0,
                }
            }
        }
    }
}

/// Periodic monitor task: one reading per interval, handed to the control
/// task until cancelled or the receiver goes away.
pub(crate) async fn run_monitor<P: Probe>(
    mut monitor: Monitor<P>,
    interval: Duration,
    tx: mpsc::Sender<NetworkSample>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    trace!(?interval, "monitor task started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let sample = monitor.sample().await;
                trace!(class = ?sample.class, bps = sample.throughput_bps, "network sample");
                if tx.send(sample).await.is_err() {
                    break;
                }
            }
        }
    }

    trace!("monitor task stopped");
}

#[cfg(test)]
mod tests {
    use unimock::{MockFn, Unimock, matching};

    use super::*;

    fn wifi_sample(bps: u64) -> NetworkSample {
        NetworkSample {
            at: std::time::Instant::now(),
            class: NetworkClass::Wifi,
            throughput_bps: bps,
            rtt: Duration::from_millis(25),
            signal_strength: 0.9,
            loss_ratio: 0.01,
        }
    }

    /// Probe that never answers within any deadline.
    struct WedgedProbe;

    #[async_trait]
    impl Probe for WedgedProbe {
        async fn sample(&self) -> NetworkSample {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            wifi_sample(0)
        }
    }

    #[tokio::test]
    async fn passes_probe_samples_through() {
        let probe = Unimock::new(
            ProbeMock::sample
                .each_call(matching!())
                .returns(wifi_sample(20_000_000)),
        );
        let mut monitor = Monitor::new(probe, Duration::from_millis(500));
        let sample = monitor.sample().await;
        assert_eq!(sample.throughput_bps, 20_000_000);
        assert_eq!(sample.class, NetworkClass::Wifi);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_degrades_with_previous_class() {
        let mut monitor = Monitor::new(WedgedProbe, Duration::from_millis(500));
        // No reading yet: degraded sample falls back to Unknown.
        let first = monitor.sample().await;
        assert_eq!(first.class, NetworkClass::Unknown);
        assert_eq!(first.loss_ratio, 1.0);
        assert_eq!(first.throughput_bps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_sample_remembers_last_good_class() {
        /// Answers once, then wedges.
        struct FlakyProbe {
            answered: std::sync::atomic::AtomicBool,
        }

        #[async_trait]
        impl Probe for FlakyProbe {
            async fn sample(&self) -> NetworkSample {
                if !self.answered.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    return wifi_sample(20_000_000);
                }
                tokio::time::sleep(Duration::from_secs(3600)).await;
                wifi_sample(0)
            }
        }

        let probe = FlakyProbe {
            answered: std::sync::atomic::AtomicBool::new(false),
        };
        let mut monitor = Monitor::new(probe, Duration::from_millis(500));

        assert_eq!(monitor.sample().await.class, NetworkClass::Wifi);

        let degraded = monitor.sample().await;
        assert_eq!(degraded.class, NetworkClass::Wifi);
        assert_eq!(degraded.loss_ratio, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_task_emits_on_cadence_until_cancelled() {
        let probe = Unimock::new(
            ProbeMock::sample
                .each_call(matching!())
                .returns(wifi_sample(5_000_000)),
        );
        let monitor = Monitor::new(probe, Duration::from_millis(500));
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_monitor(
            monitor,
            Duration::from_millis(1000),
            tx,
            cancel.clone(),
        ));

        for _ in 0..3 {
            let sample = rx.recv().await.expect("sample on cadence");
            assert_eq!(sample.throughput_bps, 5_000_000);
        }

        cancel.cancel();
        task.await.unwrap();
        assert!(rx.recv().await.is_none(), "channel closes after cancel");
    }
}

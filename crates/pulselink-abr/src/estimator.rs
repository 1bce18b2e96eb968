use std::{
    collections::VecDeque,
    time::{SystemTime, UNIX_EPOCH},
};

use pulselink_core::{BandwidthEstimate, FusionWeights, NetworkClass, SampleHistory};

use crate::{error::AbrError, types::AbrOptions};

/// Trait seam for bandwidth estimation.
pub trait BandwidthEstimator: Send {
    /// Estimate available bandwidth from the sample history.
    ///
    /// Returns `None` until at least one sample has been observed.
    fn estimate(&mut self, history: &SampleHistory) -> Option<BandwidthEstimate>;
}

/// Typical bandwidth for a network class, bits per second.
///
/// The naive sub-estimator: O(1) lookup on the most recent sample's class.
pub fn naive_bandwidth_bps(class: NetworkClass) -> u64 {
    match class {
        NetworkClass::Ethernet => 100_000_000,
        NetworkClass::Wifi => 25_000_000,
        NetworkClass::Lte => 12_000_000,
        NetworkClass::ThreeG => 2_000_000,
        NetworkClass::TwoG => 100_000,
        NetworkClass::Unknown => 1_000_000,
    }
}

/// Adaptive sub-estimator: weighted moving average over the last `window`
/// samples, weight of sample i (0 = oldest) proportional to `i + 1`,
/// normalized so the weights sum to 1.
fn adaptive_bandwidth_bps(history: &SampleHistory, window: usize) -> Option<f64> {
    let samples: Vec<u64> = history
        .tail(window)
        .map(|s| s.throughput_bps)
        .collect();
    if samples.is_empty() {
        return None;
    }
    let denom: f64 = (1..=samples.len()).map(|i| i as f64).sum();
    let weighted: f64 = samples
        .iter()
        .enumerate()
        .map(|(i, bps)| ((i + 1) as f64 / denom) * *bps as f64)
        .sum();
    Some(weighted)
}

/// Least-squares slope of the last `n` throughput readings, in Mbps per
/// sample interval. Zero when fewer than two samples are available.
fn throughput_slope_mbps(history: &SampleHistory, n: usize) -> f64 {
    let ys: Vec<f64> = history
        .tail(n)
        .map(|s| s.throughput_bps as f64 / 1e6)
        .collect();
    let len = ys.len();
    if len < 2 {
        return 0.0;
    }
    let mean_x = (len - 1) as f64 / 2.0;
    let mean_y: f64 = ys.iter().sum::<f64>() / len as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 { 0.0 } else { num / den }
}

/// Offline-trained linear model over link features.
///
/// The coefficients are a pluggable artifact: `embedded()` ships the
/// defaults baked into the binary, and `new` accepts a refreshed set.
/// There is no online learning.
#[derive(Clone, Debug)]
pub struct LearnedModel {
    /// Per-class base prediction, Mbps, indexed by `NetworkClass::one_hot_index`.
    class_mbps: [f64; NetworkClass::COUNT],
    /// Contribution of the recent throughput trend (Mbps per Mbps/sample).
    slope_coeff: f64,
    /// Contribution of normalized signal strength, Mbps at full bars.
    signal_coeff: f64,
    /// Diurnal adjustment, cyclically encoded time of day.
    tod_sin_coeff: f64,
    tod_cos_coeff: f64,
    intercept_mbps: f64,
}

impl LearnedModel {
    pub fn new(
        class_mbps: [f64; NetworkClass::COUNT],
        slope_coeff: f64,
        signal_coeff: f64,
        tod_sin_coeff: f64,
        tod_cos_coeff: f64,
        intercept_mbps: f64,
    ) -> Self {
        Self {
            class_mbps,
            slope_coeff,
            signal_coeff,
            tod_sin_coeff,
            tod_cos_coeff,
            intercept_mbps,
        }
    }

    /// Default coefficients trained offline on field captures.
    pub fn embedded() -> Self {
        Self {
            // wifi, lte, 3g, 2g, ethernet, unknown
            class_mbps: [18.0, 9.0, 1.4, 0.06, 75.0, 0.8],
            slope_coeff: 2.5,
            signal_coeff: 6.0,
            tod_sin_coeff: -0.35,
            tod_cos_coeff: 0.15,
            intercept_mbps: 0.5,
        }
    }

    /// Predicted bandwidth in bits per second, or `None` without samples.
    pub fn predict_bps(&self, history: &SampleHistory, time_of_day_secs: f64) -> Option<f64> {
        let latest = history.latest()?;
        let slope = throughput_slope_mbps(history, 5);
        let phase = 2.0 * std::f64::consts::PI * time_of_day_secs / 86_400.0;

        let mbps = self.intercept_mbps
            + self.class_mbps[latest.class.one_hot_index()]
            + self.slope_coeff * slope
            + self.signal_coeff * latest.signal_strength
            + self.tod_sin_coeff * phase.sin()
            + self.tod_cos_coeff * phase.cos();

        Some((mbps * 1e6).max(0.0))
    }
}

/// Fuses the three sub-estimators into one prediction with a confidence
/// score derived from recent estimate variance.
#[derive(Clone, Debug)]
pub struct HybridEstimator {
    opts: AbrOptions,
    model: LearnedModel,
    /// Recent fused estimates (bps) for confidence computation.
    recent: VecDeque<f64>,
}

impl HybridEstimator {
    pub fn new(opts: AbrOptions) -> Self {
        Self {
            opts,
            model: LearnedModel::embedded(),
            recent: VecDeque::new(),
        }
    }

    /// Construct with explicit fusion weights.
    ///
    /// Fails with `AbrError::FatalConfiguration` when the weights do not
    /// sum to 1.
    pub fn with_weights(naive: f64, adaptive: f64, learned: f64) -> Result<Self, AbrError> {
        let fusion = FusionWeights::new(naive, adaptive, learned)?;
        Ok(Self::new(AbrOptions::default().with_fusion(fusion)))
    }

    pub fn with_model(mut self, model: LearnedModel) -> Self {
        self.model = model;
        self
    }

    /// Estimate with an explicit time-of-day, for deterministic tests.
    pub fn estimate_at(
        &mut self,
        history: &SampleHistory,
        time_of_day_secs: f64,
    ) -> Option<BandwidthEstimate> {
        let latest = history.latest()?;
        let naive = naive_bandwidth_bps(latest.class) as f64;
        let adaptive = adaptive_bandwidth_bps(history, self.opts.adaptive_window)?;

        // Explicit fallback, not an error: trust the learned model only
        // once enough history has accumulated.
        let learned = if history.len() >= self.opts.learned_min_samples {
            self.model
                .predict_bps(history, time_of_day_secs)
                .unwrap_or(adaptive)
        } else {
            adaptive
        };

        let w = self.opts.fusion;
        let fused = w.naive() * naive + w.adaptive() * adaptive + w.learned() * learned;

        if self.recent.len() == self.opts.confidence_window.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back(fused);
        let confidence = self.confidence();

        tracing::trace!(
            naive,
            adaptive,
            learned,
            fused,
            confidence,
            "bandwidth estimate"
        );

        Some(BandwidthEstimate {
            bps: fused.round() as u64,
            confidence,
            weights: w,
        })
    }

    /// Inverse coefficient-of-variation of recent fused estimates, clamped
    /// to [0, 1]. Higher variance means lower confidence.
    fn confidence(&self) -> f64 {
        if self.recent.len() < 2 {
            return 0.5;
        }
        let n = self.recent.len() as f64;
        let mean = self.recent.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return 0.0;
        }
        let var = self
            .recent
            .iter()
            .map(|x| (x - mean).powi(2))
            .sum::<f64>()
            / n;
        let cv = var.sqrt() / mean;
        (1.0 / (1.0 + cv)).clamp(0.0, 1.0)
    }
}

impl BandwidthEstimator for HybridEstimator {
    fn estimate(&mut self, history: &SampleHistory) -> Option<BandwidthEstimate> {
        let tod = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_secs() % 86_400) as f64)
            .unwrap_or(0.0);
        self.estimate_at(history, tod)
    }
}

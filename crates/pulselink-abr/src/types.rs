use std::time::Duration;

use pulselink_core::FusionWeights;

/// Tuning knobs for estimation, quality control and scheduling.
#[derive(Clone, Debug)]
pub struct AbrOptions {
    /// Per-method fusion weights (validated to sum to 1).
    pub fusion: FusionWeights,
    /// Window for the adaptive weighted moving average.
    pub adaptive_window: usize,
    /// Minimum accumulated samples before the learned model is trusted;
    /// below this it falls back to the adaptive estimate.
    pub learned_min_samples: usize,
    /// Number of recent fused estimates kept for confidence computation.
    pub confidence_window: usize,
    /// Utilization below which a step up becomes eligible.
    pub step_up_utilization: f64,
    /// Utilization above which the bitrate is softly reduced.
    pub soft_reduce_utilization: f64,
    /// Utilization above which the profile steps down immediately.
    pub step_down_utilization: f64,
    /// Utilization above which the profile drops straight to `Low`.
    pub emergency_utilization: f64,
    /// Soft-reduction multiplier applied to the target bitrate.
    pub soft_reduce_factor: f64,
    /// Consecutive eligible cycles required before stepping up.
    pub step_up_stable_cycles: u32,
    /// Frames older than this at scheduling time are dropped.
    pub max_frame_latency: Duration,
    /// Transport buffer fill ratio above which frames are dropped.
    pub max_buffer_fill: f64,
    /// Recent transport errors above which frames are dropped.
    pub max_recent_errors: u32,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            fusion: FusionWeights::default(),
            adaptive_window: 10,
            learned_min_samples: 10,
            confidence_window: 10,
            step_up_utilization: 0.5,
            soft_reduce_utilization: 0.8,
            step_down_utilization: 1.2,
            emergency_utilization: 2.0,
            soft_reduce_factor: 0.8,
            step_up_stable_cycles: 2,
            max_frame_latency: Duration::from_millis(200),
            max_buffer_fill: 0.8,
            max_recent_errors: 10,
        }
    }
}

impl AbrOptions {
    pub fn with_fusion(mut self, fusion: FusionWeights) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_adaptive_window(mut self, window: usize) -> Self {
        self.adaptive_window = window;
        self
    }

    pub fn with_max_frame_latency(mut self, latency: Duration) -> Self {
        self.max_frame_latency = latency;
        self
    }
}

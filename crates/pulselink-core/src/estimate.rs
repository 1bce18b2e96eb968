use thiserror::Error;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Fusion weights did not sum to 1 (or were out of range).
///
/// Invalid weights are rejected at construction, never silently corrected.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("fusion weights must sum to 1 (got {naive} + {adaptive} + {learned} = {sum})")]
pub struct InvalidWeights {
    pub naive: f64,
    pub adaptive: f64,
    pub learned: f64,
    pub sum: f64,
}

/// Per-method contribution weights for the hybrid bandwidth estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FusionWeights {
    naive: f64,
    adaptive: f64,
    learned: f64,
}

impl FusionWeights {
    /// Validated constructor: weights must be non-negative and sum to 1
    /// within floating-point tolerance.
    pub fn new(naive: f64, adaptive: f64, learned: f64) -> Result<Self, InvalidWeights> {
        let sum = naive + adaptive + learned;
        let in_range = naive >= 0.0 && adaptive >= 0.0 && learned >= 0.0;
        if !in_range || (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(InvalidWeights {
                naive,
                adaptive,
                learned,
                sum,
            });
        }
        Ok(Self {
            naive,
            adaptive,
            learned,
        })
    }

    pub fn naive(&self) -> f64 {
        self.naive
    }

    pub fn adaptive(&self) -> f64 {
        self.adaptive
    }

    pub fn learned(&self) -> f64 {
        self.learned
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            naive: 0.2,
            adaptive: 0.3,
            learned: 0.5,
        }
    }
}

/// Predicted currently-available link throughput.
///
/// Only the latest estimate matters; superseded values are discarded.
#[derive(Clone, Copy, Debug)]
pub struct BandwidthEstimate {
    /// Predicted available bandwidth in bits per second.
    pub bps: u64,
    /// Confidence in [0, 1]; inverse of recent estimate variance.
    pub confidence: f64,
    /// Weights the fusion stage actually used.
    pub weights: FusionWeights,
}

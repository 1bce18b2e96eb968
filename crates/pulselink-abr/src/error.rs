use pulselink_core::InvalidWeights;
use thiserror::Error;

/// Errors from estimator/controller construction.
#[derive(Clone, Debug, Error)]
pub enum AbrError {
    /// Invalid configuration is rejected at startup, never corrected.
    #[error("fatal configuration: {0}")]
    FatalConfiguration(String),
}

impl From<InvalidWeights> for AbrError {
    fn from(err: InvalidWeights) -> Self {
        Self::FatalConfiguration(err.to_string())
    }
}

impl AbrError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfiguration(_))
    }
}

use pulselink_core::Protocol;
use pulselink_crypto::CryptoError;
use thiserror::Error;

/// Centralized error type for pulselink-transport
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Timeout")]
    Timeout,
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Handshake with {protocol} failed: {reason}")]
    Handshake { protocol: Protocol, reason: String },
    #[error("Transport is not connected")]
    NotConnected,
    #[error("Send queue is full")]
    QueueFull,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Frame encryption failed: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Malformed wire frame: {0}")]
    MalformedFrame(String),
    #[error("Connect failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        source: Box<TransportError>,
    },
}

impl TransportError {
    /// Creates a handshake error
    pub fn handshake<S: Into<String>>(protocol: Protocol, reason: S) -> Self {
        Self::Handshake {
            protocol,
            reason: reason.into(),
        }
    }

    /// Creates a connection-lost error from a generic message
    pub fn connection_lost<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionLost(msg.into())
    }

    /// Checks if this error is worth retrying on the same protocol.
    ///
    /// Handshake failures are not: they signal protocol-level rejection and
    /// should push the selector to a different protocol instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout
            | TransportError::ConnectionLost(_)
            | TransportError::Io(_) => true,
            TransportError::Handshake { .. }
            | TransportError::NotConnected
            | TransportError::QueueFull
            | TransportError::Crypto(_)
            | TransportError::MalformedFrame(_)
            | TransportError::RetryExhausted { .. } => false,
        }
    }

    /// Checks if this error indicates a failed handshake
    pub fn is_handshake(&self) -> bool {
        matches!(self, TransportError::Handshake { .. })
    }

    /// Checks if this error indicates a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

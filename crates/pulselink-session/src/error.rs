use pulselink_core::SessionId;
use pulselink_transport::TransportError;
use thiserror::Error;

/// Centralized error type for pulselink-session
#[derive(Debug, Error, Clone)]
pub enum SessionError {
    /// Invalid configuration is rejected before CONNECTING, never corrected.
    #[error("fatal configuration: {0}")]
    FatalConfiguration(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("no protocol accepted the handshake after {attempts} attempts")]
    HandshakeExhausted { attempts: u32 },
    #[error("reconnect budget exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("session already stopped")]
    AlreadyStopped,
    #[error("an active session already exists for endpoint {0}")]
    EndpointBusy(String),
}

impl SessionError {
    pub fn fatal<S: Into<String>>(msg: S) -> Self {
        Self::FatalConfiguration(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfiguration(_))
    }
}

impl From<pulselink_abr::AbrError> for SessionError {
    fn from(err: pulselink_abr::AbrError) -> Self {
        Self::FatalConfiguration(err.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#![forbid(unsafe_code)]

use thiserror::Error;

/// Frame encryption errors.
#[derive(Clone, Debug, Error)]
pub enum CryptoError {
    #[error("AES-128-CBC encryption failed: {0}")]
    EncryptFailed(String),

    #[error("AES-128-CBC decryption failed: {0}")]
    DecryptFailed(String),

    #[error("invalid key length: expected 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("invalid IV length: expected 16 bytes, got {0}")]
    InvalidIvLength(usize),
}

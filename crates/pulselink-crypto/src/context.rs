#![forbid(unsafe_code)]

use crate::error::CryptoError;

/// AES-128-CBC cipher context.
///
/// Holds the session key and the base IV. The per-frame IV mixes the frame
/// sequence number into the base IV, so each frame decrypts independently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CipherContext {
    key: [u8; 16],
    base_iv: [u8; 16],
}

impl CipherContext {
    /// Create a new cipher context from a 16-byte key and base IV.
    pub fn new(key: [u8; 16], base_iv: [u8; 16]) -> Self {
        Self { key, base_iv }
    }

    /// Create from byte slices, validating lengths.
    pub fn from_slices(key: &[u8], base_iv: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; 16] = key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
        let base_iv: [u8; 16] = base_iv
            .try_into()
            .map_err(|_| CryptoError::InvalidIvLength(base_iv.len()))?;
        Ok(Self::new(key, base_iv))
    }

    pub fn key(&self) -> &[u8; 16] {
        &self.key
    }

    /// IV for a given frame: base IV with the big-endian sequence number
    /// XOR-ed into the trailing 8 bytes.
    pub fn iv_for_seq(&self, seq: u64) -> [u8; 16] {
        let mut iv = self.base_iv;
        for (slot, byte) in iv[8..].iter_mut().zip(seq.to_be_bytes()) {
            *slot ^= byte;
        }
        iv
    }
}

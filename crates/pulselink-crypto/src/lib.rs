#![forbid(unsafe_code)]

//! AES-128-CBC payload encryption for pulselink transports.
//!
//! Frames are discrete units: each is encrypted whole with an IV derived
//! from its sequence number, so a lost or reordered frame never corrupts
//! its neighbors. Transports that encrypt by default (SRT, QUIC) wire this
//! in unconditionally; others via per-protocol configuration.

mod cipher;
mod context;
mod error;

pub use cipher::{decrypt_frame, encrypt_frame};
pub use context::CipherContext;
pub use error::CryptoError;

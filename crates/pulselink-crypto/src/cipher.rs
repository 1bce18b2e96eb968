#![forbid(unsafe_code)]

//! Whole-frame AES-128-CBC encrypt/decrypt.

use aes::Aes128;
use bytes::Bytes;
use cbc::{
    Decryptor, Encryptor,
    cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7},
};
use tracing::trace;

use crate::{context::CipherContext, error::CryptoError};

/// AES block size in bytes.
const AES_BLOCK_SIZE: usize = 16;

/// Encrypt one frame payload with PKCS7 padding.
///
/// The IV is derived from `seq`, so frames are independent: losing one in
/// transit never affects the next.
pub fn encrypt_frame(
    ctx: &CipherContext,
    seq: u64,
    payload: &[u8],
) -> Result<Bytes, CryptoError> {
    let iv = ctx.iv_for_seq(seq);
    let padded_len = payload.len() + (AES_BLOCK_SIZE - payload.len() % AES_BLOCK_SIZE);
    let mut buf = vec![0u8; padded_len];
    buf[..payload.len()].copy_from_slice(payload);

    let encryptor = Encryptor::<Aes128>::new(ctx.key().into(), (&iv).into());
    let written = encryptor
        .encrypt_padded_mut::<Pkcs7>(&mut buf, payload.len())
        .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?
        .len();
    buf.truncate(written);

    trace!(seq, plain = payload.len(), cipher = written, "frame encrypted");
    Ok(Bytes::from(buf))
}

/// Decrypt one frame payload, removing PKCS7 padding.
pub fn decrypt_frame(
    ctx: &CipherContext,
    seq: u64,
    ciphertext: &[u8],
) -> Result<Bytes, CryptoError> {
    if !ciphertext.len().is_multiple_of(AES_BLOCK_SIZE) || ciphertext.is_empty() {
        return Err(CryptoError::DecryptFailed(format!(
            "ciphertext length {} is not a positive multiple of the AES block size",
            ciphertext.len()
        )));
    }

    let iv = ctx.iv_for_seq(seq);
    let mut buf = ciphertext.to_vec();
    let decryptor = Decryptor::<Aes128>::new(ctx.key().into(), (&iv).into());
    let written = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|e| CryptoError::DecryptFailed(format!("PKCS7 unpad failed: {e}")))?
        .len();
    buf.truncate(written);

    trace!(seq, cipher = ciphertext.len(), plain = written, "frame decrypted");
    Ok(Bytes::from(buf))
}

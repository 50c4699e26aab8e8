//! AES-256-GCM credential decryption.
//!
//! Wire format: `base64(IV‖ciphertext‖authTag)` with `|IV|=12`, `|authTag|=16`.
//! The key is a process-wide base64-encoded 256-bit secret supplied via
//! [`crate::config::BatchConfig::payment_encryption_key`].
//!
//! The key string is sanitised (trim, strip stray backslashes and whitespace)
//! before base64 decoding — some deployment environments mangle multi-line
//! env vars with escaped newlines.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key is not valid base64")]
    InvalidKeyEncoding,
    #[error("encryption key must decode to 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("ciphertext is not valid base64")]
    InvalidCiphertextEncoding,
    #[error("ciphertext too short to contain an IV and auth tag")]
    CiphertextTooShort,
    #[error("AEAD decryption failed (wrong key, corrupted data, or tampering)")]
    DecryptFailed,
    #[error("decrypted bytes are not valid UTF-8")]
    NotUtf8,
}

/// Strip stray backslashes and surrounding/embedded whitespace a misconfigured
/// environment may have introduced into the key string, then base64-decode it
/// into the raw 32-byte AES-256 key material.
pub fn sanitize_and_decode_key(raw: &str) -> Result<[u8; 32], CryptoError> {
    let sanitized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\\')
        .collect();
    let bytes = STANDARD
        .decode(sanitized)
        .map_err(|_| CryptoError::InvalidKeyEncoding)?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::InvalidKeyLength(v.len()))
}

/// Decrypt a `base64(IV‖ciphertext‖authTag)` blob with the given 256-bit key,
/// returning the UTF-8 plaintext.
pub fn decrypt(key: &[u8; 32], encoded: &str) -> Result<String, CryptoError> {
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|_| CryptoError::InvalidCiphertextEncoding)?;
    if raw.len() < IV_LEN + TAG_LEN {
        return Err(CryptoError::CiphertextTooShort);
    }
    let (iv, ct_and_tag) = raw.split_at(IV_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(iv);
    let plaintext = cipher
        .decrypt(nonce, ct_and_tag)
        .map_err(|_| CryptoError::DecryptFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::NotUtf8)
}

/// Encrypt `plaintext` with the given 256-bit key, producing the same
/// `base64(IV‖ciphertext‖authTag)` wire format [`decrypt`] consumes. Used by
/// tests to exercise the round-trip invariant and by fixtures that seed
/// encrypted credential rows.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> Result<String, CryptoError> {
    use aes_gcm::aead::OsRng;
    use aes_gcm::AeadCore;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ct_and_tag = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::DecryptFailed)?;

    let mut out = Vec::with_capacity(IV_LEN + ct_and_tag.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ct_and_tag);
    Ok(STANDARD.encode(out))
}

//! AES-GCM encryption for stored passwords.
//!
//! Ciphertexts are `base64(nonce || sealed)` with a fresh 96-bit nonce per
//! call. Empty strings map to empty strings in both directions so unset
//! passwords round-trip untouched.

use std::fmt;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

const NONCE_SIZE: usize = 12;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Errors from [`Cipher`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key is not 16, 24 or 32 bytes.
    #[error("invalid key length {0}: expected 16, 24 or 32 bytes")]
    InvalidKeyLength(usize),

    /// Configured key is not valid base64.
    #[error("encryption key is not valid base64")]
    InvalidKeyEncoding,

    /// Sealing failed.
    #[error("encryption failed")]
    Encryption,

    /// Ciphertext is malformed or fails authentication.
    #[error("decryption failed: {0}")]
    Decryption(String),
}

enum Algorithm {
    Aes128(Box<Aes128Gcm>),
    Aes192(Box<Aes192Gcm>),
    Aes256(Box<Aes256Gcm>),
}

/// Symmetric cipher for credentials at rest.
pub struct Cipher {
    algorithm: Algorithm,
}

impl Cipher {
    /// Creates a cipher from raw key bytes, choosing AES-128/192/256-GCM by
    /// length.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] for any other length.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let invalid = |_| CryptoError::InvalidKeyLength(key.len());
        let algorithm = match key.len() {
            16 => Algorithm::Aes128(Box::new(Aes128Gcm::new_from_slice(key).map_err(invalid)?)),
            24 => Algorithm::Aes192(Box::new(Aes192Gcm::new_from_slice(key).map_err(invalid)?)),
            32 => Algorithm::Aes256(Box::new(Aes256Gcm::new_from_slice(key).map_err(invalid)?)),
            other => return Err(CryptoError::InvalidKeyLength(other)),
        };
        Ok(Self { algorithm })
    }

    /// Creates a cipher from a base64-encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyEncoding`] or
    /// [`CryptoError::InvalidKeyLength`].
    pub fn from_base64(key: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(key.trim())
            .map_err(|_| CryptoError::InvalidKeyEncoding)?;
        Self::new(&bytes)
    }

    /// Key size in bits.
    #[must_use]
    pub const fn key_bits(&self) -> usize {
        match self.algorithm {
            Algorithm::Aes128(_) => 128,
            Algorithm::Aes192(_) => 192,
            Algorithm::Aes256(_) => 256,
        }
    }

    /// Encrypts `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if sealing fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = match &self.algorithm {
            Algorithm::Aes128(c) => c.encrypt(&nonce, plaintext.as_bytes()),
            Algorithm::Aes192(c) => c.encrypt(&nonce, plaintext.as_bytes()),
            Algorithm::Aes256(c) => c.encrypt(&nonce, plaintext.as_bytes()),
        }
        .map_err(|_| CryptoError::Encryption)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + sealed.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&sealed);
        Ok(BASE64.encode(combined))
    }

    /// Decrypts a value produced by [`Cipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] for bad base64, truncated input,
    /// a failed tag check, or non-UTF-8 plaintext.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let data = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;
        if data.len() < NONCE_SIZE {
            return Err(CryptoError::Decryption("ciphertext too short".into()));
        }

        let (nonce, sealed) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce);
        let plaintext = match &self.algorithm {
            Algorithm::Aes128(c) => c.decrypt(nonce, sealed),
            Algorithm::Aes192(c) => c.decrypt(nonce, sealed),
            Algorithm::Aes256(c) => c.decrypt(nonce, sealed),
        }
        .map_err(|_| CryptoError::Decryption("authentication failed".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".into()))
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("key_bits", &self.key_bits())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip_all_key_sizes() {
        for len in [16, 24, 32] {
            let cipher = Cipher::new(&vec![7u8; len]).unwrap();
            assert_eq!(cipher.key_bits(), len * 8);
            let sealed = cipher.encrypt("hunter2").unwrap();
            assert_ne!(sealed, "hunter2");
            assert_eq!(cipher.decrypt(&sealed).unwrap(), "hunter2");
        }
    }

    #[test]
    fn fresh_nonce_per_call() {
        let cipher = Cipher::new(&[1u8; 32]).unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn empty_maps_to_empty() {
        let cipher = Cipher::new(&[1u8; 16]).unwrap();
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn rejects_bad_key_lengths() {
        for len in [0, 15, 20, 33] {
            assert_eq!(
                Cipher::new(&vec![0u8; len]).unwrap_err(),
                CryptoError::InvalidKeyLength(len)
            );
        }
        assert_eq!(
            Cipher::from_base64("not base64!").unwrap_err(),
            CryptoError::InvalidKeyEncoding
        );
    }

    #[test]
    fn from_base64_key() {
        let key = BASE64.encode([9u8; 24]);
        let cipher = Cipher::from_base64(&key).unwrap();
        assert_eq!(cipher.key_bits(), 192);
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = Cipher::new(&[1u8; 32]).unwrap().encrypt("secret").unwrap();
        let other = Cipher::new(&[2u8; 32]).unwrap();
        assert!(matches!(other.decrypt(&sealed), Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn malformed_input_fails_without_panic() {
        let cipher = Cipher::new(&[1u8; 32]).unwrap();
        let sealed = cipher.encrypt("secret").unwrap();
        let raw = BASE64.decode(&sealed).unwrap();

        let truncated = BASE64.encode(&raw[..NONCE_SIZE - 1]);
        let nonce_only = BASE64.encode(&raw[..NONCE_SIZE]);
        let mut flipped = raw.clone();
        *flipped.last_mut().unwrap() ^= 0x01;

        for input in [
            "%%%".to_string(),
            truncated,
            nonce_only,
            BASE64.encode(flipped),
        ] {
            assert!(matches!(cipher.decrypt(&input), Err(CryptoError::Decryption(_))));
        }
    }

    #[test]
    fn debug_hides_key() {
        let cipher = Cipher::new(&[0xAB; 16]).unwrap();
        let debug = format!("{cipher:?}");
        assert!(debug.contains("128"));
        assert!(!debug.contains("171"));
    }

    proptest! {
        #[test]
        fn any_plaintext_round_trips(plaintext in any::<String>(), key_len in prop::sample::select(vec![16usize, 24, 32])) {
            let cipher = Cipher::new(&vec![0x5Au8; key_len]).unwrap();
            let sealed = cipher.encrypt(&plaintext).unwrap();
            prop_assert_eq!(cipher.decrypt(&sealed).unwrap(), plaintext);
        }
    }
}

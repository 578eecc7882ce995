// ABOUTME: Authenticated encryption for opaque access tokens and at-rest store payloads
// ABOUTME: AES-256-GCM with random 96-bit nonces; keys loaded from environment or generated for dev
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! AES-256-GCM envelope encryption.
//!
//! The same primitive backs two distinct uses with independent keys:
//! access-token envelopes (making bearer tokens opaque and tamper-evident)
//! and optional at-rest encryption of persistent-store values.

use crate::errors::{AppError, AppResult};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
use base64::{engine::general_purpose, Engine};
use std::env;
use tracing::{info, warn};
use zeroize::Zeroize;

/// Length of the AES-GCM nonce prepended to every ciphertext
const NONCE_LEN: usize = 12;

/// Symmetric cipher wrapping a 256-bit key.
///
/// Ciphertext layout is `nonce || ciphertext+tag`. Decryption failures are
/// collapsed to `None` so callers cannot distinguish a wrong key from a
/// tampered or truncated payload.
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    /// Create a cipher from raw key bytes
    #[must_use]
    pub const fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Load a key from a base64-encoded environment variable, or generate a
    /// development key with a logged warning when the variable is unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is set but not valid base64 of
    /// exactly 32 bytes.
    pub fn load_or_generate(env_var: &str) -> AppResult<Self> {
        if let Ok(encoded) = env::var(env_var) {
            info!("Loading encryption key from {env_var}");
            return Self::from_base64(&encoded);
        }

        warn!("{env_var} not found in environment");
        warn!("Generating ephemeral key for development - NOT SECURE FOR PRODUCTION");
        let cipher = Self::generate();
        warn!(
            "Generated key (save for production): {env_var}={}",
            general_purpose::STANDARD.encode(cipher.key)
        );
        Ok(cipher)
    }

    /// Create a cipher from a base64-encoded 32-byte key
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails or the key is not 32 bytes.
    pub fn from_base64(encoded: &str) -> AppResult<Self> {
        let mut key_bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AppError::config(format!("Invalid base64 encryption key: {e}")))?;

        if key_bytes.len() != 32 {
            key_bytes.zeroize();
            return Err(AppError::config(format!(
                "Encryption key must be exactly 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        key_bytes.zeroize();
        Ok(Self { key })
    }

    /// Generate a fresh random key
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Encrypt `plaintext`, returning `nonce || ciphertext`
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>> {
        use rand::RngCore;

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| AppError::internal("Encryption failed"))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    /// Decrypt a `nonce || ciphertext` payload.
    ///
    /// Any failure (short payload, wrong key, tampered tag) yields `None`.
    #[must_use]
    pub fn decrypt(&self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.len() <= NONCE_LEN {
            return None;
        }

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = GenericArray::from_slice(nonce_bytes);

        cipher.decrypt(nonce, ciphertext).ok()
    }

    /// Encrypt and base64url-encode, for tokens carried in HTTP headers
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt_to_string(&self, plaintext: &[u8]) -> AppResult<String> {
        let payload = self.encrypt(plaintext)?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(payload))
    }

    /// Decode base64url and decrypt; `None` on any failure
    #[must_use]
    pub fn decrypt_from_string(&self, encoded: &str) -> Option<Vec<u8>> {
        let payload = general_purpose::URL_SAFE_NO_PAD.decode(encoded).ok()?;
        self.decrypt(&payload)
    }
}

impl Drop for SecretCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl Clone for SecretCipher {
    fn clone(&self) -> Self {
        Self { key: self.key }
    }
}

/// Generate an opaque, URL-safe random identifier of `len` random bytes
///
/// # Errors
///
/// Returns an error if the system randomness source fails.
pub fn random_token(len: usize) -> AppResult<String> {
    use ring::rand::{SecureRandom, SystemRandom};

    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| AppError::internal("System randomness source failed"))?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}

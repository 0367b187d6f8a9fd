//! Cryptographically strong token generation.
//!
//! Token values are raw bytes from the operating system's secure random
//! source, encoded as URL-safe base64 without padding. A failing random
//! source is a fatal [`CsrfError::Generator`] — the generator never falls
//! back to a non-cryptographic source.

use crate::error::{CsrfError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;

/// Generates opaque, unpredictable token values.
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    length: usize,
}

impl TokenGenerator {
    /// Create a generator producing tokens from `length` random bytes.
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    /// Number of random bytes per token.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Generate a fresh token value.
    pub fn generate(&self) -> Result<String> {
        let mut bytes = vec![0u8; self.length];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CsrfError::Generator(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TOKEN_LENGTH)
    }
}

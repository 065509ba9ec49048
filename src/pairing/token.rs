//! Pairing token generation.
//!
//! Tokens are alphanumeric characters from an `OsRng`-seeded generator, so they are
//! URL-safe without further encoding. At the default length of 32 characters
//! a token carries roughly 190 bits of entropy.

use rand::distributions::Alphanumeric;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};

use crate::error::PairingError;

/// Default token length in characters.
pub const DEFAULT_TOKEN_LENGTH: usize = 32;

/// Shortest token that still carries 160 bits (log2(62) ≈ 5.95 bits/char).
pub const MIN_TOKEN_LENGTH: usize = 28;

/// Produces fresh pairing tokens.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> Result<String, PairingError>;
}

/// Alphanumeric tokens backed by the operating system RNG.
#[derive(Debug, Clone, Copy)]
pub struct RandomTokenGenerator {
    length: usize,
}

impl RandomTokenGenerator {
    /// Lengths below [`MIN_TOKEN_LENGTH`] are rejected.
    pub fn new(length: usize) -> Result<Self, PairingError> {
        if length < MIN_TOKEN_LENGTH {
            return Err(PairingError::TokenGeneration {
                reason: format!(
                    "token length {} is below the minimum of {}",
                    length, MIN_TOKEN_LENGTH
                ),
            });
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomTokenGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_TOKEN_LENGTH,
        }
    }
}

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self) -> Result<String, PairingError> {
        // Seeding is the only fallible step.
        let rng = StdRng::from_rng(OsRng).map_err(|e| PairingError::TokenGeneration {
            reason: e.to_string(),
        })?;
        Ok(rng
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect())
    }
}

//! Credential issuance for exchanged pairing sessions.
//!
//! The manager only depends on [`CredentialIssuer`]. [`JwtCredentialIssuer`]
//! is a self-contained implementation producing HS256 JWT bearer tokens.
//!
//! # Security
//!
//! - The signing key and issued tokens never appear in `Debug` output.
//! - Verification pins the algorithm to HS256 and allows no clock leeway.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PairingError;

/// Minimum signing key length in bytes.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Default lifetime of an issued credential (1 hour).
pub const DEFAULT_CREDENTIAL_TTL_SECS: u64 = 3600;

/// Upper bound for credential lifetime (30 days).
pub const MAX_CREDENTIAL_TTL_SECS: u64 = 30 * 24 * 3600;

/// An access credential handed to the display device.
#[derive(Clone)]
pub struct IssuedCredential {
    access_token: SecretString,
    /// Lifetime of the credential in seconds.
    pub expires_in: u64,
}

impl IssuedCredential {
    pub fn new(access_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            expires_in,
        }
    }

    /// Expose the token value. Callers must not log or persist it.
    pub fn expose_access_token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl std::fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Issues credentials for a bound identity.
///
/// Implementations should return promptly: the call runs while the session
/// row is locked.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, user_id: &str) -> Result<IssuedCredential, PairingError>;
}

/// Claims carried by a pairing credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Signs HS256 JWTs with a shared secret.
#[derive(Clone)]
pub struct JwtCredentialIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtCredentialIssuer {
    /// `ttl` must be between one second and [`MAX_CREDENTIAL_TTL_SECS`].
    pub fn new(key: SecretString, ttl: std::time::Duration) -> Result<Self, PairingError> {
        let secret = key.expose_secret().as_bytes();
        if secret.len() < MIN_SIGNING_KEY_LEN {
            return Err(PairingError::CredentialIssuance {
                reason: format!(
                    "signing key must be at least {} bytes",
                    MIN_SIGNING_KEY_LEN
                ),
            });
        }
        if ttl.as_secs() == 0 || ttl.as_secs() > MAX_CREDENTIAL_TTL_SECS {
            return Err(PairingError::CredentialIssuance {
                reason: format!(
                    "credential ttl must be between 1 and {} seconds",
                    MAX_CREDENTIAL_TTL_SECS
                ),
            });
        }
        let ttl = Duration::from_std(ttl).map_err(|e| PairingError::CredentialIssuance {
            reason: format!("invalid credential ttl: {}", e),
        })?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        })
    }

    /// Build a credential for `user_id` issued at `now`.
    pub fn issue_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredential, PairingError> {
        let expires_at =
            now.checked_add_signed(self.ttl)
                .ok_or_else(|| PairingError::CredentialIssuance {
                    reason: "credential expiry out of range".to_string(),
                })?;
        let claims = CredentialClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(
            |e| PairingError::CredentialIssuance {
                reason: e.to_string(),
            },
        )?;
        Ok(IssuedCredential::new(token, self.ttl.num_seconds().max(0) as u64))
    }

    /// Check a token's signature and expiry against the system clock.
    /// Returns its claims when valid.
    pub fn verify(&self, token: &str) -> Option<CredentialClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<CredentialClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|data| data.claims)
    }
}

impl std::fmt::Debug for JwtCredentialIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCredentialIssuer")
            .field("key", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[async_trait]
impl CredentialIssuer for JwtCredentialIssuer {
    async fn issue(&self, user_id: &str) -> Result<IssuedCredential, PairingError> {
        self.issue_at(user_id, Utc::now())
    }
}

//! Pairing session manager.
//!
//! Drives a session through `Pending -> Authorized -> Consumed`:
//!
//! - `init` inserts a fresh pending session (display device).
//! - `status` is a lock-free poll of the authorized flag.
//! - `confirm` binds an identity under an exclusive row lock and records the
//!   audit event in the same transaction (second device).
//! - `exchange` issues a credential and deletes the row under the same lock
//!   (display device), so each session is redeemed at most once.
//!
//! Every guard failure returns [`PairingError::InvalidOrExpired`], whatever
//! the underlying reason. The reason is only logged at debug level.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PairingConfig;
use crate::error::{ConfigError, Error, PairingError};
use crate::pairing::audit::{AuditEvent, RequestContext};
use crate::pairing::clock::{Clock, SystemClock};
use crate::pairing::credential::{CredentialIssuer, IssuedCredential};
use crate::pairing::session::{NewPairingSession, SessionState};
use crate::pairing::token::{RandomTokenGenerator, TokenGenerator};
use crate::store::{PairingStore, PairingTransaction};

/// Result of `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub token: String,
    /// Session lifetime in seconds.
    pub expires_in: u64,
}

/// Result of `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub authorized: bool,
}

/// Result of a successful `exchange`.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    /// Identity bound by `confirm`.
    pub user_id: String,
    pub credential: IssuedCredential,
}

/// Owns the lifecycle of pairing sessions.
#[derive(Clone)]
pub struct PairingManager {
    store: Arc<dyn PairingStore>,
    tokens: Arc<dyn TokenGenerator>,
    issuer: Arc<dyn CredentialIssuer>,
    clock: Arc<dyn Clock>,
    session_ttl: chrono::Duration,
    collaborator_timeout: Duration,
}

impl PairingManager {
    /// Create a manager with default settings, OS randomness and the system
    /// clock.
    pub fn new(store: Arc<dyn PairingStore>, issuer: Arc<dyn CredentialIssuer>) -> Self {
        let config = PairingConfig::default();
        Self {
            store,
            tokens: Arc::new(RandomTokenGenerator::default()),
            issuer,
            clock: Arc::new(SystemClock),
            session_ttl: chrono::Duration::seconds(config.session_ttl.as_secs() as i64),
            collaborator_timeout: config.collaborator_timeout,
        }
    }

    /// Apply TTL, token length and timeout settings.
    pub fn with_config(mut self, config: &PairingConfig) -> Result<Self, Error> {
        self.tokens = Arc::new(RandomTokenGenerator::new(config.token_length)?);
        self.session_ttl =
            chrono::Duration::from_std(config.session_ttl).map_err(|e| ConfigError::InvalidValue {
                key: "PAIRING_SESSION_TTL_SECS".to_string(),
                message: e.to_string(),
            })?;
        self.collaborator_timeout = config.collaborator_timeout;
        Ok(self)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Session lifetime in seconds.
    pub fn session_ttl_secs(&self) -> u64 {
        self.session_ttl.num_seconds().max(0) as u64
    }

    /// Create a pending session and return its token.
    pub async fn init(&self) -> Result<InitResponse, PairingError> {
        let token = self.tokens.generate()?;
        let now = self.clock.now();

        let session = self
            .store
            .insert(NewPairingSession {
                token: token.clone(),
                expires_at: now + self.session_ttl,
                created_at: now,
            })
            .await?;

        tracing::info!(
            session_id = %session.id,
            expires_at = %session.expires_at,
            "Pairing session created"
        );

        Ok(InitResponse {
            token,
            expires_in: self.session_ttl_secs(),
        })
    }

    /// Whether the session has been confirmed. Never takes a row lock.
    pub async fn status(&self, token: &str) -> Result<bool, PairingError> {
        let session = self
            .store
            .find_by_token(token)
            .await?
            .ok_or_else(|| rejected(None, "unknown token"))?;

        if session.is_expired(self.clock.now()) {
            return Err(rejected(Some(session.id), "expired"));
        }
        Ok(session.is_authorized)
    }

    /// Bind `user_id` to a pending session.
    ///
    /// Fails with `InvalidOrExpired` if the session is unknown, expired or
    /// already confirmed. The session update and the audit event commit
    /// together or not at all.
    pub async fn confirm(
        &self,
        token: &str,
        user_id: &str,
        context: &RequestContext,
    ) -> Result<(), PairingError> {
        if user_id.is_empty() {
            return Err(rejected(None, "empty identity"));
        }

        let mut tx = self.store.begin().await?;

        let Some(mut session) = tx.find_by_token_for_update(token).await? else {
            return Err(abandon(tx, rejected(None, "unknown token")).await);
        };

        let now = self.clock.now();
        match session.state(now) {
            SessionState::Pending => {}
            SessionState::Authorized => {
                return Err(abandon(tx, rejected(Some(session.id), "already confirmed")).await);
            }
            SessionState::Expired => {
                return Err(abandon(tx, rejected(Some(session.id), "expired")).await);
            }
        }

        session.user_id = Some(user_id.to_string());
        session.is_authorized = true;
        tx.update(&session).await?;

        let event = AuditEvent::pairing_sign_in(user_id, context, now);
        if let Err(e) = self
            .bounded("Audit write", tx.record_audit_event(&event))
            .await
        {
            return Err(abandon(tx, e).await);
        }

        tx.commit().await?;

        tracing::info!(session_id = %session.id, user_id, "Pairing session confirmed");
        Ok(())
    }

    /// Redeem a confirmed session for a credential and delete it.
    ///
    /// If issuance fails or times out the session is left untouched so the
    /// display device can retry.
    pub async fn exchange(&self, token: &str) -> Result<ExchangeOutcome, PairingError> {
        let mut tx = self.store.begin().await?;

        let Some(session) = tx.find_by_token_for_update(token).await? else {
            return Err(abandon(tx, rejected(None, "unknown token")).await);
        };

        let now = self.clock.now();
        let Some(user_id) = session.exchangeable_identity(now).map(str::to_owned) else {
            let reason = match session.state(now) {
                SessionState::Expired => "expired",
                SessionState::Pending => "not confirmed",
                SessionState::Authorized => "no bound identity",
            };
            return Err(abandon(tx, rejected(Some(session.id), reason)).await);
        };

        let credential = match self
            .bounded("Credential issuance", self.issuer.issue(&user_id))
            .await
        {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Credential issuance failed");
                return Err(abandon(tx, e).await);
            }
        };

        tx.delete(session.id).await?;
        tx.commit().await?;

        tracing::info!(session_id = %session.id, user_id = %user_id, "Pairing session exchanged");
        Ok(ExchangeOutcome {
            user_id,
            credential,
        })
    }

    /// Run a collaborator call that executes while a row lock is held.
    async fn bounded<T, E, F>(&self, operation: &'static str, call: F) -> Result<T, PairingError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<PairingError>,
    {
        match tokio::time::timeout(self.collaborator_timeout, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(PairingError::Timeout {
                operation,
                timeout: self.collaborator_timeout,
            }),
        }
    }
}

impl std::fmt::Debug for PairingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingManager")
            .field("session_ttl", &self.session_ttl)
            .field("collaborator_timeout", &self.collaborator_timeout)
            .finish_non_exhaustive()
    }
}

/// The uniform rejection. `reason` goes to the debug log only.
fn rejected(session_id: Option<Uuid>, reason: &'static str) -> PairingError {
    tracing::debug!(session_id = ?session_id, reason, "Pairing request rejected");
    PairingError::InvalidOrExpired
}

/// Roll back `tx` and hand back `err`.
async fn abandon(tx: Box<dyn PairingTransaction>, err: PairingError) -> PairingError {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "Pairing transaction rollback failed");
    }
    err
}

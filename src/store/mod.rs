//! Transactional persistence for pairing sessions.
//!
//! The manager talks to storage only through [`PairingStore`] and
//! [`PairingTransaction`]. Every implementation must honour two rules:
//!
//! - `find_by_token_for_update` holds an exclusive lock on the row until the
//!   transaction ends, so concurrent confirm/exchange calls on one token
//!   serialize.
//! - Dropping a transaction without calling `commit` rolls it back. This is
//!   what makes cancellation of an in-flight operation safe.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pairing::audit::AuditEvent;
use crate::pairing::session::{NewPairingSession, PairingSession};

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

/// Session storage with point lookups and multi-statement transactions.
#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Insert a new session. The store assigns its id.
    async fn insert(&self, session: NewPairingSession) -> Result<PairingSession, DatabaseError>;

    /// Lock-free read of the latest committed state.
    async fn find_by_token(&self, token: &str) -> Result<Option<PairingSession>, DatabaseError>;

    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn PairingTransaction>, DatabaseError>;

    /// Delete sessions whose expiry is before `before`. Returns the number removed.
    ///
    /// Housekeeping only; the pairing manager never calls this.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, DatabaseError>;
}

/// An open store transaction.
#[async_trait]
pub trait PairingTransaction: Send {
    /// Read a session and hold an exclusive lock on it for the rest of the
    /// transaction.
    async fn find_by_token_for_update(
        &mut self,
        token: &str,
    ) -> Result<Option<PairingSession>, DatabaseError>;

    /// Persist `is_authorized` and `user_id` of a locked session.
    async fn update(&mut self, session: &PairingSession) -> Result<(), DatabaseError>;

    /// Delete a locked session.
    async fn delete(&mut self, id: Uuid) -> Result<(), DatabaseError>;

    /// Record an audit event as part of this transaction.
    async fn record_audit_event(&mut self, event: &AuditEvent) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

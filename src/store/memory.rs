//! In-process pairing store.
//!
//! Committed sessions live in a `RwLock<HashMap>` keyed by token. Each
//! transaction takes a per-row `tokio::sync::Mutex` for every token it reads
//! for update and buffers its writes until commit, so readers never see
//! uncommitted state and a dropped transaction leaves nothing behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{PairingStore, PairingTransaction};
use crate::error::DatabaseError;
use crate::pairing::audit::AuditEvent;
use crate::pairing::session::{NewPairingSession, PairingSession};

type RowLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
struct Inner {
    /// Committed sessions indexed by token.
    sessions: RwLock<HashMap<String, PairingSession>>,
    /// Committed audit events in commit order.
    audit_log: RwLock<Vec<AuditEvent>>,
    /// Row locks indexed by token. Entries are removed once nobody holds or
    /// waits on them.
    row_locks: Mutex<HashMap<String, RowLock>>,
}

impl Inner {
    fn row_lock(&self, token: &str) -> RowLock {
        let mut locks = self.row_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(token.to_string()).or_default().clone()
    }

    fn release_row_lock(&self, token: &str) {
        let mut locks = self.row_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(token)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(token);
        }
    }
}

/// Pairing store held entirely in memory.
///
/// Cloning is cheap and clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.read().await.is_empty()
    }

    /// Snapshot of all committed audit events.
    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.inner.audit_log.read().await.clone()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl PairingStore for MemoryStore {
    async fn insert(&self, session: NewPairingSession) -> Result<PairingSession, DatabaseError> {
        let mut sessions = self.inner.sessions.write().await;
        if sessions.contains_key(&session.token) {
            return Err(DatabaseError::Constraint(
                "pairing session token already exists".to_string(),
            ));
        }
        let stored = PairingSession {
            id: Uuid::new_v4(),
            token: session.token,
            expires_at: session.expires_at,
            is_authorized: false,
            user_id: None,
            created_at: session.created_at,
        };
        sessions.insert(stored.token.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PairingSession>, DatabaseError> {
        Ok(self.inner.sessions.read().await.get(token).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn PairingTransaction>, DatabaseError> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            held: Vec::new(),
            writes: Vec::new(),
            audit: Vec::new(),
        }))
    }

    /// Rows locked by an open transaction are skipped; a later pass picks
    /// them up.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let mut sessions = self.inner.sessions.write().await;
        let locks = self
            .inner
            .row_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let count = sessions.len();
        sessions.retain(|token, s| s.expires_at >= before || locks.contains_key(token));
        Ok((count - sessions.len()) as u64)
    }
}

/// A row locked by a transaction.
struct HeldRow {
    token: String,
    id: Option<Uuid>,
    guard: Option<OwnedMutexGuard<()>>,
}

enum PendingWrite {
    Update(PairingSession),
    Delete(Uuid),
}

struct MemoryTransaction {
    inner: Arc<Inner>,
    held: Vec<HeldRow>,
    writes: Vec<PendingWrite>,
    audit: Vec<AuditEvent>,
}

impl MemoryTransaction {
    /// The session as this transaction sees it: committed state plus its own
    /// buffered writes.
    fn overlay(&self, mut session: Option<PairingSession>) -> Option<PairingSession> {
        for write in &self.writes {
            let Some(current) = session.as_ref() else {
                break;
            };
            match write {
                PendingWrite::Update(updated) if updated.id == current.id => {
                    session = Some(updated.clone());
                }
                PendingWrite::Delete(id) if *id == current.id => session = None,
                _ => {}
            }
        }
        session
    }

    fn release(&mut self) {
        for mut row in self.held.drain(..) {
            drop(row.guard.take());
            self.inner.release_row_lock(&row.token);
        }
    }
}

#[async_trait]
impl PairingTransaction for MemoryTransaction {
    async fn find_by_token_for_update(
        &mut self,
        token: &str,
    ) -> Result<Option<PairingSession>, DatabaseError> {
        if !self.held.iter().any(|row| row.token == token) {
            let guard = self.inner.row_lock(token).lock_owned().await;
            self.held.push(HeldRow {
                token: token.to_string(),
                id: None,
                guard: Some(guard),
            });
        }

        let committed = self.inner.sessions.read().await.get(token).cloned();
        let session = self.overlay(committed);
        if let Some(ref s) = session
            && let Some(row) = self.held.iter_mut().find(|row| row.token == token)
        {
            row.id = Some(s.id);
        }
        Ok(session)
    }

    async fn update(&mut self, session: &PairingSession) -> Result<(), DatabaseError> {
        self.writes.push(PendingWrite::Update(session.clone()));
        Ok(())
    }

    async fn delete(&mut self, id: Uuid) -> Result<(), DatabaseError> {
        self.writes.push(PendingWrite::Delete(id));
        Ok(())
    }

    async fn record_audit_event(&mut self, event: &AuditEvent) -> Result<(), DatabaseError> {
        self.audit.push(event.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DatabaseError> {
        let writes = std::mem::take(&mut self.writes);
        let mut audit = std::mem::take(&mut self.audit);
        {
            let mut sessions = self.inner.sessions.write().await;

            // Resolve every target first so a missing row aborts the whole commit.
            let mut targets = Vec::with_capacity(writes.len());
            for write in &writes {
                let (id, token) = match write {
                    PendingWrite::Update(updated) => (updated.id, Some(updated.token.clone())),
                    PendingWrite::Delete(id) => (
                        *id,
                        self.held
                            .iter()
                            .find(|row| row.id == Some(*id))
                            .map(|row| row.token.clone()),
                    ),
                };
                let token = token.filter(|t| sessions.get(t).is_some_and(|s| s.id == id));
                let Some(token) = token else {
                    drop(sessions);
                    self.release();
                    return Err(DatabaseError::Query(format!(
                        "pairing session {} no longer exists",
                        id
                    )));
                };
                targets.push(token);
            }

            for (write, token) in writes.into_iter().zip(targets) {
                match write {
                    PendingWrite::Update(updated) => {
                        if let Some(current) = sessions.get_mut(&token) {
                            current.is_authorized = updated.is_authorized;
                            current.user_id = updated.user_id;
                        }
                    }
                    PendingWrite::Delete(_) => {
                        sessions.remove(&token);
                    }
                }
            }
            // Audit entries become visible together with the session writes.
            self.inner.audit_log.write().await.append(&mut audit);
        }
        self.release();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), DatabaseError> {
        self.writes.clear();
        self.audit.clear();
        self.release();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.release();
    }
}

//! PostgreSQL pairing store.
//!
//! Sessions live in `pairing_sessions`, audit events in `pairing_audit_log`.
//! A transaction owns one pooled connection for its whole lifetime and takes
//! row locks with `SELECT ... FOR UPDATE`.
//!
//! A transaction dropped without `commit` or `rollback` detaches its
//! connection from the pool instead of returning it. Closing the connection
//! makes the server abort the open transaction and release its locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Row;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use super::{PairingStore, PairingTransaction};
use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::pairing::audit::AuditEvent;
use crate::pairing::session::{NewPairingSession, PairingSession};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

const FIND_SESSION: &str = r#"
    SELECT id, token, expires_at, is_authorized, user_id, created_at
    FROM pairing_sessions WHERE token = $1
"#;

const LOCK_SESSION: &str = r#"
    SELECT id, token, expires_at, is_authorized, user_id, created_at
    FROM pairing_sessions WHERE token = $1
    FOR UPDATE
"#;

/// Pairing store backed by a `deadpool-postgres` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Build a pool from configuration. No connection is opened yet.
    pub fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pg_config = deadpool_postgres::Config {
            url: Some(config.url().to_string()),
            pool: Some(deadpool_postgres::PoolConfig::new(config.pool_size)),
            ..Default::default()
        };
        let pool = pg_config.create_pool(
            Some(deadpool_postgres::Runtime::Tokio1),
            tokio_postgres::NoTls,
        )?;
        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut client = self.conn().await?;
        let report = embedded::migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        for migration in report.applied_migrations() {
            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Applied migration"
            );
        }
        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        let client = self.conn().await?;
        client.execute("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn conn(&self) -> Result<Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgStore")
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

fn row_to_session(row: &Row) -> PairingSession {
    PairingSession {
        id: row.get("id"),
        token: row.get("token"),
        expires_at: row.get("expires_at"),
        is_authorized: row.get("is_authorized"),
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
    }
}

fn query_error(context: &str, e: tokio_postgres::Error) -> DatabaseError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        DatabaseError::Constraint(format!("{}: {}", context, e))
    } else {
        DatabaseError::Query(format!("{}: {}", context, e))
    }
}

#[async_trait]
impl PairingStore for PgStore {
    async fn insert(&self, session: NewPairingSession) -> Result<PairingSession, DatabaseError> {
        let client = self.conn().await?;
        let id = Uuid::new_v4();

        client
            .execute(
                r#"
                INSERT INTO pairing_sessions (id, token, expires_at, is_authorized, user_id, created_at)
                VALUES ($1, $2, $3, FALSE, NULL, $4)
                "#,
                &[&id, &session.token, &session.expires_at, &session.created_at],
            )
            .await
            .map_err(|e| query_error("Insert pairing session", e))?;

        Ok(PairingSession {
            id,
            token: session.token,
            expires_at: session.expires_at,
            is_authorized: false,
            user_id: None,
            created_at: session.created_at,
        })
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PairingSession>, DatabaseError> {
        let client = self.conn().await?;
        let row = client
            .query_opt(FIND_SESSION, &[&token])
            .await
            .map_err(|e| query_error("Find pairing session", e))?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn begin(&self) -> Result<Box<dyn PairingTransaction>, DatabaseError> {
        let client = self.conn().await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| query_error("Begin transaction", e))?;
        Ok(Box::new(PgTransaction {
            client: Some(client),
        }))
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let client = self.conn().await?;
        let removed = client
            .execute(
                "DELETE FROM pairing_sessions WHERE expires_at < $1",
                &[&before],
            )
            .await
            .map_err(|e| query_error("Purge pairing sessions", e))?;
        Ok(removed)
    }
}

struct PgTransaction {
    /// `None` once the transaction has ended.
    client: Option<Object>,
}

impl PgTransaction {
    fn client(&self) -> Result<&Object, DatabaseError> {
        self.client
            .as_ref()
            .ok_or_else(|| DatabaseError::Query("transaction already finished".to_string()))
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<(), DatabaseError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        if let Err(e) = client.batch_execute(statement).await {
            // Unknown server-side state; keep it out of the pool.
            let _ = Object::take(client);
            return Err(query_error(statement, e));
        }
        Ok(())
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            tracing::debug!("Pairing transaction dropped without commit, discarding connection");
            let _ = Object::take(client);
        }
    }
}

#[async_trait]
impl PairingTransaction for PgTransaction {
    async fn find_by_token_for_update(
        &mut self,
        token: &str,
    ) -> Result<Option<PairingSession>, DatabaseError> {
        let row = self
            .client()?
            .query_opt(LOCK_SESSION, &[&token])
            .await
            .map_err(|e| query_error("Lock pairing session", e))?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn update(&mut self, session: &PairingSession) -> Result<(), DatabaseError> {
        self.client()?
            .execute(
                "UPDATE pairing_sessions SET is_authorized = $2, user_id = $3 WHERE id = $1",
                &[&session.id, &session.is_authorized, &session.user_id],
            )
            .await
            .map_err(|e| query_error("Update pairing session", e))?;
        Ok(())
    }

    async fn delete(&mut self, id: Uuid) -> Result<(), DatabaseError> {
        self.client()?
            .execute("DELETE FROM pairing_sessions WHERE id = $1", &[&id])
            .await
            .map_err(|e| query_error("Delete pairing session", e))?;
        Ok(())
    }

    async fn record_audit_event(&mut self, event: &AuditEvent) -> Result<(), DatabaseError> {
        self.client()?
            .execute(
                r#"
                INSERT INTO pairing_audit_log (id, event, user_id, ip_address, user_agent, data, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &Uuid::new_v4(),
                    &event.kind.as_str(),
                    &event.user_id,
                    &event.ip_address,
                    &event.user_agent,
                    &event.data,
                    &event.created_at,
                ],
            )
            .await
            .map_err(|e| query_error("Record audit event", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.finish("ROLLBACK").await
    }
}

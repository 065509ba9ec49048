//! Maintenance commands: schema migrations and expired-session cleanup.

use chrono::{DateTime, Duration, Utc};

use crate::store::PairingStore;

/// Apply pending migrations.
#[cfg(feature = "postgres")]
pub async fn run_migrate_command(store: &crate::store::PgStore) -> anyhow::Result<()> {
    store.run_migrations().await?;
    println!("Migrations up to date.");
    Ok(())
}

/// Delete sessions that expired more than `grace_secs` ago.
pub async fn run_purge_command(store: &dyn PairingStore, grace_secs: u64) -> anyhow::Result<()> {
    let removed = purge_expired_sessions(store, Utc::now(), grace_secs).await?;
    if removed == 0 {
        println!("No expired sessions found.");
    } else {
        println!("Purged {} expired session(s).", removed);
    }
    Ok(())
}

/// Delete sessions whose expiry is earlier than `now - grace_secs`.
pub async fn purge_expired_sessions(
    store: &dyn PairingStore,
    now: DateTime<Utc>,
    grace_secs: u64,
) -> anyhow::Result<u64> {
    let cutoff = i64::try_from(grace_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|grace| now.checked_sub_signed(grace))
        .ok_or_else(|| anyhow::anyhow!("grace period too large: {}s", grace_secs))?;

    let removed = store.purge_expired(cutoff).await?;
    tracing::info!(removed, cutoff = %cutoff, "Purged expired pairing sessions");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::NewPairingSession;
    use crate::store::MemoryStore;

    async fn seed(store: &MemoryStore, token: &str, expires_at: DateTime<Utc>) {
        store
            .insert(NewPairingSession {
                token: token.to_string(),
                expires_at,
                created_at: expires_at - Duration::minutes(5),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let store = MemoryStore::new();
        let now = Utc::now();
        seed(&store, "old", now - Duration::minutes(10)).await;
        seed(&store, "recent", now - Duration::seconds(30)).await;
        seed(&store, "live", now + Duration::minutes(4)).await;

        let removed = purge_expired_sessions(&store, now, 0).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.find_by_token("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_respects_grace() {
        let store = MemoryStore::new();
        let now = Utc::now();
        seed(&store, "old", now - Duration::minutes(10)).await;
        seed(&store, "recent", now - Duration::seconds(30)).await;

        let removed = purge_expired_sessions(&store, now, 60).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_by_token("recent").await.unwrap().is_some());
        assert!(store.find_by_token("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_rejects_absurd_grace() {
        let store = MemoryStore::new();
        assert!(
            purge_expired_sessions(&store, Utc::now(), u64::MAX)
                .await
                .is_err()
        );
    }
}

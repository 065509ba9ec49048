//! CLI command handling.
//!
//! Provides subcommands for:
//! - Driving a pairing session (`init`, `status`, `confirm`, `exchange`)
//! - Applying schema migrations (`migrate`)
//! - Deleting expired sessions (`purge`)
//!
//! All commands run against the PostgreSQL store configured by
//! `DATABASE_URL`.

mod housekeeping;
mod session;

pub use housekeeping::{purge_expired_sessions, run_purge_command};
#[cfg(feature = "postgres")]
pub use housekeeping::run_migrate_command;
pub use session::{SessionCommand, execute_session_command, run_session_command};

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::pairing::{JwtCredentialIssuer, PairingManager};
use crate::store::PairingStore;

#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(about = "Cross-device sign-in by pairing token")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "PAIRLINK_JSON_LOGS")]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    #[command(flatten)]
    Session(SessionCommand),

    /// Apply pending database migrations
    Migrate,

    /// Delete expired pairing sessions
    Purge {
        /// Only delete sessions expired for at least this many seconds
        #[arg(long, default_value = "0")]
        grace_secs: u64,
    },
}

/// Run a command against the configured PostgreSQL store.
///
/// `migrate` and `purge` only need `DATABASE_*`; session commands load the
/// full [`Config`].
#[cfg(feature = "postgres")]
pub async fn run_command(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Migrate => {
            let store = connect(&crate::config::DatabaseConfig::from_env()?).await?;
            run_migrate_command(&store).await
        }
        Command::Purge { grace_secs } => {
            let store = connect(&crate::config::DatabaseConfig::from_env()?).await?;
            run_purge_command(&store, grace_secs).await
        }
        Command::Session(cmd) => {
            let config = Config::from_env()?;
            let store = connect(&config.database).await?;
            let manager = build_manager(Arc::new(store), &config)?;
            run_session_command(cmd, &manager).await
        }
    }
}

#[cfg(not(feature = "postgres"))]
pub async fn run_command(_command: Command) -> anyhow::Result<()> {
    anyhow::bail!("pairlink was built without the `postgres` feature; no persistent store is available")
}

#[cfg(feature = "postgres")]
async fn connect(database: &crate::config::DatabaseConfig) -> anyhow::Result<crate::store::PgStore> {
    let store = crate::store::PgStore::new(database)?;
    store
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("Cannot reach database: {}", e))?;
    Ok(store)
}

/// Build a manager from the pairing and credential settings.
pub fn build_manager(
    store: Arc<dyn PairingStore>,
    config: &Config,
) -> anyhow::Result<PairingManager> {
    let issuer = JwtCredentialIssuer::new(
        config.credential.signing_key.clone(),
        config.credential.ttl,
    )?;
    Ok(PairingManager::new(store, Arc::new(issuer)).with_config(&config.pairing)?)
}

//! Error types for pairlink.

use std::time::Duration;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error("Pool build error: {0}")]
    PoolBuild(#[from] deadpool_postgres::CreatePoolError),

    #[cfg(feature = "postgres")]
    #[error("Connection pool error: {0}")]
    PoolRuntime(#[from] deadpool_postgres::PoolError),
}

/// Errors surfaced by the pairing session manager.
///
/// `InvalidOrExpired` is the only non-infrastructure outcome. It covers an
/// unknown token, an expired session, and a session in the wrong state for
/// the requested operation, and it never says which.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("Token is invalid or expired")]
    InvalidOrExpired,

    #[error("Storage failure: {0}")]
    Database(#[from] DatabaseError),

    #[error("Token generation failed: {reason}")]
    TokenGeneration { reason: String },

    #[error("Credential issuance failed: {reason}")]
    CredentialIssuance { reason: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl PairingError {
    /// Whether this is the uniform client-facing rejection.
    pub fn is_invalid_or_expired(&self) -> bool {
        matches!(self, Self::InvalidOrExpired)
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    // --- ConfigError ---

    #[test]
    fn test_config_error_missing_env_var_display() {
        let err = ConfigError::MissingEnvVar("DATABASE_URL".to_string());
        assert!(err.to_string().contains("DATABASE_URL"));
        assert!(
            err.to_string()
                .contains("Missing required environment variable")
        );
    }

    #[test]
    fn test_config_error_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            key: "PAIRING_TOKEN_LENGTH".to_string(),
            message: "must be at least 28".to_string(),
        };
        assert!(err.to_string().contains("PAIRING_TOKEN_LENGTH"));
        assert!(err.to_string().contains("must be at least 28"));
    }

    // --- DatabaseError ---

    #[test]
    fn test_database_error_query_display() {
        let err = DatabaseError::Query("connection reset".to_string());
        assert!(err.to_string().contains("Query failed"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_database_error_constraint_display() {
        let err = DatabaseError::Constraint("duplicate token".to_string());
        assert!(err.to_string().contains("Constraint violation"));
    }

    // --- PairingError ---

    #[test]
    fn test_invalid_or_expired_message_is_uninformative() {
        let msg = PairingError::InvalidOrExpired.to_string();
        assert_eq!(msg, "Token is invalid or expired");
        assert!(!msg.contains("authorized"));
        assert!(!msg.contains("not found"));
    }

    #[test]
    fn test_is_invalid_or_expired() {
        assert!(PairingError::InvalidOrExpired.is_invalid_or_expired());
        let infra = PairingError::Database(DatabaseError::Query("boom".to_string()));
        assert!(!infra.is_invalid_or_expired());
    }

    #[test]
    fn test_timeout_display() {
        let err = PairingError::Timeout {
            operation: "Credential issuance",
            timeout: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("Credential issuance"));
        assert!(msg.contains("5"));
    }

    // --- From conversions into top-level Error ---

    #[test]
    fn test_error_from_config_error() {
        let inner = ConfigError::MissingEnvVar("TEST".to_string());
        let err = Error::from(inner);
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_from_database_error() {
        let inner = DatabaseError::Query("syntax error".to_string());
        let err = Error::from(inner);
        assert!(err.to_string().contains("Database error"));
    }

    #[test]
    fn test_error_from_pairing_error() {
        let err = Error::from(PairingError::InvalidOrExpired);
        assert!(err.to_string().contains("Pairing error"));
    }

    #[test]
    fn test_pairing_error_from_database_error() {
        let err = PairingError::from(DatabaseError::Migration("locked".to_string()));
        assert!(matches!(err, PairingError::Database(_)));
    }
}

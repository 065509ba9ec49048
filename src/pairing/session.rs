//! Pairing session record and its lifecycle predicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default session lifetime in seconds (5 minutes).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 300;

/// A pairing session as persisted by the store.
///
/// `Debug` is implemented by hand so the token never ends up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingSession {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// URL-safe random handle shown in the QR code.
    pub token: String,
    /// Absolute expiry, fixed at creation.
    pub expires_at: DateTime<Utc>,
    /// Set once by `confirm`, never reset.
    pub is_authorized: bool,
    /// Identity bound by `confirm`.
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the manager when creating a session.
/// The store assigns the id.
#[derive(Clone)]
pub struct NewPairingSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Observable state of a session at a point in time.
///
/// `Expired` is derived from the clock, never stored. A consumed session has
/// no row at all, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Authorized,
    Expired,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Pending => write!(f, "pending"),
            SessionState::Authorized => write!(f, "authorized"),
            SessionState::Expired => write!(f, "expired"),
        }
    }
}

impl PairingSession {
    /// A session is expired strictly after `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Current lifecycle state as seen at `now`.
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.is_expired(now) {
            SessionState::Expired
        } else if self.is_authorized {
            SessionState::Authorized
        } else {
            SessionState::Pending
        }
    }

    /// Identity to issue a credential for, if the session may be exchanged.
    pub fn exchangeable_identity(&self, now: DateTime<Utc>) -> Option<&str> {
        match self.state(now) {
            SessionState::Authorized => self.user_id.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PairingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingSession")
            .field("id", &self.id)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("is_authorized", &self.is_authorized)
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl std::fmt::Debug for NewPairingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewPairingSession")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session_expiring_at(expires_at: DateTime<Utc>) -> PairingSession {
        PairingSession {
            id: Uuid::new_v4(),
            token: "secret-token-value".to_string(),
            expires_at,
            is_authorized: false,
            user_id: None,
            created_at: expires_at - Duration::seconds(DEFAULT_SESSION_TTL_SECS as i64),
        }
    }

    #[test]
    fn test_fresh_session_is_pending() {
        let now = Utc::now();
        let session = session_expiring_at(now + Duration::minutes(5));
        assert_eq!(session.state(now), SessionState::Pending);
        assert!(session.exchangeable_identity(now).is_none());
    }

    #[test]
    fn test_authorized_session_exposes_identity() {
        let now = Utc::now();
        let mut session = session_expiring_at(now + Duration::minutes(5));
        session.is_authorized = true;
        session.user_id = Some("user-1".to_string());
        assert_eq!(session.state(now), SessionState::Authorized);
        assert_eq!(session.exchangeable_identity(now), Some("user-1"));
    }

    #[test]
    fn test_authorized_without_identity_is_not_exchangeable() {
        let now = Utc::now();
        let mut session = session_expiring_at(now + Duration::minutes(5));
        session.is_authorized = true;
        assert!(session.exchangeable_identity(now).is_none());
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let session = session_expiring_at(now);
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_expired_overrides_authorized() {
        let now = Utc::now();
        let mut session = session_expiring_at(now - Duration::seconds(1));
        session.is_authorized = true;
        session.user_id = Some("user-1".to_string());
        assert_eq!(session.state(now), SessionState::Expired);
        assert!(session.exchangeable_identity(now).is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = session_expiring_at(Utc::now());
        let debug = format!("{:?}", session);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-token-value"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Pending.to_string(), "pending");
        assert_eq!(SessionState::Authorized.to_string(), "authorized");
        assert_eq!(SessionState::Expired.to_string(), "expired");
    }
}

//! Audit events recorded alongside pairing state changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of audited pairing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    /// A second device confirmed a pairing session.
    PairingSignIn,
}

impl AuditEventKind {
    /// Persisted name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PairingSignIn => "PAIRING_SIGN_IN",
        }
    }
}

impl std::fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata of the confirming device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub user_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Free-form event data.
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Event for a confirmed pairing session.
    pub fn pairing_sign_in(
        user_id: impl Into<String>,
        context: &RequestContext,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: AuditEventKind::PairingSignIn,
            user_id: user_id.into(),
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            data: serde_json::json!({}),
            created_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&AuditEventKind::PairingSignIn).unwrap();
        assert_eq!(json, "\"PAIRING_SIGN_IN\"");
        assert_eq!(AuditEventKind::PairingSignIn.to_string(), "PAIRING_SIGN_IN");
    }

    #[test]
    fn test_pairing_sign_in_copies_context() {
        let ctx = RequestContext::new("203.0.113.7", "Mobile Safari");
        let at = Utc::now();
        let event = AuditEvent::pairing_sign_in("user-1", &ctx, at);
        assert_eq!(event.kind, AuditEventKind::PairingSignIn);
        assert_eq!(event.user_id, "user-1");
        assert_eq!(event.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(event.user_agent.as_deref(), Some("Mobile Safari"));
        assert_eq!(event.created_at, at);
        assert_eq!(event.data, serde_json::json!({}));
    }

    #[test]
    fn test_default_context_is_empty() {
        let ctx = RequestContext::default();
        assert!(ctx.ip_address.is_none());
        assert!(ctx.user_agent.is_none());
    }
}

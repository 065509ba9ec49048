//! Pairing session CLI commands.

use clap::Subcommand;
use serde_json::json;

use crate::pairing::{PairingManager, RequestContext, StatusResponse};

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// Start a pairing session and print its token
    Init,

    /// Check whether a session has been confirmed
    Status {
        /// Pairing token
        token: String,
    },

    /// Confirm a session on behalf of a signed-in user
    Confirm {
        /// Pairing token
        token: String,

        /// Identity to bind to the session
        #[arg(short, long)]
        user: String,

        /// IP address of the confirming device, for the audit log
        #[arg(long)]
        ip: Option<String>,

        /// User agent of the confirming device, for the audit log
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Redeem a confirmed session for a credential
    Exchange {
        /// Pairing token
        token: String,
    },
}

/// Run a session command and print its JSON result.
pub async fn run_session_command(
    cmd: SessionCommand,
    manager: &PairingManager,
) -> anyhow::Result<()> {
    let output = execute_session_command(cmd, manager).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Run a session command and return the JSON that would be printed.
pub async fn execute_session_command(
    cmd: SessionCommand,
    manager: &PairingManager,
) -> anyhow::Result<serde_json::Value> {
    match cmd {
        SessionCommand::Init => {
            let response = manager.init().await?;
            Ok(serde_json::to_value(response)?)
        }
        SessionCommand::Status { token } => {
            let authorized = manager.status(&token).await?;
            Ok(serde_json::to_value(StatusResponse { authorized })?)
        }
        SessionCommand::Confirm {
            token,
            user,
            ip,
            user_agent,
        } => {
            let context = RequestContext {
                ip_address: ip,
                user_agent,
            };
            manager.confirm(&token, &user, &context).await?;
            Ok(json!({ "confirmed": true }))
        }
        SessionCommand::Exchange { token } => {
            let outcome = manager.exchange(&token).await?;
            Ok(json!({
                "userId": outcome.user_id,
                "accessToken": outcome.credential.expose_access_token(),
                "expiresIn": outcome.credential.expires_in,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;
    use crate::pairing::JwtCredentialIssuer;
    use crate::store::MemoryStore;

    fn manager(store: &MemoryStore) -> (PairingManager, JwtCredentialIssuer) {
        let issuer = JwtCredentialIssuer::new(
            SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
            Duration::from_secs(600),
        )
        .unwrap();
        let manager = PairingManager::new(Arc::new(store.clone()), Arc::new(issuer.clone()));
        (manager, issuer)
    }

    #[tokio::test]
    async fn test_full_flow_output() {
        let store = MemoryStore::new();
        let (manager, issuer) = manager(&store);

        let init = execute_session_command(SessionCommand::Init, &manager)
            .await
            .unwrap();
        assert_eq!(init["expiresIn"], 300);
        let token = init["token"].as_str().unwrap().to_string();

        let status = execute_session_command(
            SessionCommand::Status {
                token: token.clone(),
            },
            &manager,
        )
        .await
        .unwrap();
        assert_eq!(status, json!({ "authorized": false }));

        let confirmed = execute_session_command(
            SessionCommand::Confirm {
                token: token.clone(),
                user: "user-7".to_string(),
                ip: Some("198.51.100.4".to_string()),
                user_agent: None,
            },
            &manager,
        )
        .await
        .unwrap();
        assert_eq!(confirmed, json!({ "confirmed": true }));

        let events = store.audit_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ip_address.as_deref(), Some("198.51.100.4"));
        assert!(events[0].user_agent.is_none());

        let exchanged = execute_session_command(SessionCommand::Exchange { token }, &manager)
            .await
            .unwrap();
        assert_eq!(exchanged["userId"], "user-7");
        assert_eq!(exchanged["expiresIn"], 600);

        let access_token = exchanged["accessToken"].as_str().unwrap();
        let claims = issuer.verify(access_token).unwrap();
        assert_eq!(claims.sub, "user-7");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_token_reports_uniform_error() {
        let store = MemoryStore::new();
        let (manager, _) = manager(&store);

        let err = execute_session_command(
            SessionCommand::Exchange {
                token: "missing".to_string(),
            },
            &manager,
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Token is invalid or expired");
    }
}

//! Cross-device pairing.
//!
//! A display device starts a session and shows its token (usually as a QR
//! code). It then polls `status` until a signed-in device confirms the token
//! with its identity. Finally it exchanges the token once for a credential.
//!
//! ```text
//! init ──▶ Pending ──confirm──▶ Authorized ──exchange──▶ (deleted)
//!             │                     │
//!             └──── now > expires_at ┴──▶ Expired (rejected everywhere)
//! ```

pub mod audit;
pub mod clock;
pub mod credential;
pub mod manager;
pub mod session;
pub mod token;

pub use audit::{AuditEvent, AuditEventKind, RequestContext};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{CredentialIssuer, JwtCredentialIssuer, IssuedCredential};
pub use manager::{ExchangeOutcome, InitResponse, PairingManager, StatusResponse};
pub use session::{NewPairingSession, PairingSession, SessionState};
pub use token::{RandomTokenGenerator, TokenGenerator};

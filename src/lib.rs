//! pairlink: QR-style cross-device sign-in.
//!
//! A device that is not signed in obtains a short-lived pairing token. A device
//! that is signed in approves it. The first device then trades the token for a
//! credential exactly once.

pub mod cli;
pub mod config;
pub mod error;
pub mod pairing;
pub mod store;

pub use config::Config;
pub use error::{Error, PairingError, Result};
pub use pairing::PairingManager;

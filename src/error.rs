//! Unified error type for the MyInfo client public API
//!
//! Internal modules keep their own error types (`ConfigError`, `KeyError`,
//! `JoseError`) for precise handling. `MyInfoError` is what every public
//! operation returns.
//!
//! # Example
//!
//! ```no_run
//! use myinfo_client::{MyInfoClient, MyInfoError};
//!
//! async fn fetch(client: &MyInfoClient, code: &str) -> Result<(), MyInfoError> {
//!     let token = client.exchange_code_for_token(code, None).await?;
//!     let _person = client.get_person(&token.access_token, client.config().attributes()).await?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::config::ConfigError;
use crate::jose::JoseError;
use crate::keys::KeyError;

/// Convenience alias used throughout the crate
pub type Result<T, E = MyInfoError> = std::result::Result<T, E>;

/// Error type for all MyInfo client operations
///
/// Every failure is surfaced to the caller without local recovery. None of
/// these errors are retried by the client: authorisation codes are single use
/// and a blind retry of the token exchange can burn the code.
#[derive(Debug, Error)]
pub enum MyInfoError {
    /// Security tier is neither `L0` nor `L2`
    #[error("Unknown auth level: {0}")]
    UnknownAuthLevel(String),

    /// Token endpoint answered but the response carried no access token
    #[error("Access token not found")]
    AccessTokenNotFound,

    /// Access token failed signature verification
    #[error("Invalid token: {0}")]
    InvalidToken(#[source] JoseError),

    /// Verified access token has no subject claim
    #[error("UINFIN not found in access token")]
    UinfinNotFound,

    /// Person endpoint returned an empty body
    #[error("Person data not found")]
    PersonDataNotFound,

    /// Encrypted person payload could not be decrypted
    #[error("Decryption failed: {0}")]
    DecryptionFailed(#[source] JoseError),

    /// Person payload could not be parsed or its signature did not verify
    #[error("Invalid data or signature for person data: {0}")]
    InvalidDataOrSignature(#[source] JoseError),

    /// Transport failure or non-success HTTP status
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Client configuration is incomplete for the selected tier
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Key material could not be loaded or used
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

impl MyInfoError {
    /// Returns true if the error concerns the access token or its claims
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::AccessTokenNotFound | Self::InvalidToken(_) | Self::UinfinNotFound
        )
    }

    /// Returns true if the error concerns the person payload
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            Self::PersonDataNotFound | Self::DecryptionFailed(_) | Self::InvalidDataOrSignature(_)
        )
    }

    /// Returns true if the error happened at the HTTP layer
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Returns true if the error was raised while building the client
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Key(_) | Self::UnknownAuthLevel(_)
        )
    }

    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::UnknownAuthLevel(_) => Some("Set the auth level to either \"L0\" or \"L2\""),
            Self::AccessTokenNotFound => Some(
                "The authorisation code has been consumed; restart the authorise flow to obtain a new one",
            ),
            Self::InvalidToken(_) | Self::InvalidDataOrSignature(_) => {
                Some("Check that the configured public certificate matches the consent platform environment")
            }
            Self::DecryptionFailed(_) => {
                Some("Check that the private key matches the public key registered for this client")
            }
            Self::Config(e) => e.suggestion(),
            _ => None,
        }
    }
}

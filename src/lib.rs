//! Client for the MyInfo consent platform
//!
//! Builds authorise redirects, exchanges authorisation codes for access
//! tokens and retrieves verified person data. Requests to `L2` environments
//! are signed for the API gateway, and their person payloads are decrypted
//! and signature checked before they are returned.

pub mod authorise;
pub mod client;
pub mod config;
pub mod error;
pub mod jose;
pub mod keys;
pub mod prelude;
pub mod signature;
mod tier;
pub mod types;

pub use authorise::{AuthorisationRequest, AuthoriseRedirect};
pub use client::MyInfoClient;
pub use config::{AuthLevel, ClientConfig, ClientConfigBuilder, ConfigError, Endpoints};
pub use error::{MyInfoError, Result};
pub use jose::{Claims, JoseError, JwsVerifier};
pub use keys::{KeyError, KeyMaterial};
pub use signature::{generate_authorization_header, PkiSignHeader, SignatureContext};
pub use types::{PersonRecord, PersonRequest, TokenRequest, TokenResult};

//! MyInfo client prelude
//!
//! The prelude module provides a convenient way to import commonly used types.
//!
//! # Example
//!
//! ```rust
//! use myinfo_client::prelude::*;
//!
//! let request = AuthorisationRequest::new("demo", ["uinfin", "name"]);
//! assert_eq!(request.attributes, ["uinfin", "name"]);
//! assert_eq!("L2".parse::<AuthLevel>().unwrap(), AuthLevel::L2);
//! ```

pub use crate::authorise::{AuthorisationRequest, AuthoriseRedirect};
pub use crate::client::MyInfoClient;
pub use crate::config::{AuthLevel, ClientConfig, ClientConfigBuilder};
pub use crate::error::{MyInfoError, Result};
pub use crate::keys::KeyMaterial;
pub use crate::types::{PersonRecord, TokenResult};

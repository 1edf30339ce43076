//! Client configuration
//!
//! A [`ClientConfig`] is built once, either through [`ClientConfigBuilder`] or by
//! deserializing it with serde, and is read-only afterwards. Validation fails
//! fast when a field required by the selected [`AuthLevel`] is missing.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MyInfoError;
use crate::keys::KeyMaterial;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_TIMEOUT_MS: u64 = DEFAULT_TIMEOUT_SECS * 1000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Field {field} is required for auth level {level}")]
    RequiredForLevel {
        field: &'static str,
        level: AuthLevel,
    },

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Request timeout must be at least one millisecond")]
    ZeroTimeout,
}

impl ConfigError {
    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            ConfigError::RequiredForLevel { .. } => Some(
                "L2 needs both the client private key and the platform public certificate",
            ),
            ConfigError::InvalidBaseUrl(_) => {
                Some("Use an absolute http(s) URL such as https://sandbox.api.myinfo.gov.sg")
            }
            ConfigError::ZeroTimeout => {
                Some("Leave the timeout unset for the 30 second default, or set a positive value")
            }
            ConfigError::MissingField { .. } => None,
        }
    }
}

/// Security tier of the consent platform environment
///
/// - `L0`: requests are not signed and person data comes back as plain JSON
/// - `L2`: requests carry a `PKI_SIGN` header and person data is a JWE
///   wrapping a JWS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthLevel {
    L0,
    L2,
}

impl AuthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthLevel::L0 => "L0",
            AuthLevel::L2 => "L2",
        }
    }

    /// Whether outbound requests are signed and payloads encrypted
    pub fn is_pki(&self) -> bool {
        matches!(self, AuthLevel::L2)
    }
}

impl FromStr for AuthLevel {
    type Err = MyInfoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L0" => Ok(AuthLevel::L0),
            "L2" => Ok(AuthLevel::L2),
            other => Err(MyInfoError::UnknownAuthLevel(other.to_string())),
        }
    }
}

impl TryFrom<String> for AuthLevel {
    type Error = MyInfoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AuthLevel> for String {
    fn from(level: AuthLevel) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API endpoints derived from the base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorise: String,
    pub token: String,
    pub person: String,
}

impl Endpoints {
    pub fn from_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            authorise: format!("{}/com/v3/authorise", base),
            token: format!("{}/com/v3/token", base),
            person: format!("{}/com/v3/person", base),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Immutable client configuration
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    base_url: String,
    auth_level: AuthLevel,
    client_id: String,
    client_secret: String,
    #[serde(default)]
    private_key: Option<KeyMaterial>,
    #[serde(default)]
    private_key_passphrase: Option<String>,
    #[serde(default)]
    public_cert: Option<KeyMaterial>,
    redirect_url: String,
    #[serde(default)]
    attributes: Vec<String>,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Check that every field required by the auth level is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingField { field: "base_url" });
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingField { field: "client_id" });
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::MissingField {
                field: "client_secret",
            });
        }
        if self.redirect_url.is_empty() {
            return Err(ConfigError::MissingField {
                field: "redirect_url",
            });
        }

        // Access tokens are signed on every tier.
        if self.public_cert.is_none() {
            return Err(ConfigError::RequiredForLevel {
                field: "public_cert",
                level: self.auth_level,
            });
        }
        if self.auth_level.is_pki() && self.private_key.is_none() {
            return Err(ConfigError::RequiredForLevel {
                field: "private_key",
                level: self.auth_level,
            });
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::from_base_url(&self.base_url)
    }

    pub fn auth_level(&self) -> AuthLevel {
        self.auth_level
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn private_key(&self) -> Option<&KeyMaterial> {
        self.private_key.as_ref()
    }

    /// Passphrase for an encrypted private key
    ///
    /// Falls back to the client secret, which is what the consent platform's
    /// onboarding kit protects generated keys with.
    pub fn private_key_passphrase(&self) -> Option<&str> {
        self.private_key_passphrase
            .as_deref()
            .or(Some(self.client_secret.as_str()))
            .filter(|p| !p.is_empty())
    }

    pub fn public_cert(&self) -> Option<&KeyMaterial> {
        self.public_cert.as_ref()
    }

    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// Attributes requested by default, in order
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("auth_level", &self.auth_level)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("private_key", &self.private_key)
            .field(
                "private_key_passphrase",
                &self.private_key_passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_cert", &self.public_cert)
            .field("redirect_url", &self.redirect_url)
            .field("attributes", &self.attributes)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Builder for [`ClientConfig`]
///
/// # Example
///
/// ```
/// use myinfo_client::{AuthLevel, ClientConfig, KeyMaterial};
///
/// let config = ClientConfig::builder()
///     .base_url("https://sandbox.api.myinfo.gov.sg")
///     .auth_level(AuthLevel::L0)
///     .client_id("STG2-MYINFO-SELF-TEST")
///     .client_secret("secret")
///     .public_cert(KeyMaterial::File("cert/platform.pem".into()))
///     .redirect_url("http://localhost:3001/callback")
///     .attributes(["uinfin", "name"])
///     .build()
///     .unwrap();
///
/// assert_eq!(config.endpoints().token, "https://sandbox.api.myinfo.gov.sg/com/v3/token");
/// ```
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    auth_level: Option<AuthLevel>,
    client_id: Option<String>,
    client_secret: Option<String>,
    private_key: Option<KeyMaterial>,
    private_key_passphrase: Option<String>,
    public_cert: Option<KeyMaterial>,
    redirect_url: Option<String>,
    attributes: Vec<String>,
    timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn auth_level(mut self, auth_level: AuthLevel) -> Self {
        self.auth_level = Some(auth_level);
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn private_key(mut self, private_key: KeyMaterial) -> Self {
        self.private_key = Some(private_key);
        self
    }

    pub fn private_key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.private_key_passphrase = Some(passphrase.into());
        self
    }

    pub fn public_cert(mut self, public_cert: KeyMaterial) -> Self {
        self.public_cert = Some(public_cert);
        self
    }

    pub fn redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let config = ClientConfig {
            base_url: self
                .base_url
                .ok_or(ConfigError::MissingField { field: "base_url" })?,
            auth_level: self
                .auth_level
                .ok_or(ConfigError::MissingField { field: "auth_level" })?,
            client_id: self
                .client_id
                .ok_or(ConfigError::MissingField { field: "client_id" })?,
            client_secret: self.client_secret.ok_or(ConfigError::MissingField {
                field: "client_secret",
            })?,
            private_key: self.private_key,
            private_key_passphrase: self.private_key_passphrase,
            public_cert: self.public_cert,
            redirect_url: self.redirect_url.ok_or(ConfigError::MissingField {
                field: "redirect_url",
            })?,
            attributes: self.attributes,
            timeout_ms: self
                .timeout
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        };
        config.validate()?;
        Ok(config)
    }
}

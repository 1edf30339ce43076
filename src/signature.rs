//! API gateway request signing
//!
//! Requests to an `L2` environment carry a `PKI_SIGN` authorization header.
//! The header signs a canonical base string with RSASSA-PKCS1-v1_5 / SHA-256:
//!
//! 1. Collect the default parameters `app_id`, `nonce`, `signature_method` and
//!    `timestamp`
//! 2. Merge the request parameters over them (request parameters win), unless
//!    the request is a `POST` with a body that is not form encoded
//! 3. Sort by key and join as `key=value` pairs separated by `&`, without
//!    percent escaping
//! 4. Base string is `{METHOD}&{url}&{params}`
//! 5. Sign the base string and base64 encode the signature
//!
//! The gateway rebuilds the same base string from the request it receives, so
//! every byte matters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::config::AuthLevel;
use crate::keys::KeyError;

/// Only signature method supported by the gateway
pub const SIGNATURE_METHOD: &str = "RS256";

/// Content type whose body parameters take part in the signature
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Generate a fresh nonce: 16 random bytes, hex encoded
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Everything that goes into one request signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureContext {
    url: String,
    method: String,
    content_type: String,
    params: Vec<(String, String)>,
    app_id: String,
    nonce: String,
    timestamp: i64,
}

impl SignatureContext {
    /// Create a context with a fresh nonce and the current time
    pub fn new<I, K, V>(
        url: impl Into<String>,
        method: impl Into<String>,
        content_type: impl Into<String>,
        params: I,
        app_id: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            url: url.into(),
            method: method.into(),
            content_type: content_type.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            app_id: app_id.into(),
            nonce: generate_nonce(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Replace the nonce and timestamp, e.g. to rebuild a received signature
    pub fn with_nonce(mut self, nonce: impl Into<String>, timestamp: i64) -> Self {
        self.nonce = nonce.into();
        self.timestamp = timestamp;
        self
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Whether request parameters are part of the signed input
    fn signs_params(&self) -> bool {
        !(self.method.eq_ignore_ascii_case("POST") && self.content_type != FORM_URLENCODED)
    }

    /// Sorted, unescaped `key=value&...` parameter string
    pub fn base_params(&self) -> String {
        let timestamp = self.timestamp.to_string();
        let mut merged: BTreeMap<&str, &str> = BTreeMap::new();
        merged.insert("app_id", &self.app_id);
        merged.insert("nonce", &self.nonce);
        merged.insert("signature_method", SIGNATURE_METHOD);
        merged.insert("timestamp", &timestamp);

        if self.signs_params() {
            for (key, value) in &self.params {
                merged.insert(key, value);
            }
        }

        merged
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// `{METHOD}&{url}&{params}`
    pub fn base_string(&self) -> String {
        format!(
            "{}&{}&{}",
            self.method.to_uppercase(),
            self.url,
            self.base_params()
        )
    }

    /// Sign the base string and assemble the header
    pub fn sign(&self, key: &SigningKey<Sha256>) -> Result<PkiSignHeader, KeyError> {
        let signature = key
            .try_sign(self.base_string().as_bytes())
            .map_err(|e| KeyError::Signing(e.to_string()))?;

        Ok(PkiSignHeader {
            timestamp: self.timestamp,
            nonce: self.nonce.clone(),
            app_id: self.app_id.clone(),
            signature_method: SIGNATURE_METHOD.to_string(),
            signature: BASE64.encode(signature.to_bytes()),
        })
    }

    /// Check a header produced for this context
    ///
    /// The header's nonce and timestamp are used to rebuild the base string.
    pub fn verify(&self, header: &PkiSignHeader, key: &RsaPublicKey) -> bool {
        if header.app_id != self.app_id || header.signature_method != SIGNATURE_METHOD {
            return false;
        }
        let Ok(raw) = BASE64.decode(&header.signature) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(raw.as_slice()) else {
            return false;
        };

        let context = self.clone().with_nonce(header.nonce.clone(), header.timestamp);
        VerifyingKey::<Sha256>::new(key.clone())
            .verify(context.base_string().as_bytes(), &signature)
            .is_ok()
    }
}

/// Errors raised when parsing a `PKI_SIGN` header
#[derive(Debug, Error)]
#[error("Malformed PKI_SIGN header: {0}")]
pub struct HeaderParseError(String);

/// A `PKI_SIGN` authorization header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiSignHeader {
    pub timestamp: i64,
    pub nonce: String,
    pub app_id: String,
    pub signature_method: String,
    pub signature: String,
}

impl fmt::Display for PkiSignHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PKI_SIGN timestamp=\"{}\",nonce=\"{}\",app_id=\"{}\",signature_method=\"{}\",signature=\"{}\"",
            self.timestamp, self.nonce, self.app_id, self.signature_method, self.signature
        )
    }
}

impl FromStr for PkiSignHeader {
    type Err = HeaderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s
            .strip_prefix("PKI_SIGN ")
            .ok_or_else(|| HeaderParseError("missing PKI_SIGN scheme".to_string()))?;

        let mut values: BTreeMap<&str, &str> = BTreeMap::new();
        for field in fields.split(',') {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| HeaderParseError(format!("field without value: {}", field)))?;
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or_else(|| HeaderParseError(format!("unquoted value for {}", key)))?;
            values.insert(key.trim(), value);
        }

        let mut take = |key: &str| {
            values
                .remove(key)
                .map(str::to_string)
                .ok_or_else(|| HeaderParseError(format!("missing {}", key)))
        };

        let timestamp = take("timestamp")?
            .parse()
            .map_err(|_| HeaderParseError("timestamp is not a number".to_string()))?;

        Ok(Self {
            timestamp,
            nonce: take("nonce")?,
            app_id: take("app_id")?,
            signature_method: take("signature_method")?,
            signature: take("signature")?,
        })
    }
}

/// Sign one outbound request with a fresh nonce and timestamp
///
/// Used by [`generate_authorization_header`] and by the client's `L2` tier.
pub fn sign_request<I, K, V>(
    key: &SigningKey<Sha256>,
    app_id: &str,
    url: &str,
    method: &str,
    content_type: &str,
    params: I,
) -> Result<PkiSignHeader, KeyError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let context = SignatureContext::new(url, method, content_type, params, app_id);
    debug!(url, method, nonce = context.nonce(), "Signing gateway request");
    context.sign(key)
}

/// Build the gateway authorization header for a request
///
/// Standalone entry point for signing requests outside a [`MyInfoClient`],
/// e.g. when calling other gateway endpoints with an existing key. A client
/// signs through its configured tier, which uses the same [`sign_request`].
///
/// Returns an empty string for `L0`, where requests are not signed. For `L2`
/// the private key is required.
///
/// [`MyInfoClient`]: crate::MyInfoClient
pub fn generate_authorization_header<I, K, V>(
    url: &str,
    params: I,
    method: &str,
    content_type: &str,
    auth_level: AuthLevel,
    app_id: &str,
    private_key: Option<&RsaPrivateKey>,
) -> Result<String, KeyError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    if !auth_level.is_pki() {
        return Ok(String::new());
    }

    let key = private_key.ok_or_else(|| {
        KeyError::Signing("a private key is required to sign L2 requests".to_string())
    })?;
    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let header = sign_request(&signing_key, app_id, url, method, content_type, params)?;
    Ok(header.to_string())
}

//! Request and response types for the token and person endpoints
//!
//! Each request type serializes to the wire (form body or query string) and
//! yields the exact parameter list that goes into the gateway signature, so
//! both always agree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jose::Claims;

/// Form body of the token endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest {
    pub grant_type: &'static str,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
}

impl TokenRequest {
    pub fn new(
        code: impl Into<String>,
        redirect_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            grant_type: "authorization_code",
            code: code.into(),
            redirect_uri: redirect_uri.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Parameters covered by the request signature
    pub fn signing_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("grant_type", self.grant_type.to_string()),
            ("code", self.code.clone()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ]
    }
}

/// Query string of the person endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PersonRequest {
    pub client_id: String,
    /// Comma-separated attribute names, in request order
    pub attributes: String,
}

impl PersonRequest {
    pub fn new<S: AsRef<str>>(client_id: impl Into<String>, attributes: &[S]) -> Self {
        Self {
            client_id: client_id.into(),
            attributes: join_attributes(attributes),
        }
    }

    /// Parameters covered by the request signature
    pub fn signing_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("client_id", self.client_id.clone()),
            ("attributes", self.attributes.clone()),
        ]
    }
}

pub(crate) fn join_attributes<S: AsRef<str>>(attributes: &[S]) -> String {
    attributes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Result of a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResult {
    /// Never empty
    pub access_token: String,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
}

impl TokenResult {
    /// Turn a token response into a result, if it carries a token
    pub(crate) fn from_response(response: TokenResponse) -> Option<Self> {
        let access_token = response.access_token.filter(|t| !t.is_empty())?;
        Some(Self {
            access_token,
            token_type: response.token_type,
            scope: response.scope,
            expires_in: response.expires_in,
        })
    }
}

/// Verified person attributes, keyed by attribute name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonRecord(Claims);

impl PersonRecord {
    pub fn new(attributes: Claims) -> Self {
        Self(attributes)
    }

    /// Raw attribute object, e.g. `{"value": "...", "source": "1", ...}`
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.0.get(attribute)
    }

    /// The `value` field of an attribute object
    pub fn value(&self, attribute: &str) -> Option<&Value> {
        self.get(attribute)?.get("value")
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.0.contains_key(attribute)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Claims {
        self.0
    }
}

impl From<Claims> for PersonRecord {
    fn from(claims: Claims) -> Self {
        Self(claims)
    }
}

//! Per-tier request authorization and payload decoding
//!
//! The auth level is resolved once, when the client is built, into a
//! [`SecurityTier`] strategy. Everything that differs between `L0` and `L2`
//! lives behind that trait.

use std::fmt;

use rsa::pkcs1v15::SigningKey;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use tracing::warn;

use crate::config::{AuthLevel, ClientConfig};
use crate::error::{MyInfoError, Result};
use crate::jose::{self, JwsVerifier};
use crate::keys;
use crate::signature;
use crate::types::PersonRecord;

/// An outbound request as seen by the gateway signature
#[derive(Debug)]
pub(crate) struct OutboundRequest<'a> {
    pub url: &'a str,
    pub method: &'a str,
    pub content_type: &'a str,
    pub params: Vec<(&'static str, String)>,
}

pub(crate) trait SecurityTier: fmt::Debug + Send + Sync {
    fn level(&self) -> AuthLevel;

    /// Gateway authorization header for a request, if the tier signs requests
    fn authorization_header(&self, request: OutboundRequest<'_>) -> Result<Option<String>>;

    /// Turn a non-empty person response body into verified attributes
    fn decode_person(&self, body: &str) -> Result<PersonRecord>;
}

/// Build the strategy for the configured auth level
pub(crate) fn for_config(
    config: &ClientConfig,
    verifier: &JwsVerifier,
) -> Result<Box<dyn SecurityTier>> {
    match config.auth_level() {
        AuthLevel::L0 => Ok(Box::new(SandboxTier)),
        AuthLevel::L2 => {
            let material = config.private_key().ok_or_else(|| {
                MyInfoError::Config(crate::config::ConfigError::RequiredForLevel {
                    field: "private_key",
                    level: AuthLevel::L2,
                })
            })?;
            let private_key =
                keys::load_private_key(material, config.private_key_passphrase())?;
            Ok(Box::new(PkiTier::new(
                config.client_id(),
                private_key,
                verifier.clone(),
            )))
        }
    }
}

/// `L0`: unsigned requests, plain JSON person data
#[derive(Debug)]
pub(crate) struct SandboxTier;

impl SecurityTier for SandboxTier {
    fn level(&self) -> AuthLevel {
        AuthLevel::L0
    }

    fn authorization_header(&self, _request: OutboundRequest<'_>) -> Result<Option<String>> {
        Ok(None)
    }

    fn decode_person(&self, body: &str) -> Result<PersonRecord> {
        // Sandbox payloads travel unsigned; there is nothing to verify.
        let claims = jose::parse_claims(body).map_err(|e| {
            warn!("Person payload is not a JSON object: {}", e);
            MyInfoError::InvalidDataOrSignature(e)
        })?;
        Ok(PersonRecord::new(claims))
    }
}

/// `L2`: `PKI_SIGN` requests, JWE(JWS) person data
pub(crate) struct PkiTier {
    app_id: String,
    signing_key: SigningKey<Sha256>,
    decryption_key: RsaPrivateKey,
    verifier: JwsVerifier,
}

impl PkiTier {
    pub fn new(app_id: &str, private_key: RsaPrivateKey, verifier: JwsVerifier) -> Self {
        Self {
            app_id: app_id.to_string(),
            signing_key: SigningKey::<Sha256>::new(private_key.clone()),
            decryption_key: private_key,
            verifier,
        }
    }
}

impl fmt::Debug for PkiTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkiTier")
            .field("app_id", &self.app_id)
            .field("signing_key", &"[REDACTED]")
            .field("decryption_key", &"[REDACTED]")
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl SecurityTier for PkiTier {
    fn level(&self) -> AuthLevel {
        AuthLevel::L2
    }

    fn authorization_header(&self, request: OutboundRequest<'_>) -> Result<Option<String>> {
        let header = signature::sign_request(
            &self.signing_key,
            &self.app_id,
            request.url,
            request.method,
            request.content_type,
            request.params,
        )
        .map_err(|e| {
            warn!("Failed to sign gateway request: {}", e);
            MyInfoError::Key(e)
        })?;
        Ok(Some(header.to_string()))
    }

    fn decode_person(&self, body: &str) -> Result<PersonRecord> {
        let inner = jose::decrypt_payload(body, &self.decryption_key).map_err(|e| {
            warn!("Failed to decrypt person payload: {}", e);
            MyInfoError::DecryptionFailed(e)
        })?;

        let claims = self.verifier.verify(&inner).map_err(|e| {
            warn!("Person payload signature rejected: {}", e);
            MyInfoError::InvalidDataOrSignature(e)
        })?;

        Ok(PersonRecord::new(claims))
    }
}

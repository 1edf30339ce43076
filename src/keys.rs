//! Key material loading and parsing
//!
//! Private keys are used for request signing and for unwrapping the content
//! encryption key of person payloads. Public material verifies tokens issued
//! by the consent platform and may be supplied as an X.509 certificate or as a
//! bare public key.

use std::fmt;
use std::path::PathBuf;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading key material
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Failed to read key material from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No PEM block found in key material")]
    NotPem,

    #[error("Unsupported PEM block: {0}")]
    UnsupportedPem(String),

    #[error("Encrypted private key requires a passphrase")]
    MissingPassphrase,

    #[error("RSA parse error: {0}")]
    RsaParseError(String),

    #[error("Certificate parse error: {0}")]
    CertificateError(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("JWT key error: {0}")]
    JwtKey(#[from] jsonwebtoken::errors::Error),
}

/// Where a PEM document comes from
///
/// The consent platform hands out certificates as files during onboarding,
/// while deployments often inject them through secrets as inline content, so
/// both are accepted.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMaterial {
    /// Inline PEM content
    Pem(String),
    /// Path to a PEM file
    File(PathBuf),
}

impl KeyMaterial {
    /// Read the PEM document
    pub fn read(&self) -> Result<String, KeyError> {
        match self {
            KeyMaterial::Pem(pem) => Ok(pem.clone()),
            KeyMaterial::File(path) => {
                std::fs::read_to_string(path).map_err(|source| KeyError::Io {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Pem(_) => f.write_str("Pem([REDACTED])"),
            KeyMaterial::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Label of the first PEM block, e.g. `PRIVATE KEY`
fn pem_label(pem: &str) -> Option<&str> {
    let start = pem.find("-----BEGIN ")? + "-----BEGIN ".len();
    let rest = &pem[start..];
    let end = rest.find("-----")?;
    Some(rest[..end].trim())
}

/// Load an RSA private key
///
/// Accepts PKCS#1 (`RSA PRIVATE KEY`), PKCS#8 (`PRIVATE KEY`) and encrypted
/// PKCS#8 (`ENCRYPTED PRIVATE KEY`). The passphrase is only consulted for the
/// encrypted form.
pub fn load_private_key(
    material: &KeyMaterial,
    passphrase: Option<&str>,
) -> Result<RsaPrivateKey, KeyError> {
    let pem = material.read()?;

    match pem_label(&pem).ok_or(KeyError::NotPem)? {
        "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_pem(&pem)
            .map_err(|e| KeyError::RsaParseError(format!("Failed to parse PKCS#1 key: {}", e))),
        "PRIVATE KEY" => RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| KeyError::RsaParseError(format!("Failed to parse PKCS#8 key: {}", e))),
        "ENCRYPTED PRIVATE KEY" => {
            let passphrase = passphrase
                .filter(|p| !p.is_empty())
                .ok_or(KeyError::MissingPassphrase)?;
            RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, passphrase).map_err(|e| {
                KeyError::RsaParseError(format!("Failed to decrypt PKCS#8 key: {}", e))
            })
        }
        other => Err(KeyError::UnsupportedPem(other.to_string())),
    }
}

/// Load an RSA public key from a certificate or a public key PEM
pub fn load_public_key(material: &KeyMaterial) -> Result<RsaPublicKey, KeyError> {
    let pem = material.read()?;

    match pem_label(&pem).ok_or(KeyError::NotPem)? {
        "CERTIFICATE" => public_key_from_certificate(&pem),
        "PUBLIC KEY" => RsaPublicKey::from_public_key_pem(&pem)
            .map_err(|e| KeyError::RsaParseError(format!("Failed to parse RSA public key: {}", e))),
        "RSA PUBLIC KEY" => RsaPublicKey::from_pkcs1_pem(&pem)
            .map_err(|e| KeyError::RsaParseError(format!("Failed to parse RSA public key: {}", e))),
        other => Err(KeyError::UnsupportedPem(other.to_string())),
    }
}

/// Extract the RSA public key from an X.509 certificate
fn public_key_from_certificate(pem: &str) -> Result<RsaPublicKey, KeyError> {
    let (_, block) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| KeyError::CertificateError(format!("Failed to read PEM: {}", e)))?;
    let cert = block
        .parse_x509()
        .map_err(|e| KeyError::CertificateError(format!("Failed to parse certificate: {}", e)))?;

    RsaPublicKey::from_public_key_der(cert.public_key().raw).map_err(|e| {
        KeyError::RsaParseError(format!("Certificate does not carry an RSA key: {}", e))
    })
}

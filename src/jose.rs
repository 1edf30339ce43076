//! JWS verification and JWE decryption
//!
//! Person data from an `L2` environment arrives as a compact JWE whose
//! plaintext is a compact JWS:
//!
//! ```text
//! JWE  header.encryptedKey.iv.ciphertext.tag
//!  └─ RSA-OAEP unwrap of the content key with the client private key
//!  └─ AES-GCM decryption, AAD = protected header segment
//!      └─ JWS  header.claims.signature   (RS256, platform certificate)
//! ```
//!
//! Access tokens are plain RS256 JWS on every tier.

use aes_gcm::aead::{Aead, KeyInit, Nonce, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

use crate::keys::KeyError;

/// Verified JWT claims
pub type Claims = Map<String, Value>;

const JWS_SEGMENTS: usize = 3;
const JWE_SEGMENTS: usize = 5;
const GCM_IV_LEN: usize = 12;

/// Errors raised by the verify/decrypt pipeline
#[derive(Debug, Error)]
pub enum JoseError {
    #[error("Malformed compact serialization: expected {expected} segments, found {found}")]
    Malformed { expected: usize, found: usize },

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signature verification failed: {0}")]
    Verification(#[from] jsonwebtoken::errors::Error),

    #[error("Key unwrapping failed: {0}")]
    UnwrapError(String),

    #[error("Invalid {0} length")]
    InvalidLength(&'static str),

    #[error("Content decryption failed")]
    ContentDecryption,

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

fn split_compact(token: &str, expected: usize) -> Result<Vec<&str>, JoseError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != expected {
        return Err(JoseError::Malformed {
            expected,
            found: segments.len(),
        });
    }
    Ok(segments)
}

/// RS256 verifier bound to the consent platform's public key
#[derive(Clone)]
pub struct JwsVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwsVerifier {
    pub fn new(public_key: &RsaPublicKey) -> Result<Self, KeyError> {
        let modulus = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let exponent = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        let key = DecodingKey::from_rsa_components(&modulus, &exponent)?;

        // Platform clocks run slightly ahead, so nbf is ignored. Audience is
        // the client id and checked by the platform, not here.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Ok(Self { key, validation })
    }

    /// Verify a compact JWS and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, JoseError> {
        let token = token.trim();
        split_compact(token, JWS_SEGMENTS)?;
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for JwsVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwsVerifier")
            .field("algorithm", &"RS256")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
}

fn open<C: Aead + KeyInit>(
    cek: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let cipher = C::new_from_slice(cek).map_err(|_| JoseError::InvalidLength("content key"))?;
    cipher
        .decrypt(
            Nonce::<C>::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| JoseError::ContentDecryption)
}

/// Decrypt a compact JWE and return the raw plaintext
///
/// Supports `RSA-OAEP` and `RSA-OAEP-256` key management with `A128GCM` or
/// `A256GCM` content encryption.
pub fn decrypt_jwe(compact: &str, private_key: &RsaPrivateKey) -> Result<Vec<u8>, JoseError> {
    let segments = split_compact(compact, JWE_SEGMENTS)?;
    let protected = segments[0];

    let header: JweHeader = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(protected)?)?;

    let encrypted_key = URL_SAFE_NO_PAD.decode(segments[1])?;
    let padding = match header.alg.as_str() {
        "RSA-OAEP" => Oaep::new::<Sha1>(),
        "RSA-OAEP-256" => Oaep::new::<Sha256>(),
        other => return Err(JoseError::UnsupportedAlgorithm(other.to_string())),
    };
    let cek = private_key
        .decrypt(padding, &encrypted_key)
        .map_err(|e| JoseError::UnwrapError(format!("RSA-OAEP decryption failed: {}", e)))?;

    let iv = URL_SAFE_NO_PAD.decode(segments[2])?;
    if iv.len() != GCM_IV_LEN {
        return Err(JoseError::InvalidLength("initialization vector"));
    }

    // AES-GCM expects ciphertext || tag
    let mut ciphertext = URL_SAFE_NO_PAD.decode(segments[3])?;
    ciphertext.extend_from_slice(&URL_SAFE_NO_PAD.decode(segments[4])?);

    match header.enc.as_str() {
        "A128GCM" => open::<Aes128Gcm>(&cek, &iv, &ciphertext, protected.as_bytes()),
        "A256GCM" => open::<Aes256Gcm>(&cek, &iv, &ciphertext, protected.as_bytes()),
        other => Err(JoseError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Decrypt a person payload into the signed token it wraps
///
/// The plaintext is either the bare compact JWS or a JSON string literal
/// holding it.
pub fn decrypt_payload(compact: &str, private_key: &RsaPrivateKey) -> Result<String, JoseError> {
    let plaintext = decrypt_jwe(compact, private_key)?;
    let text = String::from_utf8(plaintext).map_err(|_| JoseError::InvalidUtf8)?;
    let text = text.trim();

    if text.starts_with('"') {
        Ok(serde_json::from_str::<String>(text)?)
    } else {
        Ok(text.to_string())
    }
}

/// Parse a plain JSON person payload
pub fn parse_claims(body: &str) -> Result<Claims, JoseError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(JoseError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::OsRng, RngCore};
    use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};

    const CLIENT_PRIVATE: &str = include_str!("../tests/fixtures/client-private.pem");
    const PROVIDER_PRIVATE: &str = include_str!("../tests/fixtures/provider-private.pem");
    const PROVIDER_PUBLIC: &str = include_str!("../tests/fixtures/provider-public.pem");
    const ACCESS_TOKEN: &str = include_str!("../tests/fixtures/access-token.jwt");
    const PERSON_JWE: &str = include_str!("../tests/fixtures/person.jwe");
    const PERSON_CLAIMS: &str = include_str!("../tests/fixtures/person-claims.json");

    fn client_key() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(CLIENT_PRIVATE).unwrap()
    }

    fn provider_verifier() -> JwsVerifier {
        JwsVerifier::new(&RsaPublicKey::from_public_key_pem(PROVIDER_PUBLIC).unwrap()).unwrap()
    }

    /// Seal `plaintext` to `recipient` as a compact JWE
    fn seal(plaintext: &[u8], recipient: &RsaPublicKey, alg: &str, enc: &str) -> String {
        let protected =
            URL_SAFE_NO_PAD.encode(format!(r#"{{"alg":"{}","enc":"{}"}}"#, alg, enc));
        let mut cek = vec![0u8; if enc == "A128GCM" { 16 } else { 32 }];
        OsRng.fill_bytes(&mut cek);
        let mut iv = [0u8; GCM_IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let padding = if alg == "RSA-OAEP" {
            Oaep::new::<Sha1>()
        } else {
            Oaep::new::<Sha256>()
        };
        let encrypted_key = recipient.encrypt(&mut OsRng, padding, &cek).unwrap();

        let payload = Payload {
            msg: plaintext,
            aad: protected.as_bytes(),
        };
        let sealed = if enc == "A128GCM" {
            Aes128Gcm::new_from_slice(&cek)
                .unwrap()
                .encrypt(Nonce::<Aes128Gcm>::from_slice(&iv), payload)
                .unwrap()
        } else {
            Aes256Gcm::new_from_slice(&cek)
                .unwrap()
                .encrypt(Nonce::<Aes256Gcm>::from_slice(&iv), payload)
                .unwrap()
        };
        let (ciphertext, tag) = sealed.split_at(sealed.len() - 16);

        [
            protected,
            URL_SAFE_NO_PAD.encode(encrypted_key),
            URL_SAFE_NO_PAD.encode(iv),
            URL_SAFE_NO_PAD.encode(ciphertext),
            URL_SAFE_NO_PAD.encode(tag),
        ]
        .join(".")
    }

    #[test]
    fn test_verify_access_token_ignores_not_before() {
        let claims = provider_verifier().verify(ACCESS_TOKEN).unwrap();
        assert_eq!(claims["sub"], "S9812381D");
        assert!(claims["nbf"].as_i64().unwrap() > chrono::Utc::now().timestamp());
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let other = RsaPublicKey::from(&client_key());
        let verifier = JwsVerifier::new(&other).unwrap();
        assert!(matches!(
            verifier.verify(ACCESS_TOKEN),
            Err(JoseError::Verification(_))
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_claims() {
        let forged = URL_SAFE_NO_PAD.encode(r#"{"sub":"S0000000A"}"#);
        let mut segments: Vec<&str> = ACCESS_TOKEN.trim().split('.').collect();
        segments[1] = &forged;
        let result = provider_verifier().verify(&segments.join("."));
        assert!(matches!(result, Err(JoseError::Verification(_))));
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(PROVIDER_PRIVATE.as_bytes()).unwrap();
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::RS256),
            &serde_json::json!({ "sub": "S9812381D", "exp": 1_000_000_000 }),
            &key,
        )
        .unwrap();
        assert!(matches!(
            provider_verifier().verify(&token),
            Err(JoseError::Verification(_))
        ));
    }

    #[test]
    fn test_verify_rejects_jwe_shape() {
        assert!(matches!(
            provider_verifier().verify(PERSON_JWE),
            Err(JoseError::Malformed {
                expected: 3,
                found: 5
            })
        ));
    }

    #[test]
    fn test_decrypt_fixture_payload() {
        let inner = decrypt_payload(PERSON_JWE, &client_key()).unwrap();
        let claims = provider_verifier().verify(&inner).unwrap();
        let expected: Claims = serde_json::from_str(PERSON_CLAIMS).unwrap();
        assert_eq!(claims, expected);
    }

    #[test]
    fn test_decrypt_is_repeatable() {
        let key = client_key();
        let first = decrypt_payload(PERSON_JWE, &key).unwrap();
        let second = decrypt_payload(PERSON_JWE, &key).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decrypt_round_trip_with_oaep_256_and_a128gcm() {
        let key = client_key();
        let public = RsaPublicKey::from(&key);
        let compact = seal(b"header.claims.signature", &public, "RSA-OAEP-256", "A128GCM");
        assert_eq!(
            decrypt_payload(&compact, &key).unwrap(),
            "header.claims.signature"
        );
    }

    #[test]
    fn test_decrypt_rejects_four_segments() {
        let truncated = PERSON_JWE.trim().rsplit_once('.').unwrap().0;
        assert!(matches!(
            decrypt_payload(truncated, &client_key()),
            Err(JoseError::Malformed {
                expected: 5,
                found: 4
            })
        ));
    }

    #[test]
    fn test_decrypt_rejects_tampered_ciphertext() {
        let mut segments: Vec<String> = PERSON_JWE.trim().split('.').map(String::from).collect();
        let mut ciphertext = URL_SAFE_NO_PAD.decode(&segments[3]).unwrap();
        ciphertext[0] ^= 0x01;
        segments[3] = URL_SAFE_NO_PAD.encode(ciphertext);

        assert!(matches!(
            decrypt_jwe(&segments.join("."), &client_key()),
            Err(JoseError::ContentDecryption)
        ));
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails_unwrap() {
        let wrong = RsaPrivateKey::from_pkcs8_pem(PROVIDER_PRIVATE).unwrap();
        assert!(matches!(
            decrypt_jwe(PERSON_JWE, &wrong),
            Err(JoseError::UnwrapError(_))
        ));
    }

    #[test]
    fn test_decrypt_rejects_unknown_algorithms() {
        let public = RsaPublicKey::from(&client_key());
        let compact = seal(b"x", &public, "RSA-OAEP", "A256GCM");
        let forged_header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RSA1_5","enc":"A256GCM"}"#);
        let forged = format!("{}.{}", forged_header, compact.split_once('.').unwrap().1);

        assert!(matches!(
            decrypt_jwe(&forged, &client_key()),
            Err(JoseError::UnsupportedAlgorithm(alg)) if alg == "RSA1_5"
        ));
    }

    #[test]
    fn test_parse_claims() {
        let claims = parse_claims(r#"{"name":{"value":"TAN XIAO HUI"}}"#).unwrap();
        assert_eq!(claims["name"]["value"], "TAN XIAO HUI");

        assert!(matches!(parse_claims("[1, 2]"), Err(JoseError::NotAnObject)));
        assert!(matches!(parse_claims("not json"), Err(JoseError::Json(_))));
    }
}

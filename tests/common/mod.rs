//! Common test utilities for MyInfo client integration tests
//!
//! Fixtures under `tests/fixtures/`:
//! - `provider-*`: the consent platform's signing key and certificate
//! - `client-*`: the relying application's key pair
//! - `access-token.jwt`: RS256 token for subject `S9812381D`, signed by the
//!   provider, with `nbf` far in the future
//! - `person.jwe`: RSA-OAEP/A256GCM payload for the client wrapping a JWS of
//!   `person-claims.json`

#![allow(dead_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use myinfo_client::{AuthLevel, Claims, ClientConfig, ClientConfigBuilder, KeyMaterial};
use rand::{rngs::OsRng, RngCore};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};

pub const CLIENT_ID: &str = "STG2-MYINFO-SELF-TEST";
pub const CLIENT_SECRET: &str = "client-secret";
pub const REDIRECT_URL: &str = "http://localhost:3001/callback";
pub const UINFIN: &str = "S9812381D";

/// `PKI_SIGN` header for `CLIENT_ID`, anchored at both ends
pub const PKI_SIGN_PATTERN: &str = r#"^PKI_SIGN timestamp="\d+",nonce="[0-9a-f]{32}",app_id="STG2-MYINFO-SELF-TEST",signature_method="RS256",signature="[A-Za-z0-9+/]+=*"$"#;

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("missing fixture {}: {}", path, e))
        .trim()
        .to_string()
}

pub fn person_claims() -> Claims {
    serde_json::from_str(&fixture("person-claims.json")).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builder pointed at a mock server, without key material for L0
pub fn config_builder(base_url: &str, level: AuthLevel) -> ClientConfigBuilder {
    let builder = ClientConfig::builder()
        .base_url(base_url)
        .auth_level(level)
        .client_id(CLIENT_ID)
        .client_secret(CLIENT_SECRET)
        .public_cert(KeyMaterial::Pem(fixture("provider-cert.pem")))
        .redirect_url(REDIRECT_URL)
        .attributes(["uinfin", "name"]);

    match level {
        AuthLevel::L0 => builder,
        AuthLevel::L2 => builder.private_key(KeyMaterial::Pem(fixture("client-private.pem"))),
    }
}

pub fn config(base_url: &str, level: AuthLevel) -> ClientConfig {
    config_builder(base_url, level).build().unwrap()
}

/// Sign claims as the consent platform
pub fn provider_jws(claims: &serde_json::Value) -> String {
    sign_jws(claims, "provider-private.pem")
}

/// Sign claims with a key the client does not trust
pub fn untrusted_jws(claims: &serde_json::Value) -> String {
    sign_jws(claims, "client-private.pem")
}

fn sign_jws(claims: &serde_json::Value, key_fixture: &str) -> String {
    let key = EncodingKey::from_rsa_pem(fixture(key_fixture).as_bytes()).unwrap();
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

/// Encrypt a plaintext to the client's public key as RSA-OAEP/A256GCM
pub fn seal_for_client(plaintext: &str) -> String {
    use aes_gcm::aead::{Aead, KeyInit, Payload};
    use aes_gcm::{Aes256Gcm, Nonce};

    let recipient = RsaPublicKey::from_public_key_pem(&fixture("client-public.pem")).unwrap();
    let protected = URL_SAFE_NO_PAD.encode(r#"{"alg":"RSA-OAEP","enc":"A256GCM"}"#);

    let mut cek = [0u8; 32];
    OsRng.fill_bytes(&mut cek);
    let mut iv = [0u8; 12];
    OsRng.fill_bytes(&mut iv);

    let encrypted_key = recipient
        .encrypt(&mut OsRng, Oaep::new::<sha1::Sha1>(), &cek)
        .unwrap();
    let sealed = Aes256Gcm::new_from_slice(&cek)
        .unwrap()
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext.as_bytes(),
                aad: protected.as_bytes(),
            },
        )
        .unwrap();
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

/// Person payload as an L2 environment returns it
pub fn l2_person_payload(claims: &serde_json::Value) -> String {
    let jws = provider_jws(claims);
    seal_for_client(&serde_json::to_string(&jws).unwrap())
}

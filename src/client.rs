//! MyInfo consent platform client
//!
//! # Protocol Flow
//!
//! 1. Send the user to [`MyInfoClient::authorise_url`]
//! 2. The platform redirects back with a one-time `code`
//! 3. [`MyInfoClient::exchange_code_for_token`] POSTs the code to `/com/v3/token`
//! 4. [`MyInfoClient::get_person`] verifies the access token, takes the
//!    subject (UINFIN) from it and GETs `/com/v3/person/{uinfin}/`
//! 5. The person payload is decoded per tier: plain JSON for `L0`, JWE
//!    wrapping a JWS for `L2`
//!
//! No call is ever retried. Codes are single use and a retried exchange after
//! an ambiguous failure can burn the code.
//!
//! # Example
//!
//! ```no_run
//! use myinfo_client::{AuthLevel, ClientConfig, KeyMaterial, MyInfoClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder()
//!     .base_url("https://test.api.myinfo.gov.sg")
//!     .auth_level(AuthLevel::L2)
//!     .client_id("STG2-MYINFO-SELF-TEST")
//!     .client_secret("44d953c796cccebcec9bdc826852857ab412fbe2")
//!     .private_key(KeyMaterial::File("cert/demoapp-client-privatekey-2018.pem".into()))
//!     .public_cert(KeyMaterial::File("cert/staging_myinfo_public_cert.cer".into()))
//!     .redirect_url("http://localhost:3001/callback")
//!     .attributes(["uinfin", "name", "sex", "race"])
//!     .build()?;
//!
//! let client = MyInfoClient::new(config)?;
//!
//! let redirect = client.authorise_url(&client.authorisation_request("demonstrating MyInfo APIs"));
//! println!("Visit {} (state {})", redirect.url, redirect.state);
//!
//! // ... after the callback delivers `code`
//! # let code = "code";
//! let person = client.retrieve_person(code, None).await?;
//! println!("{:?}", person.value("name"));
//! # Ok(())
//! # }
//! ```

use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use crate::authorise::{build_authorise_url, AuthorisationRequest, AuthoriseRedirect};
use crate::config::{AuthLevel, ClientConfig, ConfigError, Endpoints};
use crate::error::{MyInfoError, Result};
use crate::jose::{Claims, JwsVerifier};
use crate::keys;
use crate::signature::FORM_URLENCODED;
use crate::tier::{self, OutboundRequest, SecurityTier};
use crate::types::{PersonRecord, PersonRequest, TokenRequest, TokenResponse, TokenResult};

const NO_CACHE: &str = "no-cache";

/// Client for the MyInfo consent platform
///
/// Read-only after construction; share it across tasks behind an `Arc`.
#[derive(Debug)]
pub struct MyInfoClient {
    http_client: Client,
    config: ClientConfig,
    endpoints: Endpoints,
    verifier: JwsVerifier,
    tier: Box<dyn SecurityTier>,
}

impl MyInfoClient {
    /// Create a new client
    ///
    /// Validates the configuration and parses all key material up front, so
    /// a misconfigured client fails here rather than on its first call.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let public_cert = config.public_cert().ok_or(ConfigError::RequiredForLevel {
            field: "public_cert",
            level: config.auth_level(),
        })?;
        let verifier = JwsVerifier::new(&keys::load_public_key(public_cert)?)?;
        let tier = tier::for_config(&config, &verifier)?;

        let http_client = Client::builder().timeout(config.timeout()).build()?;

        debug!(
            auth_level = %config.auth_level(),
            client_id = config.client_id(),
            "Created MyInfo client"
        );

        Ok(Self {
            http_client,
            endpoints: config.endpoints(),
            config,
            verifier,
            tier,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn auth_level(&self) -> AuthLevel {
        self.tier.level()
    }

    /// Authorisation request for the configured attribute list
    pub fn authorisation_request(&self, purpose: impl Into<String>) -> AuthorisationRequest {
        AuthorisationRequest::new(purpose, self.config.attributes().iter().cloned())
    }

    /// Build the authorise redirect URL and its state nonce
    pub fn authorise_url(&self, request: &AuthorisationRequest) -> AuthoriseRedirect {
        build_authorise_url(
            &self.endpoints.authorise,
            self.config.client_id(),
            request,
            self.config.redirect_url(),
        )
    }

    /// Exchange an authorisation code for an access token
    ///
    /// Issues exactly one POST. The code is consumed by the platform even when
    /// the response is unusable, so failures are never retried.
    #[instrument(skip(self, code), fields(auth_level = %self.auth_level()))]
    pub async fn exchange_code_for_token(
        &self,
        code: &str,
        redirect_override: Option<&str>,
    ) -> Result<TokenResult> {
        let request = TokenRequest::new(
            code,
            redirect_override.unwrap_or(self.config.redirect_url()),
            self.config.client_id(),
            self.config.client_secret(),
        );

        let authorization = self.tier.authorization_header(OutboundRequest {
            url: &self.endpoints.token,
            method: "POST",
            content_type: FORM_URLENCODED,
            params: request.signing_params(),
        })?;

        let mut builder = self
            .http_client
            .post(&self.endpoints.token)
            .header(CONTENT_TYPE, FORM_URLENCODED)
            .header(CACHE_CONTROL, NO_CACHE)
            .form(&request);
        if let Some(authorization) = authorization.filter(|h| !h.is_empty()) {
            builder = builder.header(AUTHORIZATION, authorization);
        }

        debug!(url = %self.endpoints.token, "Requesting access token");
        let response = builder.send().await.map_err(|e| {
            warn!("Token request failed: {}", e);
            MyInfoError::Network(e)
        })?;

        let status = response.status();
        let response = response.error_for_status().map_err(|e| {
            warn!("Token endpoint returned HTTP {}", status);
            MyInfoError::Network(e)
        })?;
        let body = response.text().await.map_err(|e| {
            warn!("Failed to read token response: {}", e);
            MyInfoError::Network(e)
        })?;

        // A body that is not JSON carries no token either.
        let token = serde_json::from_str::<TokenResponse>(&body)
            .ok()
            .and_then(TokenResult::from_response)
            .ok_or_else(|| {
                warn!("Token response has no access_token");
                MyInfoError::AccessTokenNotFound
            })?;

        info!("Exchanged authorisation code for access token");
        Ok(token)
    }

    /// Verify an access token against the platform certificate
    pub fn verify_access_token(&self, access_token: &str) -> Result<Claims> {
        self.verifier.verify(access_token).map_err(|e| {
            warn!("Access token rejected: {}", e);
            MyInfoError::InvalidToken(e)
        })
    }

    /// Fetch the person's attributes
    ///
    /// Verifies the access token, reads the subject from it and calls the
    /// person endpoint. The payload is then decoded for the configured tier.
    #[instrument(skip(self, access_token, attributes), fields(auth_level = %self.auth_level()))]
    pub async fn get_person<S: AsRef<str>>(
        &self,
        access_token: &str,
        attributes: &[S],
    ) -> Result<PersonRecord> {
        let claims = self.verify_access_token(access_token)?;
        let uinfin = claims
            .get("sub")
            .and_then(|sub| sub.as_str())
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| {
                warn!("Access token has no subject");
                MyInfoError::UinfinNotFound
            })?;

        let url = format!("{}/{}/", self.endpoints.person, uinfin);
        let request = PersonRequest::new(self.config.client_id(), attributes);

        let signature = self.tier.authorization_header(OutboundRequest {
            url: &url,
            method: "GET",
            content_type: "",
            params: request.signing_params(),
        })?;
        let authorization = match signature.filter(|h| !h.is_empty()) {
            Some(signature) => format!("{},Bearer {}", signature, access_token),
            None => format!("Bearer {}", access_token),
        };

        debug!(url = %url, attributes = %request.attributes, "Requesting person data");
        let response = self
            .http_client
            .get(&url)
            .header(CACHE_CONTROL, NO_CACHE)
            .header(AUTHORIZATION, authorization)
            .query(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Person request failed: {}", e);
                MyInfoError::Network(e)
            })?;

        let status = response.status();
        let response = response.error_for_status().map_err(|e| {
            warn!("Person endpoint returned HTTP {}", status);
            MyInfoError::Network(e)
        })?;
        let body = response.text().await.map_err(|e| {
            warn!("Failed to read person response: {}", e);
            MyInfoError::Network(e)
        })?;

        if body.trim().is_empty() {
            warn!("Person endpoint returned an empty body");
            return Err(MyInfoError::PersonDataNotFound);
        }

        let person = self.tier.decode_person(body.trim())?;
        info!(attributes = person.len(), "Retrieved person data");
        Ok(person)
    }

    /// Exchange a code and fetch the configured attributes in one go
    pub async fn retrieve_person(
        &self,
        code: &str,
        redirect_override: Option<&str>,
    ) -> Result<PersonRecord> {
        let token = self.exchange_code_for_token(code, redirect_override).await?;
        self.get_person(&token.access_token, self.config.attributes())
            .await
    }
}

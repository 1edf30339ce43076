//! Authorise redirect URL construction
//!
//! The relying application sends the user's browser to the authorise
//! endpoint. Parameter values are inserted verbatim, without percent
//! encoding, matching what the consent platform expects from existing
//! integrations.
//!
//! The generated `state` is handed back to the caller. Persisting it and
//! comparing it with the value returned on the callback is the caller's job.

use crate::signature::generate_nonce;
use crate::types::join_attributes;

/// What the user is asked to consent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorisationRequest {
    pub purpose: String,
    pub attributes: Vec<String>,
    /// Overrides the configured redirect URL
    pub redirect_uri: Option<String>,
}

impl AuthorisationRequest {
    pub fn new<I, S>(purpose: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            purpose: purpose.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
            redirect_uri: None,
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }
}

/// Authorise URL together with the state nonce embedded in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoriseRedirect {
    pub url: String,
    /// 32 lowercase hex characters
    pub state: String,
}

/// Build the authorise URL for a request
pub fn build_authorise_url(
    authorise_endpoint: &str,
    client_id: &str,
    request: &AuthorisationRequest,
    default_redirect_uri: &str,
) -> AuthoriseRedirect {
    let state = generate_nonce();
    let redirect_uri = request
        .redirect_uri
        .as_deref()
        .unwrap_or(default_redirect_uri);

    let url = format!(
        "{}?client_id={}&attributes={}&purpose={}&state={}&redirect_uri={}",
        authorise_endpoint,
        client_id,
        join_attributes(&request.attributes),
        request.purpose,
        state,
        redirect_uri
    );

    AuthoriseRedirect { url, state }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://sandbox.example/com/v3/authorise";

    fn query_keys(url: &str) -> Vec<&str> {
        url.split_once('?')
            .unwrap()
            .1
            .split('&')
            .map(|pair| pair.split_once('=').unwrap().0)
            .collect()
    }

    #[test]
    fn test_sandbox_scenario() {
        let request = AuthorisationRequest::new("demo", ["uinfin", "name"]);
        let redirect = build_authorise_url(ENDPOINT, "C1", &request, "https://app/callback");

        assert_eq!(
            redirect.url,
            format!(
                "https://sandbox.example/com/v3/authorise?client_id=C1&attributes=uinfin,name\
                 &purpose=demo&state={}&redirect_uri=https://app/callback",
                redirect.state
            )
        );
        assert_eq!(redirect.state.len(), 32);
        assert!(redirect
            .state
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_each_parameter_once_in_order() {
        let request = AuthorisationRequest::new("loan application", ["name", "uinfin", "regadd"]);
        let redirect = build_authorise_url(ENDPOINT, "C1", &request, "https://app/callback");

        assert_eq!(
            query_keys(&redirect.url),
            ["client_id", "attributes", "purpose", "state", "redirect_uri"]
        );
        assert!(redirect.url.contains("&attributes=name,uinfin,regadd&"));
        assert!(redirect.url.contains("&purpose=loan application&"));
    }

    #[test]
    fn test_redirect_override() {
        let request =
            AuthorisationRequest::new("demo", ["uinfin"]).with_redirect_uri("https://other/cb");
        let redirect = build_authorise_url(ENDPOINT, "C1", &request, "https://app/callback");
        assert!(redirect.url.ends_with("&redirect_uri=https://other/cb"));
    }

    #[test]
    fn test_state_differs_per_call() {
        let request = AuthorisationRequest::new("demo", ["uinfin"]);
        let first = build_authorise_url(ENDPOINT, "C1", &request, "https://app/callback");
        let second = build_authorise_url(ENDPOINT, "C1", &request, "https://app/callback");
        assert_ne!(first.state, second.state);
    }
}

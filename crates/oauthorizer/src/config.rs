//! OAuth client registration settings
//!
//! Everything the protocol client needs to talk to one authorization server:
//! client credentials, the two endpoints, the redirect URL registered with the
//! provider, requested scopes, and provider-specific authorization parameters
//! (for example Google's `access_type=offline`, which is what makes the server
//! issue a refresh token).

use std::collections::BTreeMap;

use common::Secret;

use crate::error::{Error, Result};

/// Settings for a single OAuth2 client registration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Absent for public clients.
    pub client_secret: Option<Secret<String>>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    /// Extra query parameters appended to every authorization URL.
    pub auth_params: BTreeMap<String, String>,
}

/// Authorization request parameters the flow sets itself. A duplicate
/// `state` would let the provider echo a value other than the nonce.
const RESERVED_AUTH_PARAMS: [&str; 5] =
    ["response_type", "client_id", "redirect_uri", "scope", "state"];

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            redirect_url: redirect_url.into(),
            scopes: Vec::new(),
            auth_params: BTreeMap::new(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(Secret::new(secret.into()));
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_params.insert(key.into(), value.into());
        self
    }

    /// Reject registrations that could never complete a flow, or whose extra
    /// authorization parameters would duplicate the ones the flow sets.
    ///
    /// The redirect URL is not checked for a scheme: out-of-band values such
    /// as `urn:ietf:wg:oauth:2.0:oob` are legitimate for CLI clients.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client_id must not be empty".into()));
        }
        for (name, url) in [("auth_url", &self.auth_url), ("token_url", &self.token_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }
        if self.redirect_url.trim().is_empty() {
            return Err(Error::Config("redirect_url must not be empty".into()));
        }
        if let Some(key) = self
            .auth_params
            .keys()
            .find(|k| RESERVED_AUTH_PARAMS.iter().any(|r| k.eq_ignore_ascii_case(r)))
        {
            return Err(Error::Config(format!(
                "auth_params must not set `{key}`, it is set by the authorization flow"
            )));
        }
        Ok(())
    }
}

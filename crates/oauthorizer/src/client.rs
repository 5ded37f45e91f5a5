//! OAuth2 protocol client
//!
//! `OAuthClient` is the seam between the orchestrators and the protocol: it
//! builds authorization URLs, exchanges codes and refreshes tokens. The
//! orchestrators only ever talk to the trait, so tests substitute a recording
//! double and callers can plug in a provider-specific client.
//!
//! `HttpOAuthClient` is the standard implementation over reqwest. Both token
//! endpoint interactions POST a form to `token_url` with different grant
//! types, per RFC 6749 sections 4.1.3 and 6.

use std::future::Future;
use std::pin::Pin;

use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::token::{Token, TokenResponse, now_millis};

/// Boxed future returned by `OAuthClient` token operations.
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<Token>> + Send + 'a>>;

/// Protocol operations the authorization flows depend on.
pub trait OAuthClient: Send + Sync {
    /// Authorization endpoint URL carrying `state`.
    fn authorization_url(&self, state: &str) -> Result<String>;

    /// Exchange an authorization code for a token.
    fn exchange_code<'a>(&'a self, code: &'a str) -> TokenFuture<'a>;

    /// Obtain a new token using a refresh token.
    fn refresh_token<'a>(&'a self, refresh: &'a str) -> TokenFuture<'a>;

    /// HTTP client used for resource requests made with the token.
    fn http_client(&self) -> &reqwest::Client;
}

/// `OAuthClient` backed by a registration in `OAuthConfig`.
#[derive(Debug, Clone)]
pub struct HttpOAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl HttpOAuthClient {
    /// Validates `config` before accepting it.
    pub fn new(config: OAuthConfig, http: reqwest::Client) -> Result<Self> {
        config.validate()?;
        reqwest::Url::parse(&config.auth_url)
            .map_err(|e| Error::Config(format!("auth_url is not a valid URL: {e}")))?;
        Ok(Self { config, http })
    }

    async fn post_token_form(&self, form: &[(&str, &str)], what: &str) -> Result<Token> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{what} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            // 401/403 means the client registration or refresh token was rejected
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::InvalidCredentials(format!(
                    "{what} rejected ({status}): {body}"
                )));
            }

            return Err(Error::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid {what} response: {e}")))?;
        Ok(token_response.into_token(now_millis()))
    }

    /// Client credentials sent in the form body (client_secret_post).
    fn client_params(&self) -> Vec<(&str, &str)> {
        let mut params = vec![("client_id", self.config.client_id.as_str())];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.expose().as_str()));
        }
        params
    }
}

impl OAuthClient for HttpOAuthClient {
    fn authorization_url(&self, state: &str) -> Result<String> {
        let scope = self.config.scopes.join(" ");
        let mut params: Vec<(&str, &str)> = vec![
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }
        params.push(("state", state));
        params.extend(
            self.config
                .auth_params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        let url = reqwest::Url::parse_with_params(&self.config.auth_url, &params)
            .map_err(|e| Error::Config(format!("building authorization URL: {e}")))?;
        Ok(url.into())
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> TokenFuture<'a> {
        Box::pin(async move {
            let mut form = vec![
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ];
            form.extend(self.client_params());
            self.post_token_form(&form, "token exchange").await
        })
    }

    fn refresh_token<'a>(&'a self, refresh: &'a str) -> TokenFuture<'a> {
        Box::pin(async move {
            let mut form = vec![("grant_type", "refresh_token"), ("refresh_token", refresh)];
            form.extend(self.client_params());
            let mut token = self.post_token_form(&form, "token refresh").await?;
            // Servers may omit the refresh token when it is not rotated
            if token.refresh_token.is_none() {
                token.refresh_token = Some(refresh.to_string());
            }
            Ok(token)
        })
    }

    fn http_client(&self) -> &reqwest::Client {
        &self.http
    }
}

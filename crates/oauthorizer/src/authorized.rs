//! Authenticated HTTP client
//!
//! What both orchestrators hand back once a token is available. Every request
//! builder it produces carries the `Authorization` header. When the access
//! token is within a minute of expiring and a refresh token exists, the token
//! is refreshed first. Refreshed tokens live only in this client; the stored
//! token is left as it was.

use std::fmt;
use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use tokio::sync::Mutex;
use tracing::info;

use crate::client::OAuthClient;
use crate::error::{Error, Result};
use crate::token::{Token, now_millis};

/// Refresh this long before the recorded expiry.
const REFRESH_LEEWAY_MILLIS: u64 = 60_000;

/// HTTP client bound to an OAuth token.
pub struct AuthorizedClient {
    oauth: Arc<dyn OAuthClient>,
    token: Mutex<Token>,
}

impl AuthorizedClient {
    pub fn new(oauth: Arc<dyn OAuthClient>, token: Token) -> Self {
        Self {
            oauth,
            token: Mutex::new(token),
        }
    }

    /// Current token, as last obtained (no refresh).
    pub async fn token(&self) -> Token {
        self.token.lock().await.clone()
    }

    /// A token that is not about to expire.
    ///
    /// The lock is held across the refresh so concurrent callers trigger at
    /// most one refresh.
    pub async fn fresh_token(&self) -> Result<Token> {
        let mut token = self.token.lock().await;
        if token.expires_within(now_millis(), REFRESH_LEEWAY_MILLIS) {
            let refresh = token.refresh_token.clone().ok_or_else(|| {
                Error::InvalidCredentials(
                    "access token expired and no refresh token is available".into(),
                )
            })?;
            *token = self.oauth.refresh_token(&refresh).await?;
            info!(expires = ?token.expires, "access token refreshed");
        }
        Ok(token.clone())
    }

    /// Start a request with the `Authorization` header set.
    pub async fn request(
        &self,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl,
    ) -> Result<reqwest::RequestBuilder> {
        let token = self.fresh_token().await?;
        Ok(self
            .oauth
            .http_client()
            .request(method, url)
            .header(AUTHORIZATION, authorization_value(&token)))
    }

    pub async fn get(&self, url: impl reqwest::IntoUrl) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::GET, url).await
    }
}

impl fmt::Debug for AuthorizedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedClient").finish_non_exhaustive()
    }
}

/// `Authorization` header value. Servers sometimes return a lowercase
/// `bearer` type, which some resource servers reject.
fn authorization_value(token: &Token) -> String {
    let token_type = if token.token_type.eq_ignore_ascii_case("bearer") {
        "Bearer"
    } else {
        token.token_type.as_str()
    };
    format!("{token_type} {}", token.access_token)
}

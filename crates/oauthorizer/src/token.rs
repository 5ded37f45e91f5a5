//! OAuth tokens and their persistence
//!
//! `Token` is what the protocol client produces from a code exchange or a
//! refresh. The orchestrators never look inside it beyond handing it to
//! `AuthorizedClient`; here it is only encoded to JSON bytes and pushed
//! through a `Storer`.
//!
//! Restoring is deliberately forgiving: a missing record, an unreadable file
//! or bytes that no longer decode all mean "no token yet", and the caller
//! simply starts a new authorization.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::metrics;
use crate::storage::Storer;

/// A token granted by the authorization server.
///
/// `expires` is a unix timestamp in milliseconds (absolute, not a delta),
/// computed from the token endpoint's `expires_in` when the token is received.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// A bearer token with no refresh token and no expiry.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expires: None,
            scope: None,
        }
    }

    /// Whether the access token expires within `leeway_millis` of `now_millis`.
    /// Tokens without an expiry never expire.
    pub fn expires_within(&self, now_millis: u64, leeway_millis: u64) -> bool {
        self.expires
            .is_some_and(|expires| expires <= now_millis.saturating_add(leeway_millis))
    }

    /// Encode for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::CredentialParse(format!("serializing token: {e}")))
    }

    /// Decode a stored record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::CredentialParse(format!("parsing stored token: {e}")))
    }
}

// Hand-written so access and refresh tokens never reach logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires", &self.expires)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Response body from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert to a `Token`, anchoring `expires_in` at `now_millis`.
    pub fn into_token(self, now_millis: u64) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_token_type),
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires: self
                .expires_in
                .map(|secs| now_millis.saturating_add(secs.saturating_mul(1000))),
            scope: self.scope,
        }
    }
}

/// Current unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Encode `token` and write it through `store`.
///
/// Failures are returned to the caller untouched; there is no retry.
pub async fn save_token(store: &dyn Storer, token: &Token) -> Result<()> {
    let bytes = token.to_bytes()?;
    store.save(&bytes).await
}

/// Load a previously saved token.
///
/// Returns `None` when nothing usable is stored. Read and decode failures are
/// logged at debug level and otherwise absorbed.
pub async fn restore_token(store: &dyn Storer) -> Option<Token> {
    match read_token(store).await {
        Ok(token) => {
            metrics::record_token_restore("present");
            Some(token)
        }
        Err(absent) => {
            metrics::record_token_restore(absent);
            None
        }
    }
}

/// Whether a readable token is stored. Unlike `restore_token` this records
/// no restore metric, so it suits frequent polling such as health checks.
pub async fn has_token(store: &dyn Storer) -> bool {
    read_token(store).await.is_ok()
}

/// Read and decode the stored token; the error is the restore metric label.
async fn read_token(store: &dyn Storer) -> std::result::Result<Token, &'static str> {
    let bytes = store.restore().await.map_err(|e| {
        debug!(error = %e, "no stored token");
        "absent"
    })?;
    Token::from_bytes(&bytes).map_err(|e| {
        debug!(error = %e, "stored token unreadable, treating as absent");
        "malformed"
    })
}

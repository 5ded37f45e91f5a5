//! Web-server authorization flow
//!
//! For request/response servers, where the user's browser carries the flow
//! between two handlers:
//! 1. A resource handler calls `get_client()`. With a saved token it gets an
//!    `AuthorizedClient`; otherwise it gets `NeedsRedirect(url)` and sends
//!    the browser to the authorization server. The URL's `state` is a fresh
//!    nonce, saved to the nonce store (replacing any earlier one).
//! 2. The callback handler passes the request's `state`/`code` parameters to
//!    `exchange()`, which checks `state` against the saved nonce before
//!    anything else, then exchanges the code and saves the token.
//! 3. The next `get_client()` finds the token.
//!
//! Nonces are never deleted; the next authorization attempt overwrites the
//! last one. Concurrent attempts sharing one nonce store race, and the last
//! writer wins.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::authorized::AuthorizedClient;
use crate::client::OAuthClient;
use crate::error::{Error, Result};
use crate::metrics::{self, Flow};
use crate::nonce::generate_nonce;
use crate::storage::Storer;
use crate::token::{restore_token, save_token};

/// Parameters the authorization server appends to the redirect URL.
///
/// Deserializes from a query string or a form body; missing fields are empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code: String,
    /// Set instead of `code` when the user denied access or the request was
    /// invalid (RFC 6749 section 4.1.2.1).
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn new(state: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            code: code.into(),
            ..Self::default()
        }
    }
}

/// Result of asking for a client in the web flow.
#[derive(Debug)]
pub enum ClientOutcome {
    /// A token was saved; the client is ready.
    Authenticated(AuthorizedClient),
    /// No token yet; send the user's browser to this URL.
    NeedsRedirect(String),
}

/// Drives the web flow against a token store and a nonce store.
pub struct WebHelper {
    oauth: Arc<dyn OAuthClient>,
    token_store: Arc<dyn Storer>,
    nonce_store: Arc<dyn Storer>,
}

impl WebHelper {
    pub fn new(
        oauth: Arc<dyn OAuthClient>,
        token_store: Arc<dyn Storer>,
        nonce_store: Arc<dyn Storer>,
    ) -> Self {
        Self {
            oauth,
            token_store,
            nonce_store,
        }
    }

    /// Return a client for the saved token, or start a new authorization.
    ///
    /// The absence of a token is never an error. `Err` means the nonce could
    /// not be saved (`Error::Persistence`) or the authorization URL could not
    /// be built; no URL is handed out in either case.
    pub async fn get_client(&self) -> Result<ClientOutcome> {
        if let Some(token) = restore_token(self.token_store.as_ref()).await {
            return Ok(ClientOutcome::Authenticated(AuthorizedClient::new(
                self.oauth.clone(),
                token,
            )));
        }

        let url = self.begin_authorization().await?;
        Ok(ClientOutcome::NeedsRedirect(url))
    }

    async fn begin_authorization(&self) -> Result<String> {
        let nonce = generate_nonce();
        let url = self.oauth.authorization_url(&nonce)?;

        self.nonce_store.save(nonce.as_bytes()).await.map_err(|e| {
            warn!(error = %e, "failed to save nonce");
            Error::Persistence(format!("failed to save nonce: {e}"))
        })?;

        metrics::record_authorization_started(Flow::Web);
        info!("authorization started, redirecting");
        Ok(url)
    }

    /// Verify the callback's `state` and exchange its `code` for a token.
    ///
    /// Verification always runs first: on a missing nonce or a mismatched
    /// `state` this returns `Error::Verification` without contacting the
    /// token endpoint and without touching the token store.
    pub async fn exchange(&self, params: &CallbackParams) -> Result<()> {
        if let Err(e) = self.verify_state(&params.state).await {
            warn!(error = %e, "callback rejected");
            metrics::record_exchange(Flow::Web, "verification_failed");
            return Err(e);
        }

        if let Some(error) = &params.error {
            warn!(error = %error, "authorization server returned an error");
            metrics::record_exchange(Flow::Web, "exchange_failed");
            let mut message = format!("authorization denied: {error}");
            if let Some(description) = &params.error_description {
                message.push_str(&format!(" ({description})"));
            }
            return Err(Error::Exchange(message));
        }

        if params.code.is_empty() {
            metrics::record_exchange(Flow::Web, "exchange_failed");
            return Err(Error::Exchange("callback has no code parameter".into()));
        }

        let token = match self.oauth.exchange_code(&params.code).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "code exchange failed");
                metrics::record_exchange(Flow::Web, "exchange_failed");
                return Err(Error::Exchange(e.to_string()));
            }
        };

        if let Err(e) = save_token(self.token_store.as_ref(), &token).await {
            warn!(error = %e, "failed to save token");
            metrics::record_exchange(Flow::Web, "persist_failed");
            return Err(Error::Persistence(format!("token save failure: {e}")));
        }

        metrics::record_exchange(Flow::Web, "success");
        info!("authorization complete, token saved");
        Ok(())
    }

    async fn verify_state(&self, state: &str) -> Result<()> {
        let bytes = self
            .nonce_store
            .restore()
            .await
            .map_err(|e| Error::Verification(format!("unable to load nonce: {e}")))?;
        let nonce = String::from_utf8(bytes)
            .map_err(|e| Error::Verification(format!("unable to load nonce: {e}")))?;
        if nonce.is_empty() {
            return Err(Error::Verification(
                "unable to load nonce: stored nonce is empty".into(),
            ));
        }

        if state != nonce {
            return Err(Error::Verification("state mismatch".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorer;
    use crate::testing::{FailingStorer, RecordingClient};
    use crate::token::Token;

    struct Fixture {
        oauth: Arc<RecordingClient>,
        tokens: Arc<MemoryStorer>,
        nonces: Arc<MemoryStorer>,
        helper: WebHelper,
    }

    fn fixture(oauth: Arc<RecordingClient>) -> Fixture {
        let tokens = Arc::new(MemoryStorer::new());
        let nonces = Arc::new(MemoryStorer::new());
        let helper = WebHelper::new(oauth.clone(), tokens.clone(), nonces.clone());
        Fixture {
            oauth,
            tokens,
            nonces,
            helper,
        }
    }

    fn issued() -> Token {
        let mut token = Token::bearer("at_web");
        token.refresh_token = Some("rt_web".into());
        token
    }

    fn stored_nonce(f: &Fixture) -> String {
        String::from_utf8(f.nonces.snapshot().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn missing_token_yields_redirect_and_saves_nonce() {
        let f = fixture(RecordingClient::succeeding(issued()));

        let outcome = f.helper.get_client().await.unwrap();
        let url = match outcome {
            ClientOutcome::NeedsRedirect(url) => url,
            other => panic!("expected redirect, got {other:?}"),
        };

        let nonce = stored_nonce(&f);
        assert_eq!(nonce.len(), 43);
        assert_eq!(url, format!("https://auth.example.com/authorize?state={nonce}"));
        assert_eq!(f.oauth.issued_states(), vec![nonce]);
        assert!(f.oauth.exchange_calls().is_empty());
    }

    #[tokio::test]
    async fn each_redirect_overwrites_nonce_with_fresh_value() {
        let f = fixture(RecordingClient::succeeding(issued()));

        f.helper.get_client().await.unwrap();
        let first = stored_nonce(&f);
        f.helper.get_client().await.unwrap();
        let second = stored_nonce(&f);

        assert_ne!(first, second);
        assert_eq!(f.oauth.issued_states(), vec![first.clone(), second]);

        // The superseded nonce no longer verifies
        let err = f
            .helper
            .exchange(&CallbackParams::new(first, "code"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
    }

    #[tokio::test]
    async fn nonce_save_failure_returns_no_url() {
        let oauth = RecordingClient::succeeding(issued());
        let helper = WebHelper::new(
            oauth,
            Arc::new(MemoryStorer::new()),
            Arc::new(FailingStorer),
        );

        let err = helper.get_client().await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn matching_state_exchanges_and_persists_once() {
        let f = fixture(RecordingClient::succeeding(issued()));
        f.nonces.save(b"abc123").await.unwrap();

        f.helper
            .exchange(&CallbackParams::new("abc123", "validcode"))
            .await
            .unwrap();

        assert_eq!(f.oauth.exchange_calls(), vec!["validcode"]);
        assert_eq!(
            Token::from_bytes(&f.tokens.snapshot().unwrap()).unwrap(),
            issued()
        );

        match f.helper.get_client().await.unwrap() {
            ClientOutcome::Authenticated(client) => {
                assert_eq!(client.token().await, issued());
                let request = client
                    .get("https://api.example.com/calendar")
                    .await
                    .unwrap()
                    .build()
                    .unwrap();
                assert_eq!(
                    request.headers()[reqwest::header::AUTHORIZATION],
                    "Bearer at_web"
                );
            }
            other => panic!("expected authenticated client, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mismatched_state_never_exchanges() {
        let f = fixture(RecordingClient::succeeding(issued()));
        f.nonces.save(b"abc123").await.unwrap();

        let err = f
            .helper
            .exchange(&CallbackParams::new("wrong", "validcode"))
            .await
            .unwrap_err();

        match err {
            Error::Verification(msg) => assert_eq!(msg, "state mismatch"),
            other => panic!("expected Verification, got {other:?}"),
        }
        assert!(f.oauth.exchange_calls().is_empty());
        assert!(f.tokens.snapshot().is_none(), "token store must be untouched");
    }

    #[tokio::test]
    async fn empty_state_is_a_mismatch() {
        let f = fixture(RecordingClient::succeeding(issued()));
        f.nonces.save(b"abc123").await.unwrap();

        let err = f
            .helper
            .exchange(&CallbackParams::new("", "validcode"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
        assert!(f.oauth.exchange_calls().is_empty());
    }

    #[tokio::test]
    async fn missing_nonce_fails_verification() {
        let f = fixture(RecordingClient::succeeding(issued()));

        let err = f
            .helper
            .exchange(&CallbackParams::new("abc123", "validcode"))
            .await
            .unwrap_err();

        match err {
            Error::Verification(msg) => assert!(msg.starts_with("unable to load nonce"), "{msg}"),
            other => panic!("expected Verification, got {other:?}"),
        }
        assert!(f.oauth.exchange_calls().is_empty());
    }

    #[tokio::test]
    async fn empty_stored_nonce_never_matches_empty_state() {
        let f = fixture(RecordingClient::succeeding(issued()));
        f.nonces.save(b"").await.unwrap();

        let err = f
            .helper
            .exchange(&CallbackParams::new("", "validcode"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
        assert!(f.oauth.exchange_calls().is_empty());
    }

    #[tokio::test]
    async fn nonce_store_failure_fails_verification() {
        let oauth = RecordingClient::succeeding(issued());
        let helper = WebHelper::new(
            oauth.clone(),
            Arc::new(MemoryStorer::new()),
            Arc::new(FailingStorer),
        );

        let err = helper
            .exchange(&CallbackParams::new("abc123", "validcode"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)), "got: {err:?}");
        assert!(oauth.exchange_calls().is_empty());
    }

    #[tokio::test]
    async fn exchange_failure_is_exchange_error() {
        let f = fixture(RecordingClient::failing());
        f.nonces.save(b"abc123").await.unwrap();

        let err = f
            .helper
            .exchange(&CallbackParams::new("abc123", "expired"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Exchange(_)), "got: {err:?}");
        assert!(f.tokens.snapshot().is_none());
    }

    #[tokio::test]
    async fn denied_callback_skips_exchange() {
        let f = fixture(RecordingClient::succeeding(issued()));
        f.nonces.save(b"abc123").await.unwrap();

        let params = CallbackParams {
            state: "abc123".into(),
            error: Some("access_denied".into()),
            ..CallbackParams::default()
        };
        let err = f.helper.exchange(&params).await.unwrap_err();

        assert_eq!(err.to_string(), "code exchange failure: authorization denied: access_denied");
        assert!(f.oauth.exchange_calls().is_empty());
    }

    #[tokio::test]
    async fn missing_code_skips_exchange() {
        let f = fixture(RecordingClient::succeeding(issued()));
        f.nonces.save(b"abc123").await.unwrap();

        let err = f
            .helper
            .exchange(&CallbackParams::new("abc123", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Exchange(_)));
        assert!(f.oauth.exchange_calls().is_empty());
    }

    #[tokio::test]
    async fn token_save_failure_is_persistence_error() {
        let oauth = RecordingClient::succeeding(issued());
        let nonces = Arc::new(MemoryStorer::new());
        nonces.save(b"abc123").await.unwrap();
        let helper = WebHelper::new(oauth.clone(), Arc::new(FailingStorer), nonces);

        let err = helper
            .exchange(&CallbackParams::new("abc123", "validcode"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)), "got: {err:?}");
        assert_eq!(oauth.exchange_calls().len(), 1);
    }

    #[test]
    fn callback_params_deserialize_with_missing_fields() {
        let params: CallbackParams = serde_json::from_str(r#"{"code":"abc"}"#).unwrap();
        assert_eq!(params.code, "abc");
        assert_eq!(params.state, "");
        assert!(params.error.is_none());
    }

    #[tokio::test]
    async fn callback_params_deserialize_from_form_body() {
        use axum::extract::{Form, FromRequest};

        let request = axum::http::Request::builder()
            .method("POST")
            .header(
                axum::http::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(axum::body::Body::from(
                "state=abc123&code=4%2Fxyz&error_description=ignored+here",
            ))
            .unwrap();
        let Form(params) = Form::<CallbackParams>::from_request(request, &())
            .await
            .unwrap();

        assert_eq!(params.state, "abc123");
        assert_eq!(params.code, "4/xyz");
        assert!(params.error.is_none());
        assert_eq!(params.error_description.as_deref(), Some("ignored here"));
    }
}

//! Test doubles shared by the unit tests in this crate

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;

use crate::client::{OAuthClient, TokenFuture};
use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::storage::{StoreFuture, Storer};
use crate::token::Token;

pub(crate) fn test_config() -> OAuthConfig {
    OAuthConfig::new(
        "client-123",
        "https://accounts.example.com/o/oauth2/auth",
        "https://oauth2.example.com/token",
        "http://localhost:8080/oauth/callback",
    )
}

/// Storer whose every operation fails.
pub(crate) struct FailingStorer;

impl Storer for FailingStorer {
    fn save<'a>(&'a self, _bytes: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async { Err(Error::Storage("disk unavailable".into())) })
    }

    fn restore(&self) -> StoreFuture<'_, Vec<u8>> {
        Box::pin(async { Err(Error::Storage("disk unavailable".into())) })
    }
}

/// `OAuthClient` that records every call and answers from canned values.
pub(crate) struct RecordingClient {
    http: reqwest::Client,
    exchange_result: Option<Token>,
    refresh_result: Option<Token>,
    pub exchanged_codes: Mutex<Vec<String>>,
    pub refreshed_tokens: Mutex<Vec<String>>,
    pub states: Mutex<Vec<String>>,
}

impl RecordingClient {
    /// Exchanges and refreshes succeed with `token`.
    pub fn succeeding(token: Token) -> Arc<Self> {
        Arc::new(Self::with_results(Some(token.clone()), Some(token)))
    }

    /// Exchanges and refreshes fail.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self::with_results(None, None))
    }

    pub fn with_results(exchange: Option<Token>, refresh: Option<Token>) -> Self {
        Self {
            http: reqwest::Client::new(),
            exchange_result: exchange,
            refresh_result: refresh,
            exchanged_codes: Mutex::new(Vec::new()),
            refreshed_tokens: Mutex::new(Vec::new()),
            states: Mutex::new(Vec::new()),
        }
    }

    pub fn exchange_calls(&self) -> Vec<String> {
        self.exchanged_codes.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> Vec<String> {
        self.refreshed_tokens.lock().unwrap().clone()
    }

    pub fn issued_states(&self) -> Vec<String> {
        self.states.lock().unwrap().clone()
    }
}

impl OAuthClient for RecordingClient {
    fn authorization_url(&self, state: &str) -> Result<String> {
        self.states.lock().unwrap().push(state.to_string());
        Ok(format!("https://auth.example.com/authorize?state={state}"))
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> TokenFuture<'a> {
        self.exchanged_codes.lock().unwrap().push(code.to_string());
        let result = self
            .exchange_result
            .clone()
            .ok_or_else(|| Error::TokenExchange("token endpoint returned 400".into()));
        Box::pin(async move { result })
    }

    fn refresh_token<'a>(&'a self, refresh: &'a str) -> TokenFuture<'a> {
        self.refreshed_tokens
            .lock()
            .unwrap()
            .push(refresh.to_string());
        let result = self
            .refresh_result
            .clone()
            .ok_or_else(|| Error::InvalidCredentials("refresh token rejected".into()));
        Box::pin(async move { result })
    }

    fn http_client(&self) -> &reqwest::Client {
        &self.http
    }
}

/// Local token endpoint answering every POST with a fixed status and body.
pub(crate) struct MockTokenServer {
    pub url: String,
    forms: Arc<tokio::sync::Mutex<Vec<HashMap<String, String>>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockTokenServer {
    pub async fn start(status: u16, body: &'static str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let forms = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let recorded = forms.clone();

        let app = axum::Router::new().route(
            "/token",
            axum::routing::post(
                move |axum::Form(form): axum::Form<HashMap<String, String>>| {
                    let recorded = recorded.clone();
                    async move {
                        recorded.lock().await.push(form);
                        (
                            StatusCode::from_u16(status).unwrap(),
                            [(axum::http::header::CONTENT_TYPE, "application/json")],
                            body,
                        )
                    }
                },
            ),
        );
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/token"),
            forms,
            _handle: handle,
        }
    }

    pub async fn last_form(&self) -> HashMap<String, String> {
        self.forms
            .lock()
            .await
            .last()
            .cloned()
            .expect("token endpoint received no request")
    }
}

//! HTTP routes for the web flow
//!
//! - `GET /`: fetch the configured resource with the saved token, or send
//!   the browser to the authorization server
//! - `GET|POST <callback_path>`: verify `state`, exchange `code`, then back
//!   to `/`. Parameters come from the query string, or from a form body when
//!   the provider uses `response_mode=form_post`
//! - `GET /health`, `GET /metrics`

use std::sync::Arc;

use axum::Router;
use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use oauthorizer::{CallbackParams, ClientOutcome, Error, Storer, WebHelper, has_token};
use tracing::{info, warn};

use crate::metrics::record_request;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub helper: Arc<WebHelper>,
    pub token_store: Arc<dyn Storer>,
    pub resource_url: Option<String>,
    pub prometheus: PrometheusHandle,
}

/// Build the router with the callback mounted at `callback_path`.
pub fn build_router(state: AppState, callback_path: &str, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(resource_handler))
        .route(
            callback_path,
            get(callback_query_handler).post(callback_form_handler),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// JSON error body: {"error":{"type":"...","message":"..."}}
fn error_response(status: StatusCode, kind: &str, message: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Status code and error type for a flow failure.
fn classify(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::Verification(_) => (StatusCode::BAD_REQUEST, "verification_error"),
        Error::Exchange(_) => (StatusCode::BAD_GATEWAY, "exchange_error"),
        Error::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error"),
        Error::Authorization(_) | Error::Config(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "authorization_error")
        }
        _ => (StatusCode::BAD_GATEWAY, "upstream_error"),
    }
}

fn flow_error(route: &'static str, err: &Error) -> Response {
    let (status, kind) = classify(err);
    record_request(route, status.as_u16());
    error_response(status, kind, &err.to_string())
}

async fn resource_handler(State(state): State<AppState>) -> Response {
    let client = match state.helper.get_client().await {
        Ok(ClientOutcome::Authenticated(client)) => client,
        Ok(ClientOutcome::NeedsRedirect(url)) => {
            info!("no saved token, redirecting to authorization server");
            record_request("resource", StatusCode::TEMPORARY_REDIRECT.as_u16());
            return Redirect::temporary(&url).into_response();
        }
        Err(e) => {
            warn!(error = %e, "unable to start authorization");
            return flow_error("resource", &e);
        }
    };

    let Some(resource_url) = state.resource_url.as_deref() else {
        record_request("resource", StatusCode::OK.as_u16());
        return (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "status": "authenticated" }).to_string(),
        )
            .into_response();
    };

    let response = match client.get(resource_url).await {
        Ok(builder) => builder
            .send()
            .await
            .map_err(|e| Error::Http(format!("resource request failed: {e}"))),
        Err(e) => Err(e),
    };
    let response = match response {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "resource request failed");
            return flow_error("resource", &e);
        }
    };

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    match response.bytes().await {
        Ok(body) => {
            record_request("resource", status.as_u16());
            (
                status,
                [(axum::http::header::CONTENT_TYPE, content_type)],
                body,
            )
                .into_response()
        }
        Err(e) => flow_error(
            "resource",
            &Error::Http(format!("reading resource body: {e}")),
        ),
    }
}

async fn callback_query_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    complete_callback(&state, &params).await
}

async fn callback_form_handler(
    State(state): State<AppState>,
    Form(params): Form<CallbackParams>,
) -> Response {
    complete_callback(&state, &params).await
}

async fn complete_callback(state: &AppState, params: &CallbackParams) -> Response {
    match state.helper.exchange(params).await {
        Ok(()) => {
            record_request("callback", StatusCode::TEMPORARY_REDIRECT.as_u16());
            Redirect::temporary("/").into_response()
        }
        Err(e) => flow_error("callback", &e),
    }
}

/// Health check: reports whether a token is currently saved.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let authenticated = has_token(state.token_store.as_ref()).await;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": "healthy",
            "authenticated": authenticated,
        })
        .to_string(),
    )
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

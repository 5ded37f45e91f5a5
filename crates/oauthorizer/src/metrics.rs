//! Flow counters
//!
//! Emitted through the `metrics` facade; they are no-ops until the host
//! process installs a recorder.
//!
//! - `oauthorizer_authorizations_started_total` (counter): label `flow`
//! - `oauthorizer_exchanges_total` (counter): labels `flow`, `outcome`
//! - `oauthorizer_token_restores_total` (counter): label `result`

/// Which orchestrator emitted a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Cli,
    Web,
}

impl Flow {
    pub fn label(self) -> &'static str {
        match self {
            Flow::Cli => "cli",
            Flow::Web => "web",
        }
    }
}

/// An authorization URL was handed to the user.
pub fn record_authorization_started(flow: Flow) {
    metrics::counter!("oauthorizer_authorizations_started_total", "flow" => flow.label())
        .increment(1);
}

/// A code exchange attempt finished with `outcome`
/// (`success`, `verification_failed`, `exchange_failed`, `persist_failed`).
pub fn record_exchange(flow: Flow, outcome: &'static str) {
    metrics::counter!("oauthorizer_exchanges_total", "flow" => flow.label(), "outcome" => outcome)
        .increment(1);
}

/// A token restore finished with `result` (`present`, `absent`, `malformed`).
pub fn record_token_restore(result: &'static str) {
    metrics::counter!("oauthorizer_token_restores_total", "result" => result).increment(1);
}

//! Error types for authorization flow operations

/// Errors from storage, protocol and orchestration operations.
///
/// The orchestrators wrap lower-level failures into `Authorization`,
/// `Exchange`, `Verification` and `Persistence` so callers can tell which
/// step of the flow failed without inspecting message text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("invalid OAuth configuration: {0}")]
    Config(String),

    #[error("failed authorization: {0}")]
    Authorization(String),

    #[error("code exchange failure: {0}")]
    Exchange(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Result alias for oauthorizer operations.
pub type Result<T> = std::result::Result<T, Error>;

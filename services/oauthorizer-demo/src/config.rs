//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from the OAUTH_CLIENT_SECRET env var or
//! client_secret_file, never stored in the TOML directly to avoid leaking it.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use common::Secret;
use oauthorizer::OAuthConfig;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub oauth: OAuthSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Client registration with the authorization server
#[derive(Debug, Deserialize)]
pub struct OAuthSection {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to OAUTH_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Provider-specific authorization URL parameters, e.g. `access_type = "offline"`
    #[serde(default)]
    pub auth_params: BTreeMap<String, String>,
}

/// Where tokens and nonces are kept
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_nonce_file")]
    pub nonce_file: PathBuf,
}

/// Web flow server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    /// Protected resource fetched with the authorized client
    #[serde(default)]
    pub resource_url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
            nonce_file: default_nonce_file(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            callback_path: default_callback_path(),
            resource_url: None,
            timeout_secs: default_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_token_file() -> PathBuf {
    PathBuf::from("oauthorizer-token.json")
}

fn default_nonce_file() -> PathBuf {
    PathBuf::from("oauthorizer-nonce")
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_callback_path() -> String {
    "/oauth/callback".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    100
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. OAUTH_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(secret) = std::env::var("OAUTH_CLIENT_SECRET") {
            config.oauth.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.oauth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.oauth.client_secret = Some(Secret::new(secret));
            }
        }

        config
            .oauth_config()
            .validate()
            .map_err(|e| common::Error::Config(e.to_string()))?;

        if let Some(ref url) = config.server.resource_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "resource_url must start with http:// or https://, got: {url}"
                )));
            }
        }

        if !config.server.callback_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "callback_path must start with '/', got: {}",
                config.server.callback_path
            )));
        }

        if config.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oauthorizer.toml")
    }

    /// Client registration for the protocol client.
    pub fn oauth_config(&self) -> OAuthConfig {
        let oauth = &self.oauth;
        OAuthConfig {
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
            auth_url: oauth.auth_url.clone(),
            token_url: oauth.token_url.clone(),
            redirect_url: oauth.redirect_url.clone(),
            scopes: oauth.scopes.clone(),
            auth_params: oauth.auth_params.clone(),
        }
    }
}

//! OAuth2 authorization-code flow helper
//!
//! Obtains, persists and reuses OAuth2 tokens so a program gets an
//! authenticated HTTP client without re-prompting the user every run.
//!
//! Two orchestrators share the same token persistence:
//! - `CliHelper`: restore the token, else print the authorization URL and
//!   read the pasted code from stdin
//! - `WebHelper`: restore the token, else redirect to an authorization URL
//!   bound to a one-time nonce; verify the nonce on callback, then exchange
//!
//! Protocol work goes through the `OAuthClient` trait (`HttpOAuthClient` is
//! the reqwest implementation) and persistence through the `Storer` trait
//! (`FileStorer`, `MemoryStorer`).

pub mod authorized;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod nonce;
pub mod storage;
pub mod token;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

pub use authorized::AuthorizedClient;
pub use cli::CliHelper;
pub use client::{HttpOAuthClient, OAuthClient};
pub use config::OAuthConfig;
pub use error::{Error, Result};
pub use nonce::generate_nonce;
pub use storage::{FileStorer, MemoryStorer, Storer};
pub use token::{Token, has_token, restore_token, save_token};
pub use web::{CallbackParams, ClientOutcome, WebHelper};

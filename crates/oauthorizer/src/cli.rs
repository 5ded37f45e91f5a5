//! Command-line authorization flow
//!
//! For text-interface programs that run once per invocation:
//! 1. Restore the saved token; if there is one, we are done
//! 2. Print the authorization URL and wait for the user to paste the code
//! 3. Exchange the code and persist the token
//!
//! The state parameter carries a fresh nonce, but it is never verified here:
//! the user pastes only the code, so there is no callback to compare against.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::authorized::AuthorizedClient;
use crate::client::OAuthClient;
use crate::error::{Error, Result};
use crate::metrics::{self, Flow};
use crate::nonce::generate_nonce;
use crate::storage::Storer;
use crate::token::{Token, restore_token, save_token};

/// Drives the CLI flow against one token store.
pub struct CliHelper {
    oauth: Arc<dyn OAuthClient>,
    token_store: Arc<dyn Storer>,
}

impl CliHelper {
    pub fn new(oauth: Arc<dyn OAuthClient>, token_store: Arc<dyn Storer>) -> Self {
        Self { oauth, token_store }
    }

    /// Run the flow on the process's stdin/stdout.
    pub async fn get_client_stdio(&self) -> Result<AuthorizedClient> {
        let mut input = tokio::io::BufReader::new(tokio::io::stdin());
        let mut output = tokio::io::stdout();
        self.get_client(&mut input, &mut output).await
    }

    /// Return a client for the saved token, or prompt on `output` and read
    /// the authorization code from `input`.
    ///
    /// Blocks until the user enters a code. Failing to read the code or to
    /// exchange it surfaces as `Error::Authorization` and nothing is
    /// persisted. A failed save surfaces as `Error::Persistence` and the new
    /// token is dropped.
    pub async fn get_client<R, W>(&self, input: &mut R, output: &mut W) -> Result<AuthorizedClient>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if let Some(token) = restore_token(self.token_store.as_ref()).await {
            return Ok(AuthorizedClient::new(self.oauth.clone(), token));
        }

        let token = match self.authorize(input, output).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "authorization failed");
                metrics::record_exchange(Flow::Cli, "authorization_failed");
                return Err(e);
            }
        };

        if let Err(e) = save_token(self.token_store.as_ref(), &token).await {
            warn!(error = %e, "failed to save token");
            metrics::record_exchange(Flow::Cli, "persist_failed");
            return Err(Error::Persistence(format!("failed to save token: {e}")));
        }

        metrics::record_exchange(Flow::Cli, "success");
        info!("authorization complete, token saved");
        Ok(AuthorizedClient::new(self.oauth.clone(), token))
    }

    async fn authorize<R, W>(&self, input: &mut R, output: &mut W) -> Result<Token>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let auth_url = self
            .oauth
            .authorization_url(&generate_nonce())
            .map_err(|e| Error::Authorization(format!("building authorization URL: {e}")))?;
        metrics::record_authorization_started(Flow::Cli);

        let prompt = format!(
            "Go to the following link in your browser then type the authorization code: \n{auth_url}\n"
        );
        write_prompt(output, &prompt)
            .await
            .map_err(|e| Error::Authorization(format!("writing prompt: {e}")))?;

        let code = read_code(input).await?;
        info!("authorization code received, exchanging");

        self.oauth.exchange_code(&code).await.map_err(|e| {
            Error::Authorization(format!(
                "unable to retrieve token from authorization code: {e}"
            ))
        })
    }
}

async fn write_prompt<W: AsyncWrite + Unpin>(output: &mut W, prompt: &str) -> std::io::Result<()> {
    output.write_all(prompt.as_bytes()).await?;
    output.flush().await
}

/// Read the first whitespace-delimited word, skipping blank lines.
async fn read_code<R: AsyncBufRead + Unpin>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = input
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Authorization(format!("unable to read authorization code: {e}")))?;
        if read == 0 {
            return Err(Error::Authorization(
                "unable to read authorization code: unexpected end of input".into(),
            ));
        }
        if let Some(word) = line.split_whitespace().next() {
            return Ok(word.to_string());
        }
    }
}

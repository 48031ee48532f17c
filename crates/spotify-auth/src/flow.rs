//! Interactive Authorization Code + PKCE flow
//!
//! Linear with one branch, no retries:
//!
//! ```text
//! Init ──► AwaitCallback ──► Validate ──► Exchange ──► Authenticated
//!               │                │            │
//!               ▼                ▼            ▼
//!            Timeout      StateMismatch  ExchangeFailed
//!                         Denied / MissingCode
//! ```
//!
//! `AuthFlow::start` performs Init and binds the listener; the returned
//! `PendingAuth` owns everything the rest of the attempt needs. A failed
//! attempt is discarded: the next one starts from Init with a fresh
//! verifier and state.

use std::net::SocketAddr;

use common::Secret;
use tracing::{info, warn};

use crate::callback::{CallbackListener, CallbackParams};
use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::pkce;
use crate::token::{self, Token};

/// Entry point for interactive authentication.
#[derive(Debug, Clone)]
pub struct AuthFlow {
    config: OAuthConfig,
}

impl AuthFlow {
    pub fn new(config: OAuthConfig) -> Self {
        Self { config }
    }

    /// Init: generate verifier, challenge and state, build the authorization
    /// URL and bind the callback listener.
    pub async fn start(&self) -> Result<PendingAuth> {
        let verifier = pkce::generate_verifier(self.config.verifier_length)?;
        let challenge = pkce::compute_challenge(&verifier);
        let state = pkce::generate_state();
        let authorization_url = pkce::build_authorization_url(&self.config, &state, &challenge)?;
        let listener = CallbackListener::bind(self.config.listen_addr).await?;

        Ok(PendingAuth {
            config: self.config.clone(),
            verifier: Secret::new(verifier),
            state,
            authorization_url,
            listener,
        })
    }

    /// Run the whole flow: start, show the URL, await the callback, exchange.
    pub async fn run(&self, client: &reqwest::Client) -> Result<Token> {
        let pending = self.start().await?;
        info!(
            url = %pending.authorization_url(),
            "Please open the following URL in your browser to authenticate"
        );
        pending.complete(client).await
    }
}

/// An authorization attempt waiting for the user to finish in the browser.
pub struct PendingAuth {
    config: OAuthConfig,
    verifier: Secret<String>,
    state: String,
    authorization_url: String,
    listener: CallbackListener,
}

impl PendingAuth {
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    /// Address the callback listener is actually bound to.
    pub fn callback_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// AwaitCallback, Validate and Exchange.
    ///
    /// The token endpoint is only contacted after the callback validated.
    pub async fn complete(self, client: &reqwest::Client) -> Result<Token> {
        let params = self.listener.wait(self.config.callback_timeout).await?;
        let code = validate_callback(&self.state, params)?;

        let token = token::exchange_code(client, &self.config, &code, self.verifier.expose())
            .await
            .map_err(|e| match e {
                Error::Http(msg) => Error::ExchangeFailed(msg),
                other => other,
            })?;
        info!("authentication complete");
        Ok(token)
    }
}

/// Check the redirect against the attempt's state and extract the code.
pub fn validate_callback(expected_state: &str, params: CallbackParams) -> Result<String> {
    if let Some(error) = params.error {
        return Err(Error::Denied(error));
    }

    let received = params.state.unwrap_or_default();
    if received != expected_state {
        warn!("authorization callback state mismatch, possible interception");
        return Err(Error::StateMismatch {
            expected: expected_state.to_string(),
            received,
        });
    }

    match params.code {
        Some(code) if !code.is_empty() => Ok(code),
        _ => Err(Error::MissingCode),
    }
}

//! Per-run OAuth settings

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::constants::{
    AUTHORIZE_ENDPOINT, CALLBACK_PORT, CALLBACK_TIMEOUT, REDIRECT_URI, SCOPES, TOKEN_ENDPOINT,
    VERIFIER_LENGTH,
};

/// Everything the authorization flow and the token endpoint calls need.
///
/// `client_id` is used both in the authorization URL and at code exchange;
/// the two must always be the same value.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    /// Address the callback listener binds. Port 0 picks a free port (tests).
    pub listen_addr: SocketAddr,
    pub scopes: Vec<String>,
    pub callback_timeout: Duration,
    pub verifier_length: usize,
}

impl OAuthConfig {
    /// Spotify defaults for the given client id.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, CALLBACK_PORT)),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            callback_timeout: CALLBACK_TIMEOUT,
            verifier_length: VERIFIER_LENGTH,
        }
    }

    /// Scopes in the space-separated form the authorization endpoint expects.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

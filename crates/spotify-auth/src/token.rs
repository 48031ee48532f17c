//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (completes the PKCE flow)
//! 2. Token refresh (silent renewal of a cached token)
//!
//! Both operations POST a form to `OAuthConfig::token_endpoint` with
//! different grant types. PKCE public clients authenticate with `client_id`
//! only; there is no client secret.

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OAuthConfig;
use crate::constants::EXPIRY_LEEWAY_MILLIS;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds. A refresh response may omit
/// `refresh_token`, in which case the previous one stays valid.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// A refreshable OAuth token, as held in memory and in the token cache.
///
/// `expiry` is a unix timestamp in milliseconds (absolute), computed from
/// `TokenResponse::expires_in` at the time the response was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: Secret<String>,
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    pub expiry: u64,
    pub token_type: String,
}

impl Token {
    /// Build a token from an endpoint response received at `now_millis`.
    ///
    /// `previous_refresh` is kept when the response carries no new refresh token.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<Secret<String>>,
        now_millis: u64,
    ) -> Self {
        Self {
            access_token: Secret::new(response.access_token),
            refresh_token: response.refresh_token.map(Secret::new).or(previous_refresh),
            expiry: now_millis.saturating_add(response.expires_in.saturating_mul(1000)),
            token_type: response.token_type,
        }
    }

    /// Whether the token is expired, or about to be, at `now_millis`.
    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        self.expiry <= now_millis.saturating_add(EXPIRY_LEEWAY_MILLIS)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// The refresh token, if there is a non-empty one.
    pub fn refresh_secret(&self) -> Option<&Secret<String>> {
        self.refresh_token.as_ref().filter(|r| !r.is_empty())
    }
}

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Exchange an authorization code for a token (last step of the PKCE flow).
///
/// Sends the raw verifier to prove this client started the flow. The
/// `redirect_uri` must equal the one used in the authorization URL.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
) -> Result<Token> {
    let response = client
        .post(&config.token_endpoint)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("code_verifier", verifier),
            ("client_id", config.client_id.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::ExchangeFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token_response = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::ExchangeFailed(format!("invalid token response: {e}")))?;

    debug!(expires_in = token_response.expires_in, "authorization code exchanged");
    Ok(Token::from_response(token_response, None, now_millis()))
}

/// Refresh an access token using a refresh token.
///
/// 400/401/403 mean the refresh token was revoked or is invalid
/// (`invalid_grant`); those map to `InvalidCredentials`.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&config.token_endpoint)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", config.client_id.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::ExchangeFailed(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::ExchangeFailed(format!("invalid refresh response: {e}")))
}

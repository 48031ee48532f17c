//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier, its S256 challenge and the CSRF state token
//! for one authorization attempt. The verifier only lives in memory for the
//! duration of the attempt and is sent at code exchange; the challenge goes
//! into the authorization URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::config::OAuthConfig;
use crate::error::{Error, Result};

/// Unreserved characters allowed in a code verifier (RFC 7636 section 4.1).
pub const VERIFIER_ALPHABET: &[u8; 66] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_.-~";

/// Generate a cryptographically random PKCE code verifier of `length` characters.
///
/// Every character is drawn uniformly from [`VERIFIER_ALPHABET`] with
/// unbiased range sampling. The thread-local CSPRNG is seeded from the OS;
/// if no entropy is available it panics, and release builds abort. There is
/// no weaker fallback.
pub fn generate_verifier(length: usize) -> Result<String> {
    if length == 0 {
        return Err(Error::InvalidVerifierLength);
    }

    let mut rng = rand::rng();
    let verifier = (0..length)
        .map(|_| VERIFIER_ALPHABET[rng.random_range(0..VERIFIER_ALPHABET.len())] as char)
        .collect();
    Ok(verifier)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`, without padding.
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate the opaque `state` value for one authorization attempt.
pub fn generate_state() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Build the full authorization URL with all required OAuth parameters.
pub fn build_authorization_url(config: &OAuthConfig, state: &str, challenge: &str) -> Result<String> {
    let url = reqwest::Url::parse_with_params(
        &config.authorize_endpoint,
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", config.scope_param().as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.authorize_endpoint)))?;
    Ok(url.into())
}

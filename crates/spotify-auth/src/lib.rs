//! Spotify OAuth authentication library
//!
//! Authorization Code with PKCE for a command line client: a loopback
//! listener captures the redirect, the code is exchanged for a token, and
//! the token is cached on disk and refreshed silently on later runs.
//!
//! Credential flow:
//! 1. `ClientProvider::get()` is called by the first command that needs the API
//! 2. Its `Connector` tries `TokenCache::load()` + `refresh_if_possible()`
//! 3. On a miss, `AuthFlow::run()` drives the browser flow
//!    (`pkce` → `callback::CallbackListener` → `token::exchange_code()`)
//! 4. The resulting token is written back with `TokenCache::store()`
//! 5. The client is published once and shared for the rest of the run

pub mod callback;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod pkce;
pub mod provider;
pub mod token;

pub use callback::{CallbackListener, CallbackParams};
pub use config::OAuthConfig;
pub use constants::*;
pub use credentials::{TokenCache, refresh_if_possible};
pub use error::{Error, Result};
pub use flow::{AuthFlow, PendingAuth, validate_callback};
pub use pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
pub use provider::{ClientProvider, Connector};
pub use token::{Token, TokenResponse, exchange_code, refresh_token};

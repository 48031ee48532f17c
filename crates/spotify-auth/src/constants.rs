//! Spotify OAuth constants
//!
//! Endpoints and defaults for the Authorization Code with PKCE flow. The
//! client id is not here: it is a per-installation value supplied through
//! configuration (`SPOTIFY_CLIENT_ID`).

use std::time::Duration;

/// Authorization endpoint the user opens in a browser
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Redirect URI registered for the app; must point at the callback listener
pub const REDIRECT_URI: &str = "http://localhost:8080/callback";

/// Loopback port the callback listener binds by default
pub const CALLBACK_PORT: u16 = 8080;

/// Path served by the callback listener
pub const CALLBACK_PATH: &str = "/callback";

/// Permission scopes needed to list and edit playlists and the liked-tracks library.
pub const SCOPES: &[&str] = &[
    "playlist-read-private",
    "playlist-modify-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "user-library-read",
    "user-library-modify",
];

/// PKCE verifier length in characters (RFC 7636 allows 43-128)
pub const VERIFIER_LENGTH: usize = 100;

/// How long to wait for the browser redirect before giving up
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Token cache location relative to the user's home directory
pub const TOKEN_CACHE_FILE: &str = ".playlistinator/token.json";

/// A token with less than this much validity left is treated as expired.
pub const EXPIRY_LEEWAY_MILLIS: u64 = 60_000;

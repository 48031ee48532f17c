//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Every field has a default, so running without a config file works as
//! long as a client id comes from `SPOTIFY_CLIENT_ID`.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use spotify_api::{API_BASE_URL, MAX_IDS_PER_REQUEST};
use spotify_auth::{OAuthConfig, REDIRECT_URI, TokenCache};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "playlistinator.toml";

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "PLAYLISTINATOR_CONFIG";

/// Env var that overrides `spotify.client_id`.
pub const CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub purge: PurgeConfig,
}

/// Application registration and API location
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

/// Interactive login settings
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Must match the redirect URI registered for the application.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
    /// Token cache location; `<home>/.playlistinator/token.json` when unset.
    #[serde(default)]
    pub token_cache: Option<PathBuf>,
}

/// Bulk removal settings
#[derive(Debug, Deserialize)]
pub struct PurgeConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_api_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], spotify_auth::CALLBACK_PORT))
}

fn default_redirect_uri() -> String {
    REDIRECT_URI.to_string()
}

fn default_callback_timeout() -> u64 {
    spotify_auth::CALLBACK_TIMEOUT.as_secs()
}

fn default_concurrency() -> usize {
    purge::DEFAULT_CONCURRENCY
}

fn default_batch_size() -> usize {
    purge::DEFAULT_BATCH_SIZE
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            api_base_url: default_api_base_url(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            redirect_uri: default_redirect_uri(),
            callback_timeout_secs: default_callback_timeout(),
            token_cache: None,
        }
    }
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
        }
    }
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from an explicitly named file, or from `DEFAULT_CONFIG_FILE` if
    /// it exists, or fall back to defaults.
    ///
    /// Only an explicit path that does not exist is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> common::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.exists() {
            Self::load(default)
        } else {
            Self::parse("")
        }
    }

    fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(id) = std::env::var(CLIENT_ID_ENV) {
            let id = id.trim().to_owned();
            if !id.is_empty() {
                config.spotify.client_id = Some(id);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("spotify.api_base_url", &self.spotify.api_base_url)?;
        require_http_url("auth.redirect_uri", &self.auth.redirect_uri)?;

        if self.auth.callback_timeout_secs == 0 {
            return Err(common::Error::Config(
                "callback_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.purge.concurrency == 0 {
            return Err(common::Error::Config(
                "concurrency must be greater than 0".into(),
            ));
        }

        if self.purge.batch_size == 0 || self.purge.batch_size > MAX_IDS_PER_REQUEST {
            return Err(common::Error::Config(format!(
                "batch_size must be between 1 and {MAX_IDS_PER_REQUEST}, got: {}",
                self.purge.batch_size
            )));
        }

        Ok(())
    }

    /// Explicit config path from the CLI arg or `PLAYLISTINATOR_CONFIG`.
    pub fn resolve_path(cli_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(p.to_path_buf());
        }
        std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)
    }

    /// The configured client id. Needed only by commands that talk to the API.
    pub fn client_id(&self) -> common::Result<&str> {
        self.spotify
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(common::Error::ConfigMissing(
                "spotify.client_id (or SPOTIFY_CLIENT_ID)",
            ))
    }

    /// OAuth settings for the interactive flow and token refresh.
    pub fn oauth(&self) -> common::Result<OAuthConfig> {
        let mut oauth = OAuthConfig::new(self.client_id()?);
        oauth.redirect_uri = self.auth.redirect_uri.clone();
        oauth.listen_addr = self.auth.listen_addr;
        oauth.callback_timeout = Duration::from_secs(self.auth.callback_timeout_secs);
        Ok(oauth)
    }

    pub fn token_cache(&self) -> TokenCache {
        match &self.auth.token_cache {
            Some(path) => TokenCache::new(path.clone()),
            None => TokenCache::default_location(),
        }
    }
}

//! Best-effort token cache
//!
//! Keeps a single refreshable token in a JSON file under the user's home
//! directory. Losing the cache only costs a re-authentication, so nothing
//! here is fatal: a failed load is a cache miss and a failed store is
//! logged and dropped. Writes go through a temp file + rename so a crash
//! never leaves a half-written token behind.
//!
//! The file is not locked against other processes; one CLI invocation at a
//! time is assumed.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::OAuthConfig;
use crate::constants::TOKEN_CACHE_FILE;
use crate::error::{Error, Result};
use crate::token::{self, Token, now_millis};

/// On-disk cache for the one token this tool uses.
///
/// `path` is `None` when no home directory could be resolved; every load is
/// then a miss and every store a no-op.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: Option<PathBuf>,
}

impl TokenCache {
    /// Cache at an explicit path.
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Cache at `<home>/.playlistinator/token.json`.
    pub fn default_location() -> Self {
        let path = dirs::home_dir().map(|home| home.join(TOKEN_CACHE_FILE));
        if path.is_none() {
            warn!("home directory not found, token cache disabled");
        }
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the cached token. Any failure is a cache miss.
    pub async fn load(&self) -> Option<Token> {
        let path = self.path.as_ref()?;
        match read_token(path).await {
            Ok(token) => {
                debug!(path = %path.display(), "loaded cached token");
                Some(token)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no usable cached token");
                None
            }
        }
    }

    /// Persist the token, logging and swallowing any failure.
    pub async fn store(&self, token: &Token) {
        if let Err(e) = self.try_store(token).await {
            warn!(error = %e, "failed to cache token, next run will re-authenticate");
        }
    }

    /// Persist the token, reporting failures to the caller.
    pub async fn try_store(&self, token: &Token) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::Io("no token cache path (home directory unknown)".into()))?;
        write_atomic(path, token).await
    }
}

async fn read_token(path: &Path) -> Result<Token> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("reading token cache: {e}")))?;
    serde_json::from_str(&contents)
        .map_err(|e| Error::CredentialParse(format!("parsing token cache: {e}")))
}

/// Write the token to a file atomically.
///
/// Creates missing parent directories (0755), writes a temp file next to the
/// target with 0600 permissions, then renames it over the target.
async fn write_atomic(path: &Path, token: &Token) -> Result<()> {
    let json = serde_json::to_string_pretty(token)
        .map_err(|e| Error::CredentialParse(format!("serializing token: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token cache path has no parent directory".into()))?;

    if !dir.exists() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io(format!("creating token cache directory: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            tokio::fs::set_permissions(dir, perms)
                .await
                .map_err(|e| Error::Io(format!("setting token cache directory permissions: {e}")))?;
        }
    }

    let tmp_path = dir.join(format!(".token.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted token");
    Ok(())
}

/// Return a usable token derived from `token`, or `None` if the caller has
/// to authenticate interactively.
///
/// A token with more than a minute of validity left is returned unchanged
/// without any network I/O. An expired token is refreshed when it carries a
/// refresh token; a rejected or failed refresh yields `None`.
pub async fn refresh_if_possible(
    client: &reqwest::Client,
    config: &OAuthConfig,
    token: Token,
) -> Option<Token> {
    if !token.is_expired() {
        debug!("cached token still valid");
        return Some(token);
    }

    let Some(refresh) = token.refresh_secret().cloned() else {
        debug!("cached token expired and has no refresh token");
        return None;
    };

    match token::refresh_token(client, config, refresh.expose()).await {
        Ok(response) => {
            info!("refreshed cached token");
            Some(Token::from_response(response, Some(refresh), now_millis()))
        }
        Err(e) => {
            warn!(error = %e, "token refresh failed, falling back to interactive login");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_token(suffix: &str, expiry: u64) -> Token {
        Token {
            access_token: Secret::new(format!("at_{suffix}")),
            refresh_token: Some(Secret::new(format!("rt_{suffix}"))),
            expiry,
            token_type: "Bearer".into(),
        }
    }

    fn test_config(server: &MockServer) -> OAuthConfig {
        let mut config = OAuthConfig::new("client-123");
        config.token_endpoint = format!("{}/api/token", server.uri());
        config
    }

    #[tokio::test]
    async fn roundtrip_store_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));

        let token = test_token("1", 1_735_500_000_000);
        cache.try_store(&token).await.unwrap();

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded, token);
        assert_eq!(loaded.access_token.expose(), "at_1");
        assert_eq!(loaded.refresh_token.unwrap().expose(), "rt_1");
    }

    #[tokio::test]
    async fn missing_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn malformed_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let cache = TokenCache::new(path);
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".playlistinator").join("token.json");
        let cache = TokenCache::new(path.clone());

        cache.store(&test_token("1", 0)).await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn store_overwrites_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));

        cache.store(&test_token("old", 1)).await;
        cache.store(&test_token("new", 2)).await;

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.access_token.expose(), "at_new");
        assert_eq!(loaded.expiry, 2);
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, "x").await.unwrap();
        let cache = TokenCache::new(blocker.join("token.json"));

        cache.store(&test_token("1", 0)).await;
        assert!(cache.try_store(&test_token("1", 0)).await.is_err());
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn cache_without_path_is_inert() {
        let cache = TokenCache { path: None };
        assert!(cache.load().await.is_none());
        cache.store(&test_token("1", 0)).await;
        assert!(cache.try_store(&test_token("1", 0)).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        TokenCache::new(path.clone())
            .try_store(&test_token("1", 0))
            .await
            .unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn valid_token_is_used_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let token = test_token("1", now_millis() + 3_600_000);
        let result = refresh_if_possible(&reqwest::Client::new(), &test_config(&server), token.clone())
            .await;
        assert_eq!(result, Some(token));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt_1"))
            .and(body_string_contains("client_id=client-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at_fresh",
                "token_type": "Bearer",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = test_token("1", 1_000);
        let refreshed = refresh_if_possible(&reqwest::Client::new(), &test_config(&server), token)
            .await
            .unwrap();

        assert_eq!(refreshed.access_token.expose(), "at_fresh");
        assert!(!refreshed.is_expired());
        assert_eq!(
            refreshed.refresh_token.unwrap().expose(),
            "rt_1",
            "refresh token must survive a response that omits it"
        );
    }

    #[tokio::test]
    async fn rejected_refresh_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .mount(&server)
            .await;

        let token = test_token("1", 1_000);
        let result = refresh_if_possible(&reqwest::Client::new(), &test_config(&server), token).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn expired_token_without_refresh_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut token = test_token("1", 1_000);
        token.refresh_token = None;
        let result = refresh_if_possible(&reqwest::Client::new(), &test_config(&server), token).await;
        assert!(result.is_none());
    }
}

//! Connector that produces an authenticated Spotify client
//!
//! Token sources, in order: the cache (refreshed if it is about to expire),
//! then the interactive browser flow. Whatever token wins is written back
//! to the cache.

use std::future::Future;
use std::pin::Pin;

use spotify_api::SpotifyClient;
use spotify_auth::{AuthFlow, Connector, OAuthConfig, Token, TokenCache, refresh_if_possible};
use tracing::{debug, info};

pub struct SpotifyConnector {
    http: reqwest::Client,
    oauth: OAuthConfig,
    cache: TokenCache,
    api_base_url: String,
}

impl SpotifyConnector {
    pub fn new(
        http: reqwest::Client,
        oauth: OAuthConfig,
        cache: TokenCache,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            oauth,
            cache,
            api_base_url: api_base_url.into(),
        }
    }

    async fn token(&self) -> spotify_auth::Result<Token> {
        if let Some(cached) = self.cache.load().await {
            let cached_expiry = cached.expiry;
            if let Some(token) = refresh_if_possible(&self.http, &self.oauth, cached).await {
                if token.expiry != cached_expiry {
                    self.cache.store(&token).await;
                }
                debug!("using cached credentials");
                return Ok(token);
            }
        }

        info!("no usable cached token, starting browser login");
        let token = AuthFlow::new(self.oauth.clone()).run(&self.http).await?;
        self.cache.store(&token).await;
        Ok(token)
    }
}

impl Connector for SpotifyConnector {
    type Client = SpotifyClient;

    fn connect(
        &self,
    ) -> Pin<Box<dyn Future<Output = spotify_auth::Result<SpotifyClient>> + Send + '_>> {
        Box::pin(async move {
            let token = self.token().await?;
            Ok(SpotifyClient::new(
                self.http.clone(),
                self.api_base_url.clone(),
                token.access_token,
            ))
        })
    }
}

//! Bearer-token Web API client with automatic retry
//!
//! Retry strategy: 429 waits for `Retry-After` (capped), 5xx and
//! connect/timeout errors wait a fixed backoff; at most
//! `RetryPolicy::max_retries` extra attempts. Everything else is returned
//! to the caller as-is.

use std::time::Duration;

use common::Secret;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::{ApiFuture, Error, Library, Page, Playlist, Result, SavedTrack};

/// Default Web API base URL
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Bulk endpoints accept at most this many ids per call.
pub const MAX_IDS_PER_REQUEST: usize = 50;

/// Page size requested from listing endpoints
const PAGE_LIMIT: &str = "50";

/// HTTP-level retry settings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Wait between attempts for 5xx and transport errors
    pub backoff: Duration,
    /// Upper bound for a server-provided `Retry-After`
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(500),
            max_retry_after: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Authenticated Web API client.
///
/// Cheap to share behind an `Arc`; `reqwest::Client` pools connections.
#[derive(Debug)]
pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Secret<String>,
    retry: RetryPolicy,
}

impl SpotifyClient {
    /// Client with the default retry policy.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, access_token: Secret<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let raw = format!("{}{path}", self.base_url);
        let parsed = if params.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, params)
        };
        parsed.map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))
    }

    /// Send a request, retrying throttled and transient failures.
    async fn send(&self, method: Method, url: Url) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let result = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(self.access_token.expose())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if retryable && attempt < self.retry.max_retries {
                        let delay = if status == StatusCode::TOO_MANY_REQUESTS {
                            retry_after(&response)
                                .unwrap_or(self.retry.backoff)
                                .min(self.retry.max_retry_after)
                        } else {
                            self.retry.backoff
                        };
                        attempt += 1;
                        warn!(
                            %status,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            path = url.path(),
                            "retrying API request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| String::from("<no body>"));
                    return Err(Error::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, path = url.path(), "transport error, retrying API request");
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(e) => return Err(Error::Http(e.to_string())),
            }
        }
    }

    /// Collect every item by following `next` links from `first`.
    async fn paginate<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let page: Page<T> = self
                .send(Method::GET, url)
                .await?
                .json()
                .await
                .map_err(|e| Error::Decode(e.to_string()))?;
            items.extend(page.items);

            if let Some(link) = page.next {
                next = Some(Url::parse(&link).map_err(|e| Error::InvalidUrl(format!("{link}: {e}")))?);
            }
        }

        debug!(items = items.len(), "pagination complete");
        Ok(items)
    }

    #[instrument(skip(self))]
    pub async fn saved_tracks(&self) -> Result<Vec<SavedTrack>> {
        let url = self.endpoint("/me/tracks", &[("limit", PAGE_LIMIT)])?;
        self.paginate(url).await
    }

    #[instrument(skip(self))]
    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        let url = self.endpoint("/me/playlists", &[("limit", PAGE_LIMIT)])?;
        self.paginate(url).await
    }

    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn remove_saved_tracks(&self, ids: &[String]) -> Result<()> {
        if ids.len() > MAX_IDS_PER_REQUEST {
            return Err(Error::TooManyIds {
                count: ids.len(),
                max: MAX_IDS_PER_REQUEST,
            });
        }
        if ids.is_empty() {
            return Ok(());
        }

        let joined = ids.join(",");
        let url = self.endpoint("/me/tracks", &[("ids", joined.as_str())])?;
        self.send(Method::DELETE, url).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unfollow_playlist(&self, id: &str) -> Result<()> {
        let mut url = self.endpoint("/playlists", &[])?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(format!("{}: cannot be a base", self.base_url)))?
            .extend([id, "followers"]);
        self.send(Method::DELETE, url).await?;
        Ok(())
    }
}

/// Parse a `Retry-After: <seconds>` header.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl Library for SpotifyClient {
    fn saved_tracks(&self) -> ApiFuture<'_, Vec<SavedTrack>> {
        Box::pin(SpotifyClient::saved_tracks(self))
    }

    fn playlists(&self) -> ApiFuture<'_, Vec<Playlist>> {
        Box::pin(SpotifyClient::playlists(self))
    }

    fn remove_saved_tracks<'a>(&'a self, ids: &'a [String]) -> ApiFuture<'a, ()> {
        Box::pin(SpotifyClient::remove_saved_tracks(self, ids))
    }

    fn unfollow_playlist<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(SpotifyClient::unfollow_playlist(self, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> SpotifyClient {
        SpotifyClient::new(
            reqwest::Client::new(),
            server.uri(),
            Secret::new("at_test".into()),
        )
        .with_retry(RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(5),
            max_retry_after: Duration::from_millis(50),
        })
    }

    fn playlist_json(id: &str) -> serde_json::Value {
        serde_json::json!({"id": id, "name": format!("list {id}"), "owner": {"id": "me"}})
    }

    #[tokio::test]
    async fn playlists_follow_next_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/playlists"))
            .and(query_param("limit", "50"))
            .and(header("authorization", "Bearer at_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [playlist_json("p1"), playlist_json("p2")],
                "next": format!("{}/me/playlists?offset=2", server.uri()),
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me/playlists"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [playlist_json("p3")],
                "next": null,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let playlists = test_client(&server).playlists().await.unwrap();
        let ids: Vec<&str> = playlists.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn remove_saved_tracks_sends_joined_ids() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/me/tracks"))
            .and(query_param("ids", "a,b,c"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        test_client(&server).remove_saved_tracks(&ids).await.unwrap();
    }

    #[tokio::test]
    async fn remove_rejects_oversized_batch_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ids: Vec<String> = (0..51).map(|i| format!("t{i}")).collect();
        let err = test_client(&server).remove_saved_tracks(&ids).await.unwrap_err();
        assert!(matches!(err, Error::TooManyIds { count: 51, max: 50 }));
    }

    #[tokio::test]
    async fn unfollow_hits_followers_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/playlists/p1/followers"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server).unfollow_playlist("p1").await.unwrap();
    }

    #[tokio::test]
    async fn throttled_request_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server).unfollow_playlist("p1").await.unwrap();
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(3)
            .mount(&server)
            .await;

        let err = test_client(&server).unfollow_playlist("p1").await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 502, ref body } if body == "bad gateway"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server).unfollow_playlist("p1").await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn library_trait_delegates_to_client() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/tracks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"added_at": "2024-01-01T00:00:00Z", "track": {"id": "t1", "name": "Song", "artists": []}}],
                "next": null,
            })))
            .mount(&server)
            .await;

        let library: Box<dyn Library> = Box::new(test_client(&server));
        let tracks = library.saved_tracks().await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track.name, "Song");
    }
}

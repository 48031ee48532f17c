//! Spotify Web API surface used by the playlist tools
//!
//! Defines the `Library` trait that decouples the commands from the HTTP
//! client. `SpotifyClient` is the real implementation; tests substitute an
//! in-memory library. Only the handful of endpoints the commands need are
//! modelled: paging through saved tracks and playlists, bulk-removing saved
//! tracks and unfollowing a playlist.

pub mod client;

pub use client::{API_BASE_URL, MAX_IDS_PER_REQUEST, RetryPolicy, SpotifyClient};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Errors from Web API calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid API response: {0}")]
    Decode(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{count} ids exceed the per-request limit of {max}")]
    TooManyIds { count: usize, max: usize },
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed future returned by `Library` methods (keeps the trait dyn-compatible).
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One page of a paged listing. `next` is an absolute URL, absent on the last page.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Artist reference inside a track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A track. Local files have no id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An entry of the user's liked tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedTrack {
    pub added_at: String,
    pub track: Track,
}

/// Public profile reference (playlist owner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A playlist the user owns or follows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub owner: User,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The library operations the commands rely on.
///
/// Mutations take at most `MAX_IDS_PER_REQUEST` ids per call and report
/// success or failure for the call as a whole, not per id.
pub trait Library: Send + Sync {
    /// All of the user's liked tracks, following `next` until the last page.
    fn saved_tracks(&self) -> ApiFuture<'_, Vec<SavedTrack>>;

    /// All playlists the user owns or follows.
    fn playlists(&self) -> ApiFuture<'_, Vec<Playlist>>;

    /// Remove up to `MAX_IDS_PER_REQUEST` tracks from the liked tracks.
    fn remove_saved_tracks<'a>(&'a self, ids: &'a [String]) -> ApiFuture<'a, ()>;

    /// Unfollow (for owned playlists: delete) a playlist.
    fn unfollow_playlist<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ()>;
}

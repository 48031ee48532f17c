//! Flat CSV/JSON records for listing and purging
//!
//! `list` writes rows with an empty `delete` column; the user marks rows
//! with `true` and feeds the file back to `purge`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use spotify_api::{Playlist, SavedTrack};

use crate::error::Error;

/// Separator between artist names in the `artists` column.
pub const ARTIST_SEPARATOR: &str = "; ";

/// Read a `delete` cell. Spreadsheets rewrite `true` as `TRUE`, so the usual
/// boolean spellings are accepted; anything else fails the whole file.
fn parse_delete<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim() {
        "" => Ok(None),
        "1" | "t" | "T" | "true" | "True" | "TRUE" => Ok(Some(true)),
        "0" | "f" | "F" | "false" | "False" | "FALSE" => Ok(Some(false)),
        other => Err(de::Error::custom(format!(
            "invalid delete value {other:?}, expected true or false"
        ))),
    }
}

/// A row that can be marked for deletion.
pub trait Marked {
    fn id(&self) -> &str;
    fn marked(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRow {
    pub id: String,
    pub name: String,
    pub artists: String,
    /// Empty cells read as `None`; see `parse_delete` for accepted spellings.
    #[serde(default, deserialize_with = "parse_delete")]
    pub delete: Option<bool>,
}

impl From<&SavedTrack> for TrackRow {
    fn from(saved: &SavedTrack) -> Self {
        let mut artists: Vec<&str> = saved
            .track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        artists.sort_unstable();

        Self {
            id: saved.track.id.clone().unwrap_or_default(),
            name: saved.track.name.clone(),
            artists: artists.join(ARTIST_SEPARATOR),
            delete: None,
        }
    }
}

impl Marked for TrackRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn marked(&self) -> bool {
        self.delete == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRow {
    pub id: String,
    pub name: String,
    pub owner: String,
    #[serde(default, deserialize_with = "parse_delete")]
    pub delete: Option<bool>,
}

impl From<&Playlist> for PlaylistRow {
    fn from(playlist: &Playlist) -> Self {
        Self {
            id: playlist.id.clone(),
            name: playlist.name.clone(),
            owner: playlist.owner.id.clone(),
            delete: None,
        }
    }
}

impl Marked for PlaylistRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn marked(&self) -> bool {
        self.delete == Some(true)
    }
}

/// Ids of the rows marked for deletion, in file order.
///
/// A marked row without an id is rejected before anything is deleted.
pub fn marked_ids<R: Marked>(path: &Path, rows: &[R]) -> crate::error::Result<Vec<String>> {
    let mut ids = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if !row.marked() {
            continue;
        }
        if row.id().is_empty() {
            return Err(Error::MissingId {
                path: path.display().to_string(),
                // header is line 1
                row: i + 2,
            });
        }
        ids.push(row.id().to_string());
    }
    Ok(ids)
}

pub fn write_json<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, items)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("failed to open {}", path.display()))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .with_context(|| format!("failed to parse {}", path.display()))
}

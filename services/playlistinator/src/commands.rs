//! `liked` and `playlists` subcommands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use purge::{BatchReport, ExecutorConfig, Progress};
use spotify_api::Library;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::records::{self, PlaylistRow, TrackRow};

/// Where `list` writes its output. Either, both or neither may be set.
#[derive(Debug, Default, Clone)]
pub struct ListOutput {
    pub json: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PurgeOptions {
    pub csv: PathBuf,
    pub dry_run: bool,
    pub concurrency: usize,
    pub batch_size: usize,
    /// Draw a progress bar on stderr.
    pub show_progress: bool,
}

impl PurgeOptions {
    fn executor(&self) -> ExecutorConfig {
        ExecutorConfig {
            concurrency: self.concurrency,
            dry_run: self.dry_run,
        }
    }
}

/// Progress bar fed by the batch executor.
struct BarProgress(ProgressBar);

impl Progress for BarProgress {
    fn advance(&self) {
        self.0.inc(1);
    }
}

// The executor drops its last handle when the run returns, before the summary.
impl Drop for BarProgress {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn progress_sink(total: usize, show: bool) -> Arc<dyn Progress> {
    if !show {
        return Arc::new(purge::NoProgress);
    }
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(style);
    }
    Arc::new(BarProgress(bar))
}

pub async fn list_liked(library: &dyn Library, output: &ListOutput) -> Result<usize> {
    let tracks = library
        .saved_tracks()
        .await
        .context("failed to fetch liked tracks")?;
    info!(count = tracks.len(), "found liked tracks");

    if let Some(path) = &output.json {
        records::write_json(path, &tracks)?;
        info!(path = %path.display(), "wrote JSON");
    }
    if let Some(path) = &output.csv {
        let rows: Vec<TrackRow> = tracks.iter().map(TrackRow::from).collect();
        records::write_csv(path, &rows)?;
        info!(path = %path.display(), "wrote CSV");
    }
    Ok(tracks.len())
}

pub async fn list_playlists(library: &dyn Library, output: &ListOutput) -> Result<usize> {
    let playlists = library
        .playlists()
        .await
        .context("failed to fetch playlists")?;
    info!(count = playlists.len(), "found playlists");

    if let Some(path) = &output.json {
        records::write_json(path, &playlists)?;
        info!(path = %path.display(), "wrote JSON");
    }
    if let Some(path) = &output.csv {
        let rows: Vec<PlaylistRow> = playlists.iter().map(PlaylistRow::from).collect();
        records::write_csv(path, &rows)?;
        info!(path = %path.display(), "wrote CSV");
    }
    Ok(playlists.len())
}

/// Ids of liked tracks marked for deletion in the CSV.
pub fn liked_purge_ids(path: &Path) -> Result<Vec<String>> {
    let rows: Vec<TrackRow> = records::read_csv(path)?;
    Ok(records::marked_ids(path, &rows)?)
}

/// Ids of playlists marked for deletion in the CSV.
pub fn playlist_purge_ids(path: &Path) -> Result<Vec<String>> {
    let rows: Vec<PlaylistRow> = records::read_csv(path)?;
    Ok(records::marked_ids(path, &rows)?)
}

/// Remove the given liked tracks in batches of `batch_size`.
pub async fn purge_liked(
    library: Arc<dyn Library>,
    ids: Vec<String>,
    options: &PurgeOptions,
    cancel: CancellationToken,
) -> Result<BatchReport<String>> {
    let chunks = purge::partition(&ids, options.batch_size)?;
    info!(
        tracks = ids.len(),
        batches = chunks.len(),
        dry_run = options.dry_run,
        "removing liked tracks"
    );

    let progress = progress_sink(chunks.len(), options.show_progress);
    let report = purge::run(
        chunks,
        move |batch: Arc<[String]>| {
            let library = Arc::clone(&library);
            async move { library.remove_saved_tracks(&batch).await }
        },
        &options.executor(),
        progress,
        cancel,
    )
    .await;
    Ok(report)
}

/// Unfollow the given playlists, one request each.
pub async fn purge_playlists(
    library: Arc<dyn Library>,
    ids: Vec<String>,
    options: &PurgeOptions,
    cancel: CancellationToken,
) -> Result<BatchReport<String>> {
    let chunks = purge::partition(&ids, 1)?;
    info!(
        playlists = ids.len(),
        dry_run = options.dry_run,
        "unfollowing playlists"
    );

    let progress = progress_sink(chunks.len(), options.show_progress);
    let report = purge::run(
        chunks,
        move |batch: Arc<[String]>| {
            let library = Arc::clone(&library);
            async move {
                for id in batch.iter() {
                    library.unfollow_playlist(id).await?;
                }
                Ok::<(), spotify_api::Error>(())
            }
        },
        &options.executor(),
        progress,
        cancel,
    )
    .await;
    Ok(report)
}

/// Log the outcome and turn failed or cancelled batches into an error.
pub fn summarize(report: &BatchReport<String>) -> crate::error::Result<()> {
    if report.dry_run {
        let items: usize = report.outcomes.iter().map(|o| o.items.len()).sum();
        info!(
            batches = report.planned,
            items, "dry run complete, nothing was deleted"
        );
        return Ok(());
    }

    for failure in report.failures() {
        if let purge::ChunkStatus::Failed(reason) = &failure.status {
            error!(
                batch = failure.index,
                ids = %failure.items.join(","),
                reason = %reason,
                "batch failed"
            );
        }
    }
    if report.processed() < report.planned {
        warn!(
            missing = report.planned - report.processed(),
            "some batches produced no outcome"
        );
    }

    info!(
        processed = report.processed(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        cancelled = report.cancelled(),
        deleted = report.items_succeeded(),
        "purge finished"
    );

    if report.is_success() {
        Ok(())
    } else {
        Err(Error::PurgeIncomplete {
            failed: report.failed() + (report.planned - report.processed()),
            cancelled: report.cancelled(),
            total: report.planned,
        })
    }
}

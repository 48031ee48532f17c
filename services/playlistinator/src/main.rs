//! Playlistinator
//!
//! Command line tool for bulk-managing a Spotify library:
//! 1. `list` exports liked tracks or playlists to JSON and CSV
//! 2. The user marks rows in the CSV with `delete=true`
//! 3. `purge` removes the marked entries with a bounded worker pool
//!
//! The first command that touches the API authenticates through the
//! cached token or the browser PKCE flow.

mod client;
mod commands;
mod config;
mod error;
mod records;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use spotify_api::Library;
use spotify_auth::ClientProvider;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::SpotifyConnector;
use crate::commands::{ListOutput, PurgeOptions};
use crate::config::Config;
use crate::error::Error;

/// Per-request timeout for Web API and token endpoint calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "playlistinator", version, about = "Bulk-manage Spotify liked tracks and playlists")]
struct Cli {
    /// Config file (default: playlistinator.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Liked ("saved") tracks
    Liked {
        #[command(subcommand)]
        action: Action,
    },
    /// Owned and followed playlists
    Playlists {
        #[command(subcommand)]
        action: Action,
    },
}

#[derive(Subcommand)]
enum Action {
    /// Export every entry
    List(ListArgs),
    /// Remove the entries marked delete=true in a CSV export
    Purge(PurgeArgs),
}

#[derive(Args)]
struct ListArgs {
    /// Write the raw API objects as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write a CSV with an empty delete column
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(Args)]
struct PurgeArgs {
    /// CSV produced by `list --csv`, with rows to remove marked delete=true
    #[arg(long)]
    csv: PathBuf,

    /// Show what would be removed without removing anything
    #[arg(long, alias = "dry-run")]
    dryrun: bool,

    /// Concurrent requests (overrides purge.concurrency)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Tracks per removal request (overrides purge.batch_size)
    #[arg(long)]
    batch_size: Option<usize>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_or_default(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to load configuration".to_string(),
    })?;

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;
    let connector = SpotifyConnector::new(
        http,
        config.oauth()?,
        config.token_cache(),
        config.spotify.api_base_url.clone(),
    );
    let provider = ClientProvider::new(connector);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    match cli.command {
        Command::Liked { action } => match action {
            Action::List(args) => {
                let output = list_output(args);
                interruptible(&cancel, async {
                    let library: Arc<dyn Library> = provider.get().await?;
                    commands::list_liked(library.as_ref(), &output).await
                })
                .await?;
            }
            Action::Purge(args) => {
                let options = purge_options(&config, args)?;
                let ids = commands::liked_purge_ids(&options.csv)?;
                let library: Arc<dyn Library> = interruptible(&cancel, provider.get()).await?;
                // The executor handles cancellation itself so the summary still runs
                let report = commands::purge_liked(library, ids, &options, cancel).await?;
                commands::summarize(&report)?;
            }
        },
        Command::Playlists { action } => match action {
            Action::List(args) => {
                let output = list_output(args);
                interruptible(&cancel, async {
                    let library: Arc<dyn Library> = provider.get().await?;
                    commands::list_playlists(library.as_ref(), &output).await
                })
                .await?;
            }
            Action::Purge(args) => {
                let options = purge_options(&config, args)?;
                let ids = commands::playlist_purge_ids(&options.csv)?;
                let library: Arc<dyn Library> = interruptible(&cancel, provider.get()).await?;
                let report = commands::purge_playlists(library, ids, &options, cancel).await?;
                commands::summarize(&report)?;
            }
        },
    }

    Ok(())
}

/// Run `work` until it finishes or a shutdown signal arrives.
///
/// Covers the steps that do not watch the token themselves: login (which can
/// wait minutes for the browser) and listing.
async fn interruptible<T, E, F>(cancel: &CancellationToken, work: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<anyhow::Error>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Interrupted.into()),
        result = work => result.map_err(Into::into),
    }
}

fn list_output(args: ListArgs) -> ListOutput {
    if args.json.is_none() && args.csv.is_none() {
        warn!("neither --json nor --csv given, only counting entries");
    }
    ListOutput {
        json: args.json,
        csv: args.csv,
    }
}

fn purge_options(config: &Config, args: PurgeArgs) -> Result<PurgeOptions> {
    let concurrency = args.concurrency.unwrap_or(config.purge.concurrency);
    if concurrency == 0 {
        anyhow::bail!("--concurrency must be greater than 0");
    }
    let batch_size = args.batch_size.unwrap_or(config.purge.batch_size);
    if batch_size == 0 || batch_size > spotify_api::MAX_IDS_PER_REQUEST {
        anyhow::bail!(
            "--batch-size must be between 1 and {}",
            spotify_api::MAX_IDS_PER_REQUEST
        );
    }

    Ok(PurgeOptions {
        csv: args.csv,
        dry_run: args.dryrun,
        concurrency,
        batch_size,
        show_progress: true,
    })
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, stopping"),
        _ = terminate => info!("received SIGTERM, stopping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_liked_purge_with_overrides() {
        let cli = Cli::try_parse_from([
            "playlistinator",
            "liked",
            "purge",
            "--csv",
            "liked.csv",
            "--dryrun",
            "--concurrency",
            "3",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        let Command::Liked {
            action: Action::Purge(args),
        } = cli.command
        else {
            panic!("expected liked purge");
        };
        assert!(args.dryrun);
        assert_eq!(args.concurrency, Some(3));
        assert_eq!(args.csv, PathBuf::from("liked.csv"));
    }

    #[tokio::test]
    async fn signal_interrupts_pending_work() {
        let cancel = CancellationToken::new();
        let waiting = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                interruptible(&cancel, std::future::pending::<Result<()>>()).await
            }
        });

        cancel.cancel();
        let err = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("interrupted work must return promptly")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Interrupted)));
    }

    #[tokio::test]
    async fn uninterrupted_work_passes_through() {
        let cancel = CancellationToken::new();
        let value = interruptible(&cancel, async { Ok::<_, spotify_auth::Error>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = interruptible(&cancel, async {
            Err::<(), _>(spotify_auth::Error::MissingCode)
        })
        .await
        .unwrap_err();
        assert!(err.downcast_ref::<spotify_auth::Error>().is_some());
    }

    #[test]
    fn purge_requires_csv() {
        assert!(Cli::try_parse_from(["playlistinator", "playlists", "purge"]).is_err());
    }

    #[test]
    fn purge_options_fall_back_to_config() {
        let config = Config::default();
        let args = PurgeArgs {
            csv: PathBuf::from("p.csv"),
            dryrun: false,
            concurrency: None,
            batch_size: None,
        };

        let options = purge_options(&config, args).unwrap();
        assert_eq!(options.concurrency, 5);
        assert_eq!(options.batch_size, 50);
    }

    #[test]
    fn purge_options_reject_oversized_batches() {
        let args = PurgeArgs {
            csv: PathBuf::from("p.csv"),
            dryrun: false,
            concurrency: Some(2),
            batch_size: Some(51),
        };
        assert!(purge_options(&Config::default(), args).is_err());
    }
}

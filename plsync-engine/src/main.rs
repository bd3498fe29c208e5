//! plsync - incremental playlist sync
//!
//! Collects tracks recently added to source playlists, plus recent releases
//! from followed artists, into one destination playlist.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plsync_common::config::{
    resolve_access_token, write_toml_config, RootFolderInitializer, RootFolderResolver,
    TomlConfig,
};
use plsync_engine::orchestrator::{ReleaseReport, RunPlan, RunReport, SourceOutcome};
use plsync_engine::play_counts::{
    top_played, top_tracks_with_counts, update_play_counts, PlayCountStore, TOP_TRACKS_LIMIT,
};
use plsync_engine::provider::{ProviderError, TimeRange};
use plsync_engine::reconciler::WriteStatus;
use plsync_engine::services::SpotifyClient;
use plsync_engine::{CollectionProvider, HistoryStore, SyncEngine};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "plsync")]
#[command(about = "Incremental playlist sync")]
#[command(version)]
struct Args {
    /// Folder holding plsync.toml, history.json and play_counts.json
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync pass
    Sync {
        /// Only scan source playlists
        #[arg(long, conflicts_with = "releases_only")]
        playlists_only: bool,

        /// Only scan followed artists' releases
        #[arg(long)]
        releases_only: bool,
    },

    /// Manage source playlists
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Manage the destination playlist
    Destination {
        #[command(subcommand)]
        action: DestinationAction,
    },

    /// Local play counts
    Plays {
        #[command(subcommand)]
        action: PlaysAction,
    },
}

#[derive(Subcommand, Debug)]
enum SourcesAction {
    /// List source playlists with their names
    List,
    /// Add a source playlist
    Add { playlist_id: String },
    /// Remove a source playlist by ID or list position
    Remove { id_or_position: String },
}

#[derive(Subcommand, Debug)]
enum DestinationAction {
    /// Set the destination playlist
    Set { playlist_id: String },
}

#[derive(Subcommand, Debug)]
enum PlaysAction {
    /// Fold recently played tracks into the local counts
    Update,
    /// Show Spotify's top tracks with their local play counts
    Top {
        /// short (4 weeks), medium (6 months) or long (years)
        #[arg(long, default_value = "short")]
        range: TimeRange,

        #[arg(short, long, default_value_t = TOP_TRACKS_LIMIT)]
        limit: u32,
    },
    /// Show the most played tracks from the local counts only
    Local {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let root_folder = RootFolderResolver::new()
        .with_cli_override(args.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    let config_path = initializer.config_path();

    // RUST_LOG wins; otherwise the level from plsync.toml
    let default_level = TomlConfig::load(&config_path)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_level)),
        )
        .init();

    info!("plsync v{}", env!("CARGO_PKG_VERSION"));

    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", initializer.root().display());

    let mut config = TomlConfig::load_or_create(&config_path);

    match args.command {
        Command::Sync {
            playlists_only,
            releases_only,
        } => {
            let settings = config.sync_settings();
            let plan = if playlists_only {
                RunPlan::playlists_only()
            } else if releases_only {
                RunPlan::releases_only()
            } else {
                RunPlan::everything(&settings)
            };

            let engine = SyncEngine::new(
                spotify_client(&config)?,
                HistoryStore::new(initializer.history_path()),
            );

            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

            let report = engine
                .run(&settings, plan, &plsync_common::time::now(), &cancel)
                .await?;
            print_report(&report);
        }

        Command::Sources { action } => match action {
            SourcesAction::List => {
                let client = spotify_client(&config)?;
                if config.source_playlists.is_empty() {
                    println!("No source playlists configured");
                }
                for (index, playlist_id) in config.source_playlists.iter().enumerate() {
                    let name = playlist_name(&client, playlist_id).await;
                    println!("{:>3}. {}  {}", index + 1, playlist_id, name);
                }
                match config.sync_settings().destination {
                    Some(destination) => {
                        let name = playlist_name(&client, &destination).await;
                        println!("Destination: {}  {}", destination, name);
                    }
                    None => println!("Destination: not set"),
                }
            }
            SourcesAction::Add { playlist_id } => {
                config.add_source(&playlist_id)?;
                write_toml_config(&config, &config_path)?;
                println!("Added source playlist {}", playlist_id.trim());
            }
            SourcesAction::Remove { id_or_position } => {
                let removed = config.remove_source(&id_or_position)?;
                write_toml_config(&config, &config_path)?;
                println!("Removed source playlist {}", removed);
            }
        },

        Command::Destination {
            action: DestinationAction::Set { playlist_id },
        } => {
            config.set_destination(&playlist_id)?;
            write_toml_config(&config, &config_path)?;
            println!("Destination playlist set to {}", playlist_id.trim());
        }

        Command::Plays { action } => {
            let store = PlayCountStore::new(initializer.play_counts_path());
            match action {
                PlaysAction::Update => {
                    let client = spotify_client(&config)?;
                    let now = chrono::Utc::now().to_rfc3339();
                    let counts = update_play_counts(&client, &store, &now).await;
                    println!("Tracking {} tracks", counts.len());
                }
                PlaysAction::Top { range, limit } => {
                    let client = spotify_client(&config)?;
                    let now = chrono::Utc::now().to_rfc3339();
                    let top = match top_tracks_with_counts(&client, &store, range, limit, &now)
                        .await
                    {
                        Ok(top) => top,
                        Err(e @ ProviderError::Forbidden(_)) => {
                            println!("Check that the token carries the user-top-read scope");
                            return Err(e).context("Failed to fetch top tracks");
                        }
                        Err(e) => return Err(e).context("Failed to fetch top tracks"),
                    };
                    if top.is_empty() {
                        println!("No top tracks for {}", range);
                    }
                    for row in &top {
                        println!(
                            "{:>3}. {} ({} plays, popularity {})",
                            row.rank, row.track, row.play_count, row.popularity
                        );
                    }
                }
                PlaysAction::Local { limit } => {
                    let counts = store.load();
                    if counts.is_empty() {
                        println!("No plays recorded yet");
                    }
                    for (rank, (_, record)) in top_played(&counts, limit).into_iter().enumerate() {
                        println!(
                            "{:>3}. {} - {} ({} plays)",
                            rank + 1,
                            record.name,
                            record.artists,
                            record.play_count
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

fn spotify_client(config: &TomlConfig) -> Result<SpotifyClient> {
    let token = resolve_access_token(config)?;
    SpotifyClient::new(token).context("Failed to create Spotify client")
}

async fn playlist_name(client: &SpotifyClient, playlist_id: &str) -> String {
    match client.collection_name(playlist_id).await {
        Ok(Some(name)) => name,
        Ok(None) => "(not found)".to_string(),
        Err(e) => {
            warn!(playlist_id = %playlist_id, error = %e, "Could not fetch playlist name");
            "(unknown)".to_string()
        }
    }
}

/// Cancel the run on Ctrl+C; the engine stops at the next phase boundary
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, cancelling after the current phase");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}

fn print_report(report: &RunReport) {
    if let Some(reason) = &report.sources_skipped {
        println!("Source playlists skipped: {}", reason);
    }
    for source in &report.sources {
        let label = source.name.as_deref().unwrap_or(&source.source_id);
        match &source.outcome {
            SourceOutcome::Scanned {
                window_tracks,
                skipped,
            } => {
                println!(
                    "{}: {} in window, {} new, {} skipped",
                    label,
                    window_tracks,
                    source.new_tracks.len(),
                    skipped
                );
                for track in &source.new_tracks {
                    println!("  + {}", track);
                }
            }
            SourceOutcome::Unavailable { cause } => {
                println!("{}: unavailable ({}), check the playlist ID", label, cause)
            }
            SourceOutcome::Failed { cause } => println!("{}: failed ({})", label, cause),
        }
    }

    match &report.releases {
        Some(ReleaseReport::Scanned {
            artists_checked,
            artists_failed,
            releases,
            new_releases,
        }) => {
            println!(
                "Releases: {} artists checked, {} failed, {} recent tracks, {} new",
                artists_checked,
                artists_failed,
                releases,
                new_releases.len()
            );
            for release in new_releases {
                println!("  + {}", release);
            }
        }
        Some(ReleaseReport::Failed { cause }) => println!("Releases: failed ({})", cause),
        None => {}
    }

    if let Some(phase) = report.cancelled_before {
        println!("Cancelled before {}; history not saved", phase);
        return;
    }

    if report.duplicates_removed > 0 {
        println!("Removed {} cross-source duplicates", report.duplicates_removed);
    }

    if let Some(write) = &report.write {
        match &write.status {
            WriteStatus::NothingToWrite => println!("Destination already up to date"),
            WriteStatus::Delivered => println!(
                "Added {} tracks ({} already present)",
                write.written, write.already_present
            ),
            WriteStatus::Partial { cause } => println!(
                "Added {} tracks, {} pending: {}",
                write.written,
                write.pending.len(),
                cause
            ),
            WriteStatus::NotAttempted { cause, unavailable } => {
                println!(
                    "Destination unreadable, {} tracks not written: {}",
                    write.pending.len(),
                    cause
                );
                if *unavailable {
                    println!("Check the destination playlist ID and permissions");
                }
            }
        }
    }

    match &report.history_error {
        Some(e) => println!("History not saved: {}", e),
        None if report.history_saved => println!("History saved"),
        None => {}
    }
}

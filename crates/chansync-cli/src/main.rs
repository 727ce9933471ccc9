//! chansync: operator tools for the download root and the task queue.
//!
//! Filesystem commands read DOWNLOAD_ROOT and the directory prefix settings;
//! `prune-tasks` also needs DATABASE_URL.

use std::path::PathBuf;

use anyhow::Context;
use chansync_cli::{init_tracing, print_json, source_kind, PruneReport};
use chansync_core::Config;
use chansync_db::setup_database;
use chansync_queue::{TaskQueue, TaskQueueConfig, TaskRepository};
use chansync_storage::PathResolver;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chansync", about = "Channel sync operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the absolute path of a source directory
    Resolve {
        /// Directory as stored on the source
        directory: String,
        /// Resolve under the audio prefix instead of video
        #[arg(long)]
        audio: bool,
    },
    /// Move a source directory, merging into anything already there
    Relocate {
        /// Current directory
        from: String,
        /// New directory
        to: String,
        #[arg(long)]
        audio: bool,
    },
    /// Delete a media file and every artifact named after it
    Sweep {
        /// Path to the media file
        video: PathBuf,
    },
    /// Delete finished tasks older than the retention period
    PruneTasks {
        /// Days to keep (defaults to COMPLETED_TASKS_DAYS_TO_KEEP)
        #[arg(long)]
        days: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env().context("Invalid configuration")?;
    let resolver = PathResolver::from_config(&config);

    match cli.command {
        Commands::Resolve { directory, audio } => {
            let report = chansync_cli::resolve(&resolver, source_kind(audio), &directory)?;
            print_json(&report)?;
        }
        Commands::Relocate { from, to, audio } => {
            let report = tokio::task::spawn_blocking(move || {
                chansync_cli::relocate(&resolver, source_kind(audio), &from, &to)
            })
            .await
            .context("Relocation task panicked")??;
            print_json(&report)?;
        }
        Commands::Sweep { video } => {
            let summary = tokio::task::spawn_blocking(move || chansync_cli::sweep(&video))
                .await
                .context("Sweep task panicked")?;
            let failed = !summary.failed.is_empty();
            print_json(&summary)?;
            if failed {
                anyhow::bail!("Some artifacts could not be deleted");
            }
        }
        Commands::PruneTasks { days } => {
            let days = days.unwrap_or(config.completed_tasks_days_to_keep);
            let pool = setup_database(&config).await?;
            let queue = TaskQueue::new(TaskRepository::new(pool), TaskQueueConfig::from_config(&config));
            let deleted = queue.delete_old_finished_tasks(days).await?;
            tracing::info!(deleted = deleted, days = days, "Pruned finished tasks");
            print_json(&PruneReport {
                older_than_days: days,
                deleted,
            })?;
        }
    }

    Ok(())
}

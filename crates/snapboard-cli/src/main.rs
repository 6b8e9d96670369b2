//! Snapboard CLI: batch-upload photos into a game gallery and list galleries.
//!
//! Reads the same environment as the API service (MEDIA_STORE_CLOUD_NAME,
//! MEDIA_STORE_API_KEY, MEDIA_STORE_API_SECRET, ...). Reports go to stdout as JSON;
//! logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use snapboard_cli::{init_tracing, read_pending_file, retry_failed, FileReport};
use snapboard_client::HttpMediaStore;
use snapboard_core::models::{FolderQuery, DEFAULT_MAX_RESULTS, MAX_RESULTS_LIMIT};
use snapboard_core::{Config, UploadValidator};
use snapboard_services::{
    MemorySessionStore, PhotoService, PhotoServiceConfig, UploadOrchestrator, UploadTarget,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "snapboard", about = "Snapboard photo uploader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload photos into one owner's game gallery
    Upload {
        /// Owner of the gallery
        #[arg(long)]
        user: String,
        /// Game number
        #[arg(long)]
        game: u32,
        /// Retry failed uploads until they succeed or run out of retries
        #[arg(long)]
        retry_failed: bool,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List one owner's game gallery
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        game: u32,
        /// Maximum number of photos (1-500)
        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        limit: u32,
    },
}

#[derive(Serialize)]
struct UploadReport {
    files: Vec<FileReport>,
    rejected: Vec<RejectedReport>,
    completed: usize,
    failed: usize,
}

#[derive(Serialize)]
struct RejectedReport {
    file: String,
    reason: String,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize report")?;
    println!("{}", out);
    Ok(())
}

fn photo_service(config: &Config) -> anyhow::Result<Arc<PhotoService>> {
    let store = HttpMediaStore::new(&config.media_store)
        .context("Failed to build media store client")?;
    Ok(Arc::new(PhotoService::new(
        Arc::new(store),
        PhotoServiceConfig::from_config(config),
    )))
}

async fn upload(
    config: &Config,
    user: String,
    game: u32,
    retry: bool,
    files: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let mut pending = Vec::with_capacity(files.len());
    for path in &files {
        pending.push(read_pending_file(path).await?);
    }

    let orchestrator = UploadOrchestrator::new(
        photo_service(config)?,
        Arc::new(MemorySessionStore::new()),
        UploadValidator::from_config(&config.upload),
        UploadTarget {
            owner_id: user,
            collection_id: game,
            session_id: uuid::Uuid::new_v4().to_string(),
        },
    );

    let intake = orchestrator.add_files(pending).await;
    let progress = orchestrator.start_upload().await?;
    tracing::info!(
        completed = progress.completed,
        failed = progress.failed,
        "Upload run finished"
    );

    if retry && progress.failed > 0 {
        let attempts = retry_failed(&orchestrator).await?;
        tracing::info!(attempts, "Retried failed uploads");
    }

    let state = orchestrator.get_state().await;
    let report = UploadReport {
        files: state.tasks.iter().map(FileReport::from).collect(),
        rejected: intake
            .rejected
            .into_iter()
            .map(|r| RejectedReport {
                file: r.name,
                reason: r.reason,
            })
            .collect(),
        completed: state.progress.completed,
        failed: state.progress.failed,
    };
    print_json(&report)?;

    if report.failed > 0 || !report.rejected.is_empty() {
        anyhow::bail!(
            "{} upload(s) failed, {} file(s) rejected",
            report.failed,
            report.rejected.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Upload {
            user,
            game,
            retry_failed,
            files,
        } => upload(&config, user, game, retry_failed, files).await?,
        Commands::List { user, game, limit } => {
            let photos = photo_service(&config)?
                .fetch_photos_by_folder(&FolderQuery {
                    owner_id: user,
                    collection_id: game,
                    max_results: limit.clamp(1, MAX_RESULTS_LIMIT),
                })
                .await?;
            print_json(&photos)?;
        }
    }

    Ok(())
}

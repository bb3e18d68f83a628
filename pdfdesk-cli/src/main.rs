mod cli;
mod commands;
mod config;

use std::fs;
use std::io;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use directories::ProjectDirs;
use pdfdesk_core::memory::MemoryEngine;
use pdfdesk_core::{BookmarkStore, DocumentEngine, FileBookmarkStore, Session};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::cli::{Cli, EngineKind};
use crate::config::{AppConfig, CONFIG_FILE};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_dirs = ProjectDirs::from("net", "pdfdesk", "pdfdesk")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join(CONFIG_FILE));
    let config = AppConfig::load(&config_path)?;
    let bookmarks_path = cli
        .bookmarks
        .clone()
        .unwrap_or_else(|| config.bookmarks_path(project_dirs.data_local_dir()));

    let engine = build_engine(cli.engine)?;
    let bookmarks: Arc<dyn BookmarkStore> = Arc::new(FileBookmarkStore::load(bookmarks_path));
    let session = Session::new(engine, bookmarks).with_default_zoom(config.default_zoom);

    commands::run(cli.command, session, &config).await
}

fn build_engine(kind: EngineKind) -> Result<Arc<dyn DocumentEngine>> {
    match kind {
        EngineKind::Memory => Ok(Arc::new(MemoryEngine::new())),
        EngineKind::Pdfium => pdfium_engine(),
    }
}

#[cfg(feature = "pdf")]
fn pdfium_engine() -> Result<Arc<dyn DocumentEngine>> {
    Ok(Arc::new(pdfdesk_render::PdfiumEngine::new()?))
}

#[cfg(not(feature = "pdf"))]
fn pdfium_engine() -> Result<Arc<dyn DocumentEngine>> {
    Err(anyhow!("built without Pdfium support; use --engine memory"))
}

/// Console output goes to stderr so command output on stdout stays clean.
/// Without a writable data directory only the console layer is installed.
fn init_logging(project_dirs: &ProjectDirs) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let log_dir = project_dirs.data_local_dir().join("logs");
    let (file_layer, guard, dir_error) = match fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::never(&log_dir, "pdfdesk.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    if let Some(err) = dir_error {
        warn!(?err, dir = %log_dir.display(), "file logging disabled");
    }
    Ok(guard)
}

pub mod board;
pub mod codec;
pub mod config;
pub mod controller;
pub mod errors;
pub mod legacy;
pub mod models;
pub mod scheduler;
pub mod store;

pub use crate::board::{SectionView, TeamBoard};
pub use crate::config::MemoConfig;
pub use crate::controller::SectionController;
pub use crate::errors::{AppError, AppResult};
pub use crate::models::AppState;
pub use crate::store::{LoadSource, SettingsStore, StorePaths};

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

const DEFAULT_CONFIG_FILE: &str = "memo.yaml";

/// Loads the config named by the first argument (or `memo.yaml`), restores
/// every section and writes the settings file back in canonical form.
pub fn run() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = MemoConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.to_string_lossy()))?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.to_string_lossy()))?;
    if let Err(error) = init_tracing(&config.log_dir()) {
        eprintln!("logging disabled: {}", error);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async {
        let controller: SectionController = SectionController::new(&config);
        let source = controller.startup();
        tokio::time::sleep(config.timings().startup_restore_delay * 2).await;

        let names = controller.section_names();
        tracing::info!(source = source.as_str(), sections = names.len(), "team memo ready");
        for name in &names {
            let teams = controller.section_data(name).map(|data| data.teams.len()).unwrap_or(0);
            println!("{}\t{} teams", name, teams);
        }

        controller.close().context("saving settings")
    })
}

pub fn init_tracing(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "team-memo.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

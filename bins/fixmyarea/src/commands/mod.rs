//! Subcommand implementations

pub mod config;
pub mod manage;
pub mod status;
pub mod submit;
pub mod sync;

use anyhow::{Context as _, Result};
use fixmyarea_core::config::Config;
use fixmyarea_sync::LocalReportStore;
use fixmyarea_telemetry::TelemetryConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loaded configuration shared by every subcommand
pub struct Context {
    pub config: Config,
}

impl Context {
    /// Load configuration, apply overrides and start logging
    pub fn load(path: Option<&Path>, store_dir: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let mut config = Config::load(path)?;
        if let Some(dir) = store_dir {
            config.app.store.dir = dir;
        }

        let telemetry = &config.app.telemetry;
        let level = if verbose { "debug" } else { telemetry.log_level.as_str() };
        fixmyarea_telemetry::init_with_config(
            TelemetryConfig::default()
                .with_log_level(level)
                .with_json(telemetry.json),
        )?;

        Ok(Self { config })
    }

    /// Open and lock the report store, creating it on first use
    pub fn store(&self) -> Result<Arc<LocalReportStore>> {
        let dir = &self.config.app.store.dir;
        let store = LocalReportStore::open(dir)
            .with_context(|| format!("cannot open report store at {}", dir.display()))?;
        Ok(Arc::new(store))
    }

    /// Open the report store without the lock; reads and new reports only
    pub fn shared_store(&self) -> Result<Arc<LocalReportStore>> {
        let dir = &self.config.app.store.dir;
        let store = LocalReportStore::open_shared(dir)
            .with_context(|| format!("cannot open report store at {}", dir.display()))?;
        Ok(Arc::new(store))
    }
}

//! Configuration file loading

use super::schema::AppConfig;
use crate::error::{Error, ErrorCode, Result, ResultExt};
use std::path::{Path, PathBuf};

/// Loaded configuration plus the file it came from
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed settings
    pub app: AppConfig,
    /// File the settings were read from; `None` when defaults are used
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load from an explicit path, or the first standard location that
    /// exists, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) if !p.exists() => return Err(Error::config_not_found(p)),
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file(),
        };

        let app = match &config_path {
            Some(p) => load_config_file(p)?,
            None => AppConfig::default(),
        };
        validate(&app)?;

        Ok(Self {
            app,
            path: config_path,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let app: AppConfig = toml::from_str(content)?;
        validate(&app)?;
        Ok(Self { app, path: None })
    }
}

/// Find configuration file in standard locations
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        "fixmyarea.toml",
        ".fixmyarea.toml",
        ".config/fixmyarea.toml",
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

fn load_config_file(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(Error::from)
        .context(format!("Failed to read config file {}", path.display()))?;

    toml::from_str(&content)
        .map_err(Error::from)
        .context(format!("Failed to parse config file {}", path.display()))
}

fn validate(app: &AppConfig) -> Result<()> {
    let invalid = |msg: &str| Err(Error::new(ErrorCode::InvalidConfigValue, msg.to_string()));

    if app.sync.workers == 0 {
        return invalid("sync.workers must be at least 1");
    }
    if app.sync.retry.max_attempts == 0 {
        return invalid("sync.retry.max_attempts must be at least 1");
    }
    if app.sync.op_timeout.is_zero() {
        return invalid("sync.op_timeout_secs cannot be zero");
    }
    if app.upload.max_asset_bytes == 0 {
        return invalid("upload.max_asset_bytes cannot be zero");
    }
    if app.upload.folder.trim().is_empty() {
        return invalid("upload.folder cannot be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.path.is_none());
        assert_eq!(config.app.sync.workers, 3);
        assert_eq!(config.app.sync.retry.max_attempts, 6);
        assert_eq!(config.app.upload.folder, "issue_images");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [sync]
            workers = 5
            op_timeout_secs = 10

            [sync.retry]
            max_attempts = 4
            initial_delay_ms = 500

            [location]
            timeout_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.app.sync.workers, 5);
        assert_eq!(config.app.sync.op_timeout, Duration::from_secs(10));
        assert_eq!(config.app.sync.poll_interval, Duration::from_secs(15));
        assert_eq!(config.app.sync.retry.max_attempts, 4);
        assert_eq!(config.app.sync.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.app.sync.retry.max_delay, Duration::from_secs(300));
        assert_eq!(config.app.location.timeout, Duration::from_millis(1500));
        assert!((config.app.location.degraded_accuracy_m - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = Config::from_toml("[sync]\nworkers = 0\n").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfigValue);
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = Config::from_toml("[sync\nworkers = 1").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigParseError);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixmyarea.toml");
        std::fs::write(&path, "[store]\ndir = \"/tmp/fixmyarea-test\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.app.store.dir, PathBuf::from("/tmp/fixmyarea-test"));
        assert_eq!(config.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigNotFound);
    }
}

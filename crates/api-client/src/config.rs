//! Configuration for the HTTP adapters
//!
//! Credentials and endpoints come from the environment; nothing here is
//! required to queue reports, only to sync them.

use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Cloudinary upload API root
const DEFAULT_CLOUDINARY_URL: &str = "https://api.cloudinary.com/v1_1";

/// Firestore REST API root
const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Local Firestore emulator
const EMULATOR_FIRESTORE_URL: &str = "http://localhost:8080/v1";

/// Environment types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development against the Firestore emulator
    Development,
    /// Staging project
    Staging,
    /// Production project
    #[default]
    Production,
}

impl Environment {
    /// Parse from the `FIXMYAREA_ENV` environment variable
    pub fn from_env() -> Self {
        Self::parse(&env::var("FIXMYAREA_ENV").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "development" | "dev" | "local" => Self::Development,
            "staging" | "stage" => Self::Staging,
            _ => Self::Production,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Cloudinary API root (without the cloud name)
    pub cloudinary_url: String,
    /// Cloudinary cloud name
    pub cloud_name: Option<String>,
    /// Unsigned upload preset
    pub upload_preset: Option<String>,
    /// Firestore REST API root
    pub firestore_url: String,
    /// Firebase project id
    pub project_id: Option<String>,
    /// Firestore database id
    pub database: String,
    /// Firebase ID token sent as a bearer token
    #[serde(skip_serializing)]
    pub id_token: Option<String>,
    /// Request timeout
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Current environment
    pub environment: Environment,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cloudinary_url: DEFAULT_CLOUDINARY_URL.to_string(),
            cloud_name: None,
            upload_preset: None,
            firestore_url: DEFAULT_FIRESTORE_URL.to_string(),
            project_id: None,
            database: "(default)".to_string(),
            id_token: None,
            timeout: Duration::from_secs(30),
            environment: Environment::default(),
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables
    ///
    /// Reads the following environment variables:
    /// - `FIXMYAREA_ENV`: Environment (development/staging/production)
    /// - `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_UPLOAD_PRESET`: photo hosting
    /// - `CLOUDINARY_API_URL`: override for the Cloudinary API root
    /// - `FIRESTORE_PROJECT_ID`: Firebase project holding the `issues` collection
    /// - `FIRESTORE_EMULATOR_HOST`: `host:port` of a Firestore emulator
    /// - `FIXMYAREA_ID_TOKEN`: Firebase ID token of the signed-in reporter
    /// - `FIXMYAREA_TIMEOUT_SECS`: Request timeout in seconds
    pub fn from_env() -> ApiResult<Self> {
        let config = Self::from_lookup(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = Environment::parse(&lookup("FIXMYAREA_ENV").unwrap_or_default());

        let mut config = match environment {
            Environment::Development => Self::development(),
            Environment::Staging | Environment::Production => Self {
                environment,
                ..Self::default()
            },
        };

        if let Some(url) = lookup("CLOUDINARY_API_URL") {
            config.cloudinary_url = url.trim_end_matches('/').to_string();
        }
        if let Some(host) = lookup("FIRESTORE_EMULATOR_HOST") {
            config.firestore_url = format!("http://{host}/v1");
        }

        config.cloud_name = lookup("CLOUDINARY_CLOUD_NAME").or(config.cloud_name);
        config.upload_preset = lookup("CLOUDINARY_UPLOAD_PRESET").or(config.upload_preset);
        config.project_id = lookup("FIRESTORE_PROJECT_ID").or(config.project_id);
        config.id_token = lookup("FIXMYAREA_ID_TOKEN");

        if let Some(secs) = lookup("FIXMYAREA_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Create development configuration (local Firestore emulator)
    #[must_use]
    pub fn development() -> Self {
        Self {
            firestore_url: EMULATOR_FIRESTORE_URL.to_string(),
            project_id: Some("demo-fixmyarea".to_string()),
            timeout: Duration::from_secs(10),
            environment: Environment::Development,
            ..Self::default()
        }
    }

    /// Builder-style method to set Cloudinary credentials
    #[must_use]
    pub fn with_cloudinary(
        mut self,
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
    ) -> Self {
        self.cloud_name = Some(cloud_name.into());
        self.upload_preset = Some(upload_preset.into());
        self
    }

    /// Builder-style method to set the Cloudinary API root
    #[must_use]
    pub fn with_cloudinary_url(mut self, url: impl Into<String>) -> Self {
        self.cloudinary_url = url.into();
        self
    }

    /// Builder-style method to set the Firebase project
    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Builder-style method to set the Firestore API root
    #[must_use]
    pub fn with_firestore_url(mut self, url: impl Into<String>) -> Self {
        self.firestore_url = url.into();
        self
    }

    /// Builder-style method to set the ID token
    #[must_use]
    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    /// Builder-style method to set timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cloud name and preset, or the variable that is missing
    pub fn cloudinary_credentials(&self) -> ApiResult<(&str, &str)> {
        let cloud = self
            .cloud_name
            .as_deref()
            .ok_or_else(|| ApiError::missing_env("CLOUDINARY_CLOUD_NAME"))?;
        let preset = self
            .upload_preset
            .as_deref()
            .ok_or_else(|| ApiError::missing_env("CLOUDINARY_UPLOAD_PRESET"))?;
        Ok((cloud, preset))
    }

    /// Firebase project id, or the variable that is missing
    pub fn firestore_project(&self) -> ApiResult<&str> {
        self.project_id
            .as_deref()
            .ok_or_else(|| ApiError::missing_env("FIRESTORE_PROJECT_ID"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ApiResult<()> {
        for (name, url) in [
            ("cloudinary_url", &self.cloudinary_url),
            ("firestore_url", &self.firestore_url),
        ] {
            if url.is_empty() {
                return Err(ApiError::config(format!("{name} cannot be empty")));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ApiError::InvalidUrl(format!(
                    "{name} must start with http:// or https:// (got {url})"
                )));
            }
        }

        if self.database.is_empty() {
            return Err(ApiError::config("database cannot be empty"));
        }

        if self.timeout.is_zero() {
            return Err(ApiError::config("timeout cannot be zero"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.firestore_url.contains("firestore.googleapis.com"));
        assert_eq!(config.database, "(default)");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.environment, Environment::Production);
    }

    #[test]
    fn test_from_lookup_reads_credentials() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("CLOUDINARY_CLOUD_NAME", "dj1pryyxv"),
            ("CLOUDINARY_UPLOAD_PRESET", "issues_unsigned"),
            ("FIRESTORE_PROJECT_ID", "fixmyarea-prod"),
            ("FIXMYAREA_ID_TOKEN", "token-abc"),
            ("FIXMYAREA_TIMEOUT_SECS", "12"),
        ]));

        assert_eq!(
            assert_ok!(config.cloudinary_credentials()),
            ("dj1pryyxv", "issues_unsigned")
        );
        assert_eq!(assert_ok!(config.firestore_project()), "fixmyarea-prod");
        assert_eq!(config.id_token.as_deref(), Some("token-abc"));
        assert_eq!(config.timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_development_uses_emulator() {
        let config = ClientConfig::from_lookup(lookup(&[("FIXMYAREA_ENV", "dev")]));
        assert_eq!(config.environment, Environment::Development);
        assert!(config.firestore_url.starts_with("http://localhost"));

        let config = ClientConfig::from_lookup(lookup(&[(
            "FIRESTORE_EMULATOR_HOST",
            "127.0.0.1:9090",
        )]));
        assert_eq!(config.firestore_url, "http://127.0.0.1:9090/v1");
    }

    #[test]
    fn test_missing_credentials_name_the_variable() {
        let config = ClientConfig::default().with_project("p");
        let err = assert_err!(config.cloudinary_credentials());
        assert!(err.to_string().contains("CLOUDINARY_CLOUD_NAME"));

        let err = assert_err!(ClientConfig::default().firestore_project());
        assert!(err.to_string().contains("FIRESTORE_PROJECT_ID"));
    }

    #[test]
    fn test_validation() {
        assert_ok!(ClientConfig::default().validate());
        assert_err!(ClientConfig::default().with_firestore_url("").validate());
        assert_err!(ClientConfig::default().with_cloudinary_url("ftp://x").validate());
        assert_err!(ClientConfig::default().with_timeout(Duration::ZERO).validate());
    }

    #[test]
    fn test_id_token_is_not_serialized() {
        let config = ClientConfig::default().with_id_token("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}

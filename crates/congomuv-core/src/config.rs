//! Service configuration.
//!
//! Layers, each overriding the previous:
//! 1. Built-in defaults
//! 2. TOML file (explicit path, `CONGOMUV_CONFIG`, or the platform config dir)
//! 3. Environment variables `CONGOMUV__<SECTION>__<KEY>`, e.g.
//!    `CONGOMUV__IDLE__IDLE_TIMEOUT_SECS=600`
//!
//! ```toml
//! [idle]
//! idle_timeout_secs = 120
//! warn_duration_secs = 15
//! failsafe_grace_secs = 1
//!
//! [server]
//! bind_address = "0.0.0.0:3000"
//! production = false
//! client_ttl_secs = 3600
//!
//! [[directory]]
//! token = "dev-operator"
//! [directory.profile]
//! id = "7f1c0e42-1b1e-4c38-9d55-3a0c4fbc2a10"
//! role = "operator"
//! name = "Transco Kinshasa"
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::idle::IdleSettings;
use crate::session::{Profile, StaticAuthProvider};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "CONGOMUV_CONFIG";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "CONGOMUV";

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// A source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Writing the file failed.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Destination path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A value is out of range or inconsistent.
    #[error("Invalid value for {field}: {message}")]
    Validation {
        /// Dotted field name.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Idle timer settings, in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Inactivity before the session ends.
    pub idle_timeout_secs: u64,
    /// Length of the warning countdown.
    pub warn_duration_secs: u64,
    /// Fail-safe delay past the idle timeout.
    pub failsafe_grace_secs: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        let defaults = IdleSettings::default();
        Self {
            idle_timeout_secs: defaults.idle_timeout.as_secs(),
            warn_duration_secs: defaults.warn_duration.as_secs(),
            failsafe_grace_secs: defaults.failsafe_grace.as_secs(),
        }
    }
}

impl IdleConfig {
    /// Converts to timer settings.
    #[must_use]
    pub const fn settings(&self) -> IdleSettings {
        IdleSettings {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            warn_duration: Duration::from_secs(self.warn_duration_secs),
            failsafe_grace: Duration::from_secs(self.failsafe_grace_secs),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_address: String,
    /// Production logging (JSON files + compact stdout).
    pub production: bool,
    /// Clients with no state-changing request for this long are unmounted.
    pub client_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            production: false,
            client_ttl_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the address is malformed.
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind_address
            .parse()
            .map_err(|e| ConfigError::validation("server.bind_address", format!("{e}")))
    }

    /// How long an untouched client stays mounted.
    #[must_use]
    pub const fn client_ttl(&self) -> Duration {
        Duration::from_secs(self.client_ttl_secs)
    }
}

/// One token → profile mapping for the static auth directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Session token.
    pub token: String,
    /// Profile returned for it.
    pub profile: Profile,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Idle timer.
    pub idle: IdleConfig,
    /// HTTP listener.
    pub server: ServerConfig,
    /// Static auth directory.
    pub directory: Vec<DirectoryEntry>,
}

impl GateConfig {
    /// Loads configuration from defaults, `path` and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not exist, a source fails to parse,
    /// or the result fails validation.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Loads from `CONGOMUV_CONFIG` or the platform path when the file
    /// exists, otherwise from defaults and the environment only.
    ///
    /// # Errors
    ///
    /// Same as [`GateConfig::load`].
    pub fn load_or_default() -> ConfigResult<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(default_config_path)
            .filter(|p| p.exists());

        match &path {
            Some(p) => info!(path = %p.display(), "Using configuration file"),
            None => info!("No configuration file found, using defaults"),
        }
        Self::load(path.as_deref())
    }

    /// Writes the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_err = |source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)
    }

    /// Checks value ranges and cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Validation`] found.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.idle.idle_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "idle.idle_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.idle.warn_duration_secs == 0 {
            return Err(ConfigError::validation(
                "idle.warn_duration_secs",
                "must be greater than zero",
            ));
        }
        if self.idle.warn_duration_secs >= self.idle.idle_timeout_secs {
            return Err(ConfigError::validation(
                "idle.warn_duration_secs",
                format!(
                    "must be shorter than idle_timeout_secs ({})",
                    self.idle.idle_timeout_secs
                ),
            ));
        }

        self.server.socket_addr()?;
        if self.server.client_ttl_secs == 0 {
            return Err(ConfigError::validation(
                "server.client_ttl_secs",
                "must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.directory {
            if entry.token.trim().is_empty() {
                return Err(ConfigError::validation("directory.token", "must not be empty"));
            }
            if !seen.insert(entry.token.as_str()) {
                return Err(ConfigError::validation(
                    "directory.token",
                    format!("duplicate token for {}", entry.profile.name),
                ));
            }
        }
        Ok(())
    }

    /// Builds the static auth provider from the directory.
    #[must_use]
    pub fn auth_provider(&self) -> StaticAuthProvider {
        StaticAuthProvider::new(
            self.directory
                .iter()
                .map(|entry| (entry.token.clone(), entry.profile.clone())),
        )
    }
}

/// Platform config file path, e.g. `~/.config/congomuv/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("cd", "CongoMuv", "congomuv")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;
    use uuid::Uuid;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = GateConfig::default();
        tokio_test::assert_ok!(config.validate());
        assert_eq!(config.idle.idle_timeout_secs, 120);
        assert_eq!(config.idle.warn_duration_secs, 15);
        assert_eq!(config.idle.failsafe_grace_secs, 1);
        assert!(!config.server.production);
        assert_eq!(config.server.client_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_idle_settings_conversion() {
        let settings = IdleConfig {
            idle_timeout_secs: 120,
            warn_duration_secs: 30,
            failsafe_grace_secs: 1,
        }
        .settings();
        assert_eq!(settings.warn_after(), Duration::from_secs(90));
        assert_eq!(settings.failsafe_after(), Duration::from_secs(121));
    }

    #[test]
    fn test_load_file_overrides_defaults() {
        let file = write_toml(
            r#"
[idle]
idle_timeout_secs = 300

[server]
bind_address = "127.0.0.1:8080"

[[directory]]
token = "dev-operator"

[directory.profile]
id = "7f1c0e42-1b1e-4c38-9d55-3a0c4fbc2a10"
role = "Operator "
name = "Transco Kinshasa"
"#,
        );

        let config = GateConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.idle.idle_timeout_secs, 300);
        assert_eq!(config.idle.warn_duration_secs, 15);
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.directory.len(), 1);
        assert_eq!(config.directory[0].profile.phone, None);
        assert_eq!(config.auth_provider().len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = GateConfig::load(Some(Path::new("/nonexistent/congomuv.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_validation_rejects_long_warning() {
        let mut config = GateConfig::default();
        config.idle.warn_duration_secs = config.idle.idle_timeout_secs;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("warn_duration_secs"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = GateConfig::default();
        config.idle.idle_timeout_secs = 0;
        tokio_test::assert_err!(config.validate());
    }

    #[test]
    fn test_validation_rejects_zero_client_ttl() {
        let mut config = GateConfig::default();
        config.server.client_ttl_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_ttl_secs"));
    }

    #[test]
    fn test_validation_rejects_bad_address() {
        let mut config = GateConfig::default();
        config.server.bind_address = "not-an-address".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.bind_address"));
    }

    #[test]
    fn test_validation_rejects_duplicate_tokens() {
        let profile = Profile {
            id: Uuid::new_v4(),
            role: "passenger".into(),
            name: "Kabila".into(),
            phone: None,
            organization_id: None,
            organization_name: None,
        };
        let mut config = GateConfig::default();
        config.directory = vec![
            DirectoryEntry {
                token: "same".into(),
                profile: profile.clone(),
            },
            DirectoryEntry {
                token: "same".into(),
                profile,
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = GateConfig::default();
        config.idle.idle_timeout_secs = 600;
        config.save(&path).unwrap();

        let loaded = GateConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.idle.idle_timeout_secs, 600);
    }

    #[test]
    fn test_default_config_path_is_toml() {
        if let Some(path) = default_config_path() {
            assert_eq!(path.file_name().unwrap(), "config.toml");
        }
    }
}

use std::{
    fs,
    path::PathBuf,
    sync::{LazyLock, PoisonError, RwLock},
    time::Duration,
};

use bpindex_oci::reference::DEFAULT_REGISTRY;
use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::{debug, info};

use crate::{
    annotations::annotate_toml_table,
    error::{ConfigError, Result},
    utils::{parse_duration, resolve_path, xdg_config_home, xdg_data_home},
};

/// Buildpack index updater configuration
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Path to the SQLite index database.
    /// Default: $XDG_DATA_HOME/bpindex/index.db
    pub db_path: Option<String>,

    /// Maximum number of concurrent registry fetches.
    /// Default: 8
    pub parallel_limit: Option<usize>,

    /// Time allowed for a single artifact fetch before it is reported as timed out.
    /// Default: 30s
    pub fetch_timeout: Option<String>,

    /// Time allowed for a whole batch. Entries still pending afterwards are reported as timed out.
    /// Default: 10m
    pub batch_deadline: Option<String>,

    /// Number of retries for transient fetch failures (network errors and timeouts).
    /// Default: 2
    pub fetch_retries: Option<u32>,

    /// Number of retries for failed index writes.
    /// Default: 1
    pub sink_retries: Option<u32>,

    /// Initial backoff between retries, doubled after every attempt.
    /// Default: 500ms
    pub retry_backoff: Option<String>,

    /// Registry used for addresses that do not name one.
    /// Default: index.docker.io
    pub default_registry: Option<String>,

    /// Registries reached over plain HTTP instead of HTTPS.
    /// Default: []
    pub insecure_registries: Option<Vec<String>>,

    /// Static bearer token sent to every registry. Anonymous token exchange is used when unset.
    pub registry_token: Option<String>,

    /// User agent sent with registry requests.
    /// Default: bpindex/<version>
    pub user_agent: Option<String>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("BPINDEX_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("bpindex").join("config.toml"),
    })
});

fn config_path() -> PathBuf {
    CONFIG_PATH
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Loads the configuration from [`CONFIG_PATH`] into the global slot.
pub fn init() -> Result<()> {
    let config = Config::new()?;
    let mut global_config = CONFIG.write().unwrap_or_else(PoisonError::into_inner);
    *global_config = Some(config);
    Ok(())
}

/// Replaces the path the configuration is read from.
pub fn set_config_path(path: PathBuf) {
    let mut current = CONFIG_PATH.write().unwrap_or_else(PoisonError::into_inner);
    *current = path;
}

/// Returns the loaded configuration, or the defaults if [`init`] never ran.
pub fn get_config() -> Config {
    let mut config_guard = CONFIG.write().unwrap_or_else(PoisonError::into_inner);
    config_guard.get_or_insert_with(Config::default_config).clone()
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            db_path: Some(
                xdg_data_home()
                    .join("bpindex")
                    .join("index.db")
                    .display()
                    .to_string(),
            ),
            parallel_limit: Some(8),
            fetch_timeout: Some("30s".to_string()),
            batch_deadline: Some("10m".to_string()),
            fetch_retries: Some(2),
            sink_retries: Some(1),
            retry_backoff: Some("500ms".to_string()),
            default_registry: Some(DEFAULT_REGISTRY.to_string()),
            insecure_registries: Some(Vec::new()),
            registry_token: None,
            user_agent: Some(default_user_agent()),
        }
    }

    /// Creates a new configuration by loading it from the configuration file.
    /// If the configuration file is not found, the defaults are used.
    pub fn new() -> Result<Self> {
        let path = config_path();

        let mut config: Config = match fs::read_to_string(&path) {
            Ok(content) => {
                debug!("loading configuration from {}", path.display());
                toml::from_str(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default_config(),
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    /// Fills unset keys with defaults and validates the rest.
    pub fn resolve(&mut self) -> Result<()> {
        let defaults = Self::default_config();

        if self.db_path.is_none() {
            self.db_path = defaults.db_path;
        }
        if self.fetch_timeout.is_none() {
            self.fetch_timeout = defaults.fetch_timeout;
        }
        if self.batch_deadline.is_none() {
            self.batch_deadline = defaults.batch_deadline;
        }
        if self.retry_backoff.is_none() {
            self.retry_backoff = defaults.retry_backoff;
        }
        if self.default_registry.is_none() {
            self.default_registry = defaults.default_registry;
        }
        if self.user_agent.is_none() {
            self.user_agent = defaults.user_agent;
        }
        self.parallel_limit.get_or_insert(8);
        self.fetch_retries.get_or_insert(2);
        self.sink_retries.get_or_insert(1);
        self.insecure_registries.get_or_insert_with(Vec::new);

        if self.parallel_limit == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "parallel_limit".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self
            .default_registry
            .as_deref()
            .is_some_and(|r| r.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                key: "default_registry".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        for (key, value) in [
            ("fetch_timeout", self.get_fetch_timeout()?),
            ("batch_deadline", self.get_batch_deadline()?),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        self.get_retry_backoff()?;

        Ok(())
    }

    pub fn get_db_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("BPINDEX_DB") {
            return resolve_path(&env_path);
        }
        match &self.db_path {
            Some(db_path) => resolve_path(db_path),
            None => Ok(xdg_data_home().join("bpindex").join("index.db")),
        }
    }

    pub fn get_parallel_limit(&self) -> usize {
        self.parallel_limit.unwrap_or(8).max(1)
    }

    pub fn get_fetch_timeout(&self) -> Result<Duration> {
        duration_value("fetch_timeout", self.fetch_timeout.as_deref().unwrap_or("30s"))
    }

    pub fn get_batch_deadline(&self) -> Result<Duration> {
        duration_value(
            "batch_deadline",
            self.batch_deadline.as_deref().unwrap_or("10m"),
        )
    }

    pub fn get_retry_backoff(&self) -> Result<Duration> {
        duration_value(
            "retry_backoff",
            self.retry_backoff.as_deref().unwrap_or("500ms"),
        )
    }

    pub fn get_default_registry(&self) -> &str {
        self.default_registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        annotate_toml_table::<Config>(doc.as_table_mut(), true)?;

        Ok(doc)
    }
}

fn duration_value(key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .and_then(|ms| u64::try_from(ms).ok())
        .map(Duration::from_millis)
        .ok_or_else(|| {
            ConfigError::InvalidDuration {
                key: key.to_string(),
                value: value.to_string(),
            }
        })
}

fn default_user_agent() -> String {
    format!("bpindex/{}", env!("CARGO_PKG_VERSION"))
}

/// Writes the annotated default configuration to [`CONFIG_PATH`].
pub fn generate_default_config() -> Result<PathBuf> {
    let path = config_path();

    if path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let annotated_doc = Config::default_config().to_annotated_document()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::tempdir;

    use super::*;
    use crate::test_utils::with_env;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.parallel_limit, Some(8));
        assert_eq!(config.fetch_retries, Some(2));
        assert_eq!(config.sink_retries, Some(1));
        assert_eq!(config.get_default_registry(), "index.docker.io");
        assert_eq!(config.get_fetch_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(
            config.get_batch_deadline().unwrap(),
            Duration::from_secs(600)
        );
        assert_eq!(
            config.get_retry_backoff().unwrap(),
            Duration::from_millis(500)
        );
        assert!(config.registry_token.is_none());
    }

    #[test]
    fn test_config_resolve_sets_defaults() {
        let mut config: Config = toml::from_str("").unwrap();
        config.resolve().unwrap();

        assert_eq!(config.parallel_limit, Some(8));
        assert_eq!(config.fetch_timeout.as_deref(), Some("30s"));
        assert_eq!(config.default_registry.as_deref(), Some(DEFAULT_REGISTRY));
        assert_eq!(config.insecure_registries, Some(Vec::new()));
    }

    #[test]
    fn test_config_resolve_rejects_zero_parallelism() {
        let mut config = Config::default_config();
        config.parallel_limit = Some(0);

        let result = config.resolve();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "parallel_limit"
        ));
    }

    #[test]
    fn test_config_resolve_rejects_bad_duration() {
        let mut config = Config::default_config();
        config.fetch_timeout = Some("whenever".to_string());

        let result = config.resolve();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidDuration { ref key, .. }) if key == "fetch_timeout"
        ));
    }

    #[test]
    fn test_config_resolve_rejects_zero_timeouts() {
        let mut config = Config::default_config();
        config.fetch_timeout = Some("0s".to_string());
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "fetch_timeout"
        ));

        let mut config = Config::default_config();
        config.batch_deadline = Some("0ms".to_string());
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "batch_deadline"
        ));

        // A zero backoff only means retries are immediate.
        let mut config = Config::default_config();
        config.retry_backoff = Some("0s".to_string());
        config.resolve().unwrap();
        assert_eq!(config.get_retry_backoff().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = Config::default_config();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.parallel_limit, config.parallel_limit);
        assert_eq!(deserialized.db_path, config.db_path);
    }

    #[test]
    #[serial]
    fn test_db_path_env_override() {
        with_env(vec![("BPINDEX_DB", "/custom/index.db")], || {
            let config = Config::default_config();
            assert_eq!(
                config.get_db_path().unwrap(),
                PathBuf::from("/custom/index.db")
            );
        });
    }

    #[test]
    #[serial]
    fn test_load_and_generate_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bpindex").join("config.toml");
        set_config_path(path.clone());

        // Missing file falls back to defaults.
        let config = Config::new().unwrap();
        assert_eq!(config.parallel_limit, Some(8));

        let written = generate_default_config().unwrap();
        assert_eq!(written, path);
        assert!(matches!(
            generate_default_config(),
            Err(ConfigError::ConfigAlreadyExists)
        ));

        fs::write(&path, "parallel_limit = 3\nfetch_timeout = \"5s\"\n").unwrap();
        let config = Config::new().unwrap();
        assert_eq!(config.get_parallel_limit(), 3);
        assert_eq!(config.get_fetch_timeout().unwrap(), Duration::from_secs(5));
        assert_eq!(config.fetch_retries, Some(2));
    }
}

mod server;
pub use server::ServerConfig;

mod snapshot;
pub use snapshot::SnapshotConfig;

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file specified by `INMEMDB_CONFIG` was not found.
    #[error("Config file not found: {path:?}")]
    FileNotFound { path: PathBuf },

    /// Failed to parse the configuration file or environment variables.
    #[error("Failed to parse config")]
    ParseError(#[from] config::ConfigError),

    /// Error in server configuration validation.
    #[error(transparent)]
    Server(#[from] server::ServerConfigError),

    /// Error in snapshot configuration validation.
    #[error(transparent)]
    Snapshot(#[from] snapshot::SnapshotConfigError),
}

/// The global configuration for the inmemdb server.
///
/// Loaded once at startup and accessed globally via `Config::global()`.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Configuration for the network server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Configuration for snapshot persistence.
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    /// Returns a reference to the global configuration singleton.
    ///
    /// # Panics
    ///
    /// Panics if `Config::init()` has not been called successfully before
    /// calling this method.
    pub fn global() -> &'static Self {
        CONFIG
            .get()
            .expect("Config is not initialized! Call Config::init() first.")
    }

    /// Initializes the global configuration.
    ///
    /// Loads the configuration from files and environment variables,
    /// validates it, and sets the global singleton. If the configuration is
    /// already initialized, this does nothing and returns `Ok(())`.
    pub fn init() -> Result<(), ConfigError> {
        if CONFIG.get().is_none() {
            info!("Initializing inmemdb configuration");
            let config = Config::load()?;
            let _ = CONFIG.set(config);
        }

        Ok(())
    }

    fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        // 1. Try to load the configuration file
        if let Some(config_file) = Self::find_config_file()? {
            info!(?config_file, "Loading configuration file");
            builder = builder.add_source(config::File::from(config_file).required(true));
        } else {
            info!("No config file found, using defaults and environment variables");
        }

        // 2. Environment variable override
        builder = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR));

        // 3. Build and deserialize
        let config: Self = builder
            .build()
            .map_err(ConfigError::ParseError)?
            .try_deserialize()
            .map_err(ConfigError::ParseError)?;

        // 4. Validate
        config.validate()?;

        debug!(
            host = %config.server.host,
            port = config.server.port,
            max_clients = config.server.max_clients,
            snapshot_path = ?config.snapshot.path,
            "Configuration loaded and validated"
        );

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.snapshot.validate()?;
        Ok(())
    }

    fn find_config_file() -> Result<Option<PathBuf>, ConfigError> {
        // Check environment variable
        if let Ok(path) = env::var(ENV_VAR_CONFIG_FILE) {
            let path = PathBuf::from(path);
            return if !path.exists() {
                Err(ConfigError::FileNotFound { path })
            } else {
                Ok(Some(path))
            };
        }

        // Check working directory
        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Ok(Some(default_path));
        }

        Ok(None)
    }
}

const ENV_PREFIX: &str = "INMEMDB";
const ENV_SEPARATOR: &str = "__";
const ENV_VAR_CONFIG_FILE: &str = "INMEMDB_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./config.toml";

#[cfg(test)]
/// Tests in this module manipulate process-level environment variables
/// (std::env) and the filesystem. Running them in parallel (cargo test's
/// default behavior) causes race conditions and environment variable
/// pollution.
///
/// Run these tests sequentially:
/// `cargo test --package inmemdb-common -- --test-threads=1`
mod tests {
    use super::*;
    use std::fs;

    fn create_test_config_file(path: &str, content: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, content.as_bytes()).expect("Failed to write file");
        path
    }

    #[test]
    fn test_find_config_file_none() {
        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        fs::remove_file(DEFAULT_CONFIG_PATH).ok();

        let result = Config::find_config_file();
        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_find_config_file_env_exists() {
        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        let test_dir = "./test_configs_env_exists";
        let test_config = format!("{}/env_test.toml", test_dir);

        fs::remove_dir_all(test_dir).ok();
        create_test_config_file(&test_config, "[server]\nport = 7000\n");

        unsafe {
            env::set_var(ENV_VAR_CONFIG_FILE, &test_config);
        }

        let result = Config::find_config_file();

        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        fs::remove_dir_all(test_dir).ok();

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Some(PathBuf::from(test_config.as_str())));
    }

    #[test]
    fn test_find_config_file_env_not_exists() {
        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        let non_existent = "./test_configs/non_existent.toml";
        unsafe {
            env::set_var(ENV_VAR_CONFIG_FILE, non_existent);
        }

        let result = Config::find_config_file();

        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        assert!(result.is_err());

        match result.unwrap_err() {
            ConfigError::FileNotFound { path } => {
                assert_eq!(path, PathBuf::from(non_existent));
            }
            _ => panic!("Expected FileNotFound error"),
        }
    }

    #[test]
    fn test_config_custom_values() {
        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        let test_dir = "./test_configs_custom";
        fs::remove_dir_all(test_dir).ok();

        let config_content = r#"
[server]
host = "127.0.0.1"
port = 7399
max_clients = 16

[snapshot]
path = "./test_configs_custom/dump.rdb"
"#;

        let test_config = format!("{}/custom_test.toml", test_dir);
        create_test_config_file(&test_config, config_content);

        unsafe {
            env::set_var(ENV_VAR_CONFIG_FILE, &test_config);
        }

        let result = Config::load();

        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        fs::remove_dir_all(test_dir).ok();

        assert!(result.is_ok(), "Config load failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7399);
        assert_eq!(config.server.max_clients, 16);
        assert_eq!(
            config.snapshot.path,
            PathBuf::from("./test_configs_custom/dump.rdb")
        );
    }

    #[test]
    fn test_config_validation_fail_server() {
        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        let test_dir = "./test_configs_fail_server";
        fs::remove_dir_all(test_dir).ok();

        let config_content = r#"
[server]
host = "not-an-ip"
port = 6399
"#;

        let test_config = format!("{}/validation_fail_server.toml", test_dir);
        create_test_config_file(&test_config, config_content);

        unsafe {
            env::set_var(ENV_VAR_CONFIG_FILE, &test_config);
        }

        let result = Config::load();

        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        fs::remove_dir_all(test_dir).ok();

        assert!(result.is_err(), "Expected error but got Ok");
        match result.unwrap_err() {
            ConfigError::Server(_) => {}
            e => panic!("Expected Server error, got: {:?}", e),
        }
    }

    #[test]
    fn test_config_parse_error() {
        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        let test_dir = "./test_configs_parse_error";
        fs::remove_dir_all(test_dir).ok();

        let config_content = r#"
[server]
port = "not_a_number"
"#;

        let test_config = format!("{}/parse_error_test.toml", test_dir);
        create_test_config_file(&test_config, config_content);
        unsafe {
            env::set_var(ENV_VAR_CONFIG_FILE, &test_config);
        }

        let result = Config::load();

        unsafe {
            env::remove_var(ENV_VAR_CONFIG_FILE);
        }

        fs::remove_dir_all(test_dir).ok();

        assert!(result.is_err());
        match result.unwrap_err() {
            ConfigError::ParseError(_) => {}
            _ => panic!("Expected ParseError"),
        }
    }
}

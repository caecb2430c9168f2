use serde::Deserialize;
use std::net::IpAddr;
use thiserror::Error;

/// Errors that can occur during server configuration validation.
#[derive(Debug, Error)]
pub enum ServerConfigError {
    /// The port number is invalid (e.g., 0).
    #[error("Invalid port: {port}")]
    InvalidPort { port: u16 },

    /// The host address is invalid or cannot be parsed.
    #[error("Invalid host: {host}")]
    InvalidHost { host: String },

    /// The client cap is invalid (e.g., 0).
    #[error("Invalid max_clients: {max_clients}")]
    InvalidMaxClients { max_clients: usize },
}

/// Configuration for the network server.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The host address to bind the server to (e.g., "0.0.0.0" or "127.0.0.1").
    /// Defaults to "0.0.0.0".
    pub host: String,

    /// The port number to listen on.
    /// Must be greater than 0.
    /// Defaults to 6399.
    pub port: u16,

    /// Maximum number of simultaneous client connections. Connections
    /// accepted past this limit are closed immediately.
    /// Defaults to 1024.
    pub max_clients: usize,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 6399;
const DEFAULT_MAX_CLIENTS: usize = 1024;

impl ServerConfig {
    /// Validates the server configuration.
    ///
    /// Checks:
    /// 1. `host` is a valid IP address.
    /// 2. `port` is a valid port number (> 0).
    /// 3. `max_clients` is greater than 0.
    pub(crate) fn validate(&self) -> Result<(), ServerConfigError> {
        self.check_host()?;
        self.check_port()?;
        self.check_max_clients()?;

        Ok(())
    }

    fn check_host(&self) -> Result<(), ServerConfigError> {
        self.host
            .parse::<IpAddr>()
            .map_err(|_| ServerConfigError::InvalidHost {
                host: self.host.clone(),
            })?;

        Ok(())
    }

    fn check_port(&self) -> Result<(), ServerConfigError> {
        match self.port {
            1..=u16::MAX => Ok(()),
            port => Err(ServerConfigError::InvalidPort { port }),
        }
    }

    fn check_max_clients(&self) -> Result<(), ServerConfigError> {
        if self.max_clients == 0 {
            return Err(ServerConfigError::InvalidMaxClients {
                max_clients: self.max_clients,
            });
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

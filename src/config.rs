//! Configuration management for the loan approval server

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the feature record reaches the worker process
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Write the JSON record to the worker's standard input
    #[default]
    Stdin,
    /// Append the JSON record as the last command-line argument
    Argument,
    /// Write the JSON record to a temporary file and append its path
    File,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub worker: WorkerConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context(format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

/// Served model configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Name reported in prediction responses
    pub name: String,
    /// Version reported in prediction and health responses
    pub version: String,
    /// Trained classifier artifact; its presence decides readiness
    pub artifact_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "loan-approval-rf".to_string(),
            version: "1.0.0".to_string(),
            artifact_path: PathBuf::from("/app/model/flask_random_forest.rds"),
        }
    }
}

/// Prediction worker process configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Interpreter to launch per prediction
    pub program: String,
    /// Arguments; empty means `-e <bundled prediction routine>`
    pub args: Vec<String>,
    /// How the record is handed to the worker
    pub input_mode: InputMode,
    /// Per-prediction deadline in milliseconds
    pub timeout_ms: u64,
}

impl WorkerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "Rscript".to_string(),
            args: Vec::new(),
            input_mode: InputMode::Stdin,
            timeout_ms: 30_000,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summary log lines (0 disables the reporter)
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.model.name, "loan-approval-rf");
        assert_eq!(config.worker.program, "Rscript");
        assert_eq!(config.worker.input_mode, InputMode::Stdin);
        assert_eq!(config.worker.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8081

[worker]
input_mode = "file"
timeout_ms = 500
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.worker.input_mode, InputMode::File);
        assert_eq!(config.worker.timeout(), Duration::from_millis(500));
        assert_eq!(config.model.version, "1.0.0");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr().unwrap().port(), 9000);

        let bad = ServerConfig {
            host: "not a host".to_string(),
            port: 1,
        };
        assert!(bad.bind_addr().is_err());
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::RequestSchema;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Listen port (default: 8000)
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path to the ONNX model file, relative to the working directory
    pub path: PathBuf,
    /// Request contract served by this deployment
    pub schema: RequestSchema,
    /// Width of the `[1, k]` input for the `features` schema
    #[serde(default = "default_feature_dim")]
    pub feature_dim: usize,
    /// Serve the mock predictor when every load strategy fails
    #[serde(default = "default_fallback_to_mock")]
    pub fallback_to_mock: bool,
}

fn default_feature_dim() -> usize {
    4
}

fn default_fallback_to_mock() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rotating log files (console only when unset)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("model.path", "working_agricultural_model.onnx")?
            .set_default("model.schema", "agronomic")?
            .set_default("model.feature_dim", 4)?
            .set_default("model.fallback_to_mock", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AGRI_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (AGRI_MODEL__PATH, etc.)
            .add_source(
                Environment::with_prefix("AGRI")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration used when no files or environment are present
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            model: ModelConfig {
                path: PathBuf::from("working_agricultural_model.onnx"),
                schema: RequestSchema::Agronomic,
                feature_dim: default_feature_dim(),
                fallback_to_mock: true,
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }

        if self.model.path.as_os_str().is_empty() {
            errors.push("model.path must not be empty".to_string());
        }

        if self.model.schema == RequestSchema::Features && self.model.feature_dim == 0 {
            errors.push("model.feature_dim must be > 0 for the features schema".to_string());
        }

        if self.logging.level.trim().is_empty() {
            errors.push("logging.level must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

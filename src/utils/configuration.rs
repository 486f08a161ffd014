use crate::core::error::CorrectionError;
use crate::correction::bootstrap::BootstrapSettings;
use crate::correction::multi_start::MultiStartDriver;
use crate::correction::optimizer::OptimizerSettings;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Environment prefix for overrides, e.g. `GASIC__BOOTSTRAP__ITERATIONS=20`
pub const ENVIRONMENT_PREFIX: &str = "GASIC";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_VARIABLE: &str = "GASIC_CONFIG";

/// Supported log output formats
pub const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Complete configuration of a correction job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GasicConfiguration {
    /// Trust-region settings for every optimizer run
    pub optimizer: OptimizerSettings,
    /// Worker pool for the multi-start driver
    pub execution: ExecutionConfig,
    /// Resampling settings
    pub bootstrap: BootstrapSettings,
    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker threads for concurrent optimizer runs
    pub num_threads: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (error, warn, info, debug, trace)
    pub level: String,
    /// Log output format (pretty, compact, json)
    pub format: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            num_threads: MultiStartDriver::default_num_threads(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Errors raised while loading, validating or saving configuration
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration error: {message}")]
    LoadError { message: String },

    #[error("Input/Output error: {message}")]
    IOError { message: String },

    #[error("Validation error: {field} is invalid: {reason}")]
    ValidationError { field: String, reason: String },
}

impl From<ConfigError> for ConfigurationError {
    fn from(err: ConfigError) -> Self {
        ConfigurationError::LoadError {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ConfigurationError {
    fn from(err: std::io::Error) -> Self {
        ConfigurationError::IOError {
            message: err.to_string(),
        }
    }
}

impl From<CorrectionError> for ConfigurationError {
    fn from(err: CorrectionError) -> Self {
        match err {
            CorrectionError::Configuration { field, reason } => {
                ConfigurationError::ValidationError { field, reason }
            }
            other => ConfigurationError::LoadError {
                message: other.to_string(),
            },
        }
    }
}

/// Configuration manager layering defaults, a TOML file and the environment
#[derive(Debug)]
pub struct ConfigurationManager {
    config: GasicConfiguration,
    config_path: Option<PathBuf>,
    environment_prefix: String,
}

impl ConfigurationManager {
    /// Load configuration from the default locations and the environment
    pub fn new() -> Result<Self, ConfigurationError> {
        Self::load_from_default_locations()
    }

    /// Create configuration manager with pure defaults (no file or environment)
    pub fn new_with_defaults() -> Result<Self, ConfigurationError> {
        let manager = Self {
            config: GasicConfiguration::default(),
            config_path: None,
            environment_prefix: ENVIRONMENT_PREFIX.to_string(),
        };

        manager.validate_configuration()?;
        Ok(manager)
    }

    /// Load configuration from a specific TOML file; environment overrides still apply
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigurationError> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = Self::build(Some(&config_path), ENVIRONMENT_PREFIX)?;

        let manager = Self {
            config,
            config_path: Some(config_path),
            environment_prefix: ENVIRONMENT_PREFIX.to_string(),
        };

        manager.validate_configuration()?;
        Ok(manager)
    }

    /// `$GASIC_CONFIG` if set, otherwise an optional `gasic.toml` in the working directory
    fn load_from_default_locations() -> Result<Self, ConfigurationError> {
        let explicit = env::var(CONFIG_PATH_VARIABLE).ok().map(PathBuf::from);
        if explicit.is_none() {
            info!("No {} set, looking for ./gasic.toml", CONFIG_PATH_VARIABLE);
        }

        let config = Self::build(explicit.as_deref(), ENVIRONMENT_PREFIX)?;
        let manager = Self {
            config,
            config_path: explicit,
            environment_prefix: ENVIRONMENT_PREFIX.to_string(),
        };

        manager.validate_configuration()?;
        Ok(manager)
    }

    fn build(path: Option<&Path>, prefix: &str) -> Result<GasicConfiguration, ConfigurationError> {
        let mut config_builder = Config::builder();

        config_builder = match path {
            Some(path) => config_builder.add_source(File::from(path).required(true)),
            None => config_builder.add_source(File::with_name("gasic").required(false)),
        };

        config_builder = config_builder.add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );

        Ok(config_builder.build()?.try_deserialize()?)
    }

    /// Validate configuration parameters
    pub fn validate_configuration(&self) -> Result<(), ConfigurationError> {
        info!("🔍 Validating configuration...");

        self.config.optimizer.validate()?;
        self.config.bootstrap.validate()?;

        if self.config.execution.num_threads == 0 {
            return Err(ConfigurationError::ValidationError {
                field: "execution.num_threads".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        let available_threads = num_cpus::get();
        if self.config.execution.num_threads > available_threads * 2 {
            warn!(
                "Configured threads ({}) exceeds available cores ({})",
                self.config.execution.num_threads, available_threads
            );
        }

        if !LOG_FORMATS.contains(&self.config.logging.format.as_str()) {
            return Err(ConfigurationError::ValidationError {
                field: "logging.format".to_string(),
                reason: format!(
                    "must be one of {}, got '{}'",
                    LOG_FORMATS.join(", "),
                    self.config.logging.format
                ),
            });
        }

        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.config.logging.level) {
            return Err(ConfigurationError::ValidationError {
                field: "logging.level".to_string(),
                reason: e.to_string(),
            });
        }

        info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Install a global tracing subscriber according to the logging section.
    /// `RUST_LOG` takes precedence over the configured level.
    pub fn setup_logging(&self) -> Result<(), ConfigurationError> {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Check if global subscriber is already set
        if tracing::dispatcher::has_been_set() {
            info!("⏭️  Logging already initialized, skipping setup");
            return Ok(());
        }

        let level = &self.config.logging.level;
        let format = &self.config.logging.format;

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let subscriber = tracing_subscriber::registry().with(env_filter);

        match format.as_str() {
            "json" => {
                let layer = fmt::layer().json().with_target(true).with_thread_ids(true);
                let _ = tracing::subscriber::set_global_default(subscriber.with(layer));
            }
            "compact" => {
                let layer = fmt::layer().compact().with_thread_names(true);
                let _ = tracing::subscriber::set_global_default(subscriber.with(layer));
            }
            _ => {
                // "pretty" or default - without timestamps for cleaner console output
                let layer = fmt::layer().without_time().with_target(false);
                let _ = tracing::subscriber::set_global_default(subscriber.with(layer));
            }
        }

        info!(
            "📝 Logging initialized with level: {}, format: {}",
            level, format
        );
        Ok(())
    }

    /// Get configuration reference
    pub fn config(&self) -> &GasicConfiguration {
        &self.config
    }

    /// Get mutable configuration reference
    pub fn config_mut(&mut self) -> &mut GasicConfiguration {
        &mut self.config
    }

    /// File the configuration was loaded from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn environment_prefix(&self) -> &str {
        &self.environment_prefix
    }

    /// Save current configuration to file
    pub fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigurationError> {
        write_toml(&self.config, path.as_ref())?;
        info!("💾 Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Write the built-in defaults as a TOML template
    pub fn generate_config_template<P: AsRef<Path>>(path: P) -> Result<(), ConfigurationError> {
        write_toml(&GasicConfiguration::default(), path.as_ref())
    }
}

impl Default for ConfigurationManager {
    fn default() -> Self {
        Self {
            config: GasicConfiguration::default(),
            config_path: None,
            environment_prefix: ENVIRONMENT_PREFIX.to_string(),
        }
    }
}

fn write_toml(config: &GasicConfiguration, path: &Path) -> Result<(), ConfigurationError> {
    let toml_string =
        toml::to_string_pretty(config).map_err(|e| ConfigurationError::LoadError {
            message: format!("Failed to serialize configuration: {e}"),
        })?;

    std::fs::write(path, toml_string).map_err(|e| ConfigurationError::IOError {
        message: format!("Failed to write configuration file {}: {e}", path.display()),
    })
}

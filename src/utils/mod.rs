pub mod configuration;
pub mod format_writers;

pub use configuration::{ConfigurationError, ConfigurationManager, GasicConfiguration};

//! # miflo-core
//!
//! Shared foundation for the miflo migration tool: environment-driven
//! configuration and logging setup.

pub mod app_config;
pub mod logging;

pub use app_config::{AppConfig, AppConfigTrait, ConfigError, LogFormat, LoggingConfig};
pub use logging::init_logging;

mod app_config;

pub use app_config::{AppConfig, CoordinatorConfig, HttpConfig, LogFormat, LoggingConfig};

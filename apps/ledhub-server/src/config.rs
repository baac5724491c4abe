//! Server deployment configuration.
//!
//! Deployment knobs (bind port, log level, config file path, plans
//! directory) live here, separate from the checked-in device topology in
//! `ledhub_core::AppConfig`. Supports CLI flags with environment variable
//! fallbacks.

use std::path::PathBuf;

/// Deployment-level server configuration, not loaded from YAML.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the YAML topology/transport config file.
    pub config_path: PathBuf,
    /// Port to bind the operator HTTP/WS surface to.
    pub bind_port: u16,
    /// Log level filter.
    pub log_level: log::LevelFilter,
    /// Directory holding plan JSON files.
    pub plans_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.yaml"),
            bind_port: 8080,
            log_level: log::LevelFilter::Info,
            plans_dir: PathBuf::from("plans"),
        }
    }
}

//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("backend {backend:?} declares no routes")]
    NoRoutes { backend: String },

    #[error("route in backend {backend:?} references unknown auth_group {group:?}")]
    UnknownAuthGroup { backend: String, group: String },
}

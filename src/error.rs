//! Error taxonomy. One `thiserror` enum per module boundary, matching the
//! policy described in the error-handling design: nothing here is retried
//! automatically except storage open, which the storage manager bounds itself.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
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

    #[error("port {0} is out of range [1024, 65535]")]
    PortOutOfRange(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to open registry file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed registry line {line_no}: {text:?}")]
    MalformedLine { line_no: usize, text: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to open database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to initialise schema: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("failed to insert reading: {0}")]
    Insert(#[source] rusqlite::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to start audit logger: {0}")]
    Logger(#[source] std::io::Error),

    #[error("a worker thread failed")]
    WorkerFailed,
}

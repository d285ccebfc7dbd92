use std::path::PathBuf;

use thiserror::Error;

use crate::core::cache::CacheError;
use crate::core::runtime::RuntimeError;
use crate::core::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
    /// The runtime has no container for a workload the store still tracks.
    #[error("Process `{name}` not found in the container runtime.")]
    ProcessNotFound { name: String },
    /// The runtime has a container that the durable store does not track.
    #[error("Process `{name}` not found in the datastore.")]
    ProcessNotFoundDatastore { name: String },
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Failed to encode record for `{name}`: {source}")]
    EncodeRecord {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Stored record `{key}` could not be decoded: {source}")]
    DecodeRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Settings rejected: {message}")]
    InvalidSettings { message: String },
    #[error("Failed to read configuration file at {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration at {path} could not be parsed: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Configuration validation failed for {path}:\n{message}")]
    InvalidConfig { path: PathBuf, message: String },
    #[error("The configuration path {path} does not exist or is not readable.")]
    ExplicitConfigMissing { path: PathBuf },
    #[error("Failed to determine the current working directory: {source}")]
    WorkingDirectoryUnavailable {
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read input from {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// True when the runtime does not know the workload (callers treat it as stopped).
    pub fn is_process_not_found(&self) -> bool {
        matches!(self, Error::ProcessNotFound { .. })
    }

    /// True when the runtime knows the workload but the store does not (orphaned container).
    pub fn is_orphaned(&self) -> bool {
        matches!(self, Error::ProcessNotFoundDatastore { .. })
    }
}

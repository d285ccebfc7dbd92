//! Container runtime capability consumed by the process manager.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::record::ContainerState;

pub mod docker;
pub mod memory;

pub use docker::DockerEngine;
pub use memory::MemoryRuntime;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container `{name}` not found.")]
    NotFound { name: String },
    #[error("A container named `{name}` already exists.")]
    Conflict { name: String },
    #[error("Container runtime request failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Container runtime unreachable: {message}")]
    Transport { message: String },
    #[error("Container runtime returned an unexpected payload: {message}")]
    Payload { message: String },
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Operations the process manager needs from a container engine.
///
/// Implementations must classify "no such container" as [`RuntimeError::NotFound`]
/// for `get`, `start`, `stop` and `logs`.
pub trait ContainerRuntime: Send + Sync {
    /// Remove stopped containers.
    fn prune(&self) -> RuntimeResult<PruneReport>;

    /// Create a container and return its id.
    fn create(&self, request: &CreateRequest) -> RuntimeResult<String>;

    fn start(&self, name: &str) -> RuntimeResult<()>;

    /// Stop gracefully, killing after `kill_after`.
    fn stop(&self, id: &str, kill_after: Duration) -> RuntimeResult<()>;

    fn get(&self, name: &str) -> RuntimeResult<ContainerSummary>;

    /// Return at most `max_lines` of output produced since `since` (unix seconds).
    fn logs(&self, id: &str, max_lines: usize, since: i64) -> RuntimeResult<Vec<String>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub space_reclaimed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub state: Option<ContainerState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub host_config: HostConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    pub log_config: LogConfig,
    pub restart_policy: RestartPolicy,
    pub cpu_shares: i64,
    pub network_mode: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogConfig {
    #[serde(rename = "Type")]
    pub driver: String,
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mount {
    #[serde(rename = "Type")]
    pub kind: String,
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
}

impl Mount {
    /// Read-write bind mount of `path` at the same location inside the container.
    pub fn bind_same_path(path: PathBuf) -> Self {
        Self {
            kind: "bind".to_string(),
            source: path.clone(),
            target: path,
            read_only: false,
        }
    }
}

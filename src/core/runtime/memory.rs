use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::core::record::ContainerState;

use super::{
    ContainerRuntime, ContainerSummary, CreateRequest, HostConfig, LogConfig, PruneReport,
    RestartPolicy, RuntimeError, RuntimeResult,
};

/// In-process container runtime. Containers live in a map keyed by name and
/// follow the engine's created → running → exited lifecycle.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    containers: Mutex<BTreeMap<String, MemoryContainer>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    fail_start: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct MemoryContainer {
    pub id: String,
    pub name: String,
    pub request: CreateRequest,
    pub status: String,
    pub logs: Vec<String>,
    pub stop_grace: Option<Duration>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a transport error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `start` fail with an engine error until reset.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn container(&self, name: &str) -> Option<MemoryContainer> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Append output lines to a container's log.
    pub fn push_logs<I, S>(&self, name: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(container) = self.lock().get_mut(name) {
            container.logs.extend(lines.into_iter().map(Into::into));
        }
    }

    /// Drop a container without going through stop, as an operator `rm -f` would.
    pub fn remove(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// Register a container that was not created through this runtime's `create`.
    pub fn insert_running(&self, name: &str, image: &str) -> String {
        let id = self.allocate_id();
        let request = CreateRequest {
            name: name.to_string(),
            image: image.to_string(),
            env: Vec::new(),
            host_config: HostConfig {
                log_config: LogConfig {
                    driver: "json-file".to_string(),
                    config: BTreeMap::new(),
                },
                restart_policy: RestartPolicy {
                    name: "no".to_string(),
                },
                cpu_shares: 0,
                network_mode: "default".to_string(),
                mounts: Vec::new(),
            },
        };
        self.lock().insert(
            name.to_string(),
            MemoryContainer {
                id: id.clone(),
                name: name.to_string(),
                request,
                status: "running".to_string(),
                logs: Vec::new(),
                stop_grace: None,
            },
        );
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, MemoryContainer>> {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn allocate_id(&self) -> String {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{seq:064x}")
    }

    fn check_available(&self) -> RuntimeResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RuntimeError::Transport {
                message: "memory runtime marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl ContainerRuntime for MemoryRuntime {
    fn prune(&self) -> RuntimeResult<PruneReport> {
        self.check_available()?;
        let mut containers = self.lock();
        let stopped: Vec<String> = containers
            .values()
            .filter(|container| container.status != "running")
            .map(|container| container.name.clone())
            .collect();
        let mut deleted = Vec::with_capacity(stopped.len());
        for name in stopped {
            if let Some(container) = containers.remove(&name) {
                deleted.push(container.id);
            }
        }
        Ok(PruneReport {
            deleted,
            space_reclaimed: 0,
        })
    }

    fn create(&self, request: &CreateRequest) -> RuntimeResult<String> {
        self.check_available()?;
        let mut containers = self.lock();
        if containers.contains_key(&request.name) {
            return Err(RuntimeError::Conflict {
                name: request.name.clone(),
            });
        }
        let id = self.allocate_id();
        containers.insert(
            request.name.clone(),
            MemoryContainer {
                id: id.clone(),
                name: request.name.clone(),
                request: request.clone(),
                status: "created".to_string(),
                logs: Vec::new(),
                stop_grace: None,
            },
        );
        Ok(id)
    }

    fn start(&self, name: &str) -> RuntimeResult<()> {
        self.check_available()?;
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RuntimeError::Api {
                status: 500,
                message: format!("cannot start container {name}"),
            });
        }
        let mut containers = self.lock();
        let container = containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound {
                name: name.to_string(),
            })?;
        container.status = "running".to_string();
        Ok(())
    }

    fn stop(&self, id: &str, kill_after: Duration) -> RuntimeResult<()> {
        self.check_available()?;
        let mut containers = self.lock();
        let container = containers
            .values_mut()
            .find(|container| container.id == id)
            .ok_or_else(|| RuntimeError::NotFound {
                name: id.to_string(),
            })?;
        container.status = "exited".to_string();
        container.stop_grace = Some(kill_after);
        Ok(())
    }

    fn get(&self, name: &str) -> RuntimeResult<ContainerSummary> {
        self.check_available()?;
        let containers = self.lock();
        let container = containers.get(name).ok_or_else(|| RuntimeError::NotFound {
            name: name.to_string(),
        })?;
        Ok(ContainerSummary {
            id: container.id.clone(),
            state: Some(ContainerState {
                status: container.status.clone(),
                running: container.status == "running",
                ..ContainerState::default()
            }),
        })
    }

    fn logs(&self, id: &str, max_lines: usize, _since: i64) -> RuntimeResult<Vec<String>> {
        self.check_available()?;
        let containers = self.lock();
        let container = containers
            .values()
            .find(|container| container.id == id)
            .ok_or_else(|| RuntimeError::NotFound {
                name: id.to_string(),
            })?;
        let skip = container.logs.len().saturating_sub(max_lines);
        Ok(container.logs[skip..].to_vec())
    }
}

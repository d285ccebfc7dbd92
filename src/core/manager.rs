//! Lifecycle and reconciliation of ingest workloads.
//!
//! The manager is the only component that talks to the container runtime, the
//! durable store and the status cache. The runtime is authoritative for
//! liveness; the store is authoritative for configuration (`rtsp_endpoint`,
//! `rtmp_endpoint`, `image_tag`) and history (`created`).
//!
//! Without [`ProcessManager::with_name_locks`] no mutual exclusion is applied:
//! concurrent calls on the same name can race, e.g. a `stop` deleting the record
//! while a `list` refresh is about to write it back.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

use super::cache::StatusCache;
use super::context::CallContext;
use super::locks::{NameGuard, NameLocks};
use super::record::{
    MAX_LOG_LINES, PROCESS_PREFIX, STATUS_RUNNING, STATUS_UNKNOWN, StreamingCacheEntry,
    StreamingStatus, WorkloadRecord, container_name, now_millis,
};
use super::runtime::{
    ContainerRuntime, CreateRequest, HostConfig, LogConfig, Mount, RestartPolicy, RuntimeError,
};
use super::store::ProcessStore;

pub const DEFAULT_IMAGE: &str = "chryscloud/chrysedgeproxy:0.0.2";
pub const DEFAULT_NETWORK: &str = "ingestnet";

/// Equal weight for every workload.
const CPU_SHARES: i64 = 1024;
const LOG_MAX_FILES: &str = "3";
const LOG_MAX_SIZE: &str = "3M";

/// Knobs the manager reads when building workloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    pub default_image: String,
    pub network: String,
    pub in_memory_buffer: u32,
    /// Host folder bind-mounted into every workload when on-disk buffering is enabled.
    pub disk_buffer: Option<PathBuf>,
    pub stop_grace: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            default_image: DEFAULT_IMAGE.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            in_memory_buffer: 1,
            disk_buffer: None,
            stop_grace: Duration::from_secs(5),
        }
    }
}

pub struct ProcessManager {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn ProcessStore>,
    cache: Arc<dyn StatusCache>,
    settings: ManagerSettings,
    locks: Option<NameLocks>,
}

impl ProcessManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn ProcessStore>,
        cache: Arc<dyn StatusCache>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            runtime,
            store,
            cache,
            settings,
            locks: None,
        }
    }

    /// Serialize start, stop, refresh write-back, list garbage collection and
    /// updates per workload name.
    pub fn with_name_locks(mut self) -> Self {
        self.locks = Some(NameLocks::new());
        self
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Create and start the workload container, then persist its record.
    ///
    /// No rollback is attempted: a container that was created but failed to
    /// start is left for the next prune.
    pub fn start(&self, mut record: WorkloadRecord) -> Result<WorkloadRecord> {
        if record.name.trim().is_empty() || record.rtsp_endpoint.trim().is_empty() {
            return Err(Error::InvalidArgument {
                message: "workload name and rtsp endpoint are required".to_string(),
            });
        }
        let image = match record.image_tag.as_deref() {
            Some(tag) if !tag.is_empty() => tag.to_string(),
            _ => self.settings.default_image.clone(),
        };
        record.image_tag = Some(image.clone());

        let _guard = self.guard(&record.name);

        self.prune()?;

        let request = CreateRequest {
            name: container_name(&record.name),
            image,
            env: self.environment(&record),
            host_config: self.host_config(),
        };
        self.runtime.create(&request).map_err(|err| {
            error!(name = %record.name, error = %err, "failed to create container");
            err
        })?;
        self.runtime.start(&request.name).map_err(|err| {
            error!(name = %record.name, error = %err, "failed to start container");
            err
        })?;

        record.status = STATUS_RUNNING.to_string();
        record.created = now_millis();
        record.modified = record.created;

        record.streaming_status = None;
        if record.relay_endpoint().is_some() {
            let entry = StreamingCacheEntry {
                last_access: now_millis(),
                streaming: true,
            };
            self.cache
                .hset(&StreamingCacheEntry::key(&record.name), &entry.fields())
                .map_err(|err| {
                    error!(name = %record.name, error = %err, "failed to store relay flags in cache");
                    err
                })?;
            record.streaming_status = Some(StreamingStatus { streaming: true });
        }

        self.persist(&record)?;
        info!(name = %record.name, image = ?record.image_tag, "workload started");
        Ok(record)
    }

    /// Stop the workload container and forget its record.
    ///
    /// When the runtime no longer knows the container the record is left in
    /// place and [`Error::ProcessNotFound`] is returned; the next [`list`]
    /// removes it.
    ///
    /// [`list`]: ProcessManager::list
    pub fn stop(&self, name: &str) -> Result<()> {
        let _guard = self.guard(name);

        let container = match self.runtime.get(&container_name(name)) {
            Ok(container) => container,
            Err(err) if err.is_not_found() => {
                info!(name, "container not found to be stopped");
                return Err(Error::ProcessNotFound {
                    name: name.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        match self.runtime.stop(&container.id, self.settings.stop_grace) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                warn!(name, "container disappeared while stopping, probably stopped before");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        self.store.delete(PROCESS_PREFIX, name).map_err(|err| {
            error!(name, error = %err, "failed to delete stopped workload record");
            err
        })?;

        self.prune()?;
        info!(name, "workload stopped");
        Ok(())
    }

    /// Refresh the stored record from live runtime state and return it.
    pub fn info(&self, name: &str) -> Result<WorkloadRecord> {
        let _guard = self.guard(name);
        self.refresh(name)
    }

    /// Refresh every stored workload. Records whose container is gone are
    /// dropped from the result and deleted once the whole scan has succeeded;
    /// any other failure aborts the call.
    pub fn list(&self) -> Result<Vec<WorkloadRecord>> {
        let records = self.load_records()?;

        let mut live = Vec::with_capacity(records.len());
        let mut stale = Vec::new();
        for record in records {
            match self.info(&record.name) {
                Ok(refreshed) => live.push(refreshed),
                Err(err) if err.is_process_not_found() => {
                    warn!(name = %record.name, "container gone, scheduling record removal");
                    stale.push(record.name);
                }
                Err(err) => {
                    error!(name = %record.name, error = %err, "failed to get process info");
                    return Err(err);
                }
            }
        }

        for name in stale {
            let _guard = self.guard(&name);
            if self.locks.is_some() && self.runtime.get(&container_name(&name)).is_ok() {
                // Started again between the scan and the cleanup.
                debug!(name = %name, "skipping removal of restarted workload");
                continue;
            }
            self.store.delete(PROCESS_PREFIX, &name).map_err(|err| {
                error!(name = %name, error = %err, "failed to delete process record");
                err
            })?;
            info!(name = %name, "removed record of vanished workload");
        }

        Ok(live)
    }

    /// Push every live workload to `found` as it is refreshed. Vanished
    /// workloads are skipped without touching the store. Cancellation is checked
    /// before each record and ends the scan successfully.
    pub fn list_stream<F>(&self, ctx: &CallContext, mut found: F) -> Result<()>
    where
        F: FnMut(WorkloadRecord) -> Result<()>,
    {
        let records = self.load_records()?;

        for record in records {
            if let Some(reason) = ctx.err() {
                warn!(?reason, "list stream context is done");
                return Ok(());
            }
            let refreshed = match self.info(&record.name) {
                Ok(refreshed) => refreshed,
                Err(err) if err.is_process_not_found() => {
                    debug!(name = %record.name, "skipping workload without container");
                    continue;
                }
                Err(err) => {
                    error!(name = %record.name, error = %err, "failed to get process info");
                    return Err(err);
                }
            };
            found(refreshed).map_err(|err| {
                error!(name = %record.name, error = %err, "failed to deliver process");
                err
            })?;
        }
        Ok(())
    }

    /// Persist a caller-supplied record as-is, stamping `modified`.
    pub fn update_process_info(&self, mut record: WorkloadRecord) -> Result<WorkloadRecord> {
        if record.name.trim().is_empty() {
            return Err(Error::InvalidArgument {
                message: "workload name is required".to_string(),
            });
        }
        let _guard = self.guard(&record.name);
        record.touch();
        self.persist(&record)?;
        // TODO: mirror streaming_status into the status cache once the worker reads it back.
        Ok(record)
    }

    fn refresh(&self, name: &str) -> Result<WorkloadRecord> {
        let container = match self.runtime.get(&container_name(name)) {
            Ok(container) => container,
            Err(err) if err.is_not_found() => {
                info!(name, "container not found");
                return Err(Error::ProcessNotFound {
                    name: name.to_string(),
                });
            }
            Err(err) => {
                error!(name, error = %err, "failed to retrieve container");
                return Err(err.into());
            }
        };

        let logs = self
            .runtime
            .logs(&container.id, MAX_LOG_LINES, 0)
            .map_err(|err| {
                error!(name, error = %err, "failed to retrieve container logs");
                err
            })?;

        let bytes = match self.store.get(PROCESS_PREFIX, name) {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => {
                warn!(name, "runtime container has no stored record");
                return Err(Error::ProcessNotFoundDatastore {
                    name: name.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let mut record = decode(name, &bytes)?;

        record.container_id = Some(container.id);
        match container.state {
            Some(state) if !state.status.is_empty() => {
                record.status = state.status.clone();
                record.state = Some(state);
            }
            state => {
                record.status = STATUS_UNKNOWN.to_string();
                record.state = state;
            }
        }
        record.replace_logs(logs);
        record.touch();

        self.persist(&record)?;
        Ok(record)
    }

    fn load_records(&self) -> Result<Vec<WorkloadRecord>> {
        let values = self.store.list(PROCESS_PREFIX).map_err(|err| {
            error!(error = %err, "failed to list workload records");
            err
        })?;
        values
            .iter()
            .enumerate()
            .map(|(idx, bytes)| decode(&format!("{PROCESS_PREFIX}[{idx}]"), bytes))
            .collect()
    }

    fn persist(&self, record: &WorkloadRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record).map_err(|source| Error::EncodeRecord {
            name: record.name.clone(),
            source,
        })?;
        self.store
            .put(PROCESS_PREFIX, &record.name, &bytes)
            .map_err(|err| {
                error!(name = %record.name, error = %err, "failed to store process record");
                err.into()
            })
    }

    fn prune(&self) -> std::result::Result<(), RuntimeError> {
        let report = self.runtime.prune().map_err(|err| {
            error!(error = %err, "container pruning failed");
            err
        })?;
        info!(
            deleted = report.deleted.len(),
            reclaimed = report.space_reclaimed,
            "container prune complete"
        );
        Ok(())
    }

    fn host_config(&self) -> HostConfig {
        let mut log_options = BTreeMap::new();
        log_options.insert("max-file".to_string(), LOG_MAX_FILES.to_string());
        log_options.insert("max-size".to_string(), LOG_MAX_SIZE.to_string());

        HostConfig {
            log_config: LogConfig {
                driver: "json-file".to_string(),
                config: log_options,
            },
            restart_policy: RestartPolicy {
                name: "always".to_string(),
            },
            cpu_shares: CPU_SHARES,
            network_mode: self.settings.network.clone(),
            mounts: self
                .settings
                .disk_buffer
                .iter()
                .cloned()
                .map(Mount::bind_same_path)
                .collect(),
        }
    }

    fn environment(&self, record: &WorkloadRecord) -> Vec<String> {
        let mut env = vec![
            format!("rtsp_endpoint={}", record.rtsp_endpoint),
            format!("device_id={}", record.name),
            format!("in_memory_buffer={}", self.settings.in_memory_buffer),
        ];
        if let Some(relay) = record.relay_endpoint() {
            env.push(format!("rtmp_endpoint={relay}"));
        }
        if let Some(folder) = &self.settings.disk_buffer {
            env.push(format!("disk_buffer_path={}", folder.display()));
        }
        env.push("PYTHONUNBUFFERED=0".to_string());
        env
    }

    fn guard(&self, name: &str) -> Option<NameGuard<'_>> {
        self.locks.as_ref().map(|locks| locks.lock(name))
    }
}

fn decode(key: &str, bytes: &[u8]) -> Result<WorkloadRecord> {
    serde_json::from_slice(bytes).map_err(|source| {
        error!(key, error = %source, "failed to decode stored process");
        Error::DecodeRecord {
            key: key.to_string(),
            source,
        }
    })
}

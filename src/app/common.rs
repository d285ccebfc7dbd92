use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::{CacheBackend, IngestConfig};
use crate::core::cache::{FileCache, MemoryCache, RedisCache, StatusCache};
use crate::core::manager::ProcessManager;
use crate::core::runtime::DockerEngine;
use crate::core::settings::SettingsManager;
use crate::core::store::FileStore;
use crate::error::{Error, Result};

/// Wire the Docker engine, file store and configured cache into a manager.
pub fn build_manager(config: &IngestConfig) -> Result<ProcessManager> {
    let runtime = Arc::new(DockerEngine::connect(
        &config.runtime.address,
        &config.runtime.api_version,
        config.runtime.timeout,
    )?);
    let store = Arc::new(FileStore::new(config.storage.root.clone()));
    let cache: Arc<dyn StatusCache> = match config.cache.backend {
        CacheBackend::Redis => Arc::new(RedisCache::open(
            &config.cache.url,
            config.runtime.timeout,
        )?),
        CacheBackend::File => Arc::new(FileCache::new(config.cache.root.clone())),
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
    };
    debug!(
        runtime = %config.runtime.address,
        store = %config.storage.root.display(),
        locking = config.locking.per_name,
        "process manager configured"
    );

    let manager = ProcessManager::new(runtime, store, cache, config.manager_settings());
    Ok(if config.locking.per_name {
        manager.with_name_locks()
    } else {
        manager
    })
}

pub fn build_settings(config: &IngestConfig) -> SettingsManager {
    SettingsManager::new(Arc::new(FileStore::new(config.storage.root.clone())))
}

pub fn emit_config_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("Warning: {warning}");
    }
}

/// Read a whole input document from `path`, or stdin when `path` is `-`.
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|source| Error::ReadInput {
                path: path.to_path_buf(),
                source,
            })?;
        return Ok(buffer);
    }
    fs::read_to_string(path).map_err(|source| Error::ReadInput {
        path: path.to_path_buf(),
        source,
    })
}

pub fn stdout_is_terminal() -> bool {
    io::stdout().is_terminal()
}

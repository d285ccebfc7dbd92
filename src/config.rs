use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use redis::IntoConnectionInfo;
use serde::Deserialize;

use crate::core::manager::{DEFAULT_IMAGE, DEFAULT_NETWORK, ManagerSettings};
use crate::core::runtime::docker::{EngineAddress, parse_api_version};
use crate::error::{Error, Result};
use crate::logging::LoggingConfig;

/// Environment variable consulted when `--config` is not given.
pub const CONFIG_ENV: &str = "INGESTD_CONFIG";
/// File picked up from the working directory when nothing else is configured.
pub const DEFAULT_CONFIG_FILE: &str = "ingestd.toml";

pub const DEFAULT_RUNTIME_ADDRESS: &str = "unix:///var/run/docker.sock";
pub const DEFAULT_API_VERSION: &str = "v1.41";
pub const DEFAULT_STORAGE_ROOT: &str = "/var/lib/ingestd";
pub const DEFAULT_CACHE_URL: &str = "redis://127.0.0.1:6379/";
pub const DEFAULT_CACHE_ROOT: &str = "/dev/shm/ingestd";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// `None` when no file was found and built-in defaults are in use.
    pub file_path: Option<PathBuf>,
    pub runtime: RuntimeConfig,
    pub buffer: BufferConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub locking: LockingConfig,
    pub logging: LoggingConfig,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub address: String,
    pub api_version: String,
    pub network: String,
    pub default_image: String,
    pub stop_grace: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    pub in_memory: u32,
    /// Set only when on-disk buffering is enabled.
    pub on_disk_folder: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    File,
    Memory,
}

impl CacheBackend {
    fn parse(input: &str) -> Option<Self> {
        match input {
            "redis" => Some(CacheBackend::Redis),
            "file" => Some(CacheBackend::File),
            "memory" => Some(CacheBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Server used by the `redis` backend.
    pub url: String,
    /// Directory used by the `file` backend.
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockingConfig {
    pub per_name: bool,
}

impl IngestConfig {
    /// Built-in defaults, used when no configuration file exists.
    pub fn synthetic() -> Self {
        Self {
            file_path: None,
            runtime: RuntimeConfig {
                address: DEFAULT_RUNTIME_ADDRESS.to_string(),
                api_version: DEFAULT_API_VERSION.to_string(),
                network: DEFAULT_NETWORK.to_string(),
                default_image: DEFAULT_IMAGE.to_string(),
                stop_grace: Duration::from_secs(5),
                timeout: Duration::from_secs(30),
            },
            buffer: BufferConfig {
                in_memory: 1,
                on_disk_folder: None,
            },
            storage: StorageConfig {
                root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            },
            cache: CacheConfig {
                backend: CacheBackend::Redis,
                url: DEFAULT_CACHE_URL.to_string(),
                root: PathBuf::from(DEFAULT_CACHE_ROOT),
            },
            locking: LockingConfig::default(),
            logging: LoggingConfig::default(),
            warnings: Vec::new(),
        }
    }

    /// The subset of settings the process manager consumes.
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            default_image: self.runtime.default_image.clone(),
            network: self.runtime.network.clone(),
            in_memory_buffer: self.buffer.in_memory,
            disk_buffer: self.buffer.on_disk_folder.clone(),
            stop_grace: self.runtime.stop_grace,
        }
    }
}

/// Resolve configuration from `--config`, then `INGESTD_CONFIG`, then
/// `./ingestd.toml`, falling back to built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<IngestConfig> {
    let cwd = env::current_dir().map_err(|source| Error::WorkingDirectoryUnavailable { source })?;
    resolve_config_in(explicit, &cwd)
}

fn resolve_config_in(explicit: Option<&Path>, cwd: &Path) -> Result<IngestConfig> {
    let requested = explicit.map(Path::to_path_buf).or_else(|| {
        env::var_os(CONFIG_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    });

    if let Some(path) = requested {
        let path = if path.is_absolute() {
            path
        } else {
            cwd.join(path)
        };
        if !path.is_file() {
            return Err(Error::ExplicitConfigMissing { path });
        }
        return load_config(&path);
    }

    let discovered = cwd.join(DEFAULT_CONFIG_FILE);
    if discovered.is_file() {
        load_config(&discovered)
    } else {
        Ok(IngestConfig::synthetic())
    }
}

pub fn load_config(path: &Path) -> Result<IngestConfig> {
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let value: toml::Value = toml::from_str(&contents).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let warnings = detect_unknown_fields(&value);

    let raw = RawConfig::deserialize(value).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    raw.into_validated(path, warnings)
}

const SECTIONS: [(&str, &[&str]); 6] = [
    (
        "runtime",
        &[
            "address",
            "api_version",
            "network",
            "default_image",
            "stop_grace_secs",
            "timeout_secs",
        ],
    ),
    ("buffer", &["in_memory", "on_disk", "on_disk_folder"]),
    ("storage", &["root"]),
    ("cache", &["backend", "url", "root"]),
    ("locking", &["per_name"]),
    ("logging", &["level", "format"]),
];

fn detect_unknown_fields(value: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let toml::Value::Table(table) = value else {
        return warnings;
    };

    let allowed_root: Vec<&str> = SECTIONS.iter().map(|(name, _)| *name).collect();
    warn_table(table, &allowed_root, "root", &mut warnings);

    for (section, allowed) in SECTIONS {
        match table.get(section) {
            Some(toml::Value::Table(inner)) => {
                warn_table(inner, allowed, &format!("[{section}]"), &mut warnings)
            }
            Some(_) => warnings.push(format!("Expected [{section}] to be a table.")),
            None => {}
        }
    }
    warnings
}

fn warn_table(
    table: &toml::map::Map<String, toml::Value>,
    allowed: &[&str],
    context: &str,
    warnings: &mut Vec<String>,
) {
    for key in table.keys() {
        if !allowed.contains(&key.as_str()) {
            warnings.push(format!(
                "Unknown field `{key}` at {context}; this value will be ignored."
            ));
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    runtime: RawRuntime,
    #[serde(default)]
    buffer: RawBuffer,
    #[serde(default)]
    storage: RawStorage,
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    locking: RawLocking,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RawRuntime {
    address: Option<String>,
    api_version: Option<String>,
    network: Option<String>,
    default_image: Option<String>,
    stop_grace_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBuffer {
    in_memory: Option<u32>,
    on_disk: Option<bool>,
    on_disk_folder: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStorage {
    root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCache {
    backend: Option<String>,
    url: Option<String>,
    root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLocking {
    per_name: Option<bool>,
}

impl RawConfig {
    fn into_validated(self, path: &Path, warnings: Vec<String>) -> Result<IngestConfig> {
        let defaults = IngestConfig::synthetic();
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut problems = Vec::new();

        let address = self.runtime.address.unwrap_or(defaults.runtime.address);
        if EngineAddress::parse(&address).is_none() {
            problems.push(format!(
                "`runtime.address` must be a unix://, http:// or tcp:// address of the Docker Engine API, got `{address}`."
            ));
        }
        let api_version = self
            .runtime
            .api_version
            .unwrap_or(defaults.runtime.api_version);
        if parse_api_version(&api_version).is_none() {
            problems.push(format!(
                "`runtime.api_version` must look like `v1.41`, got `{api_version}`."
            ));
        }
        let network = non_empty(
            self.runtime.network,
            defaults.runtime.network,
            "runtime.network",
            &mut problems,
        );
        let default_image = non_empty(
            self.runtime.default_image,
            defaults.runtime.default_image,
            "runtime.default_image",
            &mut problems,
        );
        let stop_grace = self
            .runtime
            .stop_grace_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.runtime.stop_grace);
        let timeout = match self.runtime.timeout_secs {
            Some(0) => {
                problems.push("`runtime.timeout_secs` must be greater than zero.".to_string());
                defaults.runtime.timeout
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.runtime.timeout,
        };

        let in_memory = match self.buffer.in_memory {
            Some(0) => {
                problems.push("`buffer.in_memory` must be at least 1.".to_string());
                defaults.buffer.in_memory
            }
            Some(size) => size,
            None => defaults.buffer.in_memory,
        };
        let on_disk_folder = match (self.buffer.on_disk.unwrap_or(false), self.buffer.on_disk_folder)
        {
            (true, Some(folder)) if folder.is_absolute() => Some(folder),
            (true, Some(folder)) => {
                problems.push(format!(
                    "`buffer.on_disk_folder` must be an absolute path, got `{}`.",
                    folder.display()
                ));
                None
            }
            (true, None) => {
                problems.push(
                    "`buffer.on_disk = true` requires `buffer.on_disk_folder`. Example: `on_disk_folder = \"/data/buffer\"`."
                        .to_string(),
                );
                None
            }
            (false, _) => None,
        };

        let storage_root = self
            .storage
            .root
            .map(|root| resolve_path(base, root))
            .unwrap_or(defaults.storage.root);

        let backend = match self.cache.backend.as_deref() {
            None => defaults.cache.backend,
            Some(raw) => CacheBackend::parse(raw).unwrap_or_else(|| {
                problems.push(format!(
                    "`cache.backend` must be `redis`, `file` or `memory`, got `{raw}`."
                ));
                defaults.cache.backend
            }),
        };
        let cache_url = self.cache.url.unwrap_or(defaults.cache.url);
        if cache_url.as_str().into_connection_info().is_err() {
            problems.push(format!(
                "`cache.url` must be a redis:// URL, got `{cache_url}`."
            ));
        }
        let cache_root = self
            .cache
            .root
            .map(|root| resolve_path(base, root))
            .unwrap_or(defaults.cache.root);

        problems.extend(self.logging.problems());

        if !problems.is_empty() {
            return Err(Error::InvalidConfig {
                path: path.to_path_buf(),
                message: problems
                    .iter()
                    .map(|problem| format!("  - {problem}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            });
        }

        Ok(IngestConfig {
            file_path: Some(path.to_path_buf()),
            runtime: RuntimeConfig {
                address,
                api_version,
                network,
                default_image,
                stop_grace,
                timeout,
            },
            buffer: BufferConfig {
                in_memory,
                on_disk_folder,
            },
            storage: StorageConfig { root: storage_root },
            cache: CacheConfig {
                backend,
                url: cache_url,
                root: cache_root,
            },
            locking: LockingConfig {
                per_name: self.locking.per_name.unwrap_or(false),
            },
            logging: self.logging,
            warnings,
        })
    }
}

fn non_empty(
    value: Option<String>,
    default: String,
    field: &str,
    problems: &mut Vec<String>,
) -> String {
    match value {
        Some(value) if value.trim().is_empty() => {
            problems.push(format!("`{field}` must not be empty."));
            default
        }
        Some(value) => value,
        None => default,
    }
}

fn resolve_path(base: &Path, input: PathBuf) -> PathBuf {
    if input.is_absolute() {
        input
    } else {
        base.join(input)
    }
}

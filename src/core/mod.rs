//! Process manager and the capability seams it reconciles.

pub mod cache;
pub mod context;
pub mod locks;
pub mod manager;
pub mod record;
pub mod runtime;
pub mod settings;
pub mod store;

pub use cache::{CacheError, FileCache, MemoryCache, RedisCache, StatusCache};
pub use context::{CallContext, ContextError};
pub use locks::{NameGuard, NameLocks};
pub use manager::{DEFAULT_IMAGE, DEFAULT_NETWORK, ManagerSettings, ProcessManager};
pub use record::{
    ContainerState, StreamingCacheEntry, StreamingStatus, WorkloadRecord, container_name,
};
pub use runtime::{
    ContainerRuntime, ContainerSummary, CreateRequest, DockerEngine, MemoryRuntime, PruneReport,
    RuntimeError,
};
pub use settings::{Settings, SettingsManager};
pub use store::{FileStore, MemoryStore, ProcessStore, StoreError};

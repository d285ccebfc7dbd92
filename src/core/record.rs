use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Maximum number of log lines kept on a record.
pub const MAX_LOG_LINES: usize = 100;

/// Status written by Start before the runtime has been observed.
pub const STATUS_RUNNING: &str = "running";
/// Status used when the runtime returned no usable container state.
pub const STATUS_UNKNOWN: &str = "unknown";

/// Store prefix shared by all workload records.
pub const PROCESS_PREFIX: &str = "rtsp_process";

/// Cache key prefix for streaming flags.
pub const LAST_ACCESS_PREFIX: &str = "last_access_";
/// Cache field holding the millisecond timestamp of the last access.
pub const LAST_QUERY_FIELD: &str = "last_query";
/// Cache field holding the relay flag.
pub const PROXY_RTMP_FIELD: &str = "proxy_rtmp";

/// Persisted description of one managed ingest workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadRecord {
    pub name: String,
    pub rtsp_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtmp_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ContainerState>,
    pub logs: Vec<String>,
    /// Milliseconds since the unix epoch, set once by Start.
    pub created: i64,
    /// Milliseconds since the unix epoch, refreshed on every write.
    pub modified: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_status: Option<StreamingStatus>,
}

impl WorkloadRecord {
    pub fn new(name: impl Into<String>, rtsp_endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rtsp_endpoint: rtsp_endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_rtmp(mut self, endpoint: impl Into<String>) -> Self {
        self.rtmp_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_image(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = Some(tag.into());
        self
    }

    /// Relay target, treating an empty string the same as an absent one.
    pub fn relay_endpoint(&self) -> Option<&str> {
        self.rtmp_endpoint.as_deref().filter(|value| !value.is_empty())
    }

    /// Stamp `modified` so that it always moves forward. Saturates at `i64::MAX`
    /// for caller-supplied timestamps at the end of the range.
    pub fn touch(&mut self) {
        self.modified = now_millis().max(self.modified.saturating_add(1));
    }

    /// Replace the log snapshot, keeping only the newest lines.
    pub fn replace_logs(&mut self, mut lines: Vec<String>) {
        if lines.len() > MAX_LOG_LINES {
            lines.drain(..lines.len() - MAX_LOG_LINES);
        }
        self.logs = lines;
    }
}

/// Relay sub-state, only present when an RTMP endpoint is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingStatus {
    pub streaming: bool,
}

/// Runtime state snapshot as reported by the container engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ContainerState {
    pub status: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    #[serde(rename = "OOMKilled")]
    pub oom_killed: bool,
    pub dead: bool,
    pub pid: i64,
    pub exit_code: i64,
    pub error: String,
    pub started_at: String,
    pub finished_at: String,
}

/// Streaming flags written to the ephemeral cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingCacheEntry {
    pub last_access: i64,
    pub streaming: bool,
}

impl StreamingCacheEntry {
    pub fn key(name: &str) -> String {
        format!("{LAST_ACCESS_PREFIX}{name}")
    }

    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert(LAST_QUERY_FIELD.to_string(), self.last_access.to_string());
        fields.insert(
            PROXY_RTMP_FIELD.to_string(),
            if self.streaming { "1" } else { "0" }.to_string(),
        );
        fields
    }
}

/// Runtime container name for a workload.
pub fn container_name(name: &str) -> String {
    name.to_lowercase()
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

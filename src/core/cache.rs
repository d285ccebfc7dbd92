//! Ephemeral status cache holding liveness and relay flags.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use redis::{Commands, Connection, RedisError, RedisResult};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Status cache I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Status cache entry at {path} is corrupted: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Status cache request for {target} failed: {source}")]
    Redis {
        target: String,
        #[source]
        source: RedisError,
    },
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Hash-per-key cache. `hset` merges fields into whatever is already stored.
pub trait StatusCache: Send + Sync {
    fn hset(&self, key: &str, fields: &BTreeMap<String, String>) -> CacheResult<()>;

    /// Empty map when the key is unknown.
    fn hgetall(&self, key: &str) -> CacheResult<BTreeMap<String, String>>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StatusCache for MemoryCache {
    fn hset(&self, key: &str, fields: &BTreeMap<String, String>) -> CacheResult<()> {
        let mut entries = self.lock();
        let entry = entries.entry(key.to_string()).or_default();
        entry.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn hgetall(&self, key: &str) -> CacheResult<BTreeMap<String, String>> {
        Ok(self.lock().get(key).cloned().unwrap_or_default())
    }
}

/// Redis hashes, shared with the ingest workers that poll `last_access_*`.
/// One connection is kept and re-dialed after any failed command.
pub struct RedisCache {
    url: String,
    client: redis::Client,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl RedisCache {
    /// Validates `url` without dialing; the first command connects.
    pub fn open(url: &str, timeout: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|source| CacheError::Redis {
            target: url.to_string(),
            source,
        })?;
        Ok(Self {
            url: url.to_string(),
            client,
            timeout,
            connection: Mutex::new(None),
        })
    }

    fn connect(&self) -> RedisResult<Connection> {
        let connection = self.client.get_connection_with_timeout(self.timeout)?;
        connection.set_read_timeout(Some(self.timeout))?;
        connection.set_write_timeout(Some(self.timeout))?;
        debug!(url = %self.url, "status cache connected");
        Ok(connection)
    }

    fn with_connection<T>(
        &self,
        key: &str,
        command: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> CacheResult<T> {
        let mut slot = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let outcome = match slot.take() {
            Some(connection) => Ok(connection),
            None => self.connect(),
        }
        .and_then(|mut connection| {
            let value = command(&mut connection)?;
            *slot = Some(connection);
            Ok(value)
        });
        outcome.map_err(|source| CacheError::Redis {
            target: key.to_string(),
            source,
        })
    }
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StatusCache for RedisCache {
    fn hset(&self, key: &str, fields: &BTreeMap<String, String>) -> CacheResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_str()))
            .collect();
        self.with_connection(key, |connection| {
            connection.hset_multiple::<_, _, _, ()>(key, pairs.as_slice())
        })
    }

    fn hgetall(&self, key: &str) -> CacheResult<BTreeMap<String, String>> {
        self.with_connection(key, |connection| connection.hgetall(key))
    }
}

/// JSON object per key in a volatile directory such as `/dev/shm/ingestd`.
#[derive(Debug)]
pub struct FileCache {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    fn read(&self, key: &str) -> CacheResult<BTreeMap<String, String>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| CacheError::Corrupted { path, source }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }
}

impl StatusCache for FileCache {
    fn hset(&self, key: &str, fields: &BTreeMap<String, String>) -> CacheResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        fs::create_dir_all(&self.root).map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut current = self.read(key)?;
        current.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        let path = self.path_for(key);
        let bytes = serde_json::to_vec(&current).map_err(|source| CacheError::Corrupted {
            path: path.clone(),
            source,
        })?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, bytes).map_err(|source| CacheError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|source| CacheError::Io { path, source })
    }

    fn hgetall(&self, key: &str) -> CacheResult<BTreeMap<String, String>> {
        self.read(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    const TIMEOUT: Duration = Duration::from_secs(2);

    type Hashes = Arc<Mutex<HashMap<String, BTreeMap<String, String>>>>;

    /// Minimal RESP server understanding HMSET, HSET and HGETALL. Every
    /// other command is acknowledged with `+OK`.
    fn spawn_hash_server() -> (String, Hashes) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let url = format!("redis://{}/", listener.local_addr().unwrap());
        let hashes: Hashes = Arc::default();
        let shared = Arc::clone(&hashes);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let hashes = Arc::clone(&shared);
                thread::spawn(move || serve_connection(stream, &hashes));
            }
        });
        (url, hashes)
    }

    fn serve_connection(stream: TcpStream, hashes: &Hashes) -> io::Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;
        while let Some(command) = read_command(&mut reader)? {
            let reply = match command
                .first()
                .map(|name| name.to_ascii_uppercase())
                .as_deref()
            {
                Some("HMSET") | Some("HSET") if command.len() >= 4 => {
                    let mut hashes = hashes.lock().unwrap();
                    let entry = hashes.entry(command[1].clone()).or_default();
                    for pair in command[2..].chunks(2) {
                        if let [field, value] = pair {
                            entry.insert(field.clone(), value.clone());
                        }
                    }
                    "+OK\r\n".to_string()
                }
                Some("HGETALL") if command.len() == 2 => {
                    let hashes = hashes.lock().unwrap();
                    let entry = hashes.get(&command[1]).cloned().unwrap_or_default();
                    let mut reply = format!("*{}\r\n", entry.len() * 2);
                    for (field, value) in entry {
                        for item in [field, value] {
                            reply.push_str(&format!("${}\r\n{item}\r\n", item.len()));
                        }
                    }
                    reply
                }
                _ => "+OK\r\n".to_string(),
            };
            writer.write_all(reply.as_bytes())?;
        }
        Ok(())
    }

    fn read_command(reader: &mut impl BufRead) -> io::Result<Option<Vec<String>>> {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            return Ok(None);
        }
        let count: usize = header.trim_end().trim_start_matches('*').parse().unwrap_or(0);
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            let mut length = String::new();
            reader.read_line(&mut length)?;
            let length: usize = length.trim_end().trim_start_matches('$').parse().unwrap_or(0);
            let mut data = vec![0u8; length + 2];
            reader.read_exact(&mut data)?;
            data.truncate(length);
            parts.push(String::from_utf8_lossy(&data).into_owned());
        }
        Ok(Some(parts))
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn memory_cache_merges_fields() {
        let cache = MemoryCache::new();
        cache
            .hset("last_access_cam", &fields(&[("last_query", "1"), ("proxy_rtmp", "1")]))
            .unwrap();
        cache
            .hset("last_access_cam", &fields(&[("proxy_rtmp", "0")]))
            .unwrap();

        let stored = cache.hgetall("last_access_cam").unwrap();
        assert_eq!(stored, fields(&[("last_query", "1"), ("proxy_rtmp", "0")]));
        assert!(cache.hgetall("unknown").unwrap().is_empty());
    }

    #[test]
    fn file_cache_persists_between_instances() {
        let dir = tempdir().unwrap();
        FileCache::new(dir.path())
            .hset("last_access_cam", &fields(&[("last_query", "42")]))
            .unwrap();

        let reopened = FileCache::new(dir.path());
        assert_eq!(
            reopened.hgetall("last_access_cam").unwrap(),
            fields(&[("last_query", "42")])
        );
    }

    #[test]
    fn file_cache_reports_corrupted_entries() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("last_access_cam.json"), "not json").unwrap();
        let cache = FileCache::new(dir.path());
        assert!(matches!(
            cache.hgetall("last_access_cam").unwrap_err(),
            CacheError::Corrupted { .. }
        ));
    }

    #[test]
    fn redis_cache_merges_fields_and_is_visible_to_other_clients() {
        let (url, hashes) = spawn_hash_server();
        let cache = RedisCache::open(&url, TIMEOUT).unwrap();
        cache
            .hset("last_access_cam", &fields(&[("last_query", "1"), ("proxy_rtmp", "1")]))
            .unwrap();
        cache
            .hset("last_access_cam", &fields(&[("proxy_rtmp", "0")]))
            .unwrap();

        let expected = fields(&[("last_query", "1"), ("proxy_rtmp", "0")]);
        assert_eq!(cache.hgetall("last_access_cam").unwrap(), expected);
        assert_eq!(hashes.lock().unwrap().get("last_access_cam"), Some(&expected));

        let worker = RedisCache::open(&url, TIMEOUT).unwrap();
        assert_eq!(worker.hgetall("last_access_cam").unwrap(), expected);
        assert!(worker.hgetall("last_access_other").unwrap().is_empty());
    }

    #[test]
    fn redis_cache_reports_unreachable_server() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let url = format!("redis://{}/", listener.local_addr().unwrap());
        drop(listener);

        let cache = RedisCache::open(&url, TIMEOUT).unwrap();
        let err = cache
            .hset("last_access_cam", &fields(&[("last_query", "1")]))
            .unwrap_err();
        assert!(
            matches!(err, CacheError::Redis { ref target, .. } if target == "last_access_cam"),
            "{err:?}"
        );
    }

    #[test]
    fn redis_cache_rejects_non_redis_urls() {
        let err = RedisCache::open("http://cache:6379", TIMEOUT).unwrap_err();
        assert!(matches!(err, CacheError::Redis { .. }));
    }
}

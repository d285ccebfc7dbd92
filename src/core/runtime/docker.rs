use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    PruneContainersOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::{ClientVersion, Docker};
use futures_util::TryStreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use super::{
    ContainerRuntime, ContainerSummary, CreateRequest, PruneReport, RuntimeError, RuntimeResult,
};

/// Where the engine API is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAddress {
    /// `unix:///var/run/docker.sock`
    Unix(String),
    /// `http://host:port` or `tcp://host:port`
    Http(String),
}

impl EngineAddress {
    pub fn parse(address: &str) -> Option<Self> {
        if let Some(path) = address.strip_prefix("unix://") {
            return (!path.is_empty()).then(|| EngineAddress::Unix(path.to_string()));
        }
        let authority = address
            .strip_prefix("http://")
            .or_else(|| address.strip_prefix("tcp://"))?;
        let authority = authority.trim_end_matches('/');
        (!authority.is_empty()).then(|| EngineAddress::Http(format!("http://{authority}")))
    }
}

/// `v1.41` → `(1, 41)`.
pub fn parse_api_version(input: &str) -> Option<(usize, usize)> {
    let (major, minor) = input.trim_matches('/').strip_prefix('v')?.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Docker Engine API client. Calls are driven to completion on a private
/// current-thread runtime so the manager stays synchronous.
#[derive(Debug)]
pub struct DockerEngine {
    docker: Docker,
    runtime: Runtime,
}

impl DockerEngine {
    /// `address` is `unix://PATH`, `http://HOST:PORT` or `tcp://HOST:PORT`;
    /// `api_version` is e.g. `v1.41`.
    pub fn connect(address: &str, api_version: &str, timeout: Duration) -> RuntimeResult<Self> {
        let (major_version, minor_version) =
            parse_api_version(api_version).ok_or_else(|| RuntimeError::Transport {
                message: format!("unsupported engine API version `{api_version}`"),
            })?;
        let version = ClientVersion {
            major_version,
            minor_version,
        };
        let endpoint = EngineAddress::parse(address).ok_or_else(|| RuntimeError::Transport {
            message: format!("unsupported engine address `{address}`"),
        })?;

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| RuntimeError::Transport {
                message: format!("failed to start engine client runtime: {err}"),
            })?;

        let docker = {
            let _context = runtime.enter();
            match &endpoint {
                EngineAddress::Unix(path) => {
                    Docker::connect_with_unix(path, timeout.as_secs(), &version)
                }
                EngineAddress::Http(url) => {
                    Docker::connect_with_http(url, timeout.as_secs(), &version)
                }
            }
            .map_err(|err| classify(err, None))?
        };

        debug!(?endpoint, api_version, "docker engine client ready");
        Ok(Self { docker, runtime })
    }
}

impl ContainerRuntime for DockerEngine {
    fn prune(&self) -> RuntimeResult<PruneReport> {
        let report = self
            .runtime
            .block_on(
                self.docker
                    .prune_containers(None::<PruneContainersOptions<String>>),
            )
            .map_err(|err| classify(err, None))?;
        Ok(PruneReport {
            deleted: report.containers_deleted.unwrap_or_default(),
            space_reclaimed: report
                .space_reclaimed
                .and_then(|bytes| u64::try_from(bytes).ok())
                .unwrap_or(0),
        })
    }

    fn create(&self, request: &CreateRequest) -> RuntimeResult<String> {
        let config = Config {
            image: Some(request.image.clone()),
            env: Some(request.env.clone()),
            host_config: Some(convert(&request.host_config)?),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: request.name.clone(),
            platform: None,
        };
        let created = self
            .runtime
            .block_on(self.docker.create_container(Some(options), config))
            .map_err(|err| match classify(err, None) {
                RuntimeError::Api { status: 409, .. } => RuntimeError::Conflict {
                    name: request.name.clone(),
                },
                other => other,
            })?;
        debug!(name = %request.name, id = %created.id, "container created");
        Ok(created.id)
    }

    fn start(&self, name: &str) -> RuntimeResult<()> {
        self.runtime
            .block_on(
                self.docker
                    .start_container(name, None::<StartContainerOptions<String>>),
            )
            .map_err(|err| classify(err, Some(name)))
    }

    fn stop(&self, id: &str, kill_after: Duration) -> RuntimeResult<()> {
        let options = StopContainerOptions {
            t: i64::try_from(kill_after.as_secs()).unwrap_or(i64::MAX),
        };
        self.runtime
            .block_on(self.docker.stop_container(id, Some(options)))
            .map_err(|err| classify(err, Some(id)))
    }

    fn get(&self, name: &str) -> RuntimeResult<ContainerSummary> {
        let inspect = self
            .runtime
            .block_on(
                self.docker
                    .inspect_container(name, None::<InspectContainerOptions>),
            )
            .map_err(|err| classify(err, Some(name)))?;
        let state = inspect.state.as_ref().map(convert).transpose()?;
        Ok(ContainerSummary {
            id: inspect.id.unwrap_or_default(),
            state,
        })
    }

    fn logs(&self, id: &str, max_lines: usize, since: i64) -> RuntimeResult<Vec<String>> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            since,
            tail: max_lines.to_string(),
            ..Default::default()
        };
        let chunks: Vec<LogOutput> = self
            .runtime
            .block_on(self.docker.logs(id, Some(options)).try_collect())
            .map_err(|err| classify(err, Some(id)))?;

        let mut body = Vec::new();
        for chunk in chunks {
            body.extend_from_slice(&chunk.into_bytes());
        }
        let mut lines = split_lines(&String::from_utf8_lossy(&body));
        if lines.len() > max_lines {
            lines.drain(..lines.len() - max_lines);
        }
        Ok(lines)
    }
}

/// Re-shape between our engine-named types and the client's models; both
/// use the engine's JSON field names.
fn convert<S: Serialize, T: DeserializeOwned>(value: &S) -> RuntimeResult<T> {
    serde_json::to_value(value)
        .and_then(serde_json::from_value)
        .map_err(|err| RuntimeError::Payload {
            message: err.to_string(),
        })
}

/// Map a client failure onto the runtime taxonomy. A 404 is only treated as
/// "container not found" when the request addressed a container.
fn classify(err: BollardError, container: Option<&str>) -> RuntimeError {
    match (err, container) {
        (BollardError::DockerResponseServerError { status_code: 404, .. }, Some(name)) => {
            RuntimeError::NotFound {
                name: name.to_string(),
            }
        }
        (
            BollardError::DockerResponseServerError {
                status_code,
                message,
            },
            _,
        ) => RuntimeError::Api {
            status: status_code,
            message,
        },
        (other, _) => RuntimeError::Transport {
            message: other.to_string(),
        },
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

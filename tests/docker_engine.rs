use std::collections::BTreeMap;
use std::error::Error;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use ingestd::core::runtime::{
    ContainerRuntime, CreateRequest, DockerEngine, HostConfig, LogConfig, RestartPolicy,
    RuntimeError,
};

const ENGINE_HOST: &str = "127.0.0.1";
const API_VERSION: &str = "v1.41";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

type TestResult<T = ()> = Result<T, Box<dyn Error>>;

#[derive(Debug, Clone)]
struct Scripted {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Scripted {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
        }
    }

    fn stream(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/vnd.docker.raw-stream",
            body,
        }
    }
}

#[derive(Debug)]
struct Recorded {
    request_line: String,
    body: Vec<u8>,
}

/// Answers one request per connection with the next scripted response.
struct EngineHarness {
    address: String,
    requests: Receiver<Recorded>,
    handle: JoinHandle<()>,
    _socket_dir: Option<TempDir>,
}

impl EngineHarness {
    fn spawn(script: Vec<Scripted>) -> TestResult<Self> {
        let listener = TcpListener::bind((ENGINE_HOST, 0))?;
        let address = format!("tcp://{}", listener.local_addr()?);
        let (sender, requests) = mpsc::channel();

        let handle = thread::spawn(move || {
            for response in script {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                if stream.set_read_timeout(Some(DEFAULT_TIMEOUT)).is_err() {
                    return;
                }
                if !record(serve_one(stream, &response), &sender) {
                    return;
                }
            }
        });

        Ok(Self {
            address,
            requests,
            handle,
            _socket_dir: None,
        })
    }

    fn spawn_unix(script: Vec<Scripted>) -> TestResult<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.sock");
        let listener = UnixListener::bind(&path)?;
        let address = format!("unix://{}", path.display());
        let (sender, requests) = mpsc::channel();

        let handle = thread::spawn(move || {
            for response in script {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                if stream.set_read_timeout(Some(DEFAULT_TIMEOUT)).is_err() {
                    return;
                }
                if !record(serve_one(stream, &response), &sender) {
                    return;
                }
            }
        });

        Ok(Self {
            address,
            requests,
            handle,
            _socket_dir: Some(dir),
        })
    }

    fn engine(&self) -> TestResult<DockerEngine> {
        Ok(DockerEngine::connect(
            &self.address,
            API_VERSION,
            DEFAULT_TIMEOUT,
        )?)
    }

    fn next_request(&self) -> TestResult<Recorded> {
        Ok(self.requests.recv_timeout(DEFAULT_TIMEOUT)?)
    }

    fn finish(self) {
        self.handle.join().unwrap();
    }
}

fn record(outcome: TestResult<Recorded>, sender: &Sender<Recorded>) -> bool {
    match outcome {
        Ok(recorded) => sender.send(recorded).is_ok(),
        Err(_) => false,
    }
}

fn serve_one<S: Read + Write>(mut stream: S, response: &Scripted) -> TestResult<Recorded> {
    let (request_line, body) = {
        let mut reader = BufReader::new(&mut stream);

        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;

        let mut content_length = 0usize;
        loop {
            let mut header = String::new();
            reader.read_line(&mut header)?;
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse()?;
                }
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body)?;
        (request_line, body)
    };

    write!(
        stream,
        "HTTP/1.1 {} Scripted\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.content_type,
        response.body.len()
    )?;
    stream.write_all(&response.body)?;
    stream.flush()?;

    Ok(Recorded {
        request_line: request_line.trim_end().to_string(),
        body,
    })
}

fn frame(stream: u8, payload: &str) -> Vec<u8> {
    let mut out = vec![stream, 0, 0, 0];
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload.as_bytes());
    out
}

fn create_request(name: &str) -> CreateRequest {
    let mut log_options = BTreeMap::new();
    log_options.insert("max-file".to_string(), "3".to_string());
    CreateRequest {
        name: name.to_string(),
        image: "example/proxy:1.0".to_string(),
        env: vec!["device_id=cam1".to_string()],
        host_config: HostConfig {
            log_config: LogConfig {
                driver: "json-file".to_string(),
                config: log_options,
            },
            restart_policy: RestartPolicy {
                name: "always".to_string(),
            },
            cpu_shares: 1024,
            network_mode: "ingestnet".to_string(),
            mounts: Vec::new(),
        },
    }
}

fn container_json() -> Value {
    json!({
        "Id": "abc123",
        "Name": "/cam1",
        "State": {
            "Status": "exited",
            "Running": false,
            "OOMKilled": true,
            "ExitCode": 137,
            "StartedAt": "2024-01-01T00:00:00Z"
        }
    })
}

#[test]
fn get_classifies_missing_container_as_not_found() -> TestResult {
    let harness = EngineHarness::spawn(vec![Scripted::json(
        404,
        json!({"message": "No such container: cam1"}),
    )])?;

    let err = harness.engine()?.get("cam1").unwrap_err();
    assert!(err.is_not_found(), "{err:?}");

    let request = harness.next_request()?;
    assert!(
        request
            .request_line
            .starts_with("GET /v1.41/containers/cam1/json"),
        "{}",
        request.request_line
    );
    harness.finish();
    Ok(())
}

#[test]
fn get_parses_container_state() -> TestResult {
    let harness = EngineHarness::spawn(vec![Scripted::json(200, container_json())])?;

    let summary = harness.engine()?.get("cam1")?;
    assert_eq!(summary.id, "abc123");
    let state = summary.state.expect("state parsed");
    assert_eq!(state.status, "exited");
    assert!(state.oom_killed);
    assert_eq!(state.exit_code, 137);
    harness.finish();
    Ok(())
}

#[test]
fn engine_is_reachable_over_a_unix_socket() -> TestResult {
    let harness = EngineHarness::spawn_unix(vec![Scripted::json(200, container_json())])?;

    let summary = harness.engine()?.get("cam1")?;
    assert_eq!(summary.id, "abc123");

    let request = harness.next_request()?;
    assert!(
        request
            .request_line
            .starts_with("GET /v1.41/containers/cam1/json"),
        "{}",
        request.request_line
    );
    harness.finish();
    Ok(())
}

#[test]
fn create_sends_configuration_and_maps_conflict() -> TestResult {
    let harness = EngineHarness::spawn(vec![Scripted::json(
        409,
        json!({"message": "Conflict. The container name \"/cam1\" is already in use"}),
    )])?;

    let err = harness
        .engine()?
        .create(&create_request("cam1"))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Conflict { ref name } if name == "cam1"));

    let request = harness.next_request()?;
    assert!(
        request
            .request_line
            .starts_with("POST /v1.41/containers/create?"),
        "{}",
        request.request_line
    );
    assert!(request.request_line.contains("name=cam1"));
    let body: Value = serde_json::from_slice(&request.body)?;
    assert_eq!(body["Image"], "example/proxy:1.0");
    assert_eq!(body["Env"][0], "device_id=cam1");
    assert_eq!(body["HostConfig"]["RestartPolicy"]["Name"], "always");
    assert_eq!(body["HostConfig"]["CpuShares"], 1024);
    assert_eq!(body["HostConfig"]["NetworkMode"], "ingestnet");
    assert_eq!(body["HostConfig"]["LogConfig"]["Type"], "json-file");
    assert_eq!(body["HostConfig"]["LogConfig"]["Config"]["max-file"], "3");
    harness.finish();
    Ok(())
}

#[test]
fn start_and_stop_address_container_endpoints() -> TestResult {
    let harness = EngineHarness::spawn(vec![
        Scripted::empty(204),
        Scripted::json(404, json!({"message": "No such container: abc123"})),
    ])?;
    let engine = harness.engine()?;

    engine.start("cam1")?;
    let err = engine
        .stop("abc123", Duration::from_secs(5))
        .unwrap_err();
    assert!(err.is_not_found());

    let start = harness.next_request()?;
    assert!(start.request_line.starts_with("POST /v1.41/containers/cam1/start"));
    let stop = harness.next_request()?;
    assert!(
        stop.request_line
            .starts_with("POST /v1.41/containers/abc123/stop"),
        "{}",
        stop.request_line
    );
    assert!(stop.request_line.contains("t=5"), "{}", stop.request_line);
    harness.finish();
    Ok(())
}

#[test]
fn logs_are_demultiplexed_and_bounded() -> TestResult {
    let mut body = frame(1, "RTSP Endpoint: rtsp://a\n");
    body.extend(frame(2, "connection refused\n"));
    body.extend(frame(1, "retrying\n"));
    let harness = EngineHarness::spawn(vec![Scripted::stream(body)])?;

    let lines = harness.engine()?.logs("abc123", 2, 0)?;
    assert_eq!(lines, vec!["connection refused", "retrying"]);

    let request = harness.next_request()?;
    let line = &request.request_line;
    assert!(line.starts_with("GET /v1.41/containers/abc123/logs?"), "{line}");
    for query in ["stdout=true", "stderr=true", "tail=2"] {
        assert!(line.contains(query), "{query} missing from {line}");
    }
    harness.finish();
    Ok(())
}

#[test]
fn prune_reports_deleted_containers() -> TestResult {
    let harness = EngineHarness::spawn(vec![
        Scripted::json(
            200,
            json!({"ContainersDeleted": ["a1", "b2"], "SpaceReclaimed": 4096}),
        ),
        Scripted::json(200, json!({"ContainersDeleted": null, "SpaceReclaimed": 0})),
    ])?;
    let engine = harness.engine()?;

    let report = engine.prune()?;
    assert_eq!(report.deleted, vec!["a1", "b2"]);
    assert_eq!(report.space_reclaimed, 4096);

    let empty = engine.prune()?;
    assert!(empty.deleted.is_empty());

    let request = harness.next_request()?;
    assert!(request.request_line.starts_with("POST /v1.41/containers/prune"));
    harness.finish();
    Ok(())
}

#[test]
fn engine_errors_carry_status_and_message() -> TestResult {
    let harness = EngineHarness::spawn(vec![Scripted::json(
        500,
        json!({"message": "a prune operation is already running"}),
    )])?;

    let err = harness.engine()?.prune().unwrap_err();
    match err {
        RuntimeError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "a prune operation is already running");
        }
        other => panic!("expected api error, got {other:?}"),
    }
    harness.finish();
    Ok(())
}

#[test]
fn unreachable_engine_is_a_transport_error() -> TestResult {
    let listener = TcpListener::bind((ENGINE_HOST, 0))?;
    let address = format!("http://{}", listener.local_addr()?);
    drop(listener);

    let engine = DockerEngine::connect(&address, API_VERSION, DEFAULT_TIMEOUT)?;
    let err = engine.get("cam1").unwrap_err();
    assert!(matches!(err, RuntimeError::Transport { .. }), "{err:?}");
    Ok(())
}

#[test]
fn unsupported_address_is_rejected_at_connect() {
    let err = DockerEngine::connect("ftp://engine", API_VERSION, DEFAULT_TIMEOUT).unwrap_err();
    assert!(matches!(err, RuntimeError::Transport { .. }), "{err:?}");
}

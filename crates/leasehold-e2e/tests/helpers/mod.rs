#![allow(dead_code)]

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

/// A running `leasehold-server` instance for e2e testing.
///
/// Spawns the server binary on a random port with a temporary working
/// directory holding its config file and SQLite database. The server is
/// killed when this struct is dropped.
pub struct TestServer {
    child: Option<Child>,
    addr: String,
    port: u16,
    /// Kept alive for the duration of the test. When dropped, the temp dir is cleaned up.
    /// `None` after `kill_and_take_data()` transfers ownership.
    data_dir: Option<tempfile::TempDir>,
}

impl TestServer {
    /// Start a new server instance on a random port with default leases.
    pub fn start() -> Self {
        Self::start_with_default_lease_ms(None)
    }

    /// Start a new server instance whose claims default to `lease_ms`.
    pub fn start_with_default_lease_ms(lease_ms: Option<u64>) -> Self {
        let port = free_port();
        let data_dir = tempfile::tempdir().expect("create temp dir");

        let lease_section = match lease_ms {
            Some(ms) => format!("\n[lease]\ndefault_lease_ms = {ms}\n"),
            None => String::new(),
        };
        let config_content = format!(
            r#"[server]
listen_addr = "127.0.0.1:{port}"

[storage]
url = "sqlite://data/leasehold.db"
{lease_section}
[telemetry]
log_filter = "info"
"#
        );
        std::fs::write(data_dir.path().join("leasehold.toml"), config_content)
            .expect("write config");

        Self::spawn(data_dir, port)
    }

    /// Restart a server on the same data directory and port.
    pub fn restart_on(data_dir: tempfile::TempDir, port: u16) -> Self {
        Self::spawn(data_dir, port)
    }

    fn spawn(data_dir: tempfile::TempDir, port: u16) -> Self {
        let addr = format!("127.0.0.1:{port}");

        let binary = server_binary();
        assert!(
            binary.exists(),
            "leasehold-server binary not found at {binary:?}. Run `cargo build` first."
        );

        let mut child = Command::new(&binary)
            .env_remove("LEASEHOLD_DATABASE_URL")
            .env_remove("RUST_LOG")
            .current_dir(data_dir.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("start leasehold-server");

        // Drain both pipes so the process doesn't block on a full buffer.
        if let Some(stdout) = child.stdout.take() {
            std::thread::spawn(move || for _ in BufReader::new(stdout).lines().map_while(Result::ok) {});
        }
        if let Some(stderr) = child.stderr.take() {
            std::thread::spawn(move || for _ in BufReader::new(stderr).lines().map_while(Result::ok) {});
        }

        // Poll TCP until the server is reachable.
        let start = std::time::Instant::now();
        let mut connected = false;
        while start.elapsed() < Duration::from_secs(10) {
            if std::net::TcpStream::connect(&addr).is_ok() {
                connected = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(
            connected,
            "leasehold-server did not become reachable at {addr} within 10s"
        );

        Self {
            child: Some(child),
            addr: format!("http://{addr}"),
            port,
            data_dir: Some(data_dir),
        }
    }

    /// The HTTP address of the running server (e.g., "http://127.0.0.1:12345").
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Kill the server and return the data directory for restarting on the same data.
    /// This simulates a crash: the server is killed with SIGKILL.
    pub fn kill_and_take_data(mut self) -> (tempfile::TempDir, u16) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        let data_dir = self.data_dir.take().expect("data_dir already taken");
        (data_dir, self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Output from a CLI invocation.
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Run the `leasehold` CLI binary with the given arguments and server address.
pub fn cli_run(addr: &str, args: &[&str]) -> CliOutput {
    let binary = cli_binary();
    assert!(
        binary.exists(),
        "leasehold CLI binary not found at {binary:?}. Run `cargo build` first."
    );

    let output: Output = Command::new(&binary)
        .arg("--addr")
        .arg(addr)
        .args(args)
        .output()
        .expect("run leasehold CLI");

    CliOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    }
}

/// Connect an SDK client to the given server address.
pub async fn sdk_client(addr: &str) -> leasehold_sdk::LeaseholdClient {
    leasehold_sdk::LeaseholdClient::connect(addr)
        .await
        .expect("connect SDK client")
}

/// Run the server binary against `config` and wait for it to exit. Only
/// useful for configurations the server refuses at start-up.
pub fn server_run_with_config(config: &str) -> CliOutput {
    let binary = server_binary();
    assert!(
        binary.exists(),
        "leasehold-server binary not found at {binary:?}. Run `cargo build` first."
    );

    let data_dir = tempfile::tempdir().expect("create temp dir");
    std::fs::write(data_dir.path().join("leasehold.toml"), config).expect("write config");

    let output = Command::new(&binary)
        .env_remove("LEASEHOLD_DATABASE_URL")
        .env_remove("RUST_LOG")
        .current_dir(data_dir.path())
        .output()
        .expect("run leasehold-server");

    CliOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    }
}

/// Find a free TCP port.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to free port");
    listener.local_addr().unwrap().port()
}

/// Resolve the path to the leasehold-server binary.
fn server_binary() -> PathBuf {
    workspace_binary("leasehold-server")
}

/// Resolve the path to the leasehold CLI binary.
fn cli_binary() -> PathBuf {
    workspace_binary("leasehold")
}

/// Resolve a binary path from the workspace target directory.
fn workspace_binary(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates/
    path.pop(); // workspace root
    path.push("target");
    path.push("debug");
    path.push(format!("{name}{}", std::env::consts::EXE_SUFFIX));
    path
}

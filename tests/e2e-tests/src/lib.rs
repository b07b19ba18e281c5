// E2E test harness: runs the orchestrator against testexe and testload

use bench_orchestrator::{BenchConfig, ServerConfig, SHARED_SECRET_ENV};
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub const SHARED_SECRET: &str = "e2e-secret";

/// Token handed out by testexe
pub const TESTEXE_TOKEN: &str = "testexe-token";

/// TLS files, relative to the server working directory
pub const SSL_CERT: &str = "cert.pem";
pub const SSL_KEY: &str = "key.pem";

/// Locate a workspace binary next to the test executable.
///
/// Returns `None` when it has not been built, e.g. when only this package
/// was compiled.
pub fn binary_path(name: &str) -> Option<PathBuf> {
    let mut path = env::current_exe().ok()?.parent()?.to_path_buf();

    // If we're in deps/, go up one level
    if path.ends_with("deps") {
        path.pop();
    }

    path.push(format!("{}{}", name, env::consts::EXE_SUFFIX));
    path.exists().then_some(path)
}

/// Grab a port that is free right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("Failed to find a free port")
}

/// Scratch directory plus fake server and load tool wired together.
pub struct BenchEnv {
    pub dir: TempDir,
    pub port: u16,
    pub testexe: PathBuf,
    pub load_tool: PathBuf,
    launch_log: PathBuf,
    load_log: PathBuf,
}

impl BenchEnv {
    /// `load_env` is exported to every load tool invocation.
    #[cfg(unix)]
    pub fn new(load_env: &[(&str, &str)]) -> Option<Self> {
        use std::os::unix::fs::PermissionsExt;

        let (Some(testexe), Some(testload)) = (binary_path("testexe"), binary_path("testload"))
        else {
            println!("testexe/testload not built, skipping");
            return None;
        };

        let dir = tempfile::tempdir().expect("Failed to create test directory");
        let launch_log = dir.path().join("launches.jsonl");
        let load_log = dir.path().join("load.jsonl");
        std::fs::create_dir_all(dir.path().join("client")).expect("Failed to create client dir");
        // testexe only records the TLS flags, the files just have to exist.
        std::fs::write(dir.path().join(SSL_CERT), "cert").expect("Failed to write certificate");
        std::fs::write(dir.path().join(SSL_KEY), "key").expect("Failed to write key");

        let mut script = String::from("#!/bin/sh\n");
        script.push_str(&format!("export TESTLOAD_LOG='{}'\n", load_log.display()));
        for (key, value) in load_env {
            script.push_str(&format!("export {}='{}'\n", key, value));
        }
        script.push_str(&format!("exec '{}' \"$@\"\n", testload.display()));

        let load_tool = dir.path().join("load-tool");
        std::fs::write(&load_tool, script).expect("Failed to write load tool wrapper");
        let mut perms = std::fs::metadata(&load_tool).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&load_tool, perms).unwrap();

        Some(Self {
            dir,
            port: free_port(),
            testexe,
            load_tool,
            launch_log,
            load_log,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Fast settings: one second runs, one repetition, quick readiness polling.
    /// The TLS copy of the plan is off unless a test turns it back on.
    pub fn config(&self) -> BenchConfig {
        let mut server = ServerConfig::new(&self.testexe, self.path(), "client");
        server.port = self.port;
        server.ssl_cert = Some(PathBuf::from(SSL_CERT));
        server.ssl_key = Some(PathBuf::from(SSL_KEY));
        server.collections = vec![PathBuf::from("collection")];
        server.graceful_timeout = Duration::from_secs(5);
        server.log_file = Some(self.path().join("server.log"));
        server
            .environment
            .insert(SHARED_SECRET_ENV.to_string(), SHARED_SECRET.to_string());
        server.environment.insert(
            "TESTEXE_LAUNCH_LOG".to_string(),
            self.launch_log.display().to_string(),
        );

        let mut config = BenchConfig::new(server);
        config.load.tool = self.load_tool.clone();
        config.load.duration = Duration::from_secs(1);
        config.load.repetitions = 1;
        config.readiness.timeout = Duration::from_secs(10);
        config.readiness.interval = Duration::from_millis(20);
        config.https_mirror = false;
        config
    }

    /// Lifecycle events written by testexe, in order.
    pub fn launch_events(&self) -> Vec<Value> {
        read_json_lines(&self.launch_log)
    }

    /// Invocations recorded by testload, in order.
    pub fn load_invocations(&self) -> Vec<Value> {
        read_json_lines(&self.load_log)
    }

    pub fn events_named(&self, event: &str) -> Vec<Value> {
        self.launch_events()
            .into_iter()
            .filter(|e| e["event"] == event)
            .collect()
    }
}

pub fn read_json_lines(path: &Path) -> Vec<Value> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).expect("Invalid JSON line"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Every server that started was also stopped and is gone.
pub fn assert_all_servers_stopped(env: &BenchEnv) {
    let starts = env.events_named("start");
    let stops = env.events_named("stop");
    assert_eq!(
        starts.len(),
        stops.len(),
        "start/stop mismatch: {:#?}",
        env.launch_events()
    );

    for start in starts {
        let pid = start["pid"].as_u64().expect("pid") as u32;
        assert!(
            !bench_process::process_exists(pid).unwrap_or(false),
            "server {} still running",
            pid
        );
    }
}

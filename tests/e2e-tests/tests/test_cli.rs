//! The audioserve-bench binary end to end.

#![cfg(unix)]

use e2e_tests::{binary_path, BenchEnv, SHARED_SECRET, SSL_CERT, SSL_KEY};
use std::process::{Command, Output};

fn run_bench(env: &BenchEnv, secret: Option<&str>, extra: &[&str]) -> Option<Output> {
    let bench = binary_path("audioserve-bench")?;

    let mut cmd = Command::new(bench);
    cmd.arg("--server-binary")
        .arg(&env.testexe)
        .arg("--load-tool")
        .arg(&env.load_tool)
        .arg("--working-dir")
        .arg(env.path())
        .arg("--client-dir")
        .arg("client")
        .arg("--port")
        .arg(env.port.to_string())
        .args(["--duration", "1s", "--repetitions", "1"])
        .args(["--ssl-cert", SSL_CERT, "--ssl-key", SSL_KEY])
        .args(extra)
        .arg("collection")
        .env_remove("AUDIOSERVE_SHARED_SECRET")
        .env_remove("RUST_LOG");
    if let Some(secret) = secret {
        cmd.env("AUDIOSERVE_SHARED_SECRET", secret);
    }

    Some(cmd.output().expect("Failed to run audioserve-bench"))
}

#[test]
fn test_prints_report() {
    let Some(env) = BenchEnv::new(&[("TESTLOAD_RPS", "4321")]) else {
        return;
    };
    let Some(output) = run_bench(&env, Some(SHARED_SECRET), &[]) else {
        return;
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("HTTP/1.1"));
    assert!(stdout.contains("HTTP/2"));
    assert!(stdout.contains("HTTPS"));
    assert!(stdout.contains("/0/folder/ 401"));
    assert!(stdout.contains("/0/folder/ no gzip"));
    assert!(stdout.contains("4321.0"));

    // Token server, two plain suites, then their TLS copies.
    let tls: Vec<bool> = env
        .events_named("start")
        .iter()
        .map(|e| e["tls"].as_bool().unwrap())
        .collect();
    assert_eq!(tls, vec![false, false, false, true, true]);
}

#[test]
fn test_no_https_skips_tls_copy() {
    let Some(env) = BenchEnv::new(&[]) else {
        return;
    };
    let Some(output) = run_bench(&env, Some(SHARED_SECRET), &["--no-https"]) else {
        return;
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(!stdout.contains("HTTPS"));
    assert_eq!(env.events_named("start").len(), 3);
    assert!(env.events_named("start").iter().all(|e| e["tls"] == false));
}

#[test]
fn test_missing_secret_fails() {
    let Some(env) = BenchEnv::new(&[]) else {
        return;
    };
    let Some(output) = run_bench(&env, None, &[]) else {
        return;
    };

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("AUDIOSERVE_SHARED_SECRET"));
    assert!(env.launch_events().is_empty());
}

#[test]
fn test_partial_results_on_failure() {
    let Some(env) = BenchEnv::new(&[("TESTLOAD_FAIL_MATCH", "https://")]) else {
        return;
    };
    let Some(output) = run_bench(&env, Some(SHARED_SECRET), &["--partial"]) else {
        return;
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert!(stdout.contains("Partial results"));
    assert!(stdout.contains("/0/folder/ 401"));
    assert!(!stdout.contains("HTTPS"));
}

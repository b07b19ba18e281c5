//! Failures abort the run, keep completed results and never leave a server
//! running.

#![cfg(unix)]

use bench_common::ErrorKind;
use bench_orchestrator::{MatrixOrchestrator, TestParams, TestSuite};
use e2e_tests::{assert_all_servers_stopped, BenchEnv, SHARED_SECRET};

fn two_suites() -> Vec<TestSuite> {
    vec![
        TestSuite::new(vec![
            TestParams::plain("/"),
            TestParams::plain("/collections/").with_token(true),
        ]),
        TestSuite::new(vec![
            TestParams::plain("/").with_compression(true),
            TestParams::plain("/0/search?q=a")
                .with_compression(true)
                .with_token(true),
        ]),
    ]
}

#[tokio::test]
async fn test_load_tool_failure_keeps_partial_results() {
    let Some(env) = BenchEnv::new(&[("TESTLOAD_FAIL_MATCH", "/search")]) else {
        return;
    };

    let mut config = env.config();
    config.matrix = Some(two_suites());

    let orchestrator = MatrixOrchestrator::from_config(&config).unwrap();
    let failure = orchestrator
        .run(&config.matrix(), SHARED_SECRET)
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::LoadTool);
    assert!(failure.error.to_string().contains("connection refused"));
    assert_eq!(failure.completed.len(), 3);
    assert_all_servers_stopped(&env);
}

#[tokio::test]
async fn test_retry_policy_does_not_hide_permanent_failure() {
    let Some(env) = BenchEnv::new(&[("TESTLOAD_FAIL_MATCH", "/collections/")]) else {
        return;
    };

    let mut config = env.config();
    config.matrix = Some(two_suites());
    config.load.retry.max_attempts = 3;
    config.load.retry.retry_delay = std::time::Duration::from_millis(10);

    let orchestrator = MatrixOrchestrator::from_config(&config).unwrap();
    let failure = orchestrator
        .run(&config.matrix(), SHARED_SECRET)
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::LoadTool);
    assert_eq!(failure.completed.len(), 1);
    // "/" once, then three attempts at "/collections/"
    assert_eq!(env.load_invocations().len(), 4);
    assert_all_servers_stopped(&env);
}

#[tokio::test]
async fn test_wrong_secret_aborts_before_matrix() {
    let Some(env) = BenchEnv::new(&[]) else {
        return;
    };

    let config = env.config();
    let orchestrator = MatrixOrchestrator::from_config(&config).unwrap();
    let failure = orchestrator
        .run(&config.matrix(), "not-the-secret")
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::Authentication);
    assert!(failure.completed.is_empty());
    assert_eq!(env.events_named("start").len(), 1);
    assert!(env.load_invocations().is_empty());
    assert_all_servers_stopped(&env);
}

#[tokio::test]
async fn test_server_crash_during_startup() {
    let Some(env) = BenchEnv::new(&[]) else {
        return;
    };

    let mut config = env.config();
    config
        .server
        .environment
        .insert("TESTEXE_CRASH_CODE".to_string(), "3".to_string());

    let orchestrator = MatrixOrchestrator::from_config(&config).unwrap();
    let started = std::time::Instant::now();
    let failure = orchestrator
        .run(&config.matrix(), SHARED_SECRET)
        .await
        .unwrap_err();

    // Detected through the exit, not the readiness deadline.
    assert_eq!(failure.error.kind(), ErrorKind::Process);
    assert!(started.elapsed() < config.readiness.timeout);
    assert_eq!(env.events_named("crash").len(), 1);
}

#[tokio::test]
async fn test_missing_server_binary_is_configuration_error() {
    let Some(env) = BenchEnv::new(&[]) else {
        return;
    };

    let mut config = env.config();
    config.server.binary = env.path().join("no-such-server");

    let err = MatrixOrchestrator::from_config(&config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(env.launch_events().is_empty());
}

#[tokio::test]
async fn test_mixed_suite_never_starts_a_server() {
    let Some(env) = BenchEnv::new(&[]) else {
        return;
    };

    let mut config = env.config();
    config.matrix = Some(vec![TestSuite::new(vec![
        TestParams::plain("/"),
        TestParams::plain("/").with_compression(true),
    ])]);
    assert!(config.validate().is_err());

    let orchestrator = MatrixOrchestrator::from_config(&config).unwrap();
    let failure = orchestrator
        .run(&config.matrix(), SHARED_SECRET)
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::Configuration);
    assert!(env.launch_events().is_empty());
}

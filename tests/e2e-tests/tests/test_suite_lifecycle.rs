//! A suite runs against exactly one server instance, and every server that
//! is started gets stopped.

#![cfg(unix)]

use bench_orchestrator::{MatrixOrchestrator, TestMatrix, TestParams, TestSuite};
use e2e_tests::{assert_all_servers_stopped, BenchEnv, SHARED_SECRET, TESTEXE_TOKEN};

#[tokio::test]
async fn test_one_suite_two_entries_three_repetitions() {
    let Some(env) = BenchEnv::new(&[("TESTLOAD_RPS", "1500")]) else {
        return;
    };

    let mut config = env.config();
    config.load.repetitions = 3;
    let base = TestParams::plain("/0/folder/").with_token(true);
    config.matrix = Some(vec![TestSuite::new(vec![
        base.with_http2(false),
        base.with_http2(true),
    ])]);

    let orchestrator = MatrixOrchestrator::from_config(&config).unwrap();
    let report = orchestrator
        .run(&config.matrix(), SHARED_SECRET)
        .await
        .unwrap();

    assert_eq!(report.entries.len(), 2);
    for entry in &report.entries {
        assert_eq!(entry.result.runs, 3);
        assert_eq!(entry.result.stats.requests_per_sec, 1500.0);
        assert_eq!(entry.result.stats.status_codes.get(&200), Some(&300));
        assert_eq!(entry.result.stats.success_rate, 100.0);
    }

    // One short-lived server for the token, then one for the suite.
    let starts = env.events_named("start");
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[1]["compression"], false);
    assert_eq!(starts[1]["force_cache_update"], true);
    assert_eq!(starts[1]["rust_log"], "info");
    assert_eq!(starts[1]["collections"][0], "collection");
    assert_all_servers_stopped(&env);

    let invocations = env.load_invocations();
    assert_eq!(invocations.len(), 6);
    let cookie = format!("Cookie: audioserve_token={}", TESTEXE_TOKEN);
    for invocation in &invocations {
        assert_eq!(invocation["headers"][0], cookie.as_str());
        assert_eq!(invocation["json"], true);
        assert_eq!(invocation["no_tui"], true);
        assert_eq!(invocation["insecure"], true);
        assert_eq!(invocation["duration"], "1s");
        assert_eq!(
            invocation["url"],
            format!("http://127.0.0.1:{}/0/folder/", env.port).as_str()
        );
    }
    let http2: Vec<bool> = invocations
        .iter()
        .map(|i| i["http2"].as_bool().unwrap())
        .collect();
    assert_eq!(http2, vec![false, false, false, true, true, true]);
}

#[tokio::test]
async fn test_standard_matrix_restarts_server_per_suite() {
    let Some(env) = BenchEnv::new(&[]) else {
        return;
    };

    let config = env.config();
    let matrix = TestMatrix::standard();
    let orchestrator = MatrixOrchestrator::from_config(&config).unwrap();
    let report = orchestrator.run(&matrix, SHARED_SECRET).await.unwrap();

    assert_eq!(report.entries.len(), matrix.total_entries());

    let starts = env.events_named("start");
    assert_eq!(starts.len(), 1 + matrix.suites().len());
    assert_eq!(starts[1]["compression"], false);
    assert_eq!(starts[2]["compression"], true);
    assert_all_servers_stopped(&env);

    // Unauthenticated requests to protected paths come back as 401.
    let folder_401 = report
        .entries
        .iter()
        .find(|e| e.params.path() == "/0/folder/" && !e.params.requires_token())
        .unwrap();
    assert_eq!(folder_401.result.stats.status_codes.get(&401), Some(&100));
}

#[tokio::test]
async fn test_https_mirror_runs_after_plain_suites() {
    let Some(env) = BenchEnv::new(&[]) else {
        return;
    };

    let mut config = env.config();
    config.https_mirror = true;
    config.matrix = Some(vec![TestSuite::new(vec![
        TestParams::plain("/0/folder/").with_token(true)
    ])]);

    let orchestrator = MatrixOrchestrator::from_config(&config).unwrap();
    let report = orchestrator
        .run(&config.matrix(), SHARED_SECRET)
        .await
        .unwrap();

    let tls: Vec<bool> = report.entries.iter().map(|e| e.params.use_tls()).collect();
    assert_eq!(tls, vec![false, true]);

    let starts = env.events_named("start");
    assert_eq!(starts.len(), 3);
    assert_eq!(starts[1]["tls"], false);
    assert_eq!(starts[2]["tls"], true);
    assert_all_servers_stopped(&env);

    let urls: Vec<String> = env
        .load_invocations()
        .iter()
        .map(|i| i["url"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        urls,
        vec![
            format!("http://127.0.0.1:{}/0/folder/", env.port),
            format!("https://127.0.0.1:{}/0/folder/", env.port),
        ]
    );
}

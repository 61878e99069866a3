//! Integration tests for HTTP probing
//!
//! These tests verify that:
//! - Status policies decide success
//! - Body matching works for exact content and patterns
//! - Latency, size and status code are reported for every response
//! - Payload extraction only runs after a successful probe

use blackbox_prober::Dispatcher;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{ScriptedRunner, closed_port, collect, exporter, sample};

async fn serve(mock_server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(mock_server)
        .await;
}

fn single_rule(http: &str, address: &str) -> String {
    format!(
        "namespace: blackbox\n\
         rules:\n  web:\n    type: http\n    timeout: 5\n    http:\n{http}\n\
         targets:\n  web:\n    - \"{address}\"\n"
    )
}

#[tokio::test]
async fn test_accepted_status_with_body_reports_all_series() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/health", 201, "hello").await;
    let address = format!("{}/health", mock_server.uri());

    let exporter = exporter(
        &single_rule("      statuses: [200, 201]", &address),
        Dispatcher::new(),
    );
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(1.0));
    assert_eq!(sample(&text, "blackbox_response_code", &address), Some(201.0));
    assert_eq!(sample(&text, "blackbox_size_bytes", &address), Some(5.0));
    assert!(sample(&text, "blackbox_latency_seconds", &address).unwrap() > 0.0);
}

#[tokio::test]
async fn test_status_outside_policy_fails_but_reports_status() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/health", 500, "Internal Server Error").await;
    let address = format!("{}/health", mock_server.uri());

    let exporter = exporter(
        &single_rule("      insecure: false", &address),
        Dispatcher::new(),
    );
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(0.0));
    assert_eq!(sample(&text, "blackbox_response_code", &address), Some(500.0));
    assert!(sample(&text, "blackbox_latency_seconds", &address).is_some());
}

#[tokio::test]
async fn test_ignored_status_only_checks_body() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/maintenance", 503, "down for maintenance").await;
    let address = format!("{}/maintenance", mock_server.uri());

    let exporter = exporter(
        &single_rule("      ignore_http_status: true", &address),
        Dispatcher::new(),
    );
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(1.0));
    assert_eq!(sample(&text, "blackbox_response_code", &address), Some(503.0));
}

#[tokio::test]
async fn test_body_pattern_match_and_mismatch() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/ok", 200, r#"{"status": "ok"}"#).await;
    serve(&mock_server, "/degraded", 200, r#"{"status": "degraded"}"#).await;
    let ok = format!("{}/ok", mock_server.uri());
    let degraded = format!("{}/degraded", mock_server.uri());

    let yaml = format!(
        "namespace: blackbox\n\
         rules:\n  api:\n    type: http\n    http:\n      body_regexp: '\"status\":\\s*\"ok\"'\n\
         targets:\n  api:\n    - \"{ok}\"\n    - \"{degraded}\"\n"
    );
    let exporter = exporter(&yaml, Dispatcher::new());
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &ok), Some(1.0));
    assert_eq!(sample(&text, "blackbox_Up", &degraded), Some(0.0));
}

#[tokio::test]
async fn test_exact_body_ignores_surrounding_whitespace() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/ping", 200, "pong\n").await;
    let address = format!("{}/ping", mock_server.uri());

    let exporter = exporter(
        &single_rule("      body_content: pong", &address),
        Dispatcher::new(),
    );
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(1.0));
}

#[tokio::test]
async fn test_payload_extraction_reports_value() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/stats", 200, r#"{"depth": 42}"#).await;
    let address = format!("{}/stats", mock_server.uri());
    let runner = ScriptedRunner::succeeding("42\n");

    let exporter = exporter(
        &single_rule(
            "      payload_extract:\n        metric_name: queue_depth\n        jq_query: .depth",
            &address,
        ),
        Dispatcher::with_command_runner(runner.clone()),
    );
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(1.0));
    assert_eq!(sample(&text, "blackbox_queue_depth", &address), Some(42.0));

    let calls = runner.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "jq");
    assert_eq!(calls[0].args, [".depth"]);
    assert_eq!(calls[0].stdin.as_deref(), Some(br#"{"depth": 42}"#.as_slice()));
}

#[tokio::test]
async fn test_failed_extraction_keeps_probe_successful() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/stats", 200, "not json").await;
    let address = format!("{}/stats", mock_server.uri());
    let runner = ScriptedRunner::failing(5, "parse error: Invalid literal");

    let exporter = exporter(
        &single_rule(
            "      payload_extract:\n        metric_name: queue_depth\n        jq_query: .depth",
            &address,
        ),
        Dispatcher::with_command_runner(runner.clone()),
    );
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(1.0));
    assert_eq!(sample(&text, "blackbox_queue_depth", &address), None);
}

#[tokio::test]
async fn test_no_extraction_after_failed_probe() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/stats", 500, r#"{"depth": 42}"#).await;
    let address = format!("{}/stats", mock_server.uri());
    let runner = ScriptedRunner::succeeding("42\n");

    let exporter = exporter(
        &single_rule(
            "      payload_extract:\n        metric_name: queue_depth\n        jq_query: .depth",
            &address,
        ),
        Dispatcher::with_command_runner(runner.clone()),
    );
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(0.0));
    assert!(runner.calls.lock().is_empty());
}

#[tokio::test]
async fn test_unreachable_server_reports_only_failure() {
    let address = format!("http://127.0.0.1:{}/health", closed_port());

    let exporter = exporter(&single_rule("      statuses: [200]", &address), Dispatcher::new());
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(0.0));
    assert_eq!(sample(&text, "blackbox_latency_seconds", &address), None);
    assert_eq!(sample(&text, "blackbox_response_code", &address), None);
}

#[tokio::test]
async fn test_host_label_is_taken_from_url() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/", 200, "").await;
    let address = format!("{}/", mock_server.uri());

    let exporter = exporter(&single_rule("      statuses: [200]", &address), Dispatcher::new());
    let text = collect(&exporter).await;

    let line = text
        .lines()
        .find(|line| line.starts_with("blackbox_Up{"))
        .unwrap();
    assert!(line.contains("host=\"127.0.0.1\""));
}

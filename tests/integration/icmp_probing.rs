//! Integration tests for ICMP probing through a scripted ping

use blackbox_prober::Dispatcher;
use pretty_assertions::assert_eq;

use crate::helpers::{ScriptedRunner, collect, exporter, sample};

const CONFIG: &str = "
namespace: blackbox
rules:
  gateway:
    type: icmp
    timeout: 2
targets:
  gateway:
    - 10.1.2.3
";

#[tokio::test]
async fn test_answered_ping_is_up() {
    let runner = ScriptedRunner::succeeding("1 packets transmitted, 1 received");

    let exporter = exporter(CONFIG, Dispatcher::with_command_runner(runner.clone()));
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", "10.1.2.3"), Some(1.0));
    assert!(sample(&text, "blackbox_latency_seconds", "10.1.2.3").is_some());

    let calls = runner.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "ping");
    assert_eq!(calls[0].args, ["-n", "-c", "1", "-W", "2", "10.1.2.3"]);
    assert_eq!(calls[0].stdin, None);
}

#[tokio::test]
async fn test_unanswered_ping_is_down() {
    let runner = ScriptedRunner::failing(1, "1 packets transmitted, 0 received");

    let exporter = exporter(CONFIG, Dispatcher::with_command_runner(runner));
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", "10.1.2.3"), Some(0.0));
    assert_eq!(sample(&text, "blackbox_latency_seconds", "10.1.2.3"), None);
}

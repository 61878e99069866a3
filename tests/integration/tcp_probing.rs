//! Integration tests for TCP probing

use blackbox_prober::Dispatcher;
use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use crate::helpers::{closed_port, collect, exporter, sample};

fn tcp_config(addresses: &[String]) -> String {
    let targets = addresses
        .iter()
        .map(|address| format!("    - \"{address}\"\n"))
        .collect::<String>();
    format!(
        "namespace: blackbox\n\
         rules:\n  port:\n    type: tcp\n    timeout: 2\n\
         targets:\n  port:\n{targets}"
    )
}

/// Accepts connections and answers each one with `banner` before closing
async fn banner_server(banner: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = stream.write_all(banner).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    port
}

#[tokio::test]
async fn test_open_port_is_up() {
    let port = banner_server(b"").await;
    let address = format!("127.0.0.1:{port}");

    let exporter = exporter(&tcp_config(&[address.clone()]), Dispatcher::new());
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(1.0));
    assert!(sample(&text, "blackbox_latency_seconds", &address).is_some());
    assert_eq!(sample(&text, "blackbox_size_bytes", &address), None);
}

#[tokio::test]
async fn test_closed_port_is_down_without_latency() {
    let address = format!("127.0.0.1:{}", closed_port());

    let exporter = exporter(&tcp_config(&[address.clone()]), Dispatcher::new());
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(0.0));
    assert_eq!(sample(&text, "blackbox_latency_seconds", &address), None);
}

#[tokio::test]
async fn test_read_check_reports_received_bytes() {
    let port = banner_server(b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let address = format!("tcp://127.0.0.1:{port}/banner");

    let exporter = exporter(&tcp_config(&[address.clone()]), Dispatcher::new());
    let text = collect(&exporter).await;

    assert_eq!(sample(&text, "blackbox_Up", &address), Some(1.0));
    assert_eq!(sample(&text, "blackbox_size_bytes", &address), Some(21.0));
}

#[tokio::test]
async fn test_one_closed_port_does_not_affect_others() {
    let open = format!("127.0.0.1:{}", banner_server(b"").await);
    let closed = format!("127.0.0.1:{}", closed_port());

    let exporter = exporter(&tcp_config(&[open.clone(), closed.clone()]), Dispatcher::new());
    let summary = exporter.run_pass().await;
    let text = exporter.reporter().encode_text().unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(sample(&text, "blackbox_Up", &open), Some(1.0));
    assert_eq!(sample(&text, "blackbox_Up", &closed), Some(0.0));
}

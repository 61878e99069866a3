//! Integration tests for the scrape endpoint

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use blackbox_prober::{Dispatcher, exposition};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{exporter, sample};

#[tokio::test]
async fn test_scrape_triggers_collection_pass() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;
    let address = format!("{}/", mock_server.uri());
    let yaml = format!(
        "namespace: blackbox\nrules:\n  web:\n    type: http\ntargets:\n  web:\n    - \"{address}\"\n"
    );
    let app = exposition::router(Arc::new(exporter(&yaml, Dispatcher::new())), "/metrics");

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(sample(&text, "blackbox_Up", &address), Some(1.0));
    }
}

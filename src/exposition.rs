//! Prometheus scrape endpoint
//!
//! Every GET on the metrics path triggers one collection pass and answers
//! with the resulting snapshot in the text exposition format. Probe failures
//! only show up in the series values, the response itself is a 200.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::exporter::Exporter;

/// Build the router serving `metrics_path`
pub fn router(exporter: Arc<Exporter>, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler))
        .with_state(exporter)
        .layer(TraceLayer::new_for_http())
}

async fn metrics_handler(State(exporter): State<Arc<Exporter>>) -> Response {
    match exporter.collect_text().await {
        Ok(body) => {
            let content_type = TextEncoder::new().format_type().to_string();
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            error!("cannot encode metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve the scrape endpoint until the process is stopped
pub async fn serve(
    exporter: Arc<Exporter>,
    listen_address: SocketAddr,
    metrics_path: &str,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_address).await?;
    info!(
        "serving metrics on http://{}{metrics_path}",
        listener.local_addr()?
    );

    axum::serve(listener, router(exporter, metrics_path)).await?;
    Ok(())
}

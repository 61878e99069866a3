//! SQL prober
//!
//! The target address is a connection URL (`mysql://`, `postgres://`,
//! `sqlite:`). The prober opens a connection, pings it and closes it again.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::{AnyConnection, Connection};
use tracing::{instrument, trace, warn};

use crate::config::{Endpoint, Target};
use crate::error::ProbeError;
use crate::reporter::Reporter;

use super::{Prober, report_mismatch};

#[derive(Debug, Clone, Copy)]
pub struct SqlProber;

impl SqlProber {
    pub fn new() -> Self {
        sqlx::any::install_default_drivers();
        Self
    }

    async fn check(&self, connection_string: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        let start = Instant::now();
        let mut conn = tokio::time::timeout(timeout, AnyConnection::connect(connection_string))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))??;
        trace!("connected to database");

        let ping = tokio::time::timeout(timeout, conn.ping()).await;
        let latency = start.elapsed();

        if let Err(e) = conn.close().await {
            warn!("cannot close database connection: {e}");
        }

        ping.map_err(|_| ProbeError::Timeout(timeout))??;
        Ok(latency)
    }
}

impl Default for SqlProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for SqlProber {
    #[instrument(skip_all, fields(host = %target.labels().host, rule = %target.rule.name))]
    async fn probe(&self, target: &Target, reporter: &Reporter) -> bool {
        let Endpoint::ConnectionString(connection_string) = &target.endpoint else {
            return report_mismatch(target, reporter, "sql");
        };

        let success = match self.check(connection_string, target.rule.timeout).await {
            Ok(latency) => {
                reporter.report_latency(target.labels(), latency);
                true
            }
            Err(e) => {
                // the connection string may carry credentials, log the host only
                warn!("cannot ping database at {}: {e}", target.labels().host);
                false
            }
        };

        reporter.report_success(&target.rule.metric_name, target.labels(), success);
        success
    }
}

//! TCP prober
//!
//! Dials the target within the rule's timeout. Read-check targets
//! (`tcp://host:port/<path>`) additionally read the stream until the peer
//! closes it and report the number of bytes received.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tracing::{instrument, trace, warn};

use crate::config::{DEFAULT_READ_MAX, Endpoint, Target};
use crate::error::ProbeError;
use crate::reporter::Reporter;

use super::{Prober, report_mismatch};

/// Bytes consumed at most by a read check
const READ_CHECK_MAX: usize = DEFAULT_READ_MAX;

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

impl TcpProber {
    /// Returns the connection latency and, for read checks, the byte count
    async fn check(
        &self,
        host_port: &str,
        read_check: bool,
        timeout: Duration,
    ) -> Result<(Duration, Option<usize>), ProbeError> {
        let start = Instant::now();
        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(host_port))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))??;
        trace!("connected to {host_port}");

        let size = if read_check {
            let size = tokio::time::timeout(timeout, read_size(&mut stream, READ_CHECK_MAX))
                .await
                .map_err(|_| ProbeError::Timeout(timeout))??;
            Some(size)
        } else {
            None
        };

        // the stream is closed when dropped, on every path out of here
        Ok((start.elapsed(), size))
    }
}

#[async_trait]
impl Prober for TcpProber {
    #[instrument(skip_all, fields(target = %target.name, rule = %target.rule.name))]
    async fn probe(&self, target: &Target, reporter: &Reporter) -> bool {
        let Endpoint::Socket {
            host_port,
            read_check,
        } = &target.endpoint
        else {
            return report_mismatch(target, reporter, "tcp");
        };

        let labels = target.labels();
        let success = match self.check(host_port, *read_check, target.rule.timeout).await {
            Ok((latency, size)) => {
                if let Some(size) = size {
                    reporter.report_size(labels, size);
                }
                reporter.report_latency(labels, latency);
                true
            }
            Err(e) => {
                warn!("couldn't connect to {host_port}: {e}");
                false
            }
        };

        reporter.report_success(&target.rule.metric_name, labels, success);
        success
    }
}

/// Count the bytes of a stream up to its end, stopping at `max`
async fn read_size<R: AsyncRead + Unpin>(reader: &mut R, max: usize) -> std::io::Result<usize> {
    let mut buf = [0u8; 8192];
    let mut size = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(size);
        }
        size += n;
        if size >= max {
            return Ok(max);
        }
    }
}

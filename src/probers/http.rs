//! HTTP/HTTPS prober
//!
//! Issues a GET, reads at most `read_max` bytes of the body and decides
//! success from the body match and the status policy of the rule. Latency,
//! size and status code are reported as soon as a response was read,
//! whatever the outcome of the checks.
//!
//! ```text
//! GET → read body (bounded) → report latency/size/status → body match ∧ status valid
//!                                                            │
//!                                               success ─────┴──→ payload extraction (jq)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use crate::config::{Endpoint, HttpSpec, PayloadExtract, Target};
use crate::error::ProbeError;
use crate::reporter::{Labels, Reporter};
use crate::runner::{CommandRunner, run_with_timeout};

use super::{Prober, report_mismatch};

const JQ: &str = "jq";

pub struct HttpProber {
    /// Runs the payload extraction query
    runner: Arc<dyn CommandRunner>,
}

impl HttpProber {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn check(
        &self,
        url: &Url,
        spec: &HttpSpec,
        timeout: Duration,
        labels: &Labels,
        reporter: &Reporter,
    ) -> Result<bool, ProbeError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(spec.insecure)
            // no connection reuse, every probe pays the full setup cost
            .pool_max_idle_per_host(0)
            .timeout(timeout)
            .build()?;

        let start = Instant::now();
        let mut response = client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = read_limited(&mut response, spec.read_max).await?;
        let latency = start.elapsed();

        reporter.report_latency(labels, latency);
        reporter.report_size(labels, body.len());
        reporter.report_http_status(labels, status);

        let body_match = spec.body.matches(&body);
        let status_valid = spec.statuses.is_valid(status);
        trace!("status {status} valid: {status_valid}, body match: {body_match}");
        if !body_match {
            debug!("{url}: body does not match");
        }
        if !status_valid {
            debug!("{url}: unexpected status code {status}");
        }

        let success = body_match && status_valid;
        if success && let Some(extract) = &spec.payload_extract {
            match self.extract_value(&body, extract, timeout).await {
                Ok(value) => reporter.report_value(&extract.metric_name, labels, value),
                Err(e) => warn!("{url}: cannot extract value from HTTP response: {e}"),
            }
        }

        Ok(success)
    }

    async fn extract_value(
        &self,
        body: &[u8],
        extract: &PayloadExtract,
        timeout: Duration,
    ) -> Result<f64, ProbeError> {
        let args = [extract.jq_query.clone()];
        let output = run_with_timeout(self.runner.as_ref(), JQ, &args, Some(body), timeout).await?;
        parse_extracted(&output.stdout)
    }
}

#[async_trait]
impl Prober for HttpProber {
    #[instrument(skip_all, fields(target = %target.name, rule = %target.rule.name))]
    async fn probe(&self, target: &Target, reporter: &Reporter) -> bool {
        let (Endpoint::Url(url), Some(spec)) = (&target.endpoint, target.rule.http()) else {
            return report_mismatch(target, reporter, "http");
        };

        let success = match self
            .check(url, spec, target.rule.timeout, target.labels(), reporter)
            .await
        {
            Ok(success) => success,
            Err(e) => {
                warn!("couldn't get {url}: {e}");
                false
            }
        };

        reporter.report_success(&target.rule.metric_name, target.labels(), success);
        success
    }
}

/// Read the body up to `read_max` bytes, dropping the rest
async fn read_limited(
    response: &mut reqwest::Response,
    read_max: usize,
) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while body.len() < read_max {
        let Some(chunk) = response.chunk().await? else {
            break;
        };
        let remaining = read_max - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
    }
    Ok(body)
}

/// Parse the single-line output of the extraction query
fn parse_extracted(stdout: &[u8]) -> Result<f64, ProbeError> {
    let output = String::from_utf8_lossy(stdout).trim().to_string();
    output
        .parse()
        .map_err(|source| ProbeError::InvalidNumber { output, source })
}

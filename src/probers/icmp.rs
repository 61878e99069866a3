//! ICMP prober backed by the system `ping` utility
//!
//! One echo request (`-c 1`) with the rule's timeout as wait time (`-W`).
//! The exit code decides reachability.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::config::{Endpoint, Target};
use crate::reporter::Reporter;
use crate::runner::{CommandRunner, run_with_timeout};

use super::{Prober, report_mismatch};

const PING: &str = "ping";

/// Extra time granted to `ping` beyond its own wait time before it is killed
const GRACE: Duration = Duration::from_secs(1);

pub struct IcmpProber {
    runner: Arc<dyn CommandRunner>,
}

impl IcmpProber {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

/// Arguments for a single echo request to `host`
pub fn ping_args(host: &str, timeout: Duration) -> Vec<String> {
    let wait = timeout.as_secs().max(1);
    vec![
        "-n".to_string(),
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        wait.to_string(),
        host.to_string(),
    ]
}

#[async_trait]
impl Prober for IcmpProber {
    #[instrument(skip_all, fields(target = %target.name, rule = %target.rule.name))]
    async fn probe(&self, target: &Target, reporter: &Reporter) -> bool {
        let Endpoint::Host(host) = &target.endpoint else {
            return report_mismatch(target, reporter, "icmp");
        };

        let timeout = target.rule.timeout;
        let args = ping_args(host, timeout);
        let start = Instant::now();
        let result = run_with_timeout(self.runner.as_ref(), PING, &args, None, timeout + GRACE).await;

        let success = match result {
            Ok(_) => {
                reporter.report_latency(target.labels(), start.elapsed());
                true
            }
            Err(e) => {
                warn!("couldn't ping {host}: {e}");
                false
            }
        };

        reporter.report_success(&target.rule.metric_name, target.labels(), success);
        success
    }
}

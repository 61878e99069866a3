//! Protocol dispatch and collection passes
//!
//! The [`Dispatcher`] maps each [`Protocol`] to the [`Prober`] handling it.
//! [`Dispatcher::run_pass`] spawns one task per target, waits for every task
//! to finish and returns a summary. A slow target only delays the end of the
//! pass; it never affects what the other targets report.
//!
//! ```text
//!            run_pass
//!               │ spawns
//!     ┌─────────┼─────────┐
//!     ▼         ▼         ▼
//!  probe(t1) probe(t2) probe(tN)   ← optionally bounded by a semaphore
//!     │         │         │
//!     └─────────┼─────────┘
//!               ▼ join all
//!          PassSummary
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument};

use crate::config::{Protocol, Target};
use crate::error::ProbeError;
use crate::probers::{HttpProber, IcmpProber, Prober, TcpProber};
use crate::reporter::Reporter;
use crate::runner::{CommandRunner, SystemRunner};

/// Outcome of one collection pass
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    probers: HashMap<Protocol, Arc<dyn Prober>>,
    /// Caps the number of probes running at once
    limit: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// Dispatcher with the default prober for every protocol
    pub fn new() -> Self {
        Self::with_command_runner(Arc::new(SystemRunner))
    }

    /// Dispatcher with the default probers, running external commands
    /// through `runner`
    pub fn with_command_runner(runner: Arc<dyn CommandRunner>) -> Self {
        let dispatcher = Self::empty()
            .with_prober(Protocol::Http, HttpProber::new(runner.clone()))
            .with_prober(Protocol::Tcp, TcpProber)
            .with_prober(Protocol::Icmp, IcmpProber::new(runner));

        #[cfg(feature = "sql")]
        let dispatcher = dispatcher.with_prober(Protocol::Sql, crate::probers::SqlProber::new());

        dispatcher
    }

    /// Dispatcher without any prober
    pub fn empty() -> Self {
        Self {
            probers: HashMap::new(),
            limit: None,
        }
    }

    /// Handle `protocol` with `prober`, replacing any previous one
    pub fn with_prober(mut self, protocol: Protocol, prober: impl Prober + 'static) -> Self {
        self.probers.insert(protocol, Arc::new(prober));
        self
    }

    /// Run at most `limit` probes at the same time
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    pub fn supports(&self, protocol: Protocol) -> bool {
        self.probers.contains_key(&protocol)
    }

    /// Probe a single target with the prober of its rule's protocol
    pub async fn probe(&self, target: &Target, reporter: &Reporter) -> Result<bool, ProbeError> {
        let protocol = target.rule.protocol();
        let prober = self
            .probers
            .get(&protocol)
            .ok_or(ProbeError::NoProber(protocol))?;

        Ok(prober.probe(target, reporter).await)
    }

    /// Probe every target concurrently and wait for all of them
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn run_pass(self: &Arc<Self>, targets: &[Target], reporter: &Arc<Reporter>) -> PassSummary {
        let started_at = Utc::now();
        let start = Instant::now();

        let handles = targets
            .iter()
            .cloned()
            .map(|target| {
                let dispatcher = self.clone();
                let reporter = reporter.clone();
                tokio::spawn(async move {
                    let _permit = match &dispatcher.limit {
                        Some(limit) => limit.clone().acquire_owned().await.ok(),
                        None => None,
                    };
                    match dispatcher.probe(&target, &reporter).await {
                        Ok(success) => success,
                        Err(e) => {
                            error!("{}: {e}", target.name);
                            reporter.report_success(&target.rule.metric_name, target.labels(), false);
                            false
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        let mut succeeded = 0;
        for result in join_all(handles).await {
            match result {
                Ok(true) => succeeded += 1,
                Ok(false) => {}
                Err(e) => error!("probe task failed: {e}"),
            }
        }

        let summary = PassSummary {
            started_at,
            duration: start.elapsed(),
            total: targets.len(),
            succeeded,
            failed: targets.len() - succeeded,
        };
        if summary.failed > 0 {
            info!(
                "collection pass finished in {:?}: {}/{} targets up",
                summary.duration, summary.succeeded, summary.total
            );
        } else {
            debug!(
                "collection pass finished in {:?}: all {} targets up",
                summary.duration, summary.total
            );
        }

        summary
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

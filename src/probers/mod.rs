//! Protocol probers
//!
//! Every prober performs one linear attempt against a [`Target`] and reports
//! into the [`Reporter`]: latency, size and status where they make sense for
//! the protocol, and always the rule's success metric. Failures are logged
//! and recorded as `0`; they never escape [`Prober::probe`].
//!
//! Network clients are created fresh for every probe so that the reported
//! latency always includes connection establishment.

use async_trait::async_trait;

use crate::config::Target;
use crate::reporter::Reporter;

pub mod http;
pub mod icmp;
#[cfg(feature = "sql")]
pub mod sql;
pub mod tcp;

pub use http::HttpProber;
pub use icmp::IcmpProber;
#[cfg(feature = "sql")]
pub use sql::SqlProber;
pub use tcp::TcpProber;

#[async_trait]
pub trait Prober: Send + Sync {
    /// Check `target` once and report the outcome, returning the success
    /// value that was recorded
    async fn probe(&self, target: &Target, reporter: &Reporter) -> bool;
}

/// Records a failed probe for a target the prober cannot interpret
fn report_mismatch(target: &Target, reporter: &Reporter, prober: &str) -> bool {
    tracing::error!(
        "{}: target of rule {} cannot be probed by the {prober} prober",
        target.name,
        target.rule.name
    );
    reporter.report_success(&target.rule.metric_name, target.labels(), false);
    false
}

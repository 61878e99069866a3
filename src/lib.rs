//! Rule-driven blackbox prober
//!
//! Probes externally configured endpoints over HTTP(S), TCP, ICMP and SQL
//! and exposes the outcomes as labeled Prometheus series. A collection pass
//! is triggered from outside (typically by a scrape), never by a timer.
//!
//! ```text
//! RawConfiguration ──validate──▶ Configuration ──▶ Exporter
//!        │                            │               │ collect()
//!        └── pre-registers metrics ──▶ Reporter ◀─────┤
//!                                        ▲            ▼
//!                                        └──── Dispatcher ─▶ one task per Target
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod exporter;
#[cfg(feature = "exposition")]
pub mod exposition;
pub mod probers;
pub mod reporter;
pub mod runner;
pub mod util;

pub use config::{Configuration, RawConfiguration, Rule, Target, read_config_file};
pub use dispatcher::{Dispatcher, PassSummary};
pub use error::{ConfigError, ProbeError, ReporterError};
pub use exporter::Exporter;
pub use reporter::{Labels, MetricMaker, Reporter};

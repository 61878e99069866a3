//! Wiring of configuration, registry and dispatcher
//!
//! An [`Exporter`] is built once at startup and is then asked to
//! [`collect`](Exporter::collect) whenever a scrape arrives: it runs a full
//! collection pass and returns the registry's snapshot afterwards.

use std::sync::Arc;

use prometheus::proto::MetricFamily;
use tracing::instrument;

use crate::config::{Configuration, RawConfiguration, Target};
use crate::dispatcher::{Dispatcher, PassSummary};
use crate::error::{ConfigError, ReporterError};
use crate::reporter::Reporter;

pub struct Exporter {
    reporter: Arc<Reporter>,
    targets: Arc<[Target]>,
    dispatcher: Arc<Dispatcher>,
}

impl Exporter {
    pub fn new(reporter: Arc<Reporter>, config: Configuration, dispatcher: Dispatcher) -> Self {
        Self {
            reporter,
            targets: config.into_targets().into(),
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Validate `raw` with the default probers
    pub fn from_raw(raw: &RawConfiguration) -> Result<Self, ConfigError> {
        Self::from_raw_with(raw, Dispatcher::new())
    }

    /// Validate `raw`, registering its metrics in a fresh reporter
    pub fn from_raw_with(raw: &RawConfiguration, dispatcher: Dispatcher) -> Result<Self, ConfigError> {
        let reporter = Arc::new(Reporter::new(&raw.namespace, &raw.tags)?);
        let config = raw.validate(reporter.as_ref())?;

        if let Some(target) = config
            .targets()
            .iter()
            .find(|target| !dispatcher.supports(target.rule.protocol()))
        {
            tracing::warn!(
                "{}: no prober for protocol {}, the target will always report 0",
                target.name,
                target.rule.protocol()
            );
        }

        Ok(Self::new(reporter, config, dispatcher))
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Probe every target once
    pub async fn run_pass(&self) -> PassSummary {
        self.dispatcher.run_pass(&self.targets, &self.reporter).await
    }

    /// Run a collection pass and return the resulting snapshot
    #[instrument(skip_all)]
    pub async fn collect(&self) -> Vec<MetricFamily> {
        self.run_pass().await;
        self.reporter.snapshot()
    }

    /// Run a collection pass and render it in the text exposition format
    pub async fn collect_text(&self) -> Result<String, ReporterError> {
        self.run_pass().await;
        self.reporter.encode_text()
    }
}

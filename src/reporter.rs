//! Dynamic metric registry
//!
//! The [`Reporter`] owns every series the prober exposes. Three series are
//! always present (`latency_seconds`, `size_bytes`, `response_code`); every
//! other series is keyed by a metric name chosen in the configuration and is
//! registered either up front via [`MetricMaker::make_metric`] or lazily on
//! first write.
//!
//! ## Label schema
//!
//! All series share the same label names for the lifetime of the process:
//! `address`, `host` and then every configured constant tag, sorted by name.
//! Only the values vary between observations.
//!
//! ## Concurrency
//!
//! The name → series map sits behind a read/write lock that is only taken
//! for the lookup and for double-checked insertion. Setting a value on a
//! series handle goes through the atomic gauge cell of that label tuple and
//! never touches the map lock.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::RwLock;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::{trace, warn};

use crate::error::ReporterError;

pub const ADDRESS_LABEL: &str = "address";
pub const HOST_LABEL: &str = "host";

const LATENCY_METRIC: &str = "latency_seconds";
const SIZE_METRIC: &str = "size_bytes";
const HTTP_STATUS_METRIC: &str = "response_code";

const LATENCY_HELP: &str = "Latency of the probe in seconds";
const SIZE_HELP: &str = "Size of the probe response in bytes";
const HTTP_STATUS_HELP: &str = "HTTP response code";

/// Creates metrics to be reported later on
pub trait MetricMaker {
    /// Registers `name` if it does not exist yet. Registering an existing
    /// name is a no-op.
    fn make_metric(&self, name: &str) -> Result<(), ReporterError>;
}

/// Per-target label values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels {
    pub address: String,
    pub host: String,
}

impl Labels {
    pub fn new(address: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            host: host.into(),
        }
    }
}

/// Metadata of one exposed series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDescription {
    /// Fully qualified name (namespace included)
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
}

pub struct Reporter {
    namespace: String,
    tags: BTreeMap<String, String>,
    label_names: Vec<String>,
    registry: Registry,
    latency: GaugeVec,
    size: GaugeVec,
    http_status: GaugeVec,
    other_metrics: RwLock<HashMap<String, GaugeVec>>,
}

impl Reporter {
    /// Create a reporter with the built-in series registered
    ///
    /// Fails if a tag name is not a valid label name or collides with one of
    /// the per-target labels.
    pub fn new(namespace: &str, tags: &BTreeMap<String, String>) -> Result<Self, ReporterError> {
        if let Some(reserved) = tags
            .keys()
            .find(|name| *name == ADDRESS_LABEL || *name == HOST_LABEL)
        {
            return Err(ReporterError::ReservedTag(reserved.clone()));
        }

        let mut label_names = vec![ADDRESS_LABEL.to_string(), HOST_LABEL.to_string()];
        label_names.extend(tags.keys().cloned());

        let registry = Registry::new();
        let latency = gauge_vec(namespace, &label_names, LATENCY_METRIC, LATENCY_HELP)?;
        let size = gauge_vec(namespace, &label_names, SIZE_METRIC, SIZE_HELP)?;
        let http_status = gauge_vec(namespace, &label_names, HTTP_STATUS_METRIC, HTTP_STATUS_HELP)?;
        for builtin in [&latency, &size, &http_status] {
            registry.register(Box::new(builtin.clone()))?;
        }

        Ok(Self {
            namespace: namespace.to_string(),
            tags: tags.clone(),
            label_names,
            registry,
            latency,
            size,
            http_status,
            other_metrics: RwLock::new(HashMap::new()),
        })
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Get the series registered under `name`, creating it if needed
    ///
    /// At most one series exists per name: concurrent first use of the same
    /// name is resolved under the write lock.
    pub fn series(&self, name: &str) -> Result<GaugeVec, ReporterError> {
        if let Some(metric) = self.other_metrics.read().get(name) {
            return Ok(metric.clone());
        }

        let mut metrics = self.other_metrics.write();
        // another task may have created it while we waited for the lock
        if let Some(metric) = metrics.get(name) {
            return Ok(metric.clone());
        }

        let metric = gauge_vec(&self.namespace, &self.label_names, name, name)?;
        self.registry.register(Box::new(metric.clone()))?;
        metrics.insert(name.to_string(), metric.clone());
        trace!("registered metric {name}");

        Ok(metric)
    }

    pub fn report_value(&self, name: &str, labels: &Labels, value: f64) {
        match self.series(name) {
            Ok(metric) => metric
                .with_label_values(self.label_values(labels).as_slice())
                .set(value),
            Err(e) => warn!("cannot report {name} for {}: {e}", labels.address),
        }
    }

    pub fn report_success(&self, name: &str, labels: &Labels, success: bool) {
        self.report_value(name, labels, if success { 1.0 } else { 0.0 });
    }

    pub fn report_latency(&self, labels: &Labels, latency: Duration) {
        self.latency
            .with_label_values(self.label_values(labels).as_slice())
            .set(latency.as_secs_f64());
    }

    pub fn report_size(&self, labels: &Labels, size: usize) {
        self.size
            .with_label_values(self.label_values(labels).as_slice())
            .set(size as f64);
    }

    pub fn report_http_status(&self, labels: &Labels, status: u16) {
        self.http_status
            .with_label_values(self.label_values(labels).as_slice())
            .set(f64::from(status));
    }

    /// Current values of every series
    pub fn snapshot(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Metadata of every series, built-in series first
    pub fn describe(&self) -> Vec<SeriesDescription> {
        let mut dynamic = self
            .other_metrics
            .read()
            .keys()
            .map(|name| (name.clone(), name.clone()))
            .collect::<Vec<_>>();
        dynamic.sort();

        [
            (LATENCY_METRIC.to_string(), LATENCY_HELP.to_string()),
            (SIZE_METRIC.to_string(), SIZE_HELP.to_string()),
            (HTTP_STATUS_METRIC.to_string(), HTTP_STATUS_HELP.to_string()),
        ]
        .into_iter()
        .chain(dynamic)
        .map(|(name, help)| SeriesDescription {
            name: self.qualified_name(&name),
            help,
            label_names: self.label_names.clone(),
        })
        .collect()
    }

    /// Render the snapshot in the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String, ReporterError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.snapshot(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ReporterError::Prometheus(prometheus::Error::Msg(e.to_string())))
    }

    fn qualified_name(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}_{name}", self.namespace)
        }
    }

    fn label_values<'a>(&'a self, labels: &'a Labels) -> Vec<&'a str> {
        let mut values = Vec::with_capacity(self.label_names.len());
        values.push(labels.address.as_str());
        values.push(labels.host.as_str());
        values.extend(self.tags.values().map(String::as_str));
        values
    }
}

impl MetricMaker for Reporter {
    fn make_metric(&self, name: &str) -> Result<(), ReporterError> {
        self.series(name).map(|_| ())
    }
}

fn gauge_vec(
    namespace: &str,
    label_names: &[String],
    name: &str,
    help: &str,
) -> Result<GaugeVec, ReporterError> {
    let label_names = label_names.iter().map(String::as_str).collect::<Vec<_>>();
    let opts = Opts::new(name, help).namespace(namespace);
    Ok(GaugeVec::new(opts, &label_names)?)
}

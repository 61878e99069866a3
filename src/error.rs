//! Error types for configuration loading, metric reporting and probing
//!
//! Configuration errors are fatal at load time. Probe errors never leave a
//! prober: they are logged and surface only as a `0` on the rule's success
//! series.

use std::time::Duration;

use thiserror::Error;

use crate::config::Protocol;

/// Result type alias for configuration validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The rule's `type` is not one of http, tcp, icmp or sql
    #[error("rule {rule}: unsupported type '{kind}', expected one of http, tcp, icmp, sql")]
    UnsupportedType { rule: String, kind: String },

    /// An `http:` section was given on a rule that is not of type http
    #[error("rule {rule}: http section is only allowed for rules of type http")]
    UnexpectedHttpSection { rule: String },

    #[error("rule {rule}: body_regexp and body_content are mutually exclusive")]
    BodyMatchConflict { rule: String },

    #[error("rule {rule}: ignore_http_status and statuses are mutually exclusive")]
    StatusPolicyConflict { rule: String },

    /// The body pattern does not compile
    #[error("rule {rule}: cannot compile regex '{pattern}': {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A payload_extract block is missing one of its fields
    #[error("rule {rule}: payload_extract {field} must be non empty")]
    EmptyPayloadExtractField { rule: String, field: &'static str },

    /// The metric name cannot be registered as a series
    #[error("invalid metric name '{name}': {reason}")]
    InvalidMetricName { name: String, reason: String },

    /// The targets section references a rule that does not exist
    #[error("unknown rule {0}")]
    UnknownRule(String),

    /// A target address cannot be interpreted for its rule's protocol
    #[error("invalid {protocol} target address '{address}': {reason}")]
    InvalidAddress {
        protocol: Protocol,
        address: String,
        reason: String,
    },

    /// The metric registry cannot be set up with the configured tags
    #[error(transparent)]
    Reporter(#[from] ReporterError),

    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("cannot parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the metric registry
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("metric registry error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// A constant tag collides with one of the per-target labels
    #[error("tag '{0}' is reserved for per-target labels")]
    ReservedTag(String),
}

/// Errors that can happen during a single probe
///
/// These are recovered inside the prober; the type only exists so that the
/// individual steps can use `?` and produce a descriptive log line.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No prober is registered for the protocol of the target's rule
    #[error("no prober registered for protocol {0}")]
    NoProber(Protocol),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// An external command exited unsuccessfully
    #[error("command '{program}' failed with {status}: {output}")]
    CommandFailed {
        program: String,
        status: String,
        output: String,
    },

    /// The extracted payload is not a decimal number
    #[error("cannot convert '{output}' to a float: {source}")]
    InvalidNumber {
        output: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[cfg(feature = "sql")]
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),
}

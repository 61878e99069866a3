//! Rule and target configuration
//!
//! [`RawConfiguration`] is the deserialized form of the configuration file.
//! [`RawConfiguration::validate`] applies defaults, checks every cross-field
//! invariant, pre-registers all metric names and expands the `targets`
//! section into an ordered list of [`Target`]s. Validation fails fast: the
//! first malformed rule aborts loading.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::bytes::Regex;
use tracing::{debug, trace};
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::reporter::{Labels, MetricMaker};
use crate::util::host_of;

/// Timeout applied when a rule does not specify one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Success metric name used when a rule does not specify one
pub const DEFAULT_METRIC_NAME: &str = "Up";

/// Maximum number of body bytes read when a rule does not specify one
pub const DEFAULT_READ_MAX: usize = 10_000_000;

/// Host label value for targets whose host cannot be determined
const UNKNOWN_HOST: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct RawConfiguration {
    /// Prefix prepended to every series name
    pub namespace: String,

    /// Constant labels put on every series
    pub tags: BTreeMap<String, String>,

    pub rules: BTreeMap<String, RawRule>,

    /// Rule name to the addresses probed with that rule
    pub targets: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct RawRule {
    #[serde(rename = "type")]
    pub kind: String,

    /// Timeout in seconds, `0` selects the default
    #[serde(default)]
    pub timeout: u64,

    #[serde(default)]
    pub metric_name: String,

    #[serde(default)]
    pub http: Option<RawHttpSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct RawHttpSpec {
    pub ignore_http_status: bool,
    pub statuses: Vec<u16>,
    pub body_content: Option<String>,
    pub body_regexp: Option<String>,
    pub payload_extract: Option<RawPayloadExtract>,
    pub insecure: bool,
    pub read_max: usize,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct RawPayloadExtract {
    pub metric_name: String,
    pub jq_query: String,
}

/// Wire protocol of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Http,
    Tcp,
    Icmp,
    Sql,
}

impl Protocol {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "http" => Some(Protocol::Http),
            "tcp" => Some(Protocol::Tcp),
            "icmp" => Some(Protocol::Icmp),
            "sql" => Some(Protocol::Sql),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
            Protocol::Icmp => "icmp",
            Protocol::Sql => "sql",
        };
        f.write_str(name)
    }
}

/// A validated rule, shared read-only by all of its targets
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub kind: RuleKind,
    pub timeout: Duration,
    pub metric_name: String,
}

impl Rule {
    pub fn protocol(&self) -> Protocol {
        self.kind.protocol()
    }

    pub fn http(&self) -> Option<&HttpSpec> {
        match &self.kind {
            RuleKind::Http(spec) => Some(spec),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Http(HttpSpec),
    Tcp,
    Icmp,
    Sql,
}

impl RuleKind {
    pub fn protocol(&self) -> Protocol {
        match self {
            RuleKind::Http(_) => Protocol::Http,
            RuleKind::Tcp => Protocol::Tcp,
            RuleKind::Icmp => Protocol::Icmp,
            RuleKind::Sql => Protocol::Sql,
        }
    }
}

/// Success criteria of an HTTP rule
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSpec {
    pub body: BodyMatch,
    pub statuses: StatusPolicy,
    pub payload_extract: Option<PayloadExtract>,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Bytes of the body read at most; the rest is silently dropped
    pub read_max: usize,
}

/// How the response body is checked
#[derive(Debug, Clone)]
pub enum BodyMatch {
    Any,
    /// The whitespace-trimmed body must equal the content
    Exact(String),
    Pattern(Regex),
}

impl BodyMatch {
    pub fn matches(&self, body: &[u8]) -> bool {
        match self {
            BodyMatch::Any => true,
            BodyMatch::Exact(content) => match std::str::from_utf8(body) {
                Ok(text) => text.trim() == content,
                Err(_) => body.trim_ascii() == content.as_bytes(),
            },
            BodyMatch::Pattern(pattern) => pattern.is_match(body),
        }
    }
}

impl PartialEq for BodyMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BodyMatch::Any, BodyMatch::Any) => true,
            (BodyMatch::Exact(a), BodyMatch::Exact(b)) => a == b,
            (BodyMatch::Pattern(a), BodyMatch::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// Which HTTP status codes count as healthy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPolicy {
    Ignore,
    OneOf(BTreeSet<u16>),
    /// 200 through 299
    Success,
}

impl StatusPolicy {
    pub fn is_valid(&self, status: u16) -> bool {
        match self {
            StatusPolicy::Ignore => true,
            StatusPolicy::OneOf(statuses) => statuses.contains(&status),
            StatusPolicy::Success => (200..300).contains(&status),
        }
    }
}

/// Extracts a numeric value from a successful HTTP response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadExtract {
    pub metric_name: String,
    pub jq_query: String,
}

/// Where a target is reached, interpreted per protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Url(Url),
    Socket {
        host_port: String,
        /// Read the stream to its end and report the byte count
        read_check: bool,
    },
    Host(String),
    ConnectionString(String),
}

/// One address bound to one rule
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub endpoint: Endpoint,
    pub rule: Arc<Rule>,
    labels: Labels,
}

impl Target {
    pub fn new(address: &str, rule: Arc<Rule>) -> ConfigResult<Self> {
        let protocol = rule.protocol();
        let invalid = |reason: &str| ConfigError::InvalidAddress {
            protocol,
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let mut label = address.to_string();
        let (endpoint, host) = match protocol {
            Protocol::Http => {
                let url = Url::parse(address).map_err(|e| invalid(&e.to_string()))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(invalid("scheme must be http or https"));
                }
                let host = url
                    .host_str()
                    .ok_or_else(|| invalid("missing host"))?
                    .to_string();
                (Endpoint::Url(url), host)
            }
            Protocol::Tcp => {
                let (host_port, read_check) = parse_socket(address).map_err(invalid)?;
                let host = host_of(&host_port).to_string();
                (
                    Endpoint::Socket {
                        host_port,
                        read_check,
                    },
                    host,
                )
            }
            Protocol::Icmp => {
                let host = match address.strip_prefix("icmp://") {
                    Some(rest) => host_of(rest.trim_end_matches('/')),
                    None => host_of(address),
                };
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                (Endpoint::Host(host.to_string()), host.to_string())
            }
            Protocol::Sql => {
                let (url, shown) = parse_database(address).map_err(invalid)?;
                label = shown;
                let host = url
                    .host_str()
                    .map_or_else(|| UNKNOWN_HOST.to_string(), str::to_string);
                (Endpoint::ConnectionString(url.to_string()), host)
            }
        };

        Ok(Self {
            name: label.clone(),
            endpoint,
            labels: Labels::new(label, host),
            rule,
        })
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}

/// Accepts `host:port` or `tcp://host:port[/path]`
fn parse_socket(address: &str) -> Result<(String, bool), &'static str> {
    if address.contains("://") {
        let url = Url::parse(address).map_err(|_| "not a valid URL")?;
        if url.scheme() != "tcp" {
            return Err("scheme must be tcp");
        }
        let host = url.host_str().ok_or("missing host")?;
        let port = url.port().ok_or("missing port")?;
        let read_check = !matches!(url.path(), "" | "/");
        return Ok((format!("{host}:{port}"), read_check));
    }

    let (host, port) = address.rsplit_once(':').ok_or("missing port")?;
    if host.is_empty() {
        return Err("missing host");
    }
    port.parse::<u16>().map_err(|_| "invalid port")?;
    Ok((address.to_string(), false))
}

/// URL schemes the SQL prober has drivers for
const DATABASE_SCHEMES: [&str; 5] = ["mysql", "mariadb", "postgres", "postgresql", "sqlite"];

/// Turns a database address into a connection URL and the label value
/// exposed for it. The label never carries credentials.
///
/// Accepts connection URLs and MySQL DSNs of the form
/// `[user[:password]@]tcp(host:port)/dbname[?params]`.
fn parse_database(address: &str) -> Result<(Url, String), &'static str> {
    if address.is_empty() {
        return Err("empty connection string");
    }
    if address.contains("tcp(") {
        return parse_mysql_dsn(address);
    }

    let url = Url::parse(address).map_err(|_| "expected a database URL or a MySQL DSN")?;
    if !DATABASE_SCHEMES.contains(&url.scheme()) {
        return Err("unsupported database scheme");
    }

    let mut shown = url.clone();
    // sqlite URLs cannot carry a user, the setters refuse them
    let _ = shown.set_username("");
    let _ = shown.set_password(None);
    // query parameters may hold a password too
    shown.set_query(None);
    Ok((url, shown.to_string()))
}

/// Labeled by `host:port` only, as DSNs are usually written that way in
/// dashboards
fn parse_mysql_dsn(dsn: &str) -> Result<(Url, String), &'static str> {
    let (head, database) = dsn.rsplit_once('/').ok_or("missing /dbname")?;
    let (userinfo, net) = match head.rsplit_once('@') {
        Some((userinfo, net)) => (Some(userinfo), net),
        None => (None, head),
    };
    let addr = net
        .strip_prefix("tcp(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or("only tcp(host:port) DSN addresses are supported")?;
    if addr.is_empty() {
        return Err("missing host");
    }

    let mut url = Url::parse(&format!("mysql://{addr}/{database}")).map_err(|_| "invalid DSN address")?;
    if let Some(userinfo) = userinfo {
        let (user, password) = match userinfo.split_once(':') {
            Some((user, password)) => (user, Some(password)),
            None => (userinfo, None),
        };
        url.set_username(user).map_err(|_| "invalid DSN user")?;
        url.set_password(password).map_err(|_| "invalid DSN password")?;
    }

    Ok((url, addr.to_string()))
}

/// The validated configuration
#[derive(Debug, Clone)]
pub struct Configuration {
    rules: BTreeMap<String, Arc<Rule>>,
    targets: Vec<Target>,
}

impl Configuration {
    pub fn rules(&self) -> &BTreeMap<String, Arc<Rule>> {
        &self.rules
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn into_targets(self) -> Vec<Target> {
        self.targets
    }

    /// Every series name a probe of this configuration writes to, besides
    /// the built-in ones
    pub fn metric_names(&self) -> BTreeSet<&str> {
        self.rules
            .values()
            .flat_map(|rule| {
                let extract = rule
                    .http()
                    .and_then(|spec| spec.payload_extract.as_ref())
                    .map(|extract| extract.metric_name.as_str());
                std::iter::once(rule.metric_name.as_str()).chain(extract)
            })
            .collect()
    }
}

impl RawConfiguration {
    /// Validate rules, pre-register their metrics and expand the targets
    pub fn validate(&self, maker: &dyn MetricMaker) -> ConfigResult<Configuration> {
        let mut rules = BTreeMap::new();
        for (name, raw) in &self.rules {
            let rule = raw.setup(name, maker)?;
            trace!("validated rule {name}: {rule:?}");
            rules.insert(name.clone(), Arc::new(rule));
        }

        let mut targets = Vec::new();
        for (rule_name, addresses) in &self.targets {
            let rule = rules
                .get(rule_name)
                .ok_or_else(|| ConfigError::UnknownRule(rule_name.clone()))?;
            for address in addresses {
                targets.push(Target::new(address, rule.clone())?);
            }
        }

        debug!(
            "loaded {} rules and {} targets",
            rules.len(),
            targets.len()
        );

        Ok(Configuration {
            rules,
            targets,
        })
    }
}

impl RawRule {
    fn setup(&self, name: &str, maker: &dyn MetricMaker) -> ConfigResult<Rule> {
        let metric_name = if self.metric_name.is_empty() {
            DEFAULT_METRIC_NAME.to_string()
        } else {
            self.metric_name.clone()
        };
        let timeout = match self.timeout {
            0 => DEFAULT_TIMEOUT,
            secs => Duration::from_secs(secs),
        };

        let protocol = Protocol::parse(&self.kind).ok_or_else(|| ConfigError::UnsupportedType {
            rule: name.to_string(),
            kind: self.kind.clone(),
        })?;
        make_metric(maker, &metric_name)?;

        let kind = match protocol {
            Protocol::Http => {
                let raw = self.http.clone().unwrap_or_default();
                RuleKind::Http(raw.setup(name, maker)?)
            }
            _ if self.http.is_some() => {
                return Err(ConfigError::UnexpectedHttpSection {
                    rule: name.to_string(),
                });
            }
            Protocol::Tcp => RuleKind::Tcp,
            Protocol::Icmp => RuleKind::Icmp,
            Protocol::Sql => RuleKind::Sql,
        };

        Ok(Rule {
            name: name.to_string(),
            kind,
            timeout,
            metric_name,
        })
    }
}

impl RawHttpSpec {
    fn setup(&self, rule: &str, maker: &dyn MetricMaker) -> ConfigResult<HttpSpec> {
        let content = self.body_content.clone().filter(|c| !c.is_empty());
        let pattern = self.body_regexp.clone().filter(|p| !p.is_empty());

        let body = match (content, pattern) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::BodyMatchConflict {
                    rule: rule.to_string(),
                });
            }
            (None, Some(pattern)) => {
                let compiled = Regex::new(&pattern).map_err(|source| ConfigError::InvalidPattern {
                    rule: rule.to_string(),
                    pattern: pattern.clone(),
                    source,
                })?;
                BodyMatch::Pattern(compiled)
            }
            (Some(content), None) => BodyMatch::Exact(content),
            (None, None) => BodyMatch::Any,
        };

        let statuses = match (self.ignore_http_status, self.statuses.is_empty()) {
            (true, false) => {
                return Err(ConfigError::StatusPolicyConflict {
                    rule: rule.to_string(),
                });
            }
            (true, true) => StatusPolicy::Ignore,
            (false, false) => StatusPolicy::OneOf(self.statuses.iter().copied().collect()),
            (false, true) => StatusPolicy::Success,
        };

        let payload_extract = match &self.payload_extract {
            Some(raw) => Some(raw.setup(rule, maker)?),
            None => None,
        };

        Ok(HttpSpec {
            body,
            statuses,
            payload_extract,
            insecure: self.insecure,
            read_max: match self.read_max {
                0 => DEFAULT_READ_MAX,
                max => max,
            },
        })
    }
}

impl RawPayloadExtract {
    fn setup(&self, rule: &str, maker: &dyn MetricMaker) -> ConfigResult<PayloadExtract> {
        let empty = |field| ConfigError::EmptyPayloadExtractField {
            rule: rule.to_string(),
            field,
        };
        if self.jq_query.is_empty() {
            return Err(empty("jq_query"));
        }
        if self.metric_name.is_empty() {
            return Err(empty("metric_name"));
        }
        make_metric(maker, &self.metric_name)?;

        Ok(PayloadExtract {
            metric_name: self.metric_name.clone(),
            jq_query: self.jq_query.clone(),
        })
    }
}

fn make_metric(maker: &dyn MetricMaker, name: &str) -> ConfigResult<()> {
    maker
        .make_metric(name)
        .map_err(|e| ConfigError::InvalidMetricName {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

/// Read a configuration file, YAML for `.yml`/`.yaml` and JSON otherwise
pub fn read_config_file(path: impl AsRef<Path>) -> ConfigResult<RawConfiguration> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| matches!(extension, "yml" | "yaml"));

    let config = if is_yaml {
        serde_yaml::from_str(&file_content)?
    } else {
        serde_json::from_str(&file_content)?
    };
    trace!("loaded config: {config:?}");
    Ok(config)
}

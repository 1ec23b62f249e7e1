//! Run configuration: the downstream collector, the amplification
//! parameters and the span tree to generate.
//!
//! The configuration is a JSON document. Loading it parses the file,
//! applies the environment overrides from [`env`], validates the result and
//! distributes the padding budget across the span tree.
pub(crate) mod env;

use crate::codec::Format;
use rand::Rng;
use serde::Deserialize;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service name used when the configuration does not name one.
pub const DEFAULT_SERVICE_NAME: &str = "zipkin-amplifier";

/// Zipkin v2 span ingestion path, shared by the relay and the downstream.
pub const SPANS_PATH: &str = "/api/v2/spans";

/// Errors raised while loading the configuration.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON or has the wrong shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The trace tree has no nodes.
    #[error("config has an empty trace")]
    EmptyTrace,

    /// A span node has no operation name.
    #[error("span at {position} has no operation name")]
    MissingOperation {
        /// Location of the node, e.g. `trace[0].children[2]`.
        position: String,
    },

    /// No downstream collector address was configured.
    #[error("no downstream agent configured, set dk_agent or ZIPKIN_AMPLIFIER_ENDPOINT")]
    MissingDownstream,

    /// The downstream collector address is not a valid URI.
    #[error("invalid downstream endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        /// The configured address.
        endpoint: String,
        /// Why it was rejected.
        #[source]
        source: http::uri::InvalidUri,
    },

    /// A tag value is neither a string, a number nor a boolean.
    #[error("tag {key} at {position} has a {found} value, expected string, number or boolean")]
    InvalidTagValue {
        /// Tag key.
        key: String,
        /// Location of the node carrying the tag.
        position: String,
        /// JSON type found.
        found: &'static str,
    },

    /// `encode` names a format other than `json` or `protobuf`.
    #[error("unknown encode format {0:?}, expected \"json\" or \"protobuf\"")]
    UnknownEncoding(String),
}

/// Amplification parameters of the fan-out sender.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SenderConfig {
    /// Number of concurrent workers.
    pub threads: u32,
    /// Sequential posts per worker.
    pub send_count: u32,
    /// Pause between a worker's posts.
    #[serde(default, with = "millis")]
    pub send_interval: Duration,
}

impl SenderConfig {
    /// Whether the sender would make any outbound call at all.
    pub fn amplifies(&self) -> bool {
        self.threads > 0 && self.send_count > 0
    }

    /// Total number of posts a full fan-out makes.
    pub fn total_sends(&self) -> u64 {
        u64::from(self.threads) * u64::from(self.send_count)
    }
}

/// A loosely typed tag value, stringified when attached to a span.
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    /// `true` or `false`.
    Bool(bool),
    /// Any JSON number.
    Number(serde_json::Number),
    /// Free text.
    String(String),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(b) => b.fmt(f),
            TagValue::Number(n) => n.fmt(f),
            TagValue::String(s) => f.write_str(s),
        }
    }
}

impl TagValue {
    fn from_json(
        key: &str,
        position: &str,
        value: serde_json::Value,
    ) -> Result<Self, ConfigError> {
        let found = match value {
            serde_json::Value::Bool(b) => return Ok(TagValue::Bool(b)),
            serde_json::Value::Number(n) => return Ok(TagValue::Number(n)),
            serde_json::Value::String(s) => return Ok(TagValue::String(s)),
            serde_json::Value::Null => "null",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Err(ConfigError::InvalidTagValue {
            key: key.to_string(),
            position: position.to_string(),
            found,
        })
    }
}

/// A user declared span tag.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: TagValue,
}

/// One node of the span tree to generate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanSpec {
    /// Operation name, used as the span name.
    pub operation: String,
    /// Value of the `resource.name` tag.
    pub resource: String,
    /// Value of the `span.type` tag.
    pub span_type: String,
    /// How long the span stays open.
    pub duration: Duration,
    /// Error message; the span is marked failed when present.
    pub error: Option<String>,
    /// User tags, attached in order.
    pub tags: Vec<Tag>,
    /// Child spans.
    pub children: Vec<SpanSpec>,
    /// Random bytes attached as `_dump_data` when the span finishes.
    ///
    /// Derived from the padding budget at load time.
    pub padding_bytes: u64,
}

/// Complete run configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Downstream collector, `host:port` or an `http(s)://` base URL.
    pub dk_agent: String,
    /// Amplification parameters.
    pub sender: SenderConfig,
    /// Service name of the generated spans.
    pub service: String,
    /// Wire format used by the reporter and the fan-out.
    pub encode: Format,
    /// Padding budget for the whole tree, in KiB.
    pub dump_size: u64,
    /// Draw each node's padding at random below its even share.
    pub random_dump: bool,
    /// Give every fan-out post a fresh trace id.
    pub mutate_trace_id: bool,
    /// Gzip the reporter's batch.
    pub gzip: bool,
    /// Address the relay agent listens on.
    pub agent_address: SocketAddr,
    /// Timeout of every outbound HTTP call.
    pub timeout: Duration,
    /// Top-level span nodes.
    pub trace: Vec<SpanSpec>,
}

impl Config {
    /// Reads, validates and prepares the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_json(&contents)
    }

    /// Path used when none is given: `$ZIPKIN_AMPLIFIER_CONFIG` or
    /// `./config.json`.
    pub fn default_path() -> PathBuf {
        env::get_config_path()
    }

    /// Parses and prepares a configuration document.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = serde_json::from_str(contents)?;
        let mut config = Config::try_from(file)?;
        config.prepare(&mut rand::rng());
        Ok(config)
    }

    /// Base URL of the downstream collector, without a trailing slash.
    pub fn downstream_base(&self) -> Result<String, ConfigError> {
        downstream_base(&self.dk_agent)
    }

    /// Full URL of the downstream span ingestion endpoint.
    pub fn downstream_endpoint(&self) -> Result<String, ConfigError> {
        Ok(format!("{}{}", self.downstream_base()?, SPANS_PATH))
    }

    /// Total padding budget in bytes.
    pub fn padding_budget(&self) -> u64 {
        self.dump_size.saturating_mul(1024)
    }

    fn prepare<R: Rng>(&mut self, rng: &mut R) {
        let spans = count_spans(&self.trace) as u64;
        let per_node = self.padding_budget().checked_div(spans).unwrap_or(0);
        tracing::info!(
            name: "config.padding",
            span_count = spans,
            budget_bytes = self.padding_budget(),
            per_node_bytes = per_node,
            random = self.random_dump,
        );
        distribute_padding(&mut self.trace, per_node, self.random_dump, rng);
    }
}

/// Counts every node of a span tree.
pub fn count_spans(trace: &[SpanSpec]) -> usize {
    trace
        .iter()
        .map(|node| 1 + count_spans(&node.children))
        .sum()
}

/// Assigns `per_node` padding bytes to every node, or a random amount in
/// `[0, per_node)` when `random` is set.
pub fn distribute_padding<R: Rng>(
    trace: &mut [SpanSpec],
    per_node: u64,
    random: bool,
    rng: &mut R,
) {
    for node in trace {
        node.padding_bytes = match (random, per_node) {
            (_, 0) => 0,
            (true, ceiling) => rng.random_range(0..ceiling),
            (false, fixed) => fixed,
        };
        distribute_padding(&mut node.children, per_node, random, rng);
    }
}

fn downstream_base(dk_agent: &str) -> Result<String, ConfigError> {
    let trimmed = dk_agent.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::MissingDownstream);
    }
    let base = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    base.parse::<http::Uri>()
        .map_err(|source| ConfigError::InvalidEndpoint {
            endpoint: dk_agent.to_string(),
            source,
        })?;
    Ok(base)
}

#[derive(Deserialize)]
struct FileConfig {
    #[serde(default)]
    dk_agent: String,
    sender: SenderConfig,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    encode: Option<String>,
    #[serde(default)]
    dump_size: u64,
    #[serde(default)]
    random_dump: bool,
    #[serde(default = "default_true")]
    mutate_trace_id: bool,
    #[serde(default)]
    gzip: bool,
    #[serde(default = "default_agent_address")]
    agent_address: SocketAddr,
    #[serde(default)]
    trace: Vec<FileSpan>,
}

#[derive(Deserialize)]
struct FileSpan {
    #[serde(default)]
    operation: String,
    #[serde(default)]
    resource: String,
    #[serde(default)]
    span_type: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    error: String,
    #[serde(default)]
    tags: Vec<FileTag>,
    #[serde(default)]
    children: Vec<FileSpan>,
}

#[derive(Deserialize)]
struct FileTag {
    key: String,
    value: serde_json::Value,
}

fn default_true() -> bool {
    true
}

fn default_agent_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

impl TryFrom<FileConfig> for Config {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let encode = match file.encode.as_deref().map(str::trim) {
            None | Some("") | Some("protobuf") => Format::Protobuf,
            Some("json") => Format::Json,
            Some(other) => return Err(ConfigError::UnknownEncoding(other.to_string())),
        };

        let dk_agent = env::get_endpoint().unwrap_or(file.dk_agent);
        downstream_base(&dk_agent)?;

        if file.trace.is_empty() {
            return Err(ConfigError::EmptyTrace);
        }
        let trace = file
            .trace
            .into_iter()
            .enumerate()
            .map(|(i, span)| span.into_spec(format!("trace[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            dk_agent,
            sender: file.sender,
            service: file
                .service
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            encode,
            dump_size: file.dump_size,
            random_dump: file.random_dump,
            mutate_trace_id: file.mutate_trace_id,
            gzip: file.gzip,
            agent_address: file.agent_address,
            timeout: env::get_timeout(),
            trace,
        })
    }
}

impl FileSpan {
    fn into_spec(self, position: String) -> Result<SpanSpec, ConfigError> {
        if self.operation.trim().is_empty() {
            return Err(ConfigError::MissingOperation { position });
        }
        let tags = self
            .tags
            .into_iter()
            .map(|tag| {
                let value = TagValue::from_json(&tag.key, &position, tag.value)?;
                Ok(Tag {
                    key: tag.key,
                    value,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let children = self
            .children
            .into_iter()
            .enumerate()
            .map(|(i, child)| child.into_spec(format!("{position}.children[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SpanSpec {
            operation: self.operation,
            resource: self.resource,
            span_type: self.span_type,
            duration: Duration::from_millis(self.duration),
            error: Some(self.error).filter(|e| !e.is_empty()),
            tags,
            children,
            padding_bytes: 0,
        })
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const MINIMAL: &str = r#"{
        "dk_agent": "127.0.0.1:9529",
        "sender": {"threads": 2, "send_count": 3},
        "trace": [{"operation": "GET /", "resource": "/", "span_type": "web", "duration": 5}]
    }"#;

    fn leaf(operation: &str) -> SpanSpec {
        SpanSpec {
            operation: operation.to_string(),
            ..Default::default()
        }
    }

    fn tree() -> Vec<SpanSpec> {
        vec![
            SpanSpec {
                children: vec![
                    leaf("a"),
                    SpanSpec {
                        children: vec![leaf("c"), leaf("d")],
                        ..leaf("b")
                    },
                ],
                ..leaf("root")
            },
            leaf("other"),
        ]
    }

    fn paddings(trace: &[SpanSpec], out: &mut Vec<u64>) {
        for node in trace {
            out.push(node.padding_bytes);
            paddings(&node.children, out);
        }
    }

    fn load(contents: &str) -> Result<Config, ConfigError> {
        temp_env::with_vars_unset(
            ["ZIPKIN_AMPLIFIER_ENDPOINT", "ZIPKIN_AMPLIFIER_TIMEOUT"],
            || Config::from_json(contents),
        )
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = load(MINIMAL).unwrap();
        assert_eq!(config.service, DEFAULT_SERVICE_NAME);
        assert_eq!(config.encode, Format::Protobuf);
        assert_eq!(config.dump_size, 0);
        assert!(!config.random_dump);
        assert!(config.mutate_trace_id);
        assert!(!config.gzip);
        assert_eq!(config.agent_address, "127.0.0.1:0".parse().unwrap());
        assert_eq!(config.timeout, Duration::from_millis(10_000));
        assert_eq!(config.sender.send_interval, Duration::ZERO);
        assert_eq!(config.trace[0].duration, Duration::from_millis(5));
        assert_eq!(config.trace[0].error, None);
        assert_eq!(
            config.downstream_endpoint().unwrap(),
            "http://127.0.0.1:9529/api/v2/spans"
        );
    }

    #[test]
    fn full_config() {
        let config = load(
            r#"{
                "dk_agent": "https://collector.example.com:9411/",
                "sender": {"threads": 4, "send_count": 10, "send_interval": 250},
                "service": "checkout",
                "encode": "json",
                "dump_size": 8,
                "random_dump": true,
                "mutate_trace_id": false,
                "gzip": true,
                "agent_address": "127.0.0.1:30001",
                "trace": [{
                    "operation": "POST /pay",
                    "resource": "/pay",
                    "span_type": "web",
                    "duration": 40,
                    "error": "card declined",
                    "tags": [
                        {"key": "http.status_code", "value": 402},
                        {"key": "retry", "value": false},
                        {"key": "ratio", "value": 1.5},
                        {"key": "region", "value": "eu"}
                    ],
                    "children": [{"operation": "SELECT", "span_type": "db", "duration": 3}]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.service, "checkout");
        assert_eq!(config.encode, Format::Json);
        assert_eq!(config.sender.send_interval, Duration::from_millis(250));
        assert_eq!(config.sender.total_sends(), 40);
        assert!(!config.mutate_trace_id);
        assert!(config.gzip);
        assert_eq!(
            config.downstream_endpoint().unwrap(),
            "https://collector.example.com:9411/api/v2/spans"
        );

        let root = &config.trace[0];
        assert_eq!(root.error.as_deref(), Some("card declined"));
        let rendered: Vec<String> = root.tags.iter().map(|t| t.value.to_string()).collect();
        assert_eq!(rendered, ["402", "false", "1.5", "eu"]);
        assert_eq!(root.children[0].operation, "SELECT");
        // 8 KiB across two spans, drawn below the 4 KiB share
        assert!(root.padding_bytes < 4096);
        assert!(root.children[0].padding_bytes < 4096);
    }

    #[test]
    fn invalid_configs() {
        assert!(matches!(load("{"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            load(r#"{"dk_agent": "x:1", "sender": {"threads": -1, "send_count": 1}, "trace": []}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            load(r#"{"dk_agent": "x:1", "sender": {"threads": 1, "send_count": 1}, "trace": []}"#),
            Err(ConfigError::EmptyTrace)
        ));
        assert!(matches!(
            load(r#"{"sender": {"threads": 1, "send_count": 1}, "trace": [{"operation": "a"}]}"#),
            Err(ConfigError::MissingDownstream)
        ));
        assert!(matches!(
            load(r#"{"dk_agent": "bad host:1", "sender": {"threads": 1, "send_count": 1}, "trace": [{"operation": "a"}]}"#),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            load(r#"{"dk_agent": "x:1", "encode": "thrift", "sender": {"threads": 1, "send_count": 1}, "trace": [{"operation": "a"}]}"#),
            Err(ConfigError::UnknownEncoding(e)) if e == "thrift"
        ));
        assert!(matches!(
            load(r#"{"dk_agent": "x:1", "sender": {"threads": 1, "send_count": 1}, "trace": [{"operation": "a", "children": [{"resource": "r"}]}]}"#),
            Err(ConfigError::MissingOperation { position }) if position == "trace[0].children[0]"
        ));
        assert!(matches!(
            load(r#"{"dk_agent": "x:1", "sender": {"threads": 1, "send_count": 1}, "trace": [{"operation": "a", "tags": [{"key": "k", "value": [1]}]}]}"#),
            Err(ConfigError::InvalidTagValue { found: "array", .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            Config::load("/nonexistent/zipkin-amplifier.json"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn endpoint_override_replaces_dk_agent() {
        let config = temp_env::with_var(
            "ZIPKIN_AMPLIFIER_ENDPOINT",
            Some("http://override:9411"),
            || Config::from_json(MINIMAL),
        )
        .unwrap();
        assert_eq!(config.dk_agent, "http://override:9411");
    }

    #[test]
    fn counts_every_node() {
        assert_eq!(count_spans(&tree()), 6);
        assert_eq!(count_spans(&[]), 0);
    }

    #[test]
    fn fixed_padding_is_even_share() {
        let mut trace = tree();
        let per_node = 12 * 1024 / count_spans(&trace) as u64;
        distribute_padding(&mut trace, per_node, false, &mut StdRng::seed_from_u64(7));

        let mut out = Vec::new();
        paddings(&trace, &mut out);
        assert_eq!(out, vec![2048; 6]);
    }

    #[test]
    fn random_padding_stays_below_share() {
        let mut trace = tree();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            distribute_padding(&mut trace, 2048, true, &mut rng);
            let mut out = Vec::new();
            paddings(&trace, &mut out);
            assert_eq!(out.len(), 6);
            assert!(out.iter().all(|bytes| *bytes < 2048));
        }

        distribute_padding(&mut trace, 0, true, &mut rng);
        let mut out = Vec::new();
        paddings(&trace, &mut out);
        assert_eq!(out, vec![0; 6]);
    }
}

use super::{annotation::Annotation, endpoint::Endpoint, id, micros, SpanId, TraceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Clarifies the meaning of timestamp, duration and remote endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    /// Client side of an RPC.
    Client,
    /// Server side of an RPC.
    Server,
    /// Message sent to a broker.
    Producer,
    /// Message received from a broker.
    Consumer,
}

/// One span of a batch as it travels on the wire.
///
/// Field names follow the Zipkin v2 JSON model. Timestamps keep nanosecond
/// precision in memory; both wire formats carry microseconds.
#[derive(TypedBuilder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    /// Trace the span belongs to.
    pub trace_id: TraceId,
    /// Parent span, absent for a root span.
    #[builder(setter(strip_option), default)]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "id::deserialize_parent"
    )]
    pub parent_id: Option<SpanId>,
    /// Id of this span, never blank.
    pub id: SpanId,
    /// Span kind, absent for local spans.
    #[builder(setter(strip_option), default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    /// Operation name.
    #[builder(setter(into), default)]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Start of the span.
    #[builder(setter(strip_option), default)]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "micros::option_timestamp"
    )]
    pub timestamp: Option<SystemTime>,
    /// Duration of the critical path.
    #[builder(setter(strip_option), default)]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "micros::option_duration"
    )]
    pub duration: Option<Duration>,
    /// Host that recorded the span.
    #[builder(setter(strip_option), default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_endpoint: Option<Endpoint>,
    /// Other side of an RPC or messaging span.
    #[builder(setter(strip_option), default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<Endpoint>,
    /// Timestamped events.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    /// Span tags.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// Request to store the span regardless of sampling.
    #[builder(default = false)]
    #[serde(default, skip_serializing_if = "is_false")]
    pub debug: bool,
    /// Whether the span was started by another tracer.
    #[builder(default = false)]
    #[serde(default, skip_serializing_if = "is_false")]
    pub shared: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

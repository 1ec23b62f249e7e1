use crate::model::{Endpoint, Kind, SpanId, SpanRecord, TraceId};
use opentelemetry::trace::{SpanKind, Status};
use opentelemetry::{Key, KeyValue};
use opentelemetry_sdk::trace::SpanData;
use std::collections::HashMap;

const INSTRUMENTATION_LIBRARY_NAME: &str = "otel.library.name";
const INSTRUMENTATION_LIBRARY_VERSION: &str = "otel.library.version";
pub(crate) const OTEL_ERROR_DESCRIPTION: &str = "error";
pub(crate) const OTEL_STATUS_CODE: &str = "otel.status_code";

/// Converts `SpanKind` into an `Option<Kind>`
fn into_zipkin_span_kind(kind: SpanKind) -> Option<Kind> {
    match kind {
        SpanKind::Client => Some(Kind::Client),
        SpanKind::Server => Some(Kind::Server),
        SpanKind::Producer => Some(Kind::Producer),
        SpanKind::Consumer => Some(Kind::Consumer),
        SpanKind::Internal => None,
    }
}

/// Converts a finished `SpanData` into a `SpanRecord` reported by
/// `local_endpoint`.
pub(crate) fn into_span_record(local_endpoint: Endpoint, span_data: SpanData) -> SpanRecord {
    let mut user_defined_span_kind = false;
    let scope = &span_data.instrumentation_scope;
    let mut tags = map_from_kvs(
        span_data
            .attributes
            .into_iter()
            .inspect(|kv| {
                if kv.key == Key::from_static_str("span.kind") {
                    user_defined_span_kind = true;
                }
            })
            .chain(
                [
                    (
                        INSTRUMENTATION_LIBRARY_NAME,
                        Some(scope.name().to_owned()),
                    ),
                    (
                        INSTRUMENTATION_LIBRARY_VERSION,
                        scope.version().map(ToOwned::to_owned),
                    ),
                ]
                .into_iter()
                .filter_map(|(key, val)| val.map(|val| KeyValue::new(key, val))),
            )
            .filter(|kv| kv.key.as_str() != OTEL_ERROR_DESCRIPTION),
    );

    match span_data.status {
        Status::Unset => {}
        Status::Ok => {
            tags.insert(OTEL_STATUS_CODE.into(), "OK".into());
        }
        Status::Error {
            description: message,
        } => {
            tags.insert(OTEL_STATUS_CODE.into(), "ERROR".into());
            tags.insert(OTEL_ERROR_DESCRIPTION.into(), message.into_owned());
        }
    };

    let parent_id = (span_data.parent_span_id != opentelemetry::trace::SpanId::INVALID)
        .then(|| SpanId(u64::from_be_bytes(span_data.parent_span_id.to_bytes())));

    SpanRecord {
        trace_id: TraceId::from_u128(u128::from_be_bytes(
            span_data.span_context.trace_id().to_bytes(),
        )),
        parent_id,
        id: SpanId(u64::from_be_bytes(
            span_data.span_context.span_id().to_bytes(),
        )),
        kind: if user_defined_span_kind {
            None
        } else {
            into_zipkin_span_kind(span_data.span_kind)
        },
        name: span_data.name.into_owned(),
        timestamp: Some(span_data.start_time),
        duration: Some(
            span_data
                .end_time
                .duration_since(span_data.start_time)
                .unwrap_or_default(),
        ),
        local_endpoint: Some(local_endpoint),
        remote_endpoint: None,
        annotations: span_data
            .events
            .events
            .into_iter()
            .map(Into::into)
            .collect(),
        tags,
        debug: false,
        shared: false,
    }
}

fn map_from_kvs<T>(kvs: T) -> HashMap<String, String>
where
    T: IntoIterator<Item = KeyValue>,
{
    let mut map: HashMap<String, String> = HashMap::new();
    for kv in kvs {
        map.insert(kv.key.into(), kv.value.to_string());
    }
    map
}

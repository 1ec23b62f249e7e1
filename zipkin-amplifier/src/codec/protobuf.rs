use super::DecodeError;
use crate::model::{
    duration_to_micros, from_micros, to_micros, Annotation, Endpoint, Kind, SpanId, SpanRecord,
    TraceId,
};
use bytes::Bytes;
use prost::Message;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use zipkin_amplifier_proto::proto3;

pub(super) fn decode(payload: &[u8]) -> Result<Vec<SpanRecord>, DecodeError> {
    proto3::ListOfSpans::decode(payload)?
        .spans
        .into_iter()
        .map(span_from_proto)
        .collect()
}

pub(super) fn encode(records: &[SpanRecord]) -> Bytes {
    proto3::ListOfSpans {
        spans: records.iter().map(span_to_proto).collect(),
    }
    .encode_to_vec()
    .into()
}

fn span_from_proto(span: proto3::Span) -> Result<SpanRecord, DecodeError> {
    let trace_id = trace_id_from_bytes(&span.trace_id)?;
    let parent_id = span_id_from_bytes("parent id", &span.parent_id)?;
    let id = span_id_from_bytes("span id", &span.id)?.ok_or(DecodeError::MissingSpanId)?;
    let kind = kind_from_proto(span.kind());

    Ok(SpanRecord {
        trace_id,
        parent_id,
        id,
        kind,
        name: span.name,
        timestamp: (span.timestamp != 0).then(|| from_micros(span.timestamp)),
        duration: (span.duration != 0)
            .then(|| Duration::from_nanos(span.duration.saturating_mul(1_000))),
        local_endpoint: span.local_endpoint.map(endpoint_from_proto).transpose()?,
        remote_endpoint: span.remote_endpoint.map(endpoint_from_proto).transpose()?,
        annotations: span
            .annotations
            .into_iter()
            .map(|annotation| Annotation {
                timestamp: from_micros(annotation.timestamp),
                value: annotation.value,
            })
            .collect(),
        tags: span.tags,
        debug: span.debug,
        shared: span.shared,
    })
}

fn span_to_proto(record: &SpanRecord) -> proto3::Span {
    proto3::Span {
        trace_id: trace_id_to_bytes(record.trace_id),
        parent_id: record
            .parent_id
            .map(|id| id.to_u64().to_be_bytes().to_vec())
            .unwrap_or_default(),
        id: record.id.to_u64().to_be_bytes().to_vec(),
        kind: kind_to_proto(record.kind) as i32,
        name: record.name.clone(),
        timestamp: record.timestamp.map(to_micros).unwrap_or_default(),
        duration: record.duration.map(duration_to_micros).unwrap_or_default(),
        local_endpoint: record.local_endpoint.as_ref().map(endpoint_to_proto),
        remote_endpoint: record.remote_endpoint.as_ref().map(endpoint_to_proto),
        annotations: record
            .annotations
            .iter()
            .map(|annotation| proto3::Annotation {
                timestamp: to_micros(annotation.timestamp),
                value: annotation.value.clone(),
            })
            .collect(),
        tags: record.tags.clone(),
        debug: record.debug,
        shared: record.shared,
    }
}

/// Trace ids are 1 to 16 big endian bytes; the last eight are the low half.
fn trace_id_from_bytes(bytes: &[u8]) -> Result<TraceId, DecodeError> {
    if bytes.is_empty() || bytes.len() > 16 {
        return Err(DecodeError::InvalidTraceId(bytes.len()));
    }
    let split = bytes.len().saturating_sub(8);
    let (high, low) = bytes.split_at(split);
    Ok(TraceId::new(be_u64(high), be_u64(low)))
}

fn trace_id_to_bytes(trace_id: TraceId) -> Vec<u8> {
    if trace_id.high == 0 {
        trace_id.low.to_be_bytes().to_vec()
    } else {
        trace_id.to_u128().to_be_bytes().to_vec()
    }
}

/// An empty id is absent, eight bytes is an id, anything else is malformed.
pub(crate) fn span_id_from_bytes(
    field: &'static str,
    bytes: &[u8],
) -> Result<Option<SpanId>, DecodeError> {
    match bytes.len() {
        0 => Ok(None),
        8 => Ok(Some(SpanId(be_u64(bytes)))),
        len => Err(DecodeError::InvalidSpanId { field, len }),
    }
}

fn be_u64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

fn kind_from_proto(kind: proto3::span::Kind) -> Option<Kind> {
    match kind {
        proto3::span::Kind::SpanKindUnspecified => None,
        proto3::span::Kind::Client => Some(Kind::Client),
        proto3::span::Kind::Server => Some(Kind::Server),
        proto3::span::Kind::Producer => Some(Kind::Producer),
        proto3::span::Kind::Consumer => Some(Kind::Consumer),
    }
}

fn kind_to_proto(kind: Option<Kind>) -> proto3::span::Kind {
    match kind {
        None => proto3::span::Kind::SpanKindUnspecified,
        Some(Kind::Client) => proto3::span::Kind::Client,
        Some(Kind::Server) => proto3::span::Kind::Server,
        Some(Kind::Producer) => proto3::span::Kind::Producer,
        Some(Kind::Consumer) => proto3::span::Kind::Consumer,
    }
}

fn endpoint_from_proto(endpoint: proto3::Endpoint) -> Result<Endpoint, DecodeError> {
    let ipv4 = match endpoint.ipv4.len() {
        0 => None,
        4 => Some(Ipv4Addr::new(
            endpoint.ipv4[0],
            endpoint.ipv4[1],
            endpoint.ipv4[2],
            endpoint.ipv4[3],
        )),
        len => return Err(DecodeError::InvalidEndpointAddress { field: "ipv4", len }),
    };
    let ipv6 = match <[u8; 16]>::try_from(endpoint.ipv6.as_slice()) {
        Ok(octets) => Some(Ipv6Addr::from(octets)),
        Err(_) if endpoint.ipv6.is_empty() => None,
        Err(_) => {
            return Err(DecodeError::InvalidEndpointAddress {
                field: "ipv6",
                len: endpoint.ipv6.len(),
            })
        }
    };

    Ok(Endpoint {
        service_name: Some(endpoint.service_name).filter(|name| !name.is_empty()),
        ipv4,
        ipv6,
        // out of range ports are unknown
        port: u16::try_from(endpoint.port).ok().filter(|port| *port != 0),
    })
}

fn endpoint_to_proto(endpoint: &Endpoint) -> proto3::Endpoint {
    proto3::Endpoint {
        service_name: endpoint.service_name.clone().unwrap_or_default(),
        ipv4: endpoint
            .ipv4
            .map(|ip| ip.octets().to_vec())
            .unwrap_or_default(),
        ipv6: endpoint
            .ipv6
            .map(|ip| ip.octets().to_vec())
            .unwrap_or_default(),
        port: endpoint.port.map(i32::from).unwrap_or_default(),
    }
}

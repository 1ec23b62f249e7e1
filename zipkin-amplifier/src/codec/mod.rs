//! Conversion between span batches and their Zipkin v2 wire encodings.
//!
//! Two payload formats are understood, JSON and proto3, each optionally
//! wrapped in gzip transport encoding. The format a batch is decoded from
//! and the one it is encoded to are independent.
mod json;
mod protobuf;

use crate::model::SpanRecord;
use bytes::Bytes;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::fmt;
use std::io::{self, Read, Write};

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";

/// Payload format of a span batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// JSON array of Zipkin v2 spans.
    Json,
    /// `zipkin.proto3.ListOfSpans` message.
    #[default]
    Protobuf,
}

impl Format {
    /// Picks the format for a `Content-Type` header value.
    ///
    /// Media type parameters such as `charset` are ignored.
    pub fn from_content_type(content_type: &str) -> Result<Self, DecodeError> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        if media_type.eq_ignore_ascii_case(CONTENT_TYPE_JSON) {
            Ok(Format::Json)
        } else if media_type.eq_ignore_ascii_case(CONTENT_TYPE_PROTOBUF) {
            Ok(Format::Protobuf)
        } else {
            Err(DecodeError::UnsupportedContentType(content_type.to_string()))
        }
    }

    /// The `Content-Type` header value for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Json => CONTENT_TYPE_JSON,
            Format::Protobuf => CONTENT_TYPE_PROTOBUF,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => f.write_str("json"),
            Format::Protobuf => f.write_str("protobuf"),
        }
    }
}

/// Transport encoding of a request body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentEncoding {
    /// Body is used as is.
    #[default]
    Identity,
    /// Body is gzip compressed.
    Gzip,
}

impl ContentEncoding {
    /// Picks the encoding for an optional `Content-Encoding` header value.
    pub fn from_header(value: Option<&str>) -> Result<Self, DecodeError> {
        match value.map(str::trim) {
            None | Some("") => Ok(ContentEncoding::Identity),
            Some(v) if v.eq_ignore_ascii_case("identity") => Ok(ContentEncoding::Identity),
            Some(v) if v.eq_ignore_ascii_case("gzip") => Ok(ContentEncoding::Gzip),
            Some(v) => Err(DecodeError::UnsupportedContentEncoding(v.to_string())),
        }
    }
}

/// Errors raised while decoding an inbound batch.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// The gzip stream could not be inflated.
    #[error("failed to decompress gzip body: {0}")]
    Decompress(#[source] io::Error),

    /// The JSON payload is malformed.
    #[error("malformed JSON span batch: {0}")]
    Json(#[from] serde_json::Error),

    /// The protobuf payload is malformed.
    #[error("malformed protobuf span batch: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// The `Content-Type` is neither JSON nor protobuf.
    #[error("zipkin v2 unsupported Content-Type: {0}")]
    UnsupportedContentType(String),

    /// The `Content-Encoding` is neither identity nor gzip.
    #[error("unsupported Content-Encoding: {0}")]
    UnsupportedContentEncoding(String),

    /// A span or parent id is neither empty nor 8 bytes.
    #[error("invalid {field}: has length {len} yet wanted length 8")]
    InvalidSpanId {
        /// Which id was invalid.
        field: &'static str,
        /// Length found.
        len: usize,
    },

    /// A span carries no id.
    #[error("expected a non-blank span id")]
    MissingSpanId,

    /// A trace id is empty or longer than 16 bytes.
    #[error("invalid trace id: has length {0}, wanted 1 to 16")]
    InvalidTraceId(usize),

    /// An endpoint address has a length other than 4 (IPv4) or 16 (IPv6).
    #[error("invalid {field} address: has length {len}")]
    InvalidEndpointAddress {
        /// `ipv4` or `ipv6`.
        field: &'static str,
        /// Length found.
        len: usize,
    },

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The request body was not received in time.
    #[error("timed out reading request body")]
    BodyReadTimeout,
}

/// Errors raised while encoding an outbound batch.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum EncodeError {
    /// JSON serialization failed.
    #[error("failed to serialize span batch as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes a span batch received with the given transport encoding and
/// payload format.
pub fn decode(
    body: &[u8],
    encoding: ContentEncoding,
    format: Format,
) -> Result<Vec<SpanRecord>, DecodeError> {
    let inflated;
    let payload = match encoding {
        ContentEncoding::Identity => body,
        ContentEncoding::Gzip => {
            let mut buf = Vec::new();
            GzDecoder::new(body)
                .read_to_end(&mut buf)
                .map_err(DecodeError::Decompress)?;
            inflated = buf;
            inflated.as_slice()
        }
    };

    match format {
        Format::Json => json::decode(payload),
        Format::Protobuf => protobuf::decode(payload),
    }
}

/// Encodes a span batch in the given payload format.
pub fn encode(records: &[SpanRecord], format: Format) -> Result<Bytes, EncodeError> {
    match format {
        Format::Json => json::encode(records),
        Format::Protobuf => Ok(protobuf::encode(records)),
    }
}

/// Gzip compresses an encoded batch.
pub fn compress(payload: &[u8]) -> io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish().map(Bytes::from)
}

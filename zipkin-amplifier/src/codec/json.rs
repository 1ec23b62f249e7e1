use super::{DecodeError, EncodeError};
use crate::model::SpanRecord;
use bytes::Bytes;

pub(super) fn decode(payload: &[u8]) -> Result<Vec<SpanRecord>, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

pub(super) fn encode(records: &[SpanRecord]) -> Result<Bytes, EncodeError> {
    Ok(serde_json::to_vec(records)?.into())
}

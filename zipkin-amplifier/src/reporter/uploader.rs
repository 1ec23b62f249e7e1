//! Posts one encoded batch to the relay agent.
use crate::codec::{self, Format};
use crate::model::SpanRecord;
use crate::relay::TransportError;
use crate::Error;
use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::{Method, Request, Uri};
use opentelemetry_http::{HttpClient, ResponseExt};
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct Uploader {
    client: Arc<dyn HttpClient>,
    collector_endpoint: Uri,
    format: Format,
    compression: bool,
}

impl Uploader {
    pub(crate) fn new(
        client: Arc<dyn HttpClient>,
        collector_endpoint: Uri,
        format: Format,
        compression: bool,
    ) -> Self {
        Uploader {
            client,
            collector_endpoint,
            format,
            compression,
        }
    }

    /// Upload spans to the collector endpoint.
    pub(crate) async fn upload(&self, spans: &[SpanRecord]) -> Result<(), Error> {
        let payload = codec::encode(spans, self.format)?;
        let mut req = Request::builder()
            .method(Method::POST)
            .uri(self.collector_endpoint.clone())
            .header(CONTENT_TYPE, self.format.content_type());
        let body: Bytes = if self.compression {
            req = req.header(CONTENT_ENCODING, "gzip");
            codec::compress(&payload)?
        } else {
            payload
        };
        let req = req.body(body).map_err(TransportError::from)?;

        let _ = self
            .client
            .send_bytes(req)
            .await
            .and_then(|response| response.error_for_status())
            .map_err(TransportError::Send)?;
        Ok(())
    }
}

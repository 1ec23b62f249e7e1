//! # Buffering Zipkin reporter
//!
//! Bridges the OpenTelemetry SDK to the relay agent. The installed exporter
//! keeps every finished span in memory; [`ReporterHandle::flush`] converts
//! them to Zipkin records and posts them to the collector endpoint as one
//! batch.
//!
//! ```no_run
//! # async fn doc() -> Result<(), zipkin_amplifier::Error> {
//! use opentelemetry::trace::{Tracer, TracerProvider};
//!
//! let (provider, reporter) = zipkin_amplifier::reporter::new_pipeline()
//!     .with_service_name("checkout")
//!     .with_collector_endpoint("http://127.0.0.1:30000/api/v2/spans")
//!     .install()?;
//! provider.tracer("checkout").in_span("pay", |_cx| {});
//! reporter.flush().await?;
//! # Ok(())
//! # }
//! ```
mod model;
mod uploader;

use crate::codec::Format;
use crate::config::{DEFAULT_SERVICE_NAME, SPANS_PATH};
use crate::model::Endpoint;
use crate::Error;
use opentelemetry_http::HttpClient;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{SdkTracerProvider, SpanData, SpanExporter};
use opentelemetry_sdk::Resource;
use std::mem;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Default collector endpoint
const DEFAULT_COLLECTOR_ENDPOINT: &str = "http://127.0.0.1:9411/api/v2/spans";

type SpanBuffer = Arc<Mutex<Vec<SpanData>>>;

/// Span exporter that holds finished spans until the reporter flushes.
#[derive(Debug, Default)]
pub struct BufferingExporter {
    spans: SpanBuffer,
}

impl SpanExporter for BufferingExporter {
    async fn export(&self, mut batch: Vec<SpanData>) -> OTelSdkResult {
        self.spans
            .lock()
            .map(|mut spans| spans.append(&mut batch))
            .map_err(|err| OTelSdkError::InternalFailure(format!("span buffer poisoned: {err}")))
    }
}

/// Drains the buffered spans and posts them.
#[derive(Debug)]
pub struct ReporterHandle {
    spans: SpanBuffer,
    local_endpoint: Endpoint,
    uploader: uploader::Uploader,
}

impl ReporterHandle {
    /// Number of spans waiting to be flushed.
    pub fn buffered(&self) -> usize {
        self.spans.lock().map(|spans| spans.len()).unwrap_or(0)
    }

    /// Posts every buffered span in a single request and returns how many
    /// were sent. An empty buffer sends nothing.
    pub async fn flush(&self) -> Result<usize, Error> {
        let spans = match self.spans.lock() {
            Ok(mut spans) => mem::take(&mut *spans),
            Err(poisoned) => mem::take(&mut *poisoned.into_inner()),
        };
        if spans.is_empty() {
            tracing::debug!(name: "reporter.nothing_to_flush", "span buffer is empty");
            return Ok(0);
        }

        let records: Vec<_> = spans
            .into_iter()
            .map(|span| model::into_span_record(self.local_endpoint.clone(), span))
            .collect();
        self.uploader.upload(&records).await?;
        tracing::info!(name: "reporter.flushed", spans = records.len());
        Ok(records.len())
    }
}

/// Create a new reporter pipeline builder.
pub fn new_pipeline() -> ReporterPipelineBuilder {
    ReporterPipelineBuilder::default()
}

/// Builder for the tracer provider and its [`ReporterHandle`].
#[derive(Debug)]
pub struct ReporterPipelineBuilder {
    service_name: String,
    service_addr: Option<SocketAddr>,
    collector_endpoint: String,
    format: Format,
    compression: bool,
    client: Arc<dyn HttpClient>,
}

impl Default for ReporterPipelineBuilder {
    fn default() -> Self {
        ReporterPipelineBuilder {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_addr: None,
            collector_endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_string(),
            format: Format::default(),
            compression: false,
            client: Arc::new(reqwest::Client::new()),
        }
    }
}

impl ReporterPipelineBuilder {
    /// Builds the tracer provider with the buffering exporter installed.
    pub fn install(self) -> Result<(SdkTracerProvider, ReporterHandle), Error> {
        let collector_endpoint = self.collector_endpoint.parse::<http::Uri>()?;
        let exporter = BufferingExporter::default();
        let spans = Arc::clone(&exporter.spans);

        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter)
            .with_resource(
                Resource::builder_empty()
                    .with_service_name(self.service_name.clone())
                    .build(),
            )
            .build();

        let handle = ReporterHandle {
            spans,
            local_endpoint: Endpoint::new(self.service_name, self.service_addr),
            uploader: uploader::Uploader::new(
                self.client,
                collector_endpoint,
                self.format,
                self.compression,
            ),
        };
        Ok((provider, handle))
    }

    /// Assign the service name under which to group traces.
    pub fn with_service_name<T: Into<String>>(mut self, name: T) -> Self {
        self.service_name = name.into();
        self
    }

    /// Assign client implementation
    pub fn with_http_client<T: HttpClient + 'static>(mut self, client: T) -> Self {
        self.client = Arc::new(client);
        self
    }

    /// Assign a shared client implementation
    pub fn with_shared_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = client;
        self
    }

    /// Assign the address reported as the local endpoint.
    pub fn with_service_address(mut self, addr: SocketAddr) -> Self {
        self.service_addr = Some(addr);
        self
    }

    /// Assign the collector endpoint
    pub fn with_collector_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.collector_endpoint = endpoint.into();
        self
    }

    /// Assign the collector endpoint from the address of a relay agent.
    pub fn with_relay_address(self, addr: SocketAddr) -> Self {
        self.with_collector_endpoint(format!("http://{addr}{SPANS_PATH}"))
    }

    /// Assign the wire format of the batch.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Gzip the batch before posting it.
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }
}

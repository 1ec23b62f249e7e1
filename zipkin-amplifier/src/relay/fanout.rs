//! Replays one decoded batch `threads × send_count` times against the
//! downstream collector.
use crate::codec::{self, EncodeError, Format};
use crate::config::SenderConfig;
use crate::model::{SpanRecord, TraceId};
use crate::signal::CompletionSignal;
use crate::Error;
use bytes::Bytes;
use futures_util::future::join_all;
use http::header::{
    HeaderMap, HeaderValue, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST,
    TRANSFER_ENCODING,
};
use http::{Method, Request, StatusCode, Uri};
use opentelemetry_http::{HttpClient, HttpError};
use std::sync::Arc;

/// Headers that describe the inbound connection or body and must not be
/// replayed.
const HOP_HEADERS: [http::header::HeaderName; 5] = [
    HOST,
    CONTENT_LENGTH,
    CONTENT_ENCODING,
    TRANSFER_ENCODING,
    CONNECTION,
];

/// Errors raised by a single outbound post.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The request could not be built.
    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),

    /// The client failed or the collector answered with a non-success status.
    #[error("request failed: {0}")]
    Send(#[source] HttpError),
}

/// Tally of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanoutSummary {
    /// Posts issued.
    pub attempted: u64,
    /// Posts answered with a success status.
    pub succeeded: u64,
    /// Posts that failed to send or were rejected.
    pub failed: u64,
}

impl FanoutSummary {
    fn merge(&mut self, other: FanoutSummary) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Sends copies of a batch to the downstream collector.
#[derive(Clone, Debug)]
pub struct FanoutSender {
    client: Arc<dyn HttpClient>,
    endpoint: Uri,
    format: Format,
    sender: SenderConfig,
    mutate_trace_id: bool,
}

impl FanoutSender {
    /// Creates a sender posting to `endpoint`, the full span ingestion URL.
    pub fn new(
        client: Arc<dyn HttpClient>,
        endpoint: Uri,
        format: Format,
        sender: SenderConfig,
        mutate_trace_id: bool,
    ) -> Self {
        FanoutSender {
            client,
            endpoint,
            format,
            sender,
            mutate_trace_id,
        }
    }

    /// Sender parameters in use.
    pub fn sender(&self) -> &SenderConfig {
        &self.sender
    }

    /// Fans `batch` out and opens `signal` with the result.
    ///
    /// The outcome is delivered through the gate only; the returned error
    /// reports a gate that was already open.
    pub async fn run(
        &self,
        batch: Vec<SpanRecord>,
        headers: HeaderMap,
        signal: &CompletionSignal,
    ) -> Result<(), Error> {
        let outcome = self.send_all(batch, headers).await.map_err(Error::from);
        match &outcome {
            Ok(summary) => tracing::info!(
                name: "fanout.complete",
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failed,
            ),
            Err(err) => tracing::error!(name: "fanout.failed", error = %err),
        }
        signal.fire(outcome)
    }

    /// Runs every worker to completion and tallies their posts.
    ///
    /// Failed posts are counted, not returned; only an encoding failure
    /// aborts the fan-out.
    pub async fn send_all(
        &self,
        batch: Vec<SpanRecord>,
        mut headers: HeaderMap,
    ) -> Result<FanoutSummary, EncodeError> {
        for name in HOP_HEADERS {
            headers.remove(name);
        }
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(self.format.content_type()),
        );

        let workers = (0..self.sender.threads).map(|worker| {
            let this = self.clone();
            let batch = batch.clone();
            let headers = headers.clone();
            tokio::spawn(async move { this.worker(worker, batch, headers).await })
        });

        let mut summary = FanoutSummary::default();
        let mut encode_error = None;
        for (worker, joined) in join_all(workers).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(tally)) => summary.merge(tally),
                Ok(Err(err)) => encode_error = Some(err),
                Err(err) => {
                    tracing::error!(name: "fanout.worker_panicked", worker, error = %err);
                    summary.failed += u64::from(self.sender.send_count);
                }
            }
        }

        match encode_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    async fn worker(
        &self,
        worker: u32,
        mut batch: Vec<SpanRecord>,
        headers: HeaderMap,
    ) -> Result<FanoutSummary, EncodeError> {
        let mut tally = FanoutSummary::default();
        for iteration in 0..self.sender.send_count {
            if iteration > 0 && !self.sender.send_interval.is_zero() {
                tokio::time::sleep(self.sender.send_interval).await;
            }
            if self.mutate_trace_id {
                let trace_id = TraceId::random();
                for record in batch.iter_mut() {
                    record.trace_id = trace_id;
                }
            }
            let body = codec::encode(&batch, self.format)?;

            tally.attempted += 1;
            match self.post(body, &headers).await {
                Ok(status) => {
                    tally.succeeded += 1;
                    tracing::debug!(
                        name: "fanout.sent",
                        worker,
                        iteration,
                        status = status.as_u16(),
                    );
                }
                Err(err) => {
                    tally.failed += 1;
                    tracing::warn!(name: "fanout.send_failed", worker, iteration, error = %err);
                }
            }
        }
        Ok(tally)
    }

    async fn post(&self, body: Bytes, headers: &HeaderMap) -> Result<StatusCode, TransportError> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .body(body)?;
        *request.headers_mut() = headers.clone();

        let response = self
            .client
            .send_bytes(request)
            .await
            .map_err(TransportError::Send)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Send(
                format!("downstream responded with {status}").into(),
            ));
        }
        Ok(status)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::SpanId;
    use async_trait::async_trait;
    use http::Response;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every request and answers with a fixed status, failing every
    /// `fail_every`-th call at the transport level.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingClient {
        pub(crate) requests: Mutex<Vec<Request<Bytes>>>,
        pub(crate) status: Option<StatusCode>,
        pub(crate) fail_every: Option<usize>,
    }

    impl RecordingClient {
        pub(crate) fn requests(&self) -> Vec<Request<Bytes>> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|request| {
                    let mut copy = Request::new(request.body().clone());
                    *copy.method_mut() = request.method().clone();
                    *copy.uri_mut() = request.uri().clone();
                    *copy.headers_mut() = request.headers().clone();
                    copy
                })
                .collect()
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            let count = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request);
                requests.len()
            };
            if matches!(self.fail_every, Some(n) if count % n == 0) {
                return Err("connection refused".into());
            }
            let mut response = Response::new(Bytes::new());
            *response.status_mut() = self.status.unwrap_or(StatusCode::ACCEPTED);
            Ok(response)
        }
    }

    pub(crate) fn batch(len: u64) -> Vec<SpanRecord> {
        let trace_id = TraceId::new(0, 0xabc);
        (1..=len)
            .map(|id| {
                let builder = SpanRecord::builder()
                    .trace_id(trace_id)
                    .id(SpanId(id))
                    .name(format!("op-{id}"));
                if id == 1 {
                    builder.build()
                } else {
                    builder.parent_id(SpanId(1)).build()
                }
            })
            .collect()
    }

    fn fanout(
        client: Arc<RecordingClient>,
        threads: u32,
        send_count: u32,
        mutate: bool,
        format: Format,
    ) -> FanoutSender {
        FanoutSender::new(
            client,
            Uri::from_static("http://collector:9411/api/v2/spans"),
            format,
            SenderConfig {
                threads,
                send_count,
                send_interval: Duration::ZERO,
            },
            mutate,
        )
    }

    fn inbound_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("127.0.0.1:30000"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("512"));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-b3-sampled", HeaderValue::from_static("1"));
        headers
    }

    #[tokio::test]
    async fn posts_threads_times_send_count() {
        let client = Arc::new(RecordingClient::default());
        let summary = fanout(client.clone(), 3, 4, true, Format::Protobuf)
            .send_all(batch(3), inbound_headers())
            .await
            .unwrap();

        assert_eq!(
            summary,
            FanoutSummary {
                attempted: 12,
                succeeded: 12,
                failed: 0
            }
        );
        let requests = client.requests();
        assert_eq!(requests.len(), 12);
        for request in &requests {
            assert_eq!(request.method(), Method::POST);
            assert_eq!(request.uri(), "http://collector:9411/api/v2/spans");
            assert_eq!(
                request.headers().get(CONTENT_TYPE).unwrap(),
                "application/x-protobuf"
            );
            assert_eq!(request.headers().get("x-b3-sampled").unwrap(), "1");
            assert!(request.headers().get(HOST).is_none());
            assert!(request.headers().get(CONTENT_LENGTH).is_none());
            assert!(request.headers().get(CONTENT_ENCODING).is_none());
        }
    }

    #[tokio::test]
    async fn every_post_carries_one_fresh_trace_id() {
        let client = Arc::new(RecordingClient::default());
        let original = batch(4);
        fanout(client.clone(), 2, 3, true, Format::Json)
            .send_all(original.clone(), HeaderMap::new())
            .await
            .unwrap();

        let mut seen = HashSet::new();
        for request in client.requests() {
            let records =
                codec::decode(request.body(), codec::ContentEncoding::Identity, Format::Json)
                    .unwrap();
            let trace_id = records[0].trace_id;
            assert!(records.iter().all(|r| r.trace_id == trace_id));
            assert_ne!(trace_id, original[0].trace_id);
            seen.insert(trace_id);
            // everything but the trace id is replayed untouched
            let ids: Vec<_> = records.iter().map(|r| (r.id, r.parent_id)).collect();
            let expected: Vec<_> = original.iter().map(|r| (r.id, r.parent_id)).collect();
            assert_eq!(ids, expected);
        }
        assert_eq!(seen.len(), 6);
        // the caller's batch is never touched
        assert!(original.iter().all(|r| r.trace_id == TraceId::new(0, 0xabc)));
    }

    #[tokio::test]
    async fn without_mutation_trace_id_is_kept() {
        let client = Arc::new(RecordingClient::default());
        fanout(client.clone(), 2, 2, false, Format::Protobuf)
            .send_all(batch(2), HeaderMap::new())
            .await
            .unwrap();

        for request in client.requests() {
            let records = codec::decode(
                request.body(),
                codec::ContentEncoding::Identity,
                Format::Protobuf,
            )
            .unwrap();
            assert!(records.iter().all(|r| r.trace_id == TraceId::new(0, 0xabc)));
        }
    }

    #[tokio::test]
    async fn failures_are_counted_and_skipped() {
        let client = Arc::new(RecordingClient {
            fail_every: Some(3),
            ..Default::default()
        });
        let summary = fanout(client.clone(), 3, 4, true, Format::Json)
            .send_all(batch(1), HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(summary.attempted, 12);
        assert_eq!(summary.failed, 4);
        assert_eq!(summary.succeeded, 8);
        assert_eq!(client.requests().len(), 12);
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let client = Arc::new(RecordingClient {
            status: Some(StatusCode::SERVICE_UNAVAILABLE),
            ..Default::default()
        });
        let summary = fanout(client, 1, 2, true, Format::Json)
            .send_all(batch(1), HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.succeeded, 0);
    }

    #[tokio::test]
    async fn run_fires_the_gate_once() {
        let client = Arc::new(RecordingClient {
            fail_every: Some(2),
            ..Default::default()
        });
        let (signal, waiter) = CompletionSignal::new();
        fanout(client, 3, 4, true, Format::Protobuf)
            .run(batch(2), HeaderMap::new(), &signal)
            .await
            .unwrap();

        assert!(matches!(
            signal.fire(Ok(FanoutSummary::default())),
            Err(Error::CompletionAlreadySignaled)
        ));
        let summary = waiter.wait().await.unwrap();
        assert_eq!(summary.attempted, 12);
        assert_eq!(summary.failed, 6);
    }

    #[tokio::test]
    async fn send_interval_spaces_iterations() {
        let client = Arc::new(RecordingClient::default());
        let sender = FanoutSender::new(
            client.clone(),
            Uri::from_static("http://collector:9411/api/v2/spans"),
            Format::Json,
            SenderConfig {
                threads: 1,
                send_count: 3,
                send_interval: Duration::from_millis(20),
            },
            true,
        );
        let started = std::time::Instant::now();
        sender.send_all(batch(1), HeaderMap::new()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(client.requests().len(), 3);
    }
}

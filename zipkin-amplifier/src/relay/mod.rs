//! Local HTTP endpoint that every reported batch passes through.
//!
//! The agent accepts Zipkin v2 batches on `POST /api/v2/spans`, answers
//! immediately, then decodes the first non-empty batch in the background and
//! hands it to the [`FanoutSender`]. Whatever ends the relay opens the
//! [`CompletionSignal`] exactly once.
pub mod fanout;

pub use fanout::{FanoutSender, FanoutSummary, TransportError};

use crate::codec::{self, ContentEncoding, DecodeError, Format};
use crate::config::SPANS_PATH;
use crate::model::SpanRecord;
use crate::signal::CompletionSignal;
use crate::Error;
use bytes::Bytes;
use http::header::{HeaderMap, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Connection deadlines of the relay agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerTimeouts {
    /// Time allowed to receive the request head.
    pub header_read: Duration,
    /// Time allowed to receive the whole request body.
    pub body_read: Duration,
    /// Time a connection gets to finish in-flight responses after its
    /// lifetime ends, before it is dropped.
    pub drain: Duration,
    /// Total lifetime of a connection, counted from accept. Once it elapses
    /// the connection is shut down gracefully, busy or not.
    pub lifetime: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        ServerTimeouts {
            header_read: Duration::from_millis(10),
            body_read: Duration::from_secs(1),
            drain: Duration::from_secs(3),
            lifetime: Duration::from_secs(10),
        }
    }
}

/// Everything the agent needs besides its address and gate.
#[derive(Clone, Debug)]
pub struct RelaySettings {
    /// Sender the decoded batch is handed to.
    pub fanout: FanoutSender,
    /// Connection deadlines.
    pub timeouts: ServerTimeouts,
}

/// Relay agent bound to a local address.
#[derive(Debug)]
pub struct RelayAgent {
    listener: TcpListener,
    state: Arc<RelayState>,
}

#[derive(Debug)]
struct RelayState {
    fanout: FanoutSender,
    timeouts: ServerTimeouts,
    signal: Arc<CompletionSignal>,
    relayed: AtomicBool,
}

impl RelayAgent {
    /// Binds the listener. Port `0` picks an ephemeral port.
    pub async fn bind(
        addr: SocketAddr,
        settings: RelaySettings,
        signal: Arc<CompletionSignal>,
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            name: "relay.listening",
            address = %listener.local_addr()?,
            threads = settings.fanout.sender().threads,
            send_count = settings.fanout.sender().send_count,
            total_sends = settings.fanout.sender().total_sends(),
        );
        Ok(RelayAgent {
            listener,
            state: Arc::new(RelayState {
                fanout: settings.fanout,
                timeouts: settings.timeouts,
                signal,
                relayed: AtomicBool::new(false),
            }),
        })
    }

    /// Address the agent is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener fails.
    pub async fn serve(self) -> Result<(), Error> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                tracing::debug!(name: "relay.connection", peer = %peer);
                state.serve_connection(TokioIo::new(stream)).await;
            });
        }
    }

    /// Runs [`serve`](Self::serve) on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(self.serve())
    }
}

impl RelayState {
    async fn serve_connection(self: Arc<Self>, io: TokioIo<tokio::net::TcpStream>) {
        let timeouts = self.timeouts;
        let service = service_fn(move |request| Arc::clone(&self).handle(request));
        let conn = http1::Builder::new()
            .timer(TokioTimer::new())
            .header_read_timeout(timeouts.header_read)
            .serve_connection(io, service);
        let mut conn = std::pin::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    tracing::debug!(name: "relay.connection_error", error = %err);
                }
            }
            _ = tokio::time::sleep(timeouts.lifetime) => {
                conn.as_mut().graceful_shutdown();
                if tokio::time::timeout(timeouts.drain, conn.as_mut()).await.is_err() {
                    tracing::debug!(
                        name: "relay.connection_drain_timeout",
                        "connection did not drain in time"
                    );
                }
            }
        }
    }

    async fn handle(
        self: Arc<Self>,
        request: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        tracing::debug!(
            name: "relay.request",
            method = %request.method(),
            path = request.uri().path(),
            headers = ?request.headers(),
        );

        if request.uri().path() != SPANS_PATH {
            return Ok(respond(StatusCode::NOT_FOUND));
        }
        if request.method() != Method::POST {
            return Ok(respond(StatusCode::METHOD_NOT_ALLOWED));
        }
        if is_heartbeat(request.headers()) {
            return Ok(respond(StatusCode::OK));
        }
        if self.relayed.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                name: "relay.extra_batch_dropped",
                "dropping batch, one was already relayed"
            );
            return Ok(respond(StatusCode::OK));
        }
        if !self.fanout.sender().amplifies() {
            tracing::info!(
                name: "relay.nothing_to_amplify",
                "sender makes no posts, skipping fan-out"
            );
            self.fire(Ok(FanoutSummary::default()));
            return Ok(respond(StatusCode::OK));
        }

        let (parts, body) = request.into_parts();
        tokio::spawn(self.relay(parts.headers, body));
        Ok(respond(StatusCode::OK))
    }

    async fn relay(self: Arc<Self>, headers: HeaderMap, body: Incoming) {
        let batch = match self.read_batch(&headers, body).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::error!(name: "relay.decode_failed", error = %err);
                self.fire(Err(err.into()));
                return;
            }
        };
        tracing::info!(name: "relay.batch_received", spans = batch.len());

        if batch.is_empty() {
            self.fire(Ok(FanoutSummary::default()));
            return;
        }
        if let Err(err) = self.fanout.run(batch, headers, &self.signal).await {
            tracing::warn!(name: "relay.gate_already_open", error = %err);
        }
    }

    async fn read_batch(
        &self,
        headers: &HeaderMap,
        body: Incoming,
    ) -> Result<Vec<SpanRecord>, DecodeError> {
        let format = Format::from_content_type(&header_str(headers, CONTENT_TYPE))?;
        let encoding = ContentEncoding::from_header(
            headers
                .contains_key(CONTENT_ENCODING)
                .then(|| header_str(headers, CONTENT_ENCODING))
                .as_deref(),
        )?;

        let body = tokio::time::timeout(self.timeouts.body_read, body.collect())
            .await
            .map_err(|_| DecodeError::BodyReadTimeout)?
            .map_err(|err| DecodeError::BodyRead(Box::new(err)))?
            .to_bytes();

        codec::decode(&body, encoding, format)
    }

    fn fire(&self, outcome: Result<FanoutSummary, Error>) {
        if let Err(err) = self.signal.fire(outcome) {
            tracing::warn!(name: "relay.gate_already_open", error = %err);
        }
    }
}

fn is_heartbeat(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim() == "0")
}

fn header_str(headers: &HeaderMap, name: http::header::HeaderName) -> String {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default()
}

fn respond(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

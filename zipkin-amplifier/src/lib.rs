//! # Zipkin Amplifier
//!
//! Generates synthetic Zipkin traces and replays them, amplified, against a
//! Zipkin compatible collector to load-test tracing pipelines.
//!
//! A run has two halves that meet over HTTP on the loopback interface:
//!
//! * the [`orchestrator`] walks a configured span tree and emits real spans
//!   through the OpenTelemetry SDK, with the configured durations, tags,
//!   errors and payload padding. The [`reporter`] buffers them and posts them
//!   as one batch;
//! * the [`relay`] agent receives that batch, decodes it, and the
//!   [`relay::fanout`] sender posts it `threads × send_count` times to the
//!   downstream collector, optionally with a fresh trace id per post.
//!
//! The run ends when the relay opens the [`signal::CompletionSignal`].
//!
//! ## Configuration
//!
//! ```json
//! {
//!   "dk_agent": "127.0.0.1:9529",
//!   "sender": { "threads": 4, "send_count": 100, "send_interval": 0 },
//!   "service": "checkout",
//!   "encode": "protobuf",
//!   "dump_size": 64,
//!   "random_dump": true,
//!   "trace": [
//!     {
//!       "operation": "POST /pay",
//!       "resource": "/pay",
//!       "span_type": "web",
//!       "duration": 120,
//!       "tags": [{ "key": "http.status_code", "value": 200 }],
//!       "children": [
//!         { "operation": "SELECT", "resource": "orders", "span_type": "db", "duration": 15 },
//!         { "operation": "GET", "resource": "/fraud", "span_type": "http", "duration": 40,
//!           "error": "upstream timeout" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! ## Running
//!
//! ```no_run
//! # async fn doc() -> Result<(), zipkin_amplifier::Error> {
//! let config = zipkin_amplifier::Config::load("config.json")?;
//! let outcome = zipkin_amplifier::run(config).await?;
//! println!("{} spans, {} posts", outcome.spans, outcome.fanout.attempted);
//! # Ok(())
//! # }
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

#[macro_use]
extern crate typed_builder;

pub mod codec;
pub mod config;
pub mod model;
pub mod orchestrator;
pub mod relay;
pub mod reporter;
mod run;
pub mod signal;

pub use codec::{DecodeError, EncodeError, Format};
pub use config::{Config, ConfigError};
pub use relay::{FanoutSummary, TransportError};
pub use run::{run, run_with_clients, RunOutcome};

/// Errors of a zipkin-amplifier run.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An inbound batch could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An outbound batch could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// An HTTP call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Socket or compression failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The uri provided is invalid
    #[error("invalid uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// The completion gate was opened twice.
    #[error("completion signal fired more than once")]
    CompletionAlreadySignaled,

    /// Every completion handle was dropped before the gate opened.
    #[error("completion signal dropped before it fired")]
    CompletionDropped,

    /// The tracer provider failed to flush or shut down.
    #[error("tracer provider error: {0}")]
    Sdk(#[from] opentelemetry_sdk::error::OTelSdkError),
}

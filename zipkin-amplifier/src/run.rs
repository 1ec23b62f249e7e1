use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::relay::{
    FanoutSender, FanoutSummary, RelayAgent, RelaySettings, ServerTimeouts, TransportError,
};
use crate::reporter;
use crate::signal::CompletionSignal;
use crate::Error;
use opentelemetry::trace::TracerProvider;
use opentelemetry_http::HttpClient;
use opentelemetry_sdk::error::OTelSdkResult;
use std::sync::Arc;

/// Result of one generate-and-relay cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Spans reported to the relay agent.
    pub spans: usize,
    /// Tally of the amplified posts.
    pub fanout: FanoutSummary,
}

/// Runs one cycle with reqwest clients bounded by `config.timeout`.
pub async fn run(config: Config) -> Result<RunOutcome, Error> {
    let reporter_client = http_client(&config)?;
    let downstream_client = http_client(&config)?;
    run_with_clients(config, reporter_client, downstream_client).await
}

/// Runs one cycle: the reporter posts through `reporter_client`, the
/// fan-out through `downstream_client`.
pub async fn run_with_clients(
    config: Config,
    reporter_client: Arc<dyn HttpClient>,
    downstream_client: Arc<dyn HttpClient>,
) -> Result<RunOutcome, Error> {
    let (signal, waiter) = CompletionSignal::new();
    let signal = Arc::new(signal);

    let endpoint = config.downstream_endpoint()?.parse::<http::Uri>()?;
    let fanout = FanoutSender::new(
        downstream_client,
        endpoint,
        config.encode,
        config.sender.clone(),
        config.mutate_trace_id,
    );
    let agent = RelayAgent::bind(
        config.agent_address,
        RelaySettings {
            fanout,
            timeouts: ServerTimeouts::default(),
        },
        Arc::clone(&signal),
    )
    .await?;
    let relay_addr = agent.local_addr()?;
    let mut relay = agent.spawn();

    let (provider, reporter) = reporter::new_pipeline()
        .with_service_name(config.service.clone())
        .with_relay_address(relay_addr)
        .with_format(config.encode)
        .with_compression(config.gzip)
        .with_shared_http_client(reporter_client)
        .install()?;

    let summary = Orchestrator::new(provider.tracer("zipkin-amplifier"))
        .run(&config.trace)
        .await;
    provider.force_flush()?;

    let spans = match reporter.flush().await {
        Ok(spans) => spans,
        Err(err) => {
            relay.abort();
            return Err(err);
        }
    };
    tracing::info!(
        name: "run.reported",
        finished_spans = summary.finished_spans,
        reported_spans = spans,
    );
    if spans == 0 {
        signal.fire(Ok(FanoutSummary::default()))?;
    }

    let fanout = tokio::select! {
        outcome = waiter.wait() => outcome,
        exited = &mut relay => match exited {
            Ok(Ok(())) => Err(Error::CompletionDropped),
            Ok(Err(err)) => Err(err),
            Err(err) => Err(Error::Io(err.into())),
        },
    };
    relay.abort();

    let fanout = settle(fanout, provider.shutdown())?;
    tracing::info!(
        name: "run.complete",
        spans,
        attempted = fanout.attempted,
        succeeded = fanout.succeeded,
        failed = fanout.failed,
    );
    Ok(RunOutcome { spans, fanout })
}

/// The relay outcome wins over a provider shutdown failure.
fn settle(
    fanout: Result<FanoutSummary, Error>,
    shutdown: OTelSdkResult,
) -> Result<FanoutSummary, Error> {
    match shutdown {
        Ok(()) => fanout,
        Err(err) if fanout.is_err() => {
            tracing::warn!(name: "run.shutdown_failed", error = %err);
            fanout
        }
        Err(err) => Err(err.into()),
    }
}

fn http_client(config: &Config) -> Result<Arc<dyn HttpClient>, Error> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|err| TransportError::Send(err.into()))?;
    Ok(Arc::new(client))
}

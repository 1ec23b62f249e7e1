use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use zipkin_amplifier::Config;

#[derive(Parser, Debug)]
#[command(name = "zipkin-amplifier", version, about)]
struct Cli {
    /// JSON configuration file, defaults to $ZIPKIN_AMPLIFIER_CONFIG or ./config.json
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(Config::default_path);

    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(name: "config.invalid", path = %path.display(), error = %err);
            return ExitCode::FAILURE;
        }
    };

    match zipkin_amplifier::run(config).await {
        Ok(outcome) => {
            tracing::info!(
                name: "amplifier.done",
                spans = outcome.spans,
                posts = outcome.fanout.attempted,
                failed = outcome.fanout.failed,
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(name: "amplifier.failed", error = %err);
            ExitCode::FAILURE
        }
    }
}

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Path of the configuration file when none is given on the command line.
const ENV_CONFIG: &str = "ZIPKIN_AMPLIFIER_CONFIG";

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Downstream collector, overrides `dk_agent`.
/// e.g. "http://localhost:9411"
const ENV_ENDPOINT: &str = "ZIPKIN_AMPLIFIER_ENDPOINT";

/// Maximum time each outbound HTTP call may take, in milliseconds.
const ENV_TIMEOUT: &str = "ZIPKIN_AMPLIFIER_TIMEOUT";

/// Default outbound timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

pub(crate) fn get_config_path() -> PathBuf {
    match env::var(ENV_CONFIG).ok().filter(|var| !var.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

pub(crate) fn get_endpoint() -> Option<String> {
    env::var(ENV_ENDPOINT).ok().filter(|var| !var.is_empty())
}

pub(crate) fn get_timeout() -> Duration {
    match env::var(ENV_TIMEOUT).ok().filter(|var| !var.is_empty()) {
        Some(timeout) => match timeout.parse() {
            Ok(timeout) => Duration::from_millis(timeout),
            Err(err) => {
                tracing::warn!(
                    name: "config.malformed_timeout",
                    variable = ENV_TIMEOUT,
                    value = %timeout,
                    error = %err,
                    "defaulting to 10000 ms",
                );
                DEFAULT_TIMEOUT
            }
        },
        None => DEFAULT_TIMEOUT,
    }
}

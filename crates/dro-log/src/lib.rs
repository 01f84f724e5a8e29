//! Structured logging for the DRO client.
//!
//! Console output with uptime timestamps and targets, plus JSON file logging
//! in debug builds for post-mortem analysis of connection problems. The
//! level comes from `RUST_LOG` when set, otherwise from the config.

use std::fs::File;
use std::path::Path;

use dro_config::Config;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default directives: `info`, with the WebSocket stack kept quiet.
const DEFAULT_FILTER: &str = "info,tungstenite=warn,tokio_tungstenite=warn";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "dro-client.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - whether to write the JSON log file
/// * `config` - optional configuration whose `debug.log_level` replaces
///   the default directives
///
/// `log` records, such as those from `dro-config`, are captured as well.
///
/// ```no_run
/// use dro_config::Config;
/// use dro_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = File::create(log_dir.join(LOG_FILE_NAME))
    {
        subscriber.with(file_layer(log_file)).init();
        return;
    }

    subscriber.init();
}

/// Create an `EnvFilter` with the default directives.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

fn filter_directives(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => {
            config.debug.log_level.clone()
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// JSON lines, no ANSI codes.
fn file_layer<S>(log_file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_timer(fmt::time::uptime())
        .json()
}

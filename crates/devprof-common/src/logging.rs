use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Log formatter selectable from the command line
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Use pretty formatter (default in debug mode)
    Pretty,
    /// Use JSON formatter (default in release mode)
    Json,
}

#[cfg(debug_assertions)]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Pretty;
#[cfg(not(debug_assertions))]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Json;

pub fn default_tracing_format() -> TracingFormat {
    DEFAULT_TRACING_FORMAT
}

/// Build the filter directive used when `RUST_LOG` is not set
///
/// Third-party crates stay at `warn`; the workspace crates log at `level`.
pub fn filter_directive(level: &str) -> String {
    format!("warn,devprof_common={level},devprof_agent={level},devprof_collector={level}")
}

/// Configure and initialize logging for the application
///
/// Events go to stderr; stdout is reserved for encoded records and JSON output.
pub fn setup_logging(log_level: &str, format: TracingFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    match format {
        TracingFormat::Pretty => {
            let subscriber = FmtSubscriber::builder()
                .with_target(true)
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .pretty()
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("setting default subscriber failed");
        }
        TracingFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_target(true)
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .flatten_event(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("setting default subscriber failed");
        }
    }
}

//! Logging bootstrap for the `sahaay` command line.
//!
//! Command output (values, keys, chat replies) goes to stdout, so log lines
//! are written to stderr and `sahaay get k | jq` keeps working.

use std::io;

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// Filter used when `RUST_LOG` is unset. JSON logs also carry the
    /// per-attempt retry events from `service::storage`.
    fn default_filter(self) -> &'static str {
        match self {
            LogFormat::Compact => "info,service::storage=info",
            LogFormat::Json => "info,service::storage=debug",
        }
    }
}

/// `RUST_LOG` if set and parseable, the format's default otherwise.
pub fn env_filter(format: LogFormat) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format.default_filter()))
}

/// Build the CLI subscriber over any writer.
pub fn cli_subscriber<W>(format: LogFormat, filter: EnvFilter, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(writer);
    match format {
        LogFormat::Compact => Box::new(builder.compact().finish()),
        LogFormat::Json => Box::new(builder.json().finish()),
    }
}

/// Install the CLI subscriber globally, writing to stderr. A second call is a no-op.
pub fn init_logging_cli(format: LogFormat) {
    let subscriber = cli_subscriber(format, env_filter(format), io::stderr);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

//! Process-wide logging setup.
//!
//! ## Environment Variables
//!
//! - `SWIPETRAINER_LOG` or `RUST_LOG`: filter directive
//!   (e.g. `swipetrainer=debug,chromiumoxide=warn`)
//! - `SWIPETRAINER_LOG_FORMAT`: `pretty`, `compact` or `json`

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

const DEFAULT_FILTER: &str = "swipetrainer=info,swipetrainer_core=info,warn";
const DEBUG_FILTER: &str = "swipetrainer=debug,swipetrainer_core=debug,info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Case-insensitive; anything unknown is `Pretty`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
    /// Emit span open/close events
    pub with_spans: bool,
    /// Include file and line
    pub with_file: bool,
    pub with_thread_ids: bool,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            with_spans: false,
            with_file: false,
            with_thread_ids: false,
            with_target: true,
        }
    }
}

fn env_format() -> LogFormat {
    std::env::var("SWIPETRAINER_LOG_FORMAT")
        .map(|s| LogFormat::parse(&s))
        .unwrap_or_default()
}

impl LogConfig {
    pub fn from_env() -> Self {
        let filter = std::env::var("SWIPETRAINER_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string());

        Self {
            filter,
            format: env_format(),
            ..Default::default()
        }
    }

    /// `--debug`: debug level for this crate, file/line and thread ids on.
    /// The network callback runs on another task, so thread ids matter here.
    pub fn debug() -> Self {
        Self {
            filter: DEBUG_FILTER.to_string(),
            format: env_format(),
            with_file: true,
            with_thread_ids: true,
            ..Default::default()
        }
    }
}

/// Install the global subscriber. Only the first call has an effect.
pub fn init(config: LogConfig) {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let span_events = if config.with_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(span_events)
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_thread_ids(config.with_thread_ids)
        .with_target(config.with_target);

    let registry = tracing_subscriber::registry().with(env_filter);
    let _ = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(registry.with(layer.json())),
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(registry.with(layer.compact()))
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(registry.with(layer.pretty())),
    };
}

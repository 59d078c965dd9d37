use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter variable checked first; `RUST_LOG` is the fallback.
pub const LOG_ENV: &str = "TASKTRACK_LOG";

/// Build the filter from the environment. Logging is off unless asked for,
/// and an unusable filter is ignored rather than failing startup.
pub fn env_filter() -> EnvFilter {
    [LOG_ENV, "RUST_LOG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|raw| parse_filter(&raw))
        .unwrap_or_else(|| EnvFilter::new("off"))
}

fn parse_filter(raw: &str) -> Option<EnvFilter> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > 4096 {
        return None;
    }
    EnvFilter::try_new(raw).ok()
}

/// Install the global subscriber, writing to stderr so command output on
/// stdout stays clean.
pub fn init() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter())
        .init();
}

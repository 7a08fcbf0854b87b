//! # fanhub-logging
//!
//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the global stderr subscriber (compact or JSON)
//! - [`capture_logs`] installs a thread-local capturing subscriber for tests

#![deny(unsafe_code)]

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

use fanhub_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` wins over the configured level when set. Call once at
/// startup; subsequent calls are no-ops.
pub fn init_subscriber(settings: &LoggingSettings) {
    init_subscriber_with(settings.level.as_filter_str(), settings.format);
}

/// Initialize the global subscriber from a raw filter directive.
pub fn init_subscriber_with(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // set_global_default is a no-op if already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanhub_settings::LogLevel;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber(&LoggingSettings::default());
        init_subscriber_with("debug", LogFormat::Json);
    }

    #[test]
    fn init_from_settings_uses_level() {
        let settings = LoggingSettings {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
        };
        init_subscriber(&settings);
    }
}

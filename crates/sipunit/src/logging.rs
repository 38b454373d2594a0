//! Logging setup for harness-driven tests
//!
//! Tests call [`init_test_logging`] at the top of each case. The first call
//! installs a global `tracing` subscriber; later calls are no-ops, so the
//! order in which test threads start does not matter. Without `RUST_LOG`
//! the harness crates log at `info`.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{SipUnitError, SipUnitResult};

/// Subscriber options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for the harness crates when `RUST_LOG` is not set
    pub level: Level,
    pub file_info: bool,
    pub log_spans: bool,
    /// Write through the test harness' captured output
    pub test_writer: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            file_info: false,
            log_spans: false,
            test_writer: true,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            ..Default::default()
        }
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    fn directives(&self) -> String {
        let level = self.level.to_string().to_ascii_lowercase();
        ["sipunit", "sipunit_dialog_core", "sipunit_sip_transport", "sipunit_sip_core"]
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Installs the global subscriber
///
/// Returns `Ok(false)` when a subscriber was already installed.
pub fn setup_logging(config: LoggingConfig) -> SipUnitResult<bool> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.test_writer {
        builder.with_test_writer().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    Ok(installed)
}

/// Installs the default subscriber once; safe to call from every test
pub fn init_test_logging() {
    let _ = setup_logging(LoggingConfig::default());
}

/// Parses a level name such as `debug`
pub fn parse_log_level(level: &str) -> SipUnitResult<Level> {
    Level::from_str(level)
        .map_err(|_| SipUnitError::configuration(format!("Invalid log level: {}", level)))
}

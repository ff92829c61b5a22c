//! Tracing setup for test binaries.
//!
//! The engine emits `tracing` events at session transitions, matched and
//! unexpected calls, verification failures and restoration problems. This
//! module installs a subscriber that prints them.
//!
//! Logging format is controlled via `REWIRE_LOG_FORMAT`:
//! - `json` - Structured JSON output
//! - `pretty` - Human-readable multi-line output
//! - `compact` - Compact single-line format (default)
//!
//! # Example
//!
//! ```ignore
//! use rewire_core::observability::{TracingConfig, init_tracing};
//!
//! init_tracing(TracingConfig::from_env())?;
//! ```

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::env_flag;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON format for structured logging.
    Json,
    /// Human-readable pretty format.
    Pretty,
    /// Compact single-line format.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        })
    }
}

/// Configuration for the tracing subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    log_format: LogFormat,
    /// Log level filter (e.g., "info", "warn,rewire_core=trace").
    log_filter: String,
    include_location: bool,
    include_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: "warn".to_string(),
            include_location: false,
            include_target: true,
        }
    }
}

impl TracingConfig {
    /// Create a new builder.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `REWIRE_LOG_FORMAT`: "json", "pretty", or "compact"
    /// - `REWIRE_LOG_LEVEL` or `RUST_LOG`: Log filter string
    /// - `REWIRE_LOG_LOCATION`: "true" to include file and line
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_format: env::var("REWIRE_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse::<LogFormat>().ok())
                .unwrap_or(defaults.log_format),
            log_filter: env::var("REWIRE_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_filter),
            include_location: env_flag("REWIRE_LOG_LOCATION").unwrap_or(false),
            include_target: defaults.include_target,
        }
    }

    /// Get the log format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Get the log filter.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Check if source location should be included.
    pub fn include_location(&self) -> bool {
        self.include_location
    }

    /// Check if target should be included.
    pub fn include_target(&self) -> bool {
        self.include_target
    }
}

/// Builder for TracingConfig.
#[derive(Debug, Clone, Default)]
pub struct TracingConfigBuilder {
    log_format: Option<LogFormat>,
    log_filter: Option<String>,
    include_location: Option<bool>,
    include_target: Option<bool>,
}

impl TracingConfigBuilder {
    /// Set the log format.
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    /// Set the log filter.
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Include source location in logs.
    pub fn include_location(mut self, include: bool) -> Self {
        self.include_location = Some(include);
        self
    }

    /// Include target in logs.
    pub fn include_target(mut self, include: bool) -> Self {
        self.include_target = Some(include);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TracingConfig {
        let defaults = TracingConfig::default();
        TracingConfig {
            log_format: self.log_format.unwrap_or(defaults.log_format),
            log_filter: self.log_filter.unwrap_or(defaults.log_filter),
            include_location: self.include_location.unwrap_or(defaults.include_location),
            include_target: self.include_target.unwrap_or(defaults.include_target),
        }
    }
}

/// Build the fmt layer for the configured format, writing to `writer`.
fn fmt_layer<S, W>(config: &TracingConfig, writer: W) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_file(config.include_location())
        .with_line_number(config.include_location())
        .with_target(config.include_target());

    match config.log_format() {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Build a subscriber configured by `config` that writes to `writer`.
///
/// Use it with [`tracing::subscriber::with_default`] to capture engine events
/// in a single test, or install it globally through [`init_tracing`].
pub fn subscriber<W>(config: &TracingConfig, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(config, writer))
}

/// Install a global tracing subscriber configured by `config`.
///
/// Output goes through the test harness capture. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    subscriber(&config, fmt::TestWriter::new())
        .try_init()
        .context("Failed to initialize tracing subscriber")
}

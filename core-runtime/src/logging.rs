//! # Logging
//!
//! `tracing` is the only logging API used by the core. This module installs the
//! global subscriber for hosts that do not bring their own, and mirrors events
//! to the host's [`LoggerSink`] so they show up in logcat / os_log next to the
//! rest of the app.
//!
//! Values of identifier-like fields (`gaid`, `idfa`, `device_id`, tokens) are
//! replaced with `[REDACTED]` before they reach the sink.
//!
//! ```ignore
//! use bridge_traits::time::{ConsoleLogger, LogLevel};
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use std::sync::Arc;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_logger_sink(Arc::new(ConsoleLogger::default())),
//! )?;
//! tracing::info!(surface = "INTERSTITIAL", "Ad shown");
//! ```

use crate::error::{Error, Result};
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FmtSpan, Format};
use tracing_subscriber::fmt::{FormatFields, Layer as FmtLayer};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const CORE_TARGETS: [&str; 3] = ["core_ads", "core_runtime", "bridge_traits"];

const SENSITIVE_FIELDS: [&str; 9] = [
    "advertising_id",
    "gaid",
    "idfa",
    "device_id",
    "token",
    "api_key",
    "secret",
    "password",
    "authorization",
];

const REDACTED: &str = "[REDACTED]";

/// Console output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, coloured. Debug builds default to this.
    Pretty,
    /// One JSON object per line. Release builds default to this.
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level applied to the core crates when no `filter` is given.
    pub level: LogLevel,
    /// `EnvFilter` directives, e.g. `"core_ads=trace,sqlx=info"`. Overrides `level`.
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    pub redact_sensitive: bool,
    /// Log span open/close (console) or span context (JSON).
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            logger_sink: None,
            redact_sensitive: true,
            enable_spans: false,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("has_sink", &self.logger_sink.is_some())
            .field("redact_sensitive", &self.redact_sensitive)
            .field("enable_spans", &self.enable_spans)
            .finish_non_exhaustive()
    }
}

impl LoggingConfig {
    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn with_level(self, level: LogLevel) -> Self {
        Self { level, ..self }
    }

    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..self
        }
    }

    pub fn with_logger_sink(self, sink: Arc<dyn LoggerSink>) -> Self {
        Self {
            logger_sink: Some(sink),
            ..self
        }
    }

    pub fn with_redaction(self, redact_sensitive: bool) -> Self {
        Self {
            redact_sensitive,
            ..self
        }
    }

    pub fn with_spans(self, enable_spans: bool) -> Self {
        Self {
            enable_spans,
            ..self
        }
    }

    pub fn with_target(self, display_target: bool) -> Self {
        Self {
            display_target,
            ..self
        }
    }

    pub fn with_thread_info(self, display_thread_info: bool) -> Self {
        Self {
            display_thread_info,
            ..self
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let directives = self
            .filter
            .clone()
            .unwrap_or_else(|| default_filter(self.level));
        EnvFilter::try_new(&directives)
            .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// [`Error::Config`] for a malformed filter, [`Error::Logging`] when a global
/// subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    // Exactly one of these is Some; `Option<L>` is itself a layer.
    let (pretty, json, compact) = match config.format {
        LogFormat::Pretty => (
            Some(
                console(tracing_subscriber::fmt::layer().pretty(), &config)
                    .with_span_events(span_events),
            ),
            None,
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                console(tracing_subscriber::fmt::layer().json(), &config)
                    .flatten_event(true)
                    .with_current_span(config.enable_spans)
                    .with_span_list(config.enable_spans),
            ),
            None,
        ),
        LogFormat::Compact => (
            None,
            None,
            Some(
                console(tracing_subscriber::fmt::layer().compact(), &config)
                    .with_span_events(span_events),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(LoggerSinkLayer::new(
            config.logger_sink.clone(),
            config.redact_sensitive,
        ))
        .with(pretty)
        .with(json)
        .with(compact)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

fn console<S, N, L, T, W>(
    layer: FmtLayer<S, N, Format<L, T>, W>,
    config: &LoggingConfig,
) -> FmtLayer<S, N, Format<L, T>, W>
where
    N: for<'w> FormatFields<'w> + 'static,
{
    layer
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
}

/// `core_ads=<level>,core_runtime=<level>,bridge_traits=<level>,sqlx=warn`
pub fn default_filter(level: LogLevel) -> String {
    let level = level.as_str().to_ascii_lowercase();
    CORE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .chain(std::iter::once("sqlx=warn".to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Mirrors events into a host [`LoggerSink`].
///
/// Delivery is spawned on the current Tokio runtime when there is one so a
/// slow sink never stalls the emitting task.
pub struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl LoggerSinkLayer {
    pub fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn to_entry(&self, event: &Event<'_>, level: LogLevel, span: Option<&str>) -> LogEntry {
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let metadata = event.metadata();
        let message = fields
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());

        let mut entry = LogEntry::new(level, metadata.target(), message);
        for (name, value) in fields.values {
            let value = if self.redact {
                redact_if_sensitive(&name, &value)
            } else {
                value
            };
            entry = entry.with_field(name, value);
        }
        entry.span_id = span.map(str::to_string);
        entry
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let level = log_level(*event.metadata().level());
        if level < sink.min_level() {
            return;
        }

        let span = ctx.lookup_current();
        let entry = self.to_entry(event, level, span.as_ref().map(|s| s.name()));
        let sink = Arc::clone(sink);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = sink.log(entry).await {
                        eprintln!("logger sink failed: {}", e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("logger sink failed: {}", e);
                }
            }
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: HashMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    // integers, floats and bools land here through the default impls
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

fn log_level(level: Level) -> LogLevel {
    if level == Level::ERROR {
        LogLevel::Error
    } else if level == Level::WARN {
        LogLevel::Warn
    } else if level == Level::INFO {
        LogLevel::Info
    } else if level == Level::DEBUG {
        LogLevel::Debug
    } else {
        LogLevel::Trace
    }
}

/// Replace the value of an identifier or credential field.
///
/// Matching is case-insensitive and by substring, so `user_gaid` and
/// `Authorization` are both caught.
///
/// ```
/// use core_runtime::logging::redact_if_sensitive;
///
/// assert_eq!(redact_if_sensitive("gaid", "38400000-8cf0-11bd-b23e-10b96e40000d"), "[REDACTED]");
/// assert_eq!(redact_if_sensitive("config_id", "fallback-banner"), "fallback-banner");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let name = field_name.to_ascii_lowercase();
    let shown = if SENSITIVE_FIELDS.iter().any(|s| name.contains(s)) {
        REDACTED
    } else {
        value
    };
    shown.to_string()
}

//! Logging for Girder
//!
//! Configurable `tracing` subscriber setup plus the structured events the
//! pipeline emits. Defaults to JSON output to STDOUT.
//!
//! # Examples
//!
//! ```no_run
//! use girder_core::logging::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let _guard = LogConfig::new()
//!         .level(LogLevel::Debug)
//!         .format(LogFormat::Pretty)
//!         .with_targets(true)
//!         .init();
//!
//!     info!("Application configured with pretty logging");
//! }
//! ```
//!
//! Pipeline events use the targets `girder::invoker` and `girder::selector`,
//! so `with_env_filter("girder::invoker=trace")` shows every filter call.

use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use tracing::{debug, error, info, trace, warn};

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Directive string for `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Output format for log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured, machine-readable (default)
    Json,
    Plain,
    /// Multi-line, for development
    Pretty,
    Compact,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "plain" => Some(LogFormat::Plain),
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

/// Output destination for logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(String),
    RollingFile {
        directory: String,
        prefix: String,
        rotation: Rotation,
    },
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl Rotation {
    fn to_tracing_rotation(self) -> tracing_appender::rolling::Rotation {
        match self {
            Rotation::Minutely => tracing_appender::rolling::Rotation::MINUTELY,
            Rotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
            Rotation::Daily => tracing_appender::rolling::Rotation::DAILY,
            Rotation::Never => tracing_appender::rolling::Rotation::NEVER,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub thread_ids: bool,
    /// Include target (module path)
    pub targets: bool,
    pub file_line: bool,
    /// Log span close events and include the span list in JSON output
    pub spans: bool,
    /// ANSI colors (ignored by JSON)
    pub colors: bool,
    /// Custom filter directives; overrides `level` when set
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `GIRDER_LOG_LEVEL`, `GIRDER_LOG_FORMAT` and
    /// `GIRDER_LOG_FILTER`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(level) = std::env::var("GIRDER_LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
        {
            config.level = level;
        }
        if let Some(format) = std::env::var("GIRDER_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
        {
            config.format = format;
        }
        if let Ok(filter) = std::env::var("GIRDER_LOG_FILTER") {
            if !filter.trim().is_empty() {
                config.env_filter = Some(filter);
            }
        }
        config
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.thread_ids = enable;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_file_line(mut self, enable: bool) -> Self {
        self.file_line = enable;
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.spans = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    /// Set filter directives such as `"girder::invoker=trace,info"`
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Install the global subscriber.
    ///
    /// Keep the returned guard alive for the life of the program; dropping it
    /// flushes buffered output. A log file that cannot be opened falls back
    /// to STDERR.
    pub fn init(self) -> Option<WorkerGuard> {
        let env_filter = match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives)
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
        };

        let (writer, guard) = match &self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(file) => tracing_appender::non_blocking(file),
                Err(_) => tracing_appender::non_blocking(io::stderr()),
            },
            LogOutput::RollingFile {
                directory,
                prefix,
                rotation,
            } => tracing_appender::non_blocking(
                tracing_appender::rolling::RollingFileAppender::new(
                    rotation.to_tracing_rotation(),
                    directory,
                    prefix,
                ),
            ),
        };

        self.init_with_writer(writer, env_filter);
        Some(guard)
    }

    fn init_with_writer<W>(&self, writer: W, env_filter: EnvFilter)
    where
        W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
    {
        let fmt_span = if self.spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        // A second init in the same process (tests) keeps the first subscriber.
        match self.format {
            LogFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(self.spans)
                    .with_span_list(self.spans)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_file(self.file_line)
                    .with_line_number(self.file_line)
                    .with_span_events(fmt_span);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
            LogFormat::Plain => {
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_file(self.file_line)
                    .with_line_number(self.file_line)
                    .with_ansi(self.colors)
                    .with_span_events(fmt_span);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .pretty()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_file(self.file_line)
                    .with_line_number(self.file_line)
                    .with_ansi(self.colors)
                    .with_span_events(fmt_span);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
            LogFormat::Compact => {
                let layer = fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_ansi(self.colors)
                    .with_span_events(fmt_span);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
        }
    }
}

impl Default for LogConfig {
    /// JSON to STDOUT at INFO
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            thread_ids: false,
            targets: true,
            file_line: false,
            spans: false,
            colors: false,
            env_filter: None,
        }
    }
}

/// Structured events emitted by the invoker and the selector.
///
/// Every function is cheap when its level is disabled.
pub mod events {
    use crate::action_descriptor::ActionDescriptor;
    use crate::filters::FilterMetadata;
    use std::time::Duration;
    use tracing::{Span, debug, info, trace};

    const INVOKER: &str = "girder::invoker";

    /// Span wrapping one invocation
    pub fn action_span(action: &ActionDescriptor) -> Span {
        tracing::info_span!(
            target: "girder::invoker",
            "action",
            action_id = %action.id,
            action_name = %action.display_name,
        )
    }

    pub fn executing_action(action: &ActionDescriptor) {
        info!(
            target: INVOKER,
            action = %action.display_name,
            route_values = ?action.route_values,
            "Executing action"
        );
    }

    pub fn executed_action(action: &ActionDescriptor, elapsed: Duration) {
        info!(
            target: INVOKER,
            action = %action.display_name,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Executed action"
        );
    }

    /// Filters of one kind in execution order; silent when there are none.
    pub fn execution_plan<'a, I>(kind: &'static str, filters: I)
    where
        I: IntoIterator<Item = &'a dyn FilterMetadata>,
    {
        if !tracing::enabled!(target: "girder::invoker", tracing::Level::DEBUG) {
            return;
        }
        let names: Vec<&str> = filters.into_iter().map(|f| f.name()).collect();
        if names.is_empty() {
            return;
        }
        debug!(
            target: INVOKER,
            kind,
            filters = ?names,
            "Execution plan of {} filters (in the following order): {}",
            kind,
            names.join(", ")
        );
    }

    pub fn before_executing_method_on_filter(kind: &'static str, method: &'static str, filter: &str) {
        trace!(target: INVOKER, kind, method, filter, "{} {}: Before executing {} on filter {}", kind, method, method, filter);
    }

    pub fn after_executing_method_on_filter(kind: &'static str, method: &'static str, filter: &str) {
        trace!(target: INVOKER, kind, method, filter, "{} {}: After executing {} on filter {}", kind, method, method, filter);
    }

    pub fn authorization_failure(filter: &str) {
        debug!(
            target: INVOKER,
            filter,
            "Authorization failed for the request at filter '{}'.",
            filter
        );
    }

    pub fn resource_filter_short_circuited(filter: &str) {
        debug!(
            target: INVOKER,
            filter,
            "Request was short circuited at resource filter '{}'.",
            filter
        );
    }

    pub fn action_filter_short_circuited(filter: &str) {
        debug!(
            target: INVOKER,
            filter,
            "Request was short circuited at action filter '{}'.",
            filter
        );
    }

    pub fn result_filter_short_circuited(filter: &str) {
        debug!(
            target: INVOKER,
            filter,
            "Request was short circuited at result filter '{}'.",
            filter
        );
    }

    pub fn exception_filter_short_circuited(filter: &str) {
        debug!(
            target: INVOKER,
            filter,
            "Request was short circuited at exception filter '{}'.",
            filter
        );
    }

    pub fn executing_action_method(action: &ActionDescriptor, arguments: &[String]) {
        info!(
            target: INVOKER,
            action = %action.display_name,
            arguments = ?arguments,
            "Executing action method {} with arguments ({})",
            action.display_name,
            arguments.join(", ")
        );
    }

    pub fn executed_action_method(action: &ActionDescriptor, result: &str, elapsed: Duration) {
        info!(
            target: INVOKER,
            action = %action.display_name,
            result,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Executed action method {}, returned result {}",
            action.display_name,
            result
        );
    }

    pub fn before_executing_action_result(result: &str) {
        trace!(target: INVOKER, result, "Before executing action result {}", result);
    }

    pub fn after_executing_action_result(result: &str) {
        trace!(target: INVOKER, result, "After executing action result {}", result);
    }

    const SELECTOR: &str = "girder::selector";

    pub fn constraint_mismatch(action: &ActionDescriptor, constraint: &str) {
        debug!(
            target: SELECTOR,
            action = %action.display_name,
            constraint,
            "Action '{}' with id '{}' did not match the constraint '{}'",
            action.display_name,
            action.id,
            constraint
        );
    }

    pub fn ambiguous_actions(actions: &str) {
        debug!(
            target: SELECTOR,
            actions,
            "Request matched multiple actions resulting in ambiguity. Matching actions: {}",
            actions
        );
    }

    pub fn no_actions_matched(route_values: &crate::route::RouteValues) {
        debug!(
            target: SELECTOR,
            route_values = ?route_values,
            "No actions matched the current request"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Trace.to_tracing_level(), Level::TRACE);
        assert_eq!(LogLevel::Warn.to_tracing_level(), Level::WARN);
        assert_eq!(LogLevel::Error.as_str(), "error");
    }

    #[test]
    fn test_parse_level_and_format() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogFormat::parse(" Pretty "), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
        assert!(config.targets);
        assert!(config.env_filter.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .level(LogLevel::Debug)
            .format(LogFormat::Compact)
            .with_colors(true)
            .with_env_filter("girder::invoker=trace");

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.colors);
        assert_eq!(config.env_filter.as_deref(), Some("girder::invoker=trace"));
    }
}

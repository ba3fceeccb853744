//! Structured call logging.
//!
//! # Data Flow
//! ```text
//! accepted call
//!     → LoggingReportable: CallLogger (call fields + Tag Bag) stored in the context
//!     → handler logs through logging::extract(&ctx)
//!     → post_call: decider → codes → levels → one "finished ... call" record
//!     → Logger::log (TracingLogger forwards to `tracing`)
//! ```
//!
//! # Design Decisions
//! - Code, level and duration rendering are plain function pointers so a
//!   server can swap any of them without a new reportable
//! - Tag Bag values are read at log time, not at call start

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::call::{CallContext, CallKind, CallMeta};
use crate::interceptor::{Filter, ReportingLayer};
use crate::reporter::{Reporter, ServerReportable};
use crate::status::{Code, Status};
use crate::tags::{TagValue, Tags};

const LOG_TARGET: &str = "rpc_interceptors::call";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log field.
pub type Field = (String, TagValue);

pub fn field(key: impl Into<String>, value: impl Into<TagValue>) -> Field {
    (key.into(), value.into())
}

/// Logging backend.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str, fields: &[Field]);
}

/// Forwards records to the `tracing` macros, fields rendered as one JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        let fields = fields_to_json(fields);
        match level {
            Level::Debug => tracing::debug!(target: LOG_TARGET, fields = %fields, "{}", message),
            Level::Info => tracing::info!(target: LOG_TARGET, fields = %fields, "{}", message),
            Level::Warn => tracing::warn!(target: LOG_TARGET, fields = %fields, "{}", message),
            Level::Error => tracing::error!(target: LOG_TARGET, fields = %fields, "{}", message),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _: Level, _: &str, _: &[Field]) {}
}

fn fields_to_json(fields: &[Field]) -> serde_json::Value {
    let map = fields
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or_default()))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(map)
}

/// Decides at completion whether the call is logged at all.
pub type Decider = Arc<dyn Fn(&str, Option<&Status>) -> bool + Send + Sync>;

/// Logging layer settings. Built once at startup.
#[derive(Clone)]
pub struct LoggingOptions {
    pub logger: Arc<dyn Logger>,
    pub filter: Option<Filter>,
    pub decider: Decider,
    pub levels: fn(Code) -> Level,
    pub codes: fn(Option<&Status>) -> Code,
    pub duration_field: fn(Duration) -> Field,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            filter: None,
            decider: Arc::new(|_: &str, _: Option<&Status>| true),
            levels: default_code_to_level,
            codes: default_error_to_code,
            duration_field: duration_to_time_millis_field,
        }
    }
}

impl LoggingOptions {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            logger,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_decider<F>(mut self, decider: F) -> Self
    where
        F: Fn(&str, Option<&Status>) -> bool + Send + Sync + 'static,
    {
        self.decider = Arc::new(decider);
        self
    }

    pub fn with_levels(mut self, levels: fn(Code) -> Level) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_codes(mut self, codes: fn(Option<&Status>) -> Code) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_duration_field(mut self, duration_field: fn(Duration) -> Field) -> Self {
        self.duration_field = duration_field;
        self
    }
}

impl fmt::Debug for LoggingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingOptions")
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

/// Level for a server-side call outcome.
pub fn default_code_to_level(code: Code) -> Level {
    match code {
        Code::Ok
        | Code::Cancelled
        | Code::InvalidArgument
        | Code::NotFound
        | Code::AlreadyExists
        | Code::Unauthenticated => Level::Info,

        Code::DeadlineExceeded
        | Code::PermissionDenied
        | Code::ResourceExhausted
        | Code::FailedPrecondition
        | Code::Aborted
        | Code::OutOfRange
        | Code::Unavailable => Level::Warn,

        Code::Unknown | Code::Unimplemented | Code::Internal | Code::DataLoss => Level::Error,
    }
}

/// Level for a client-side call outcome.
pub fn default_client_code_to_level(code: Code) -> Level {
    match code {
        Code::Ok
        | Code::Cancelled
        | Code::InvalidArgument
        | Code::NotFound
        | Code::AlreadyExists
        | Code::ResourceExhausted
        | Code::FailedPrecondition
        | Code::Aborted
        | Code::OutOfRange => Level::Debug,

        Code::Unknown | Code::DeadlineExceeded | Code::PermissionDenied | Code::Unauthenticated => {
            Level::Info
        }

        Code::Unimplemented | Code::Internal | Code::Unavailable | Code::DataLoss => Level::Warn,
    }
}

pub fn default_error_to_code(err: Option<&Status>) -> Code {
    err.map_or(Code::Ok, Status::code)
}

/// `grpc.time_ms`: milliseconds as a float, microsecond precision.
pub fn duration_to_time_millis_field(elapsed: Duration) -> Field {
    let millis = elapsed.as_micros() as f64 / 1000.0;
    field("grpc.time_ms", millis)
}

/// `grpc.duration`: human readable, e.g. `1.5ms`.
pub fn duration_to_duration_field(elapsed: Duration) -> Field {
    field("grpc.duration", format!("{:?}", elapsed))
}

/// Request-scoped logger.
///
/// Every record carries the call fields and the Tag Bag as it is when the
/// record is written.
#[derive(Clone)]
pub struct CallLogger {
    logger: Arc<dyn Logger>,
    fields: Vec<Field>,
    tags: Tags,
}

impl CallLogger {
    pub fn new(logger: Arc<dyn Logger>, tags: Tags) -> Self {
        Self {
            logger,
            fields: Vec::new(),
            tags,
        }
    }

    /// Derive a logger with one more field.
    pub fn with(&self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        let mut derived = self.clone();
        derived.fields.push(field(key, value));
        derived
    }

    pub fn log(&self, level: Level, message: &str) {
        self.log_with(level, message, Vec::new());
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    fn log_with(&self, level: Level, message: &str, extra: Vec<Field>) {
        let mut fields = self.fields.clone();
        fields.extend(extra);
        fields.extend(self.tags.values());
        self.logger.log(level, message, &fields);
    }
}

impl fmt::Debug for CallLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLogger")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// The call's logger, or a no-op logger when logging is not installed.
pub fn extract(ctx: &CallContext) -> CallLogger {
    ctx.extension::<CallLogger>()
        .cloned()
        .unwrap_or_else(|| CallLogger::new(Arc::new(NoopLogger), ctx.tags().clone()))
}

/// Build the logging layer.
pub fn server_layer(options: LoggingOptions) -> ReportingLayer<LoggingReportable> {
    let filter = options.filter.clone();
    let layer = ReportingLayer::new(LoggingReportable::new(options));
    match filter {
        Some(filter) => layer.with_filter(filter),
        None => layer,
    }
}

#[derive(Debug, Clone)]
pub struct LoggingReportable {
    options: Arc<LoggingOptions>,
}

impl LoggingReportable {
    pub fn new(options: LoggingOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }
}

impl ServerReportable for LoggingReportable {
    fn server_reporter(&self, call: &CallMeta, ctx: CallContext) -> (Box<dyn Reporter>, CallContext) {
        let logger = CallLogger::new(self.options.logger.clone(), ctx.tags().clone())
            .with("system", "grpc")
            .with("span.kind", "server")
            .with("grpc.service", call.service())
            .with("grpc.method", call.method());
        let reporter = LoggingReporter {
            options: self.options.clone(),
            logger: logger.clone(),
            full_method: call.full_method(),
            kind: call.kind(),
        };
        (Box::new(reporter), ctx.with_extension(logger))
    }
}

struct LoggingReporter {
    options: Arc<LoggingOptions>,
    logger: CallLogger,
    full_method: String,
    kind: CallKind,
}

impl Reporter for LoggingReporter {
    fn post_call(&mut self, err: Option<&Status>, elapsed: Duration) {
        if !(self.options.decider)(&self.full_method, err) {
            return;
        }
        let code = (self.options.codes)(err);
        let level = (self.options.levels)(code);

        let mut fields = vec![
            field("grpc.code", code.as_str()),
            (self.options.duration_field)(elapsed),
        ];
        if let Some(err) = err {
            fields.push(field("error", err.to_string()));
        }

        let shape = if self.kind.is_streaming() {
            "streaming"
        } else {
            "unary"
        };
        let message = format!("finished {} call with code {}", shape, code);
        self.logger.log_with(level, &message, fields);
    }
}

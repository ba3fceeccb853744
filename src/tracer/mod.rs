//! Tracing backend capability interface.
//!
//! # Data Flow
//! ```text
//! inbound Metadata
//!     → Tracer::extract (backend-specific text codec)
//!     → Tracer::start_span (child of the extracted context, or root)
//!     → Span::set_tag / Span::log_fields during the call
//!     → Span::finish (exactly once, on completion)
//! ```
//!
//! # Backends
//! - mock.rs: deterministic ids, records finished spans, Jaeger-style header
//! - w3c.rs: `traceparent` codec, finished spans emitted as `tracing` events
//!
//! # Design Decisions
//! - The wire encoding belongs to the backend; the rest of the crate only sees
//!   [`SpanContext`]
//! - A missing parent is not an error condition, a malformed one is only logged

pub mod mock;
pub mod w3c;

use std::fmt;
use std::time::SystemTime;

use thiserror::Error;

use crate::call::Metadata;
use crate::tags::TagValue;

pub use mock::{FinishedSpan, MockTracer};
pub use w3c::W3cTracer;

/// Identity of one span within a trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: u128,
    pub span_id: u64,
    pub sampled: bool,
}

impl SpanContext {
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.trace_id_hex(), self.span_id_hex())
    }
}

/// Why no parent context could be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The carrier holds no propagated context.
    #[error("span context not found")]
    NotFound,

    /// The carrier holds a propagation header that cannot be decoded.
    #[error("malformed span context in {header:?}: {reason}")]
    Malformed { header: String, reason: String },
}

/// Text value of a propagation header.
///
/// A header that is present but not visible ASCII counts as malformed.
pub(crate) fn header_text<'a>(carrier: &'a Metadata, header: &str) -> Result<&'a str, ExtractError> {
    if !carrier.contains_key(header) {
        return Err(ExtractError::NotFound);
    }
    carrier.get(header).ok_or_else(|| ExtractError::Malformed {
        header: header.to_string(),
        reason: "value is not visible ASCII".to_string(),
    })
}

/// A single structured field attached to a span log entry.
pub type LogField = (&'static str, TagValue);

/// Options for [`Tracer::start_span`].
#[derive(Debug, Clone)]
pub struct StartSpanOptions {
    /// Parent the new span is a child of; `None` starts a new trace.
    pub child_of: Option<SpanContext>,
    /// Tags set at start time.
    pub tags: Vec<(String, TagValue)>,
    pub start_time: SystemTime,
}

impl Default for StartSpanOptions {
    fn default() -> Self {
        Self {
            child_of: None,
            tags: Vec::new(),
            start_time: SystemTime::now(),
        }
    }
}

impl StartSpanOptions {
    pub fn child_of(mut self, parent: Option<SpanContext>) -> Self {
        self.child_of = parent;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }
}

/// Tracing backend.
pub trait Tracer: Send + Sync {
    /// Extract a propagated parent context from inbound metadata.
    fn extract(&self, carrier: &Metadata) -> Result<SpanContext, ExtractError>;

    /// Write `context` into outbound metadata.
    fn inject(&self, context: &SpanContext, carrier: &mut Metadata);

    fn start_span(&self, operation_name: &str, options: StartSpanOptions) -> Box<dyn Span>;
}

/// A started span. Owned by exactly one reporter.
pub trait Span: Send {
    fn context(&self) -> SpanContext;

    fn set_tag(&mut self, key: &str, value: TagValue);

    fn log_fields(&mut self, fields: &[LogField]);

    /// Finish the span. Calls after the first are ignored.
    fn finish(&mut self);
}

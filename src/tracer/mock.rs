//! In-memory tracer for tests and local runs.
//!
//! Span ids come from a counter so traces are reproducible. Propagation uses a
//! single Jaeger-style header: `{trace}:{span}:{parent}:{flags}` in lowercase
//! hex, where bit 0 of `flags` is the sampled bit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use super::{header_text, ExtractError, LogField, Span, SpanContext, StartSpanOptions, Tracer};
use crate::call::Metadata;
use crate::tags::{TagValue, TagValues, Tags};

pub const DEFAULT_HEADER: &str = "uber-trace-id";

const FIRST_ID: u64 = 43;

/// A span that has been finished.
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub operation_name: String,
    pub context: SpanContext,
    pub parent: Option<SpanContext>,
    pub tags: TagValues,
    pub logs: Vec<Vec<(String, TagValue)>>,
    pub start_time: SystemTime,
    pub finish_time: SystemTime,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }
}

#[derive(Debug)]
struct Recorder {
    next_id: AtomicU64,
    finished: Mutex<Vec<FinishedSpan>>,
}

#[derive(Debug, Clone)]
pub struct MockTracer {
    header_name: String,
    recorder: Arc<Recorder>,
}

impl Default for MockTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTracer {
    pub fn new() -> Self {
        Self::with_header(DEFAULT_HEADER)
    }

    pub fn with_header(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into().to_ascii_lowercase(),
            recorder: Arc::new(Recorder {
                next_id: AtomicU64::new(FIRST_ID),
                finished: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Spans finished so far, in finish order.
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.recorder
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset(&self) {
        self.recorder
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn next_id(&self) -> u64 {
        self.recorder.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Tracer for MockTracer {
    fn extract(&self, carrier: &Metadata) -> Result<SpanContext, ExtractError> {
        let raw = header_text(carrier, &self.header_name)?;
        decode(raw).map_err(|reason| ExtractError::Malformed {
            header: self.header_name.clone(),
            reason,
        })
    }

    fn inject(&self, context: &SpanContext, carrier: &mut Metadata) {
        let value = encode(context);
        if let Err(e) = carrier.insert(&self.header_name, &value) {
            tracing::debug!(error = %e, "Failed to inject mock trace header");
        }
    }

    fn start_span(&self, operation_name: &str, options: StartSpanOptions) -> Box<dyn Span> {
        let span_id = self.next_id();
        let context = match &options.child_of {
            Some(parent) => SpanContext {
                trace_id: parent.trace_id,
                span_id,
                sampled: parent.sampled,
            },
            None => SpanContext {
                trace_id: u128::from(self.next_id()),
                span_id,
                sampled: true,
            },
        };

        let tags = Tags::new();
        for (key, value) in options.tags {
            tags.set(key, value);
        }

        Box::new(MockSpan {
            recorder: self.recorder.clone(),
            operation_name: operation_name.to_string(),
            context,
            parent: options.child_of,
            tags,
            logs: Vec::new(),
            start_time: options.start_time,
            finished: false,
        })
    }
}

struct MockSpan {
    recorder: Arc<Recorder>,
    operation_name: String,
    context: SpanContext,
    parent: Option<SpanContext>,
    tags: Tags,
    logs: Vec<Vec<(String, TagValue)>>,
    start_time: SystemTime,
    finished: bool,
}

impl Span for MockSpan {
    fn context(&self) -> SpanContext {
        self.context.clone()
    }

    fn set_tag(&mut self, key: &str, value: TagValue) {
        self.tags.set(key, value);
    }

    fn log_fields(&mut self, fields: &[LogField]) {
        self.logs.push(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        );
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let span = FinishedSpan {
            operation_name: self.operation_name.clone(),
            context: self.context.clone(),
            parent: self.parent.clone(),
            tags: self.tags.values(),
            logs: std::mem::take(&mut self.logs),
            start_time: self.start_time,
            finish_time: SystemTime::now(),
        };
        self.recorder
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(span);
    }
}

fn encode(context: &SpanContext) -> String {
    let flags = u8::from(context.sampled);
    format!("{:x}:{:x}:0:{:x}", context.trace_id, context.span_id, flags)
}

fn decode(raw: &str) -> Result<SpanContext, String> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    let [trace, span, _parent, flags] = parts.as_slice() else {
        return Err(format!("expected 4 fields, found {}", parts.len()));
    };
    let trace_id = u128::from_str_radix(trace, 16).map_err(|e| format!("trace id: {}", e))?;
    let span_id = u64::from_str_radix(span, 16).map_err(|e| format!("span id: {}", e))?;
    let flags = u8::from_str_radix(flags, 16).map_err(|e| format!("flags: {}", e))?;
    if trace_id == 0 || span_id == 0 {
        return Err("zero trace or span id".to_string());
    }
    Ok(SpanContext {
        trace_id,
        span_id,
        sampled: flags & 1 == 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_then_extract() {
        let tracer = MockTracer::new();
        let cx = SpanContext {
            trace_id: 0xdead,
            span_id: 0xbeef,
            sampled: true,
        };
        let mut md = Metadata::new();
        tracer.inject(&cx, &mut md);
        assert_eq!(md.get(DEFAULT_HEADER), Some("dead:beef:0:1"));
        assert_eq!(tracer.extract(&md), Ok(cx));
    }

    #[test]
    fn test_extract_missing_and_malformed() {
        let tracer = MockTracer::with_header("X-Trace");
        assert_eq!(tracer.header_name(), "x-trace");
        assert_eq!(tracer.extract(&Metadata::new()), Err(ExtractError::NotFound));

        for bad in ["nonsense", "zz:1:0:1", "1:2:3", "0:0:0:1"] {
            let md = Metadata::from_pairs([("x-trace", bad)]).unwrap();
            assert!(
                matches!(tracer.extract(&md), Err(ExtractError::Malformed { .. })),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn test_child_span_inherits_trace() {
        let tracer = MockTracer::new();
        let parent = SpanContext {
            trace_id: 500,
            span_id: 600,
            sampled: false,
        };
        let mut span = tracer.start_span(
            "/Echo/Ping",
            StartSpanOptions::default().child_of(Some(parent.clone())),
        );
        let cx = span.context();
        assert_eq!(cx.trace_id, 500);
        assert_ne!(cx.span_id, 600);
        assert!(!cx.sampled);
        span.finish();

        let finished = tracer.finished_spans();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].parent, Some(parent));
    }

    #[test]
    fn test_finish_is_idempotent_and_records_tags() {
        let tracer = MockTracer::new();
        let mut span = tracer.start_span("op", StartSpanOptions::default().tag("a", 1));
        span.set_tag("a", TagValue::from(2));
        span.set_tag("b", TagValue::from("x"));
        span.log_fields(&[("event", TagValue::from("error"))]);
        span.finish();
        span.finish();

        let finished = tracer.finished_spans();
        assert_eq!(finished.len(), 1);
        let span = &finished[0];
        assert_eq!(span.operation_name, "op");
        assert!(span.parent.is_none());
        assert_eq!(span.tag("a"), Some(&TagValue::Int(2)));
        assert_eq!(span.tag("b"), Some(&TagValue::from("x")));
        assert_eq!(span.logs, vec![vec![("event".to_string(), TagValue::from("error"))]]);

        tracer.reset();
        assert!(tracer.finished_spans().is_empty());
    }

    #[test]
    fn test_deterministic_ids() {
        let tracer = MockTracer::new();
        let cx = tracer.start_span("op", StartSpanOptions::default()).context();
        assert_eq!(cx.span_id, FIRST_ID);
        assert_eq!(cx.trace_id, u128::from(FIRST_ID + 1));
    }
}

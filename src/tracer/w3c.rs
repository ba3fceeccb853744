//! Tracer speaking W3C Trace Context, reporting through `tracing`.
//!
//! Parents are read from the `traceparent` header
//! (`{version}-{trace-id}-{parent-id}-{flags}`). Spans are not exported to a
//! collector; each finished span becomes one structured event on the
//! `rpc_interceptors::span` target, which any `tracing` subscriber can ship.

use std::time::SystemTime;

use rand::Rng;

use super::{header_text, ExtractError, LogField, Span, SpanContext, StartSpanOptions, Tracer};
use crate::call::Metadata;
use crate::tags::{TagValue, Tags};

pub const TRACEPARENT: &str = "traceparent";

const SPAN_TARGET: &str = "rpc_interceptors::span";

#[derive(Debug, Clone)]
pub struct W3cTracer {
    header_name: String,
}

impl Default for W3cTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl W3cTracer {
    pub fn new() -> Self {
        Self::with_header(TRACEPARENT)
    }

    pub fn with_header(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into().to_ascii_lowercase(),
        }
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

impl Tracer for W3cTracer {
    fn extract(&self, carrier: &Metadata) -> Result<SpanContext, ExtractError> {
        let raw = header_text(carrier, &self.header_name)?;
        parse_traceparent(raw).map_err(|reason| ExtractError::Malformed {
            header: self.header_name.clone(),
            reason: reason.to_string(),
        })
    }

    fn inject(&self, context: &SpanContext, carrier: &mut Metadata) {
        if let Err(e) = carrier.insert(&self.header_name, &format_traceparent(context)) {
            tracing::debug!(error = %e, "Failed to inject traceparent");
        }
    }

    fn start_span(&self, operation_name: &str, options: StartSpanOptions) -> Box<dyn Span> {
        let mut rng = rand::thread_rng();
        let span_id = loop {
            let id: u64 = rng.gen();
            if id != 0 {
                break id;
            }
        };
        let (trace_id, sampled) = match &options.child_of {
            Some(parent) => (parent.trace_id, parent.sampled),
            None => loop {
                let id: u128 = rng.gen();
                if id != 0 {
                    break (id, true);
                }
            },
        };

        let tags = Tags::new();
        for (key, value) in options.tags {
            tags.set(key, value);
        }

        Box::new(W3cSpan {
            name: operation_name.to_string(),
            context: SpanContext {
                trace_id,
                span_id,
                sampled,
            },
            parent: options.child_of,
            tags,
            start_time: options.start_time,
            finished: false,
        })
    }
}

struct W3cSpan {
    name: String,
    context: SpanContext,
    parent: Option<SpanContext>,
    tags: Tags,
    start_time: SystemTime,
    finished: bool,
}

impl Span for W3cSpan {
    fn context(&self) -> SpanContext {
        self.context.clone()
    }

    fn set_tag(&mut self, key: &str, value: TagValue) {
        self.tags.set(key, value);
    }

    fn log_fields(&mut self, fields: &[LogField]) {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::to_value(v).unwrap_or_default()))
            .collect::<serde_json::Map<_, _>>();
        tracing::info!(
            target: SPAN_TARGET,
            span_name = %self.name,
            trace_id = %self.context.trace_id_hex(),
            span_id = %self.context.span_id_hex(),
            fields = %serde_json::Value::Object(fields),
            "span log"
        );
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let duration = SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default();
        let tags = self.tags.values();
        let error = matches!(tags.get("error"), Some(TagValue::Bool(true)));
        let parent_span_id = self
            .parent
            .as_ref()
            .map(|p| p.span_id_hex())
            .unwrap_or_default();

        tracing::info!(
            target: SPAN_TARGET,
            span_name = %self.name,
            trace_id = %self.context.trace_id_hex(),
            span_id = %self.context.span_id_hex(),
            parent_span_id = %parent_span_id,
            sampled = self.context.sampled,
            duration_ms = duration.as_secs_f64() * 1000.0,
            error,
            tags = %tags.to_json(),
            "span finished"
        );
    }
}

pub fn format_traceparent(context: &SpanContext) -> String {
    format!(
        "00-{}-{}-{:02x}",
        context.trace_id_hex(),
        context.span_id_hex(),
        u8::from(context.sampled)
    )
}

pub fn parse_traceparent(raw: &str) -> Result<SpanContext, &'static str> {
    let parts: Vec<&str> = raw.trim().split('-').collect();
    let [version, trace, span, flags] = parts.as_slice() else {
        return Err("expected 4 dash-separated fields");
    };
    if version.len() != 2 || !is_lower_hex(version) || *version == "ff" {
        return Err("invalid version");
    }
    if trace.len() != 32 || !is_lower_hex(trace) {
        return Err("invalid trace id");
    }
    if span.len() != 16 || !is_lower_hex(span) {
        return Err("invalid parent id");
    }
    if flags.len() != 2 || !is_lower_hex(flags) {
        return Err("invalid trace flags");
    }

    let trace_id = u128::from_str_radix(trace, 16).map_err(|_| "invalid trace id")?;
    let span_id = u64::from_str_radix(span, 16).map_err(|_| "invalid parent id")?;
    let flags = u8::from_str_radix(flags, 16).map_err(|_| "invalid trace flags")?;
    if trace_id == 0 {
        return Err("all-zero trace id");
    }
    if span_id == 0 {
        return Err("all-zero parent id");
    }

    Ok(SpanContext {
        trace_id,
        span_id,
        sampled: flags & 1 == 1,
    })
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

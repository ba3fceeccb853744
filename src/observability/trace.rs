//! Server spans for inbound calls.
//!
//! # Data Flow
//! ```text
//! inbound CallContext
//!     → Tracer::extract (NotFound: root span, Malformed: warn + root span)
//!     → Tracer::start_span("/service/method", component + span.kind tags)
//!     → Tag Bag copied onto the span
//!     → trace ids mirrored into the Tag Bag (when propagated under the header)
//!     → SpanContext stored in the derived CallContext
//!     → TracingReporter::post_call (final tags, error flag, finish)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::call::{CallContext, CallMeta, Metadata};
use crate::interceptor::{Filter, ReportingLayer};
use crate::reporter::{Reporter, ServerReportable};
use crate::status::Status;
use crate::tags::{TagValue, Tags};
use crate::tracer::w3c::{W3cTracer, TRACEPARENT};
use crate::tracer::{ExtractError, Span, StartSpanOptions, Tracer};

pub const COMPONENT: &str = "gRPC";

pub const TAG_TRACE_ID: &str = "trace.traceid";
pub const TAG_SPAN_ID: &str = "trace.spanid";
pub const TAG_SAMPLED: &str = "trace.sampled";

/// Tracing layer settings. Built once at startup.
#[derive(Clone)]
pub struct TracingOptions {
    pub tracer: Arc<dyn Tracer>,
    pub filter: Option<Filter>,
    /// Header the tracer propagates under. Trace ids are mirrored into the
    /// Tag Bag only when the tracer writes this header.
    pub trace_header_name: String,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            tracer: Arc::new(W3cTracer::new()),
            filter: None,
            trace_header_name: TRACEPARENT.to_string(),
        }
    }
}

impl TracingOptions {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            tracer,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_trace_header_name(mut self, name: impl Into<String>) -> Self {
        self.trace_header_name = name.into().to_ascii_lowercase();
        self
    }
}

impl fmt::Debug for TracingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingOptions")
            .field("filtered", &self.filter.is_some())
            .field("trace_header_name", &self.trace_header_name)
            .finish_non_exhaustive()
    }
}

/// Build the tracing layer.
pub fn server_layer(options: TracingOptions) -> ReportingLayer<TracingReportable> {
    let filter = options.filter.clone();
    let layer = ReportingLayer::new(TracingReportable::new(options));
    match filter {
        Some(filter) => layer.with_filter(filter),
        None => layer,
    }
}

/// Start the server span for an inbound call.
///
/// Never fails: a missing or undecodable parent yields a root span.
pub fn new_server_span_from_inbound(
    ctx: CallContext,
    tracer: &dyn Tracer,
    trace_header_name: &str,
    full_method: &str,
) -> (CallContext, Box<dyn Span>) {
    let parent = match tracer.extract(ctx.metadata()) {
        Ok(parent) => Some(parent),
        Err(ExtractError::NotFound) => None,
        Err(e) => {
            tracing::warn!(
                grpc.full_method = %full_method,
                error = %e,
                "Failed to extract parent span context, starting a root span"
            );
            None
        }
    };

    let options = StartSpanOptions::default()
        .child_of(parent)
        .tag("component", COMPONENT)
        .tag("span.kind", "server");
    let mut span = tracer.start_span(full_method, options);

    for (key, value) in ctx.tags().values() {
        span.set_tag(&key, value);
    }

    let span_context = span.context();
    let mut carrier = Metadata::new();
    tracer.inject(&span_context, &mut carrier);
    if carrier.contains_key(trace_header_name) {
        ctx.tags()
            .set(TAG_TRACE_ID, span_context.trace_id_hex())
            .set(TAG_SPAN_ID, span_context.span_id_hex())
            .set(TAG_SAMPLED, span_context.sampled);
    }

    (ctx.with_span_context(span_context), span)
}

/// Propagate the call's span to an outbound call made by a handler.
///
/// Returns `false` when the context carries no span.
pub fn inject_outgoing(tracer: &dyn Tracer, ctx: &CallContext, outbound: &mut Metadata) -> bool {
    match ctx.span_context() {
        Some(span_context) => {
            tracer.inject(span_context, outbound);
            true
        }
        None => false,
    }
}

/// Reportable starting one server span per accepted call.
#[derive(Debug, Clone)]
pub struct TracingReportable {
    options: Arc<TracingOptions>,
}

impl TracingReportable {
    pub fn new(options: TracingOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &TracingOptions {
        &self.options
    }
}

impl ServerReportable for TracingReportable {
    fn server_reporter(&self, call: &CallMeta, ctx: CallContext) -> (Box<dyn Reporter>, CallContext) {
        let (ctx, span) = new_server_span_from_inbound(
            ctx,
            self.options.tracer.as_ref(),
            &self.options.trace_header_name,
            &call.full_method(),
        );
        let reporter = TracingReporter {
            tags: ctx.tags().clone(),
            span,
        };
        (Box::new(reporter), ctx)
    }
}

struct TracingReporter {
    tags: Tags,
    span: Box<dyn Span>,
}

impl Reporter for TracingReporter {
    fn post_call(&mut self, err: Option<&Status>, _elapsed: Duration) {
        for (key, value) in self.tags.values() {
            self.span.set_tag(&key, value);
        }
        if let Some(err) = err {
            self.span.set_tag("error", TagValue::Bool(true));
            self.span.log_fields(&[
                ("event", TagValue::from("error")),
                ("message", TagValue::from(err.to_string())),
            ]);
        }
        self.span.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallInfo;
    use crate::tracer::mock::{MockTracer, DEFAULT_HEADER};
    use crate::tracer::SpanContext;

    fn inbound(pairs: &[(&str, &str)]) -> CallContext {
        CallContext::new(Metadata::from_pairs(pairs.iter().copied()).unwrap())
    }

    #[test]
    fn test_root_span_without_parent() {
        let tracer = MockTracer::new();
        let (ctx, mut span) =
            new_server_span_from_inbound(inbound(&[]), &tracer, DEFAULT_HEADER, "/Echo/Ping");
        assert_eq!(ctx.span_context(), Some(&span.context()));
        span.finish();

        let finished = tracer.finished_spans();
        assert_eq!(finished[0].operation_name, "/Echo/Ping");
        assert!(finished[0].parent.is_none());
        assert_eq!(finished[0].tag("component"), Some(&TagValue::from("gRPC")));
        assert_eq!(finished[0].tag("span.kind"), Some(&TagValue::from("server")));
    }

    #[test]
    fn test_child_of_propagated_parent() {
        let tracer = MockTracer::new();
        let ctx = inbound(&[(DEFAULT_HEADER, "abc:def:0:1")]);
        let (ctx, mut span) =
            new_server_span_from_inbound(ctx, &tracer, DEFAULT_HEADER, "/Echo/Ping");
        span.finish();

        let parent = SpanContext {
            trace_id: 0xabc,
            span_id: 0xdef,
            sampled: true,
        };
        let finished = tracer.finished_spans();
        assert_eq!(finished[0].parent, Some(parent));
        assert_eq!(ctx.span_context().map(|c| c.trace_id), Some(0xabc));
    }

    #[test]
    fn test_malformed_parent_gives_root_span() {
        let tracer = MockTracer::new();
        let ctx = inbound(&[(DEFAULT_HEADER, "not-a-trace")]);
        let (_, mut span) = new_server_span_from_inbound(ctx, &tracer, DEFAULT_HEADER, "/Echo/Ping");
        span.finish();
        assert!(tracer.finished_spans()[0].parent.is_none());
    }

    #[test]
    fn test_trace_ids_mirrored_into_tags() {
        let tracer = MockTracer::new();
        let ctx = inbound(&[]);
        ctx.tags().set("peer.address", "10.0.0.1");
        let (ctx, span) = new_server_span_from_inbound(ctx, &tracer, DEFAULT_HEADER, "/Echo/Ping");

        let cx = span.context();
        let tags = ctx.tags().values();
        assert_eq!(tags.get(TAG_TRACE_ID), Some(&TagValue::from(cx.trace_id_hex())));
        assert_eq!(tags.get(TAG_SPAN_ID), Some(&TagValue::from(cx.span_id_hex())));
        assert_eq!(tags.get(TAG_SAMPLED), Some(&TagValue::Bool(true)));

        // tracer propagating under another header: nothing mirrored
        let (ctx, _) = new_server_span_from_inbound(inbound(&[]), &tracer, "traceparent", "/Echo/Ping");
        assert!(!ctx.tags().has(TAG_TRACE_ID));
    }

    #[test]
    fn test_bag_copied_at_start() {
        let tracer = MockTracer::new();
        let ctx = inbound(&[]);
        ctx.tags().set("peer.address", "10.0.0.1");
        let (_, mut span) = new_server_span_from_inbound(ctx, &tracer, "traceparent", "/Echo/Ping");
        span.finish();
        assert_eq!(
            tracer.finished_spans()[0].tag("peer.address"),
            Some(&TagValue::from("10.0.0.1"))
        );
    }

    #[test]
    fn test_inject_outgoing() {
        let tracer = MockTracer::new();
        let mut outbound = Metadata::new();
        assert!(!inject_outgoing(&tracer, &CallContext::default(), &mut outbound));
        assert!(outbound.is_empty());

        let (ctx, span) = new_server_span_from_inbound(inbound(&[]), &tracer, DEFAULT_HEADER, "/Echo/Ping");
        assert!(inject_outgoing(&tracer, &ctx, &mut outbound));
        assert_eq!(tracer.extract(&outbound), Ok(span.context()));
    }

    #[test]
    fn test_reporter_finishes_with_error() {
        let tracer = MockTracer::new();
        let reportable = TracingReportable::new(
            TracingOptions::new(Arc::new(tracer.clone())).with_trace_header_name(DEFAULT_HEADER),
        );
        let meta = CallMeta::new(&CallInfo::unary("/Echo/Ping"));
        let (mut reporter, ctx) = reportable.server_reporter(&meta, inbound(&[]));
        ctx.tags().set("custom.int", 5);

        reporter.post_call(Some(&Status::not_found("no such echo")), Duration::ZERO);

        let finished = tracer.finished_spans();
        assert_eq!(finished.len(), 1);
        let span = &finished[0];
        assert_eq!(span.tag("error"), Some(&TagValue::Bool(true)));
        assert_eq!(span.tag("custom.int"), Some(&TagValue::Int(5)));
        assert_eq!(span.logs[0][0], ("event".to_string(), TagValue::from("error")));
        assert!(span.logs[0][1].1.to_string().contains("no such echo"));
    }
}

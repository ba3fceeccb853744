//! Call interceptor as a tower layer.
//!
//! # Data Flow
//! ```text
//! UnaryRequest / StreamRequest
//!     → filter.rs (false: inner service called with the untouched request)
//!     → ServerReportable::server_reporter (Reporter + derived CallContext)
//!     → unary.rs: receive(request) → handler → send(response)
//!       stream.rs: ReportingStream reports each recv/send as it completes
//!     → ReporterHandle::run (post_call once: result, panic, or drop)
//! ```
//!
//! # Design Decisions
//! - One layer per backend; stacks are built with `tower::ServiceBuilder`
//!   and every layer evaluates its own filter
//! - Handler errors pass through unchanged
//! - The stream wrapper never buffers

pub mod filter;
mod stream;
mod unary;

use std::fmt;
use std::sync::Arc;

use tower::Layer;

use crate::call::{CallContext, CallInfo, CallMeta};
use crate::reporter::{ReporterHandle, ServerReportable};

pub use filter::Filter;
pub use stream::ReportingStream;

/// Layer installing one [`ServerReportable`] around a handler service.
pub struct ReportingLayer<R> {
    reportable: Arc<R>,
    filter: Option<Filter>,
}

impl<R: ServerReportable> ReportingLayer<R> {
    pub fn new(reportable: R) -> Self {
        Self::from_arc(Arc::new(reportable))
    }

    pub fn from_arc(reportable: Arc<R>) -> Self {
        Self {
            reportable,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn reportable(&self) -> &Arc<R> {
        &self.reportable
    }
}

impl<R> Clone for ReportingLayer<R> {
    fn clone(&self) -> Self {
        Self {
            reportable: self.reportable.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<R> fmt::Debug for ReportingLayer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingLayer")
            .field("reportable", &std::any::type_name::<R>())
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl<S, R> Layer<S> for ReportingLayer<R> {
    type Service = Reporting<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        Reporting {
            inner,
            reportable: self.reportable.clone(),
            filter: self.filter.clone(),
        }
    }
}

/// Service produced by [`ReportingLayer`].
pub struct Reporting<S, R> {
    inner: S,
    reportable: Arc<R>,
    filter: Option<Filter>,
}

impl<S, R: ServerReportable> Reporting<S, R> {
    fn accepts(&self, ctx: &CallContext, full_method: &str) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter(ctx, full_method))
    }

    fn begin(&self, info: &CallInfo, ctx: CallContext) -> (ReporterHandle, CallContext) {
        let meta = CallMeta::new(info);
        let (reporter, ctx) = self.reportable.server_reporter(&meta, ctx);
        let handle = ReporterHandle::new(reporter, meta.started(), &info.full_method);
        (handle, ctx)
    }
}

impl<S: Clone, R> Clone for Reporting<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            reportable: self.reportable.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<S: fmt::Debug, R> fmt::Debug for Reporting<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporting")
            .field("inner", &self.inner)
            .field("reportable", &std::any::type_name::<R>())
            .finish()
    }
}

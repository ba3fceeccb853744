//! Per-call context.
//!
//! Every layer receives the context by value and passes a derived one to the
//! next layer. Typed extensions carry layer-specific state (the active span
//! context, the request-scoped logger) the same way HTTP request extensions
//! carry middleware state.

use http::Extensions;

use super::metadata::Metadata;
use crate::tags::Tags;
use crate::tracer::SpanContext;

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    metadata: Metadata,
    extensions: Extensions,
    tags: Tags,
}

impl CallContext {
    /// Context for a new inbound call. Creates the call's tag bag.
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            extensions: Extensions::new(),
            tags: Tags::new(),
        }
    }

    /// Inbound wire metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Span context of the server span started for this call, if tracing is installed.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.extensions.get::<SpanContext>()
    }

    /// Derive a context carrying `span`.
    pub fn with_span_context(mut self, span: SpanContext) -> Self {
        self.extensions.insert(span);
        self
    }

    /// Derive a context carrying an extension value, replacing one of the same type.
    pub fn with_extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }
}

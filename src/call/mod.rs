//! Call model shared by every interceptor.
//!
//! # Data Flow
//! ```text
//! transport accepts a call
//!     → metadata.rs (inbound headers as a Metadata carrier)
//!     → context.rs (CallContext: metadata + extensions + tags)
//!     → CallInfo (full method + call kind) handed to the interceptor
//!     → CallMeta (immutable descriptor) built once the call is accepted
//!     → stream.rs (ServerStream for the streaming kinds)
//! ```
//!
//! # Design Decisions
//! - The context is passed explicitly down the chain, never looked up globally
//! - Descriptors are created at interception time and never mutated

pub mod context;
pub mod metadata;
pub mod stream;

use std::fmt;
use std::time::{Instant, SystemTime};

pub use context::CallContext;
pub use metadata::{Metadata, MetadataError};
pub use stream::{BoxServerStream, MemoryStream, ServerStream, StreamRequest, UnaryRequest};

/// Shape of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Unary,
    ClientStream,
    ServerStream,
    BidiStream,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Unary => "unary",
            CallKind::ClientStream => "client_stream",
            CallKind::ServerStream => "server_stream",
            CallKind::BidiStream => "bidi_stream",
        }
    }

    pub fn is_streaming(&self) -> bool {
        !matches!(self, CallKind::Unary)
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the framework tells the interceptor about the call being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub full_method: String,
    pub kind: CallKind,
}

impl CallInfo {
    pub fn unary(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
            kind: CallKind::Unary,
        }
    }

    pub fn streaming(
        full_method: impl Into<String>,
        is_client_stream: bool,
        is_server_stream: bool,
    ) -> Self {
        let kind = match (is_client_stream, is_server_stream) {
            (true, false) => CallKind::ClientStream,
            (false, true) => CallKind::ServerStream,
            _ => CallKind::BidiStream,
        };
        Self {
            full_method: full_method.into(),
            kind,
        }
    }
}

/// Immutable per-call descriptor.
#[derive(Debug, Clone)]
pub struct CallMeta {
    kind: CallKind,
    service: String,
    method: String,
    started: Instant,
    start_time: SystemTime,
}

impl CallMeta {
    pub fn new(info: &CallInfo) -> Self {
        let (service, method) = split_method_name(&info.full_method);
        Self {
            kind: info.kind,
            service: service.to_string(),
            method: method.to_string(),
            started: Instant::now(),
            start_time: SystemTime::now(),
        }
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// `/service/method`
    pub fn full_method(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }
}

/// Split `/pkg.Service/Method` into service and method.
///
/// Names without a separator yield `("unknown", "unknown")`.
pub fn split_method_name(full_method: &str) -> (&str, &str) {
    let trimmed = full_method.strip_prefix('/').unwrap_or(full_method);
    match trimmed.split_once('/') {
        Some((service, method)) => (service, method),
        None => ("unknown", "unknown"),
    }
}

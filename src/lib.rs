//! RPC server instrumentation layers.
//!
//! Attaches trace spans, structured call logs and call metrics to every
//! inbound call without touching the handlers.
//!
//! # Architecture Overview
//!
//! ```text
//!   UnaryRequest / StreamRequest
//!          │
//!          ▼
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ ReportingLayer<TracingReportable>   (filter → span)      │
//!   │   ┌──────────────────────────────────────────────────┐   │
//!   │   │ ReportingLayer<LoggingReportable> (call logger)  │   │
//!   │   │   ┌──────────────────────────────────────────┐   │   │
//!   │   │   │ ReportingLayer<MetricsReportable>        │   │   │
//!   │   │   │   ┌──────────────────────────────────┐   │   │   │
//!   │   │   │   │ handler (tower::Service)         │   │   │   │
//!   │   │   │   │   ctx.tags().set(..)             │   │   │   │
//!   │   │   │   └──────────────────────────────────┘   │   │   │
//!   │   │   └──────────────────────────────────────────┘   │   │
//!   │   └──────────────────────────────────────────────────┘   │
//!   └──────────────────────────────────────────────────────────┘
//!          │ per message: post_msg_receive / post_msg_send
//!          ▼ once:        post_call
//!   Span::finish / completion log record / grpc_server_handled_total
//! ```

// Call model
pub mod call;
pub mod status;
pub mod tags;

// Interception
pub mod interceptor;
pub mod reporter;

// Backends
pub mod observability;
pub mod tracer;

pub mod config;

pub use call::{CallContext, CallInfo, CallKind, CallMeta, Metadata, StreamRequest, UnaryRequest};
pub use config::InterceptorConfig;
pub use interceptor::{Reporting, ReportingLayer};
pub use reporter::{Reporter, ServerReportable};
pub use status::{Code, Status};
pub use tags::{TagValue, Tags};

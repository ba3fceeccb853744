//! Observability backends, one reportable each.
//!
//! # Data Flow
//! ```text
//! ReportingLayer<R> (one per backend, stacked with ServiceBuilder)
//!     → trace.rs (server span per call, parent from inbound metadata)
//!     → logging.rs (request-scoped logger + completion record)
//!     → metrics.rs (grpc_server_* counters and latency histogram)
//! ```
//!
//! # Design Decisions
//! - Backends never share state; each layer is enabled and filtered on its own
//! - Each module exposes `server_layer(options)` and its reportable type
//! - Backend failures are logged and swallowed, never returned to the caller

pub mod logging;
pub mod metrics;
pub mod trace;

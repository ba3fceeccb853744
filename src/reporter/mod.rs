//! Reporter lifecycle contract.
//!
//! # Data Flow
//! ```text
//! interceptor accepts a call
//!     → ServerReportable::server_reporter (one Reporter + derived context)
//!     → handle.rs wraps the Reporter (created)
//!     → post_msg_receive / post_msg_send per message, in stream order
//!     → post_call exactly once (completed, terminal)
//! ```
//!
//! # Design Decisions
//! - One trait per backend concern; backends compose as separate layers
//! - Callbacks return nothing: instrumentation cannot fail a call
//! - Message events default to no-ops

pub mod handle;

use std::any::Any;
use std::time::Duration;

use crate::call::{CallContext, CallMeta};
use crate::status::Status;

pub use handle::ReporterHandle;

/// Per-call observer. Bound to exactly one in-flight call.
pub trait Reporter: Send {
    /// An outbound message was sent (or failed to send).
    fn post_msg_send(&mut self, msg: Option<&dyn Any>, err: Option<&Status>, elapsed: Duration) {
        let _ = (msg, err, elapsed);
    }

    /// An inbound message was received (or receiving failed).
    fn post_msg_receive(&mut self, msg: Option<&dyn Any>, err: Option<&Status>, elapsed: Duration) {
        let _ = (msg, err, elapsed);
    }

    /// The call finished. `err` is the status returned to the caller.
    fn post_call(&mut self, err: Option<&Status>, elapsed: Duration);
}

/// Factory building a [`Reporter`] for every accepted call.
pub trait ServerReportable: Send + Sync + 'static {
    /// Build the reporter and the context the rest of the call runs in.
    fn server_reporter(&self, call: &CallMeta, ctx: CallContext) -> (Box<dyn Reporter>, CallContext);
}

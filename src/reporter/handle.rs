//! Shared, once-only access to a call's reporter.
//!
//! The interceptor and any stream wrappers of one call hold clones of the same
//! [`ReporterHandle`]. Completion takes the reporter out of the handle, so a
//! reporter sees `post_call` once and nothing after it.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures_util::FutureExt;

use super::Reporter;
use crate::status::Status;

pub const DROPPED_MESSAGE: &str = "call dropped before completion";

#[derive(Clone)]
pub struct ReporterHandle {
    slot: Arc<Mutex<Option<Box<dyn Reporter>>>>,
    started: Instant,
    full_method: Arc<str>,
}

impl ReporterHandle {
    pub fn new(reporter: Box<dyn Reporter>, started: Instant, full_method: &str) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(reporter))),
            started,
            full_method: Arc::from(full_method),
        }
    }

    pub fn post_msg_send(&self, msg: Option<&dyn Any>, err: Option<&Status>) {
        let elapsed = self.started.elapsed();
        self.with_live("post_msg_send", |r| r.post_msg_send(msg, err, elapsed));
    }

    pub fn post_msg_receive(&self, msg: Option<&dyn Any>, err: Option<&Status>) {
        let elapsed = self.started.elapsed();
        self.with_live("post_msg_receive", |r| r.post_msg_receive(msg, err, elapsed));
    }

    /// Run `post_call` if the call has not completed yet.
    ///
    /// Returns `false` when an earlier completion already happened.
    pub fn complete(&self, err: Option<&Status>) -> bool {
        let reporter = self.lock().take();
        let Some(mut reporter) = reporter else {
            return false;
        };
        let elapsed = self.started.elapsed();
        self.guarded("post_call", || reporter.post_call(err, elapsed));
        true
    }

    pub fn is_completed(&self) -> bool {
        self.lock().is_none()
    }

    /// Drive `call` and complete the reporter with its outcome.
    ///
    /// A panic is reported as `Internal` and then resumed. If the returned
    /// future is dropped early, polled or not, the call is reported as
    /// `Canceled`.
    pub fn run<T, F>(self, call: F) -> impl Future<Output = Result<T, Status>>
    where
        F: Future<Output = Result<T, Status>>,
    {
        let guard = CompletionGuard(self);
        async move {
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(result) => {
                    guard.0.complete(result.as_ref().err());
                    result
                }
                Err(payload) => {
                    let status = Status::from_panic(&*payload);
                    guard.0.complete(Some(&status));
                    panic::resume_unwind(payload)
                }
            }
        }
    }

    fn with_live(&self, callback: &'static str, f: impl FnOnce(&mut dyn Reporter)) {
        let mut slot = self.lock();
        if let Some(reporter) = slot.as_mut() {
            self.guarded(callback, || f(reporter.as_mut()));
        }
    }

    fn guarded(&self, callback: &'static str, f: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            let status = Status::from_panic(&*payload);
            tracing::warn!(
                grpc.full_method = %self.full_method,
                callback,
                error = %status.message(),
                "Reporter callback panicked, call result unaffected"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Reporter>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ReporterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterHandle")
            .field("full_method", &self.full_method)
            .field("completed", &self.is_completed())
            .finish()
    }
}

struct CompletionGuard(ReporterHandle);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.0.is_completed() {
            return;
        }
        let status = Status::cancelled(DROPPED_MESSAGE);
        if self.0.complete(Some(&status)) {
            tracing::debug!(grpc.full_method = %self.0.full_method, "{}", DROPPED_MESSAGE);
        }
    }
}

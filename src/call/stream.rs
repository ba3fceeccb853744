//! Request types handed to handler services, and the server stream abstraction.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;

use super::context::CallContext;
use super::CallInfo;
use crate::status::Status;

/// Server side of a streaming call.
///
/// `recv_msg` yields `Ok(None)` once the client has finished sending.
pub trait ServerStream<In, Out>: Send {
    fn recv_msg(&mut self) -> BoxFuture<'_, Result<Option<In>, Status>>;

    fn send_msg<'a>(&'a mut self, msg: &'a Out) -> BoxFuture<'a, Result<(), Status>>;
}

pub type BoxServerStream<In, Out> = Box<dyn ServerStream<In, Out>>;

/// A unary call as seen by a handler service.
pub struct UnaryRequest<M> {
    pub ctx: CallContext,
    pub info: CallInfo,
    pub message: M,
}

impl<M> UnaryRequest<M> {
    pub fn new(ctx: CallContext, info: CallInfo, message: M) -> Self {
        Self { ctx, info, message }
    }
}

impl<M: fmt::Debug> fmt::Debug for UnaryRequest<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryRequest")
            .field("info", &self.info)
            .field("message", &self.message)
            .finish()
    }
}

/// A streaming call as seen by a handler service.
pub struct StreamRequest<In, Out> {
    pub ctx: CallContext,
    pub info: CallInfo,
    pub stream: BoxServerStream<In, Out>,
}

impl<In, Out> StreamRequest<In, Out> {
    pub fn new(ctx: CallContext, info: CallInfo, stream: BoxServerStream<In, Out>) -> Self {
        Self { ctx, info, stream }
    }
}

impl<In, Out> fmt::Debug for StreamRequest<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRequest")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// In-process stream with scripted inbound messages.
///
/// Outbound messages are captured and can be read back through the
/// [`MemoryStream::sent`] handle after the stream has been moved into a call.
pub struct MemoryStream<In, Out> {
    inbound: VecDeque<Result<In, Status>>,
    sent: Arc<Mutex<Vec<Out>>>,
    fail_sends: Option<Status>,
}

impl<In, Out> MemoryStream<In, Out>
where
    In: Send + 'static,
    Out: Clone + Send + Sync + 'static,
{
    pub fn new(inbound: impl IntoIterator<Item = In>) -> Self {
        Self {
            inbound: inbound.into_iter().map(Ok).collect(),
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_sends: None,
        }
    }

    /// Queue a receive failure after the already queued messages.
    pub fn with_recv_error(mut self, status: Status) -> Self {
        self.inbound.push_back(Err(status));
        self
    }

    /// Make every send fail with `status`.
    pub fn with_send_error(mut self, status: Status) -> Self {
        self.fail_sends = Some(status);
        self
    }

    /// Handle to the captured outbound messages.
    pub fn sent(&self) -> SentMessages<Out> {
        SentMessages(self.sent.clone())
    }

    pub fn boxed(self) -> BoxServerStream<In, Out> {
        Box::new(self)
    }
}

impl<In, Out> ServerStream<In, Out> for MemoryStream<In, Out>
where
    In: Send + 'static,
    Out: Clone + Send + Sync + 'static,
{
    fn recv_msg(&mut self) -> BoxFuture<'_, Result<Option<In>, Status>> {
        let next = self.inbound.pop_front();
        Box::pin(async move { next.transpose() })
    }

    fn send_msg<'a>(&'a mut self, msg: &'a Out) -> BoxFuture<'a, Result<(), Status>> {
        Box::pin(async move {
            if let Some(status) = &self.fail_sends {
                return Err(status.clone());
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(msg.clone());
            Ok(())
        })
    }
}

/// Shared view of the messages a [`MemoryStream`] has sent.
#[derive(Clone)]
pub struct SentMessages<Out>(Arc<Mutex<Vec<Out>>>);

impl<Out: Clone> SentMessages<Out> {
    pub fn snapshot(&self) -> Vec<Out> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;

    #[tokio::test]
    async fn test_memory_stream_round() {
        let mut stream = MemoryStream::<u32, String>::new([1, 2]);
        let sent = stream.sent();

        assert_eq!(stream.recv_msg().await.unwrap(), Some(1));
        assert_eq!(stream.recv_msg().await.unwrap(), Some(2));
        assert_eq!(stream.recv_msg().await.unwrap(), None);

        stream.send_msg(&"a".to_string()).await.unwrap();
        stream.send_msg(&"b".to_string()).await.unwrap();
        assert_eq!(sent.snapshot(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_stream_failures() {
        let mut stream = MemoryStream::<u32, u32>::new([1])
            .with_recv_error(Status::unavailable("connection reset"))
            .with_send_error(Status::internal("write failed"));

        assert_eq!(stream.recv_msg().await.unwrap(), Some(1));
        let err = stream.recv_msg().await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);

        let err = stream.send_msg(&5).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(stream.sent().is_empty());
    }
}

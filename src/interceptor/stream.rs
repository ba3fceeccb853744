use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tower::Service;
use tracing::Instrument;

use super::Reporting;
use crate::call::{BoxServerStream, ServerStream, StreamRequest};
use crate::reporter::{ReporterHandle, ServerReportable};
use crate::status::Status;

/// Server stream that reports every message operation after it returns.
///
/// A clean end of the inbound stream (`Ok(None)`) is not a message and is not
/// reported.
pub struct ReportingStream<In, Out> {
    inner: BoxServerStream<In, Out>,
    handle: ReporterHandle,
}

impl<In, Out> ReportingStream<In, Out> {
    pub fn new(inner: BoxServerStream<In, Out>, handle: ReporterHandle) -> Self {
        Self { inner, handle }
    }
}

impl<In, Out> ServerStream<In, Out> for ReportingStream<In, Out>
where
    In: Send + 'static,
    Out: Send + Sync + 'static,
{
    fn recv_msg(&mut self) -> BoxFuture<'_, Result<Option<In>, Status>> {
        Box::pin(async move {
            let received = self.inner.recv_msg().await;
            match &received {
                Ok(Some(msg)) => self.handle.post_msg_receive(Some(msg), None),
                Ok(None) => {}
                Err(status) => self.handle.post_msg_receive(None, Some(status)),
            }
            received
        })
    }

    fn send_msg<'a>(&'a mut self, msg: &'a Out) -> BoxFuture<'a, Result<(), Status>> {
        Box::pin(async move {
            let sent = self.inner.send_msg(msg).await;
            self.handle.post_msg_send(Some(msg), sent.as_ref().err());
            sent
        })
    }
}

impl<S, R, In, Out> Service<StreamRequest<In, Out>> for Reporting<S, R>
where
    S: Service<StreamRequest<In, Out>, Error = Status> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    In: Send + 'static,
    Out: Send + Sync + 'static,
    R: ServerReportable,
{
    type Response = S::Response;
    type Error = Status;
    type Future = BoxFuture<'static, Result<S::Response, Status>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Service::<StreamRequest<In, Out>>::poll_ready(&mut self.inner, cx)
    }

    fn call(&mut self, request: StreamRequest<In, Out>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !self.accepts(&request.ctx, &request.info.full_method) {
            return Box::pin(inner.call(request));
        }

        let StreamRequest { ctx, info, stream } = request;
        let (handle, ctx) = self.begin(&info, ctx);
        let stream: BoxServerStream<In, Out> =
            Box::new(ReportingStream::new(stream, handle.clone()));

        let span = tracing::debug_span!(
            "rpc_call",
            grpc.full_method = %info.full_method,
            grpc.kind = %info.kind
        );
        let call = async move { inner.call(StreamRequest::new(ctx, info, stream)).await };
        Box::pin(handle.run(call).instrument(span))
    }
}

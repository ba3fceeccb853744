use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tower::Service;
use tracing::Instrument;

use super::Reporting;
use crate::call::UnaryRequest;
use crate::reporter::ServerReportable;
use crate::status::Status;

impl<S, R, M> Service<UnaryRequest<M>> for Reporting<S, R>
where
    S: Service<UnaryRequest<M>, Error = Status> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    M: Send + 'static,
    R: ServerReportable,
{
    type Response = S::Response;
    type Error = Status;
    type Future = BoxFuture<'static, Result<S::Response, Status>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Service::<UnaryRequest<M>>::poll_ready(&mut self.inner, cx)
    }

    fn call(&mut self, request: UnaryRequest<M>) -> Self::Future {
        // the clone may not be ready; keep the one poll_ready was called on
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !self.accepts(&request.ctx, &request.info.full_method) {
            return Box::pin(inner.call(request));
        }

        let UnaryRequest { ctx, info, message } = request;
        let (handle, ctx) = self.begin(&info, ctx);
        handle.post_msg_receive(Some(&message), None);

        let span = tracing::debug_span!("rpc_call", grpc.full_method = %info.full_method);
        let reporter = handle.clone();
        let call = async move {
            let response = inner.call(UnaryRequest::new(ctx, info, message)).await?;
            reporter.post_msg_send(Some(&response), None);
            Ok(response)
        };
        Box::pin(handle.run(call).instrument(span))
    }
}

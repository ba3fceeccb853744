//! Call metrics through the full layer stack, rendered by a local Prometheus recorder.

use metrics_exporter_prometheus::PrometheusBuilder;
use rpc_interceptors::call::{CallContext, CallInfo, MemoryStream, StreamRequest, UnaryRequest};
use rpc_interceptors::interceptor::filter;
use rpc_interceptors::observability::metrics::{self, MetricsOptions};
use tower::{ServiceBuilder, ServiceExt};

mod common;
use common::{block_on, chat, echo};

fn sample(rendered: &str, name: &str, labels: &[&str]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| line.starts_with(&format!("{}{{", name)))
        .find(|line| labels.iter().all(|l| line.contains(l)))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|v| v.parse().ok())
}

#[test]
fn test_unary_and_stream_series() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    ::metrics::with_local_recorder(&recorder, || {
        block_on(async {
            let options = MetricsOptions::default()
                .with_handling_time_histogram(true)
                .with_filter(filter::exclude_methods(["/grpc.health.v1.Health/Check"]));

            let unary = ServiceBuilder::new()
                .layer(metrics::server_layer(options.clone()))
                .service_fn(echo);
            for message in ["a", "b", "fail"] {
                let request = UnaryRequest::new(
                    CallContext::default(),
                    CallInfo::unary("/Echo/Ping"),
                    message.to_string(),
                );
                let _ = unary.clone().oneshot(request).await;
            }
            let health = UnaryRequest::new(
                CallContext::default(),
                CallInfo::unary("/grpc.health.v1.Health/Check"),
                String::new(),
            );
            unary.oneshot(health).await.unwrap();

            let streaming = ServiceBuilder::new()
                .layer(metrics::server_layer(options))
                .service_fn(chat);
            let stream = MemoryStream::new(["x", "y", "z"].map(String::from));
            let request = StreamRequest::new(
                CallContext::default(),
                CallInfo::streaming("/Echo/Chat", true, true),
                stream.boxed(),
            );
            streaming.oneshot(request).await.unwrap();
        })
    });

    let rendered = handle.render();
    let ping = r#"grpc_method="Ping""#;
    let chat = r#"grpc_method="Chat""#;

    assert_eq!(sample(&rendered, metrics::STARTED_TOTAL, &[ping, r#"grpc_type="unary""#]), Some(3.0));
    assert_eq!(sample(&rendered, metrics::MSG_RECEIVED_TOTAL, &[ping]), Some(3.0));
    assert_eq!(sample(&rendered, metrics::MSG_SENT_TOTAL, &[ping]), Some(2.0));
    assert_eq!(
        sample(&rendered, metrics::HANDLED_TOTAL, &[ping, r#"grpc_code="OK""#]),
        Some(2.0)
    );
    assert_eq!(
        sample(&rendered, metrics::HANDLED_TOTAL, &[ping, r#"grpc_code="InvalidArgument""#]),
        Some(1.0)
    );

    assert_eq!(sample(&rendered, metrics::STARTED_TOTAL, &[chat, r#"grpc_type="bidi_stream""#]), Some(1.0));
    assert_eq!(sample(&rendered, metrics::MSG_RECEIVED_TOTAL, &[chat]), Some(3.0));
    assert_eq!(sample(&rendered, metrics::MSG_SENT_TOTAL, &[chat]), Some(3.0));

    assert!(!rendered.contains("Health"));
    assert!(rendered.contains(metrics::HANDLING_SECONDS));
}

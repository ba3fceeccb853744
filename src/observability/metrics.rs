//! Server call metrics.
//!
//! # Metrics
//! - `grpc_server_started_total` (counter): calls accepted
//! - `grpc_server_msg_received_total` (counter): inbound messages received
//! - `grpc_server_msg_sent_total` (counter): outbound messages sent
//! - `grpc_server_handled_total` (counter): completed calls, by `grpc_code`
//! - `grpc_server_handling_seconds` (histogram, optional): call latency
//!
//! Every series carries `grpc_type`, `grpc_service` and `grpc_method`.
//! Failed message operations are not counted.

use std::any::Any;
use std::net::SocketAddr;
use std::time::Duration;

use metrics::Label;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::call::{CallContext, CallMeta};
use crate::interceptor::{Filter, ReportingLayer};
use crate::reporter::{Reporter, ServerReportable};
use crate::status::{Code, Status};

pub const STARTED_TOTAL: &str = "grpc_server_started_total";
pub const MSG_RECEIVED_TOTAL: &str = "grpc_server_msg_received_total";
pub const MSG_SENT_TOTAL: &str = "grpc_server_msg_sent_total";
pub const HANDLED_TOTAL: &str = "grpc_server_handled_total";
pub const HANDLING_SECONDS: &str = "grpc_server_handling_seconds";

const HANDLING_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Clone, Default)]
pub struct MetricsOptions {
    pub filter: Option<Filter>,
    pub handling_time_histogram: bool,
}

impl MetricsOptions {
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_handling_time_histogram(mut self, enabled: bool) -> Self {
        self.handling_time_histogram = enabled;
        self
    }
}

/// Install the Prometheus recorder with a scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(HANDLING_SECONDS.to_string()), HANDLING_BUCKETS)?
        .install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(STARTED_TOTAL, "Total number of RPCs started on the server.");
    metrics::describe_counter!(
        MSG_RECEIVED_TOTAL,
        "Total number of RPC stream messages received on the server."
    );
    metrics::describe_counter!(
        MSG_SENT_TOTAL,
        "Total number of RPC stream messages sent by the server."
    );
    metrics::describe_counter!(
        HANDLED_TOTAL,
        "Total number of RPCs completed on the server, regardless of success or failure."
    );
    metrics::describe_histogram!(
        HANDLING_SECONDS,
        metrics::Unit::Seconds,
        "Histogram of response latency of RPCs handled by the server."
    );
}

/// Build the metrics layer.
pub fn server_layer(options: MetricsOptions) -> ReportingLayer<MetricsReportable> {
    let filter = options.filter.clone();
    let layer = ReportingLayer::new(MetricsReportable::new(options));
    match filter {
        Some(filter) => layer.with_filter(filter),
        None => layer,
    }
}

#[derive(Clone, Default)]
pub struct MetricsReportable {
    handling_time_histogram: bool,
}

impl MetricsReportable {
    pub fn new(options: MetricsOptions) -> Self {
        Self {
            handling_time_histogram: options.handling_time_histogram,
        }
    }
}

impl ServerReportable for MetricsReportable {
    fn server_reporter(&self, call: &CallMeta, ctx: CallContext) -> (Box<dyn Reporter>, CallContext) {
        let labels = vec![
            Label::new("grpc_type", call.kind().as_str()),
            Label::new("grpc_service", call.service().to_string()),
            Label::new("grpc_method", call.method().to_string()),
        ];
        metrics::counter!(STARTED_TOTAL, labels.clone()).increment(1);
        let reporter = MetricsReporter {
            labels,
            handling_time_histogram: self.handling_time_histogram,
        };
        (Box::new(reporter), ctx)
    }
}

struct MetricsReporter {
    labels: Vec<Label>,
    handling_time_histogram: bool,
}

impl Reporter for MetricsReporter {
    fn post_msg_send(&mut self, _msg: Option<&dyn Any>, err: Option<&Status>, _elapsed: Duration) {
        if err.is_none() {
            metrics::counter!(MSG_SENT_TOTAL, self.labels.clone()).increment(1);
        }
    }

    fn post_msg_receive(&mut self, _msg: Option<&dyn Any>, err: Option<&Status>, _elapsed: Duration) {
        if err.is_none() {
            metrics::counter!(MSG_RECEIVED_TOTAL, self.labels.clone()).increment(1);
        }
    }

    fn post_call(&mut self, err: Option<&Status>, elapsed: Duration) {
        let code = err.map_or(Code::Ok, Status::code);
        let mut labels = self.labels.clone();
        labels.push(Label::new("grpc_code", code.as_str()));
        metrics::counter!(HANDLED_TOTAL, labels).increment(1);

        if self.handling_time_histogram {
            metrics::histogram!(HANDLING_SECONDS, self.labels.clone()).record(elapsed.as_secs_f64());
        }
    }
}

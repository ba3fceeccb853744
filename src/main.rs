//! echo-demo
//!
//! Runs an in-process echo service behind the tracing, logging and metrics
//! layers and drives a few calls through it.
//!
//! ```text
//! echo-demo [--config interceptors.toml] [--calls N] [--fail]
//!
//!   /Echo/Ping                    unary, N calls (the last fails with --fail)
//!   /Echo/Chat                    bidi stream, echoes upper-cased messages
//!   /grpc.health.v1.Health/Check  excluded by the default filter
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tower::{ServiceBuilder, ServiceExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rpc_interceptors::call::MemoryStream;
use rpc_interceptors::config::{load_config, LogFormat, LoggingConfig};
use rpc_interceptors::observability::{logging, metrics, trace};
use rpc_interceptors::tracer::w3c::TRACEPARENT;
use rpc_interceptors::{
    CallContext, CallInfo, InterceptorConfig, Metadata, Status, StreamRequest, UnaryRequest,
};

const SAMPLE_PARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

#[derive(Parser, Debug)]
#[command(name = "echo-demo", about = "Drive echo calls through the instrumentation layers")]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of unary calls to make.
    #[arg(short = 'n', long, default_value_t = 3)]
    calls: usize,

    /// Make the last unary call fail.
    #[arg(long)]
    fail: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => InterceptorConfig::default(),
    };
    init_logging(&config.logging);

    tracing::info!(
        tracing_enabled = config.tracing.enabled,
        logging_enabled = config.logging.enabled,
        metrics_enabled = config.metrics.enabled,
        excluded_methods = ?config.filter.exclude_methods,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        let addr: SocketAddr = config.metrics.listen_address.parse()?;
        metrics::install_prometheus(addr)?;
    }

    let tracing_layer = config.tracing_options().map(trace::server_layer);
    let logging_layer = config.logging_options().map(logging::server_layer);
    let metrics_layer = config.metrics_options().map(metrics::server_layer);

    let unary = ServiceBuilder::new()
        .option_layer(tracing_layer.clone())
        .option_layer(logging_layer.clone())
        .option_layer(metrics_layer.clone())
        .service_fn(ping);
    let streaming = ServiceBuilder::new()
        .option_layer(tracing_layer)
        .option_layer(logging_layer)
        .option_layer(metrics_layer)
        .service_fn(chat);

    for i in 0..args.calls {
        let metadata = if i == 0 {
            Metadata::from_pairs([(TRACEPARENT, SAMPLE_PARENT)])?
        } else {
            Metadata::new()
        };
        let message = if args.fail && i + 1 == args.calls {
            "fail".to_string()
        } else {
            format!("ping {}", i)
        };
        let request = UnaryRequest::new(
            CallContext::new(metadata),
            CallInfo::unary("/Echo/Ping"),
            message,
        );
        match unary.clone().oneshot(request).await {
            Ok(reply) => tracing::info!(reply = %reply, "Ping answered"),
            Err(status) => tracing::warn!(error = %status, "Ping failed"),
        }
    }

    let stream = MemoryStream::new(["hello".to_string(), "world".to_string()]);
    let sent = stream.sent();
    let request = StreamRequest::new(
        CallContext::default(),
        CallInfo::streaming("/Echo/Chat", true, true),
        stream.boxed(),
    );
    streaming.oneshot(request).await?;
    tracing::info!(replies = ?sent.snapshot(), "Chat finished");

    let health = UnaryRequest::new(
        CallContext::default(),
        CallInfo::unary("/grpc.health.v1.Health/Check"),
        String::new(),
    );
    unary.oneshot(health).await?;

    if config.metrics.enabled {
        // leave the scrape endpoint up briefly
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    tracing::info!("Demo complete");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn ping(request: UnaryRequest<String>) -> Result<String, Status> {
    let UnaryRequest { ctx, message, .. } = request;
    ctx.tags()
        .set("echo.length", message.len())
        .set("peer.service", "echo-demo");

    logging::extract(&ctx)
        .with("echo.message", message.as_str())
        .info("Handling ping");

    if message == "fail" {
        return Err(Status::invalid_argument(format!(
            "refusing to echo {:?}",
            message
        )));
    }
    Ok(format!("pong: {}", message))
}

async fn chat(request: StreamRequest<String, String>) -> Result<(), Status> {
    let StreamRequest { ctx, mut stream, .. } = request;
    let mut count: u64 = 0;
    while let Some(message) = stream.recv_msg().await? {
        count += 1;
        stream.send_msg(&message.to_uppercase()).await?;
    }
    ctx.tags().set("chat.messages", count);
    Ok(())
}

//! Configuration schema definitions.
//!
//! Every section is optional in the file; missing fields take the defaults
//! below.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::interceptor::filter::{self, Filter};
use crate::observability::logging::{
    duration_to_duration_field, duration_to_time_millis_field, LoggingOptions,
};
use crate::observability::metrics::MetricsOptions;
use crate::observability::trace::TracingOptions;
use crate::tracer::mock::MockTracer;
use crate::tracer::w3c::W3cTracer;
use crate::tracer::Tracer;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InterceptorConfig {
    pub tracing: TracingConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    /// Methods every layer leaves alone.
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TracerBackend {
    #[default]
    W3c,
    Mock,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub backend: TracerBackend,

    /// Propagation header. Defaults to the backend's own header
    /// (`traceparent` or `uber-trace-id`).
    pub header_name: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: TracerBackend::W3c,
            header_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DurationFieldFormat {
    /// `grpc.time_ms` as float milliseconds.
    #[default]
    TimeMs,
    /// `grpc.duration` as a human readable string.
    Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Install the call logging layer.
    pub enabled: bool,

    /// Process log filter (`EnvFilter` directive). `RUST_LOG` wins.
    pub level: String,

    pub format: LogFormat,
    pub duration_field: DurationFieldFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Pretty,
            duration_field: DurationFieldFormat::TimeMs,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Prometheus scrape endpoint bind address.
    pub listen_address: String,

    pub handling_time_histogram: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "127.0.0.1:9090".to_string(),
            handling_time_histogram: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Full method names (`/service/method`) excluded from instrumentation.
    pub exclude_methods: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_methods: vec!["/grpc.health.v1.Health/Check".to_string()],
        }
    }
}

impl InterceptorConfig {
    pub fn filter(&self) -> Option<Filter> {
        if self.filter.exclude_methods.is_empty() {
            None
        } else {
            Some(filter::exclude_methods(self.filter.exclude_methods.clone()))
        }
    }

    /// Tracing layer options, `None` when tracing is disabled.
    pub fn tracing_options(&self) -> Option<TracingOptions> {
        if !self.tracing.enabled {
            return None;
        }
        let header = self.tracing.header_name.as_deref();
        let (tracer, header_name): (Arc<dyn Tracer>, String) = match self.tracing.backend {
            TracerBackend::W3c => {
                let tracer = match header {
                    Some(name) => W3cTracer::with_header(name),
                    None => W3cTracer::new(),
                };
                let name = tracer.header_name().to_string();
                (Arc::new(tracer), name)
            }
            TracerBackend::Mock => {
                let tracer = match header {
                    Some(name) => MockTracer::with_header(name),
                    None => MockTracer::new(),
                };
                let name = tracer.header_name().to_string();
                (Arc::new(tracer), name)
            }
        };
        let options = TracingOptions::new(tracer).with_trace_header_name(header_name);
        Some(match self.filter() {
            Some(filter) => options.with_filter(filter),
            None => options,
        })
    }

    /// Logging layer options, `None` when call logging is disabled.
    pub fn logging_options(&self) -> Option<LoggingOptions> {
        if !self.logging.enabled {
            return None;
        }
        let duration_field = match self.logging.duration_field {
            DurationFieldFormat::TimeMs => duration_to_time_millis_field,
            DurationFieldFormat::Duration => duration_to_duration_field,
        };
        let options = LoggingOptions::default().with_duration_field(duration_field);
        Some(match self.filter() {
            Some(filter) => options.with_filter(filter),
            None => options,
        })
    }

    /// Metrics layer options, `None` when metrics are disabled.
    pub fn metrics_options(&self) -> Option<MetricsOptions> {
        if !self.metrics.enabled {
            return None;
        }
        let options =
            MetricsOptions::default().with_handling_time_histogram(self.metrics.handling_time_histogram);
        Some(match self.filter() {
            Some(filter) => options.with_filter(filter),
            None => options,
        })
    }
}

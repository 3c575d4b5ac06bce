//! Logging and Prometheus metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `tollgate_requests_total` | Counter | `method`, `status` |
//! | `tollgate_request_duration_seconds` | Histogram | `method` |
//! | `tollgate_authz_decisions_total` | Counter | `outcome` |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::TelemetrySettings;
use crate::error::{SidecarError, SidecarResult};

const REQUESTS_TOTAL: &str = "tollgate_requests_total";
const REQUEST_DURATION: &str = "tollgate_request_duration_seconds";
const AUTHZ_DECISIONS: &str = "tollgate_authz_decisions_total";

// 1ms .. 10s
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(settings: &TelemetrySettings) -> SidecarResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .map_err(|e| SidecarError::config(format!("invalid log level: {e}")))?;

    let fmt_layer = if settings.json_logs {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer().pretty().boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| SidecarError::config(format!("failed to initialise logging: {e}")))
}

/// Install the Prometheus recorder.
///
/// Must run inside a Tokio runtime when `metrics_port` is set, since the
/// extra listener is spawned onto it.
pub fn init_metrics(settings: &TelemetrySettings) -> SidecarResult<()> {
    if !settings.metrics_enabled || METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), DURATION_BUCKETS)
        .map_err(|e| SidecarError::config(format!("invalid metric buckets: {e}")))?;

    let handle = match settings.metrics_port {
        Some(port) => {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            let (recorder, exporter) = builder
                .with_http_listener(addr)
                .build()
                .map_err(|e| SidecarError::config(format!("failed to build metrics exporter: {e}")))?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|_| SidecarError::config("a metrics recorder is already installed"))?;
            tokio::spawn(async move {
                if let Err(e) = exporter.await {
                    warn!(error = ?e, "metrics listener stopped");
                }
            });
            handle
        }
        None => builder
            .install_recorder()
            .map_err(|e| SidecarError::config(format!("failed to install metrics recorder: {e}")))?,
    };

    let _ = METRICS_HANDLE.set(handle);
    describe_metrics();
    Ok(())
}

/// Render metrics in Prometheus text format, if a recorder is installed.
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of proxied requests");
    describe_histogram!(REQUEST_DURATION, "Request duration in seconds, authorization included");
    describe_counter!(AUTHZ_DECISIONS, "Authorization outcomes");
}

/// Record a completed request.
pub fn record_request(method: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION, "method" => method.to_string()).record(duration.as_secs_f64());
}

/// Record an authorization outcome: `allow`, `deny`, or an error kind.
pub fn record_authz_decision(outcome: &'static str) {
    counter!(AUTHZ_DECISIONS, "outcome" => outcome).increment(1);
}

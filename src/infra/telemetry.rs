use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Per-target filter overrides are read from this variable, so operators can
/// turn up engine logging without touching the configured default level.
const FILTER_ENV_VAR: &str = "SCRIVANO_LOG";

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_env_var(FILTER_ENV_VAR)
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scrivano_document_prepare_total",
            Unit::Count,
            "Total number of document preparations (source load + compile)."
        );
        describe_counter!(
            "scrivano_document_hit_total",
            Unit::Count,
            "Total number of document-store hits on already-prepared units."
        );
        describe_counter!(
            "scrivano_output_hit_total",
            Unit::Count,
            "Total number of output-cache hits."
        );
        describe_counter!(
            "scrivano_output_miss_total",
            Unit::Count,
            "Total number of output-cache misses."
        );
        describe_counter!(
            "scrivano_output_expired_total",
            Unit::Count,
            "Total number of output-cache entries evicted lazily on lookup."
        );
        describe_counter!(
            "scrivano_output_store_total",
            Unit::Count,
            "Total number of output-cache writes."
        );
        describe_counter!(
            "scrivano_hook_invocation_total",
            Unit::Count,
            "Total number of filter hook invocations."
        );
        describe_counter!(
            "scrivano_hook_redirect_total",
            Unit::Count,
            "Total number of capturing redirects dispatched by filters."
        );
        describe_counter!(
            "scrivano_scheduler_run_total",
            Unit::Count,
            "Total number of scheduled document invocations."
        );
        describe_histogram!(
            "scrivano_render_ms",
            Unit::Milliseconds,
            "Render pipeline latency in milliseconds, cache misses only."
        );
    });
}

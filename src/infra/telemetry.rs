use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::{orchestrator, scheduler};
use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError(err.to_string()))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            orchestrator::COMPLETED_COUNTER,
            Unit::Count,
            "Total number of successfully rendered requests."
        );
        describe_counter!(
            orchestrator::FAILED_COUNTER,
            Unit::Count,
            "Total number of failed render requests, labelled by failure kind."
        );
        describe_counter!(
            scheduler::ADMITTED_COUNTER,
            Unit::Count,
            "Total number of jobs admitted to the conversion engine."
        );
        describe_counter!(
            scheduler::REJECTED_COUNTER,
            Unit::Count,
            "Total number of jobs shed before conversion, labelled by reason."
        );
        describe_gauge!(
            scheduler::QUEUE_DEPTH_GAUGE,
            Unit::Count,
            "Current number of jobs holding an admission ticket."
        );
        describe_histogram!(
            orchestrator::DURATION_HISTOGRAM,
            Unit::Milliseconds,
            "End-to-end render latency in milliseconds."
        );
    });
}

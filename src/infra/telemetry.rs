use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metrics::{
    METRIC_FRAGMENT_HIT, METRIC_FRAGMENT_MARK_ERROR, METRIC_FRAGMENT_MISS,
    METRIC_FRAGMENT_READ_ERROR, METRIC_FRAGMENT_RENDER_MS, METRIC_FRAGMENT_WRITE_ERROR,
    METRIC_SINGLE_FLIGHT_WAIT,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber and register metric descriptions.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber rejected: {err}")))
}

/// Describe the fragment cache metrics. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_FRAGMENT_HIT,
            Unit::Count,
            "Fragments served from the content store."
        );
        describe_counter!(
            METRIC_FRAGMENT_MISS,
            Unit::Count,
            "Fragment lookups that found no stored artifact."
        );
        describe_counter!(
            METRIC_FRAGMENT_READ_ERROR,
            Unit::Count,
            "Fragment lookups that failed and fell back to rendering."
        );
        describe_counter!(
            METRIC_FRAGMENT_WRITE_ERROR,
            Unit::Count,
            "Rendered fragments that could not be written to the store."
        );
        describe_counter!(
            METRIC_FRAGMENT_MARK_ERROR,
            Unit::Count,
            "Rendered fragments whose rendition record could not be persisted."
        );
        describe_counter!(
            METRIC_SINGLE_FLIGHT_WAIT,
            Unit::Count,
            "Requests that waited on another request rendering the same fragment."
        );
        describe_histogram!(
            METRIC_FRAGMENT_RENDER_MS,
            Unit::Milliseconds,
            "Fragment render-and-populate latency in milliseconds."
        );
    });
}

//! Interfaces for exporting metrics
use std::{fmt, future::Future, time::Duration};

use serde::Serialize;

use crate::{
    data::Instrument,
    error::{MetricError, MetricResult},
    global,
    temporality::TemporalityPreference,
};

const POINTS_DROPPED_TRAILER: &str = "otlp-points-dropped";
const METRICS_DROPPED_TRAILER: &str = "otlp-metrics-dropped";
const INVALID_TRAILER_PREFIX: &str = "otlp-invalid-";

/// Exporter handles the delivery of metric data to external receivers.
///
/// This is the final component in the metric push pipeline.
pub trait PushMetricExporter: Send + Sync + 'static {
    /// Export serializes and transmits metric data to a receiver.
    ///
    /// All retry logic must be contained in this function. The engine does not
    /// implement any retry logic. All errors returned by this function are
    /// considered unrecoverable and will be logged.
    fn export(&self, metrics: &[Instrument]) -> impl Future<Output = MetricResult<()>> + Send;

    /// Flushes any metric data held by an exporter.
    fn force_flush(&self) -> MetricResult<()>;

    /// Releases any held computational resources.
    ///
    /// After Shutdown is called, calls to Export will perform no operation and
    /// instead will return an error indicating the shutdown state.
    fn shutdown_with_timeout(&self, timeout: Duration) -> MetricResult<()>;

    /// Shutdown with the default timeout of 5 seconds.
    fn shutdown(&self) -> MetricResult<()> {
        self.shutdown_with_timeout(Duration::from_secs(5))
    }

    /// The temporality preference the receiver expects; engines feeding this
    /// exporter should be built with it.
    fn temporality(&self) -> TemporalityPreference {
        TemporalityPreference::Cumulative
    }
}

/// Counts of data a receiver accepted the request for but did not store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DroppedCounts {
    /// Number of dropped points.
    #[serde(skip_serializing_if = "is_zero")]
    pub points: u64,
    /// Number of dropped metrics.
    #[serde(skip_serializing_if = "is_zero")]
    pub metrics: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// One rejection reason reported by a receiver and the metric names it
/// applied to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DropExample {
    /// Human readable reason, e.g. `"name too long"`.
    pub reason: String,
    /// Names of the affected metrics.
    pub names: Vec<String>,
}

/// Summary of a partially successful export.
///
/// Receivers signal partial failures through response trailers: counts under
/// `otlp-points-dropped` and `otlp-metrics-dropped`, and one
/// `otlp-invalid-<reason>` trailer per rejection reason listing the affected
/// metric names. The summary displays as compact JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DropSummary {
    /// Dropped data counts.
    pub dropped: DroppedCounts,
    /// Rejection reasons, sorted by reason.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<DropExample>,
}

impl DropSummary {
    /// Builds a summary from response trailers.
    ///
    /// Keys are matched case-insensitively and keys without the `otlp-` prefix
    /// are ignored. A count trailer is used only when it carries exactly one
    /// integer value. Dashes in a rejection reason become spaces.
    pub fn from_trailers<I, K, V, S>(trailers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut summary = DropSummary::default();
        for (key, values) in trailers {
            let key = key.as_ref().to_ascii_lowercase();
            if !key.starts_with("otlp-") {
                continue;
            }

            let values = values.into_iter().map(Into::into);
            if key == POINTS_DROPPED_TRAILER {
                if let Some(points) = single_count(values) {
                    summary.dropped.points = points;
                }
            } else if key == METRICS_DROPPED_TRAILER {
                if let Some(metrics) = single_count(values) {
                    summary.dropped.metrics = metrics;
                }
            } else if let Some(reason) = key.strip_prefix(INVALID_TRAILER_PREFIX) {
                summary.examples.push(DropExample {
                    reason: reason.replace('-', " "),
                    names: values.collect(),
                });
            }
        }
        summary.examples.sort_by(|a, b| a.reason.cmp(&b.reason));
        summary
    }

    /// Returns `true` when nothing was dropped.
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty() && self.dropped.points == 0 && self.dropped.metrics == 0
    }

    /// Hands a non-empty summary to the global error handler as
    /// [MetricError::PartialFailure]. Returns whether anything was reported.
    pub fn report(self) -> bool {
        if self.is_empty() {
            return false;
        }
        global::handle_error(MetricError::PartialFailure(self));
        true
    }
}

fn single_count(mut values: impl Iterator<Item = String>) -> Option<u64> {
    let value = values.next()?;
    if values.next().is_some() {
        return None;
    }
    value.trim().parse().ok()
}

impl fmt::Display for DropSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

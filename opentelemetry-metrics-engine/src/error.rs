use std::result;
use std::sync::PoisonError;
use thiserror::Error;

use crate::exporter::DropSummary;

/// A specialized `Result` type for metric operations.
pub type MetricResult<T> = result::Result<T, MetricError>;

/// Errors returned by the metrics engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
    /// Invalid configuration, rejected before any collection takes place.
    #[error("Config error {0}")]
    Config(String),
    /// Invalid instrument configuration such as an invalid instrument name or
    /// unit.
    #[error("Invalid instrument configuration: {0}")]
    InvalidInstrumentConfiguration(&'static str),
    /// A downstream receiver accepted the export but rejected part of it.
    #[error("metrics partial failure: {0}")]
    PartialFailure(DropSummary),
    /// The reader or exporter was already shut down.
    #[error("reader is shut down")]
    AlreadyShutdown,
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}

mod instrument_storage;

use std::sync::Arc;

use opentelemetry::KeyValue;

use crate::{aggregator::AggregationKind, data::Collection, instrument::Descriptor};

pub(crate) use instrument_storage::InstrumentStorage;

/// Receives measurements to be aggregated.
pub(crate) trait Measure<N>: Send + Sync + 'static {
    fn call(&self, measurement: N, attrs: &[KeyValue]);
}

/// A registered instrument as seen by the collection loop.
pub(crate) trait Collector: Send + Sync + 'static {
    /// The descriptor, with the description merged over every registration.
    fn descriptor(&self) -> Arc<Descriptor>;

    /// The aggregation applied to every attribute set.
    fn aggregation(&self) -> AggregationKind;

    /// Keeps the longer of the current and the offered description.
    fn merge_description(&self, description: &str);

    /// Appends this instrument and its points to `output`, returning the
    /// number of points written.
    fn collect(&self, output: &mut Collection) -> usize;
}

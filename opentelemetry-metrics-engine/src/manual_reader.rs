use std::fmt;

use opentelemetry::otel_debug;

use crate::{
    data::Collection,
    engine::MetricsEngine,
    error::{MetricError, MetricResult},
};

/// A simple reader that allows an application to read metrics on demand.
///
/// The reader owns the [Collection] every call to [collect] writes into, so
/// consecutive collections reuse the same output allocations.
///
/// [collect]: ManualReader::collect
///
/// # Example
///
/// ```
/// use opentelemetry_metrics_engine::{ManualReader, MetricsEngine};
///
/// let mut reader = ManualReader::new(MetricsEngine::default());
/// assert!(reader.collect().unwrap().is_empty());
/// ```
pub struct ManualReader {
    engine: Option<MetricsEngine>,
    collection: Collection,
}

impl fmt::Debug for ManualReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ManualReader")
    }
}

impl ManualReader {
    /// A reader collecting `engine`.
    pub fn new(engine: MetricsEngine) -> Self {
        ManualReader {
            engine: Some(engine),
            collection: Collection::default(),
        }
    }

    /// Collects every instrument of the engine.
    ///
    /// The returned collection is valid until the next call.
    ///
    /// Returns an error if called after shutdown.
    pub fn collect(&mut self) -> MetricResult<&Collection> {
        let engine = self.engine.as_ref().ok_or(MetricError::AlreadyShutdown)?;
        engine.collect(&mut self.collection);
        Ok(&self.collection)
    }

    /// Releases the engine and the retained output. Any future call to
    /// collect will return an error.
    pub fn shutdown(&mut self) -> MetricResult<()> {
        if self.engine.take().is_none() {
            return Err(MetricError::AlreadyShutdown);
        }
        self.collection = Collection::default();
        otel_debug!(name: "ManualReader.Shutdown");
        Ok(())
    }
}

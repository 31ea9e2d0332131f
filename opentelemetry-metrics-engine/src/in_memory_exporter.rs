use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::data::Instrument;
use crate::error::{MetricError, MetricResult};
use crate::exporter::PushMetricExporter;
use crate::temporality::TemporalityPreference;

/// An in-memory metrics exporter that stores metrics data in memory.
///
/// This exporter is useful for testing and debugging purposes. It stores one
/// `Vec<Instrument>` per export; batches can be retrieved using the
/// `get_finished_metrics` method.
///
/// # Example
///
/// ```
/// # use opentelemetry::KeyValue;
/// # use opentelemetry_metrics_engine::{
/// #     exporter::PushMetricExporter, Descriptor, InMemoryMetricExporter, InstrumentKind,
/// #     ManualReader, MetricsEngine,
/// # };
/// // Create an InMemoryMetricExporter
/// let exporter = InMemoryMetricExporter::default();
///
/// // Create an engine using the exporter's temporality
/// let engine = MetricsEngine::builder()
///     .with_temporality_preference(exporter.temporality())
///     .build();
/// let counter = engine
///     .instrument::<u64>(Descriptor::new("my_counter", InstrumentKind::Counter))
///     .build()
///     .unwrap();
/// counter.record(1, &[KeyValue::new("key", "value")]);
///
/// // Collect on demand and export
/// let mut reader = ManualReader::new(engine);
/// let collection = reader.collect().unwrap();
/// futures_executor::block_on(exporter.export(collection)).unwrap();
///
/// // Retrieve the finished metrics from the exporter
/// let finished_metrics = exporter.get_finished_metrics().unwrap();
/// assert_eq!(finished_metrics[0][0].descriptor.name(), "my_counter");
/// ```
pub struct InMemoryMetricExporter {
    metrics: Arc<Mutex<VecDeque<Vec<Instrument>>>>,
    temporality: TemporalityPreference,
    is_shutdown: Arc<AtomicBool>,
}

impl Clone for InMemoryMetricExporter {
    fn clone(&self) -> Self {
        InMemoryMetricExporter {
            metrics: self.metrics.clone(),
            temporality: self.temporality,
            is_shutdown: self.is_shutdown.clone(),
        }
    }
}

impl fmt::Debug for InMemoryMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetricExporter").finish()
    }
}

impl Default for InMemoryMetricExporter {
    fn default() -> Self {
        InMemoryMetricExporterBuilder::new().build()
    }
}

/// Builder for [`InMemoryMetricExporter`].
/// # Example
///
/// ```
/// # use opentelemetry_metrics_engine::{InMemoryMetricExporterBuilder, TemporalityPreference};
///
/// let exporter = InMemoryMetricExporterBuilder::new()
///     .with_temporality(TemporalityPreference::Delta)
///     .build();
/// ```
pub struct InMemoryMetricExporterBuilder {
    temporality: Option<TemporalityPreference>,
}

impl fmt::Debug for InMemoryMetricExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetricExporterBuilder").finish()
    }
}

impl Default for InMemoryMetricExporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMetricExporterBuilder {
    /// Creates a new instance of the `InMemoryMetricExporterBuilder`.
    pub fn new() -> Self {
        Self { temporality: None }
    }

    /// Set the [TemporalityPreference] of the exporter.
    pub fn with_temporality(mut self, temporality: TemporalityPreference) -> Self {
        self.temporality = Some(temporality);
        self
    }

    /// Creates a new instance of the `InMemoryMetricExporter`.
    ///
    pub fn build(self) -> InMemoryMetricExporter {
        InMemoryMetricExporter {
            metrics: Arc::new(Mutex::new(VecDeque::new())),
            temporality: self.temporality.unwrap_or_default(),
            is_shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl InMemoryMetricExporter {
    /// Returns the exported batches, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a `MetricError` if the internal lock cannot be acquired.
    ///
    /// # Example
    ///
    /// ```
    /// # use opentelemetry_metrics_engine::InMemoryMetricExporter;
    ///
    /// let exporter = InMemoryMetricExporter::default();
    /// let finished_metrics = exporter.get_finished_metrics().unwrap();
    /// ```
    pub fn get_finished_metrics(&self) -> MetricResult<Vec<Vec<Instrument>>> {
        self.metrics
            .lock()
            .map(|metrics_guard| metrics_guard.iter().cloned().collect())
            .map_err(MetricError::from)
    }

    /// Clears the internal storage of finished metrics.
    ///
    /// # Example
    ///
    /// ```
    /// # use opentelemetry_metrics_engine::InMemoryMetricExporter;
    ///
    /// let exporter = InMemoryMetricExporter::default();
    /// exporter.reset();
    /// ```
    pub fn reset(&self) {
        let _ = self
            .metrics
            .lock()
            .map(|mut metrics_guard| metrics_guard.clear());
    }
}

impl PushMetricExporter for InMemoryMetricExporter {
    async fn export(&self, metrics: &[Instrument]) -> MetricResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }
        self.metrics
            .lock()
            .map(|mut metrics_guard| metrics_guard.push_back(metrics.to_vec()))
            .map_err(MetricError::from)
    }

    fn force_flush(&self) -> MetricResult<()> {
        Ok(()) // In this implementation, flush does nothing
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> MetricResult<()> {
        self.is_shutdown.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn temporality(&self) -> TemporalityPreference {
        self.temporality
    }
}

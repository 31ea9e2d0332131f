use core::fmt;
use std::{
    any::Any,
    borrow::Cow,
    marker::PhantomData,
    sync::{Arc, Mutex},
};

use opentelemetry::{otel_debug, otel_info, otel_warn, KeyValue};

use crate::{
    aggregator::{
        lock, AggregationKind, AggregatorConfig, HistogramMethods, LastValueMethods, Methods,
        Number, PrecomputedSumMethods, SumMethods,
    },
    attributes::KeyFilter,
    data::Collection,
    error::MetricResult,
    instrument::{Descriptor, InstrumentKind},
    internal::{Collector, InstrumentStorage, Measure},
    temporality::{Temporality, TemporalityPreference, TemporalitySelector},
};

struct Registered {
    collector: Arc<dyn Collector>,
    // an `Arc<dyn Measure<N>>` for the number type the instrument was built with
    measure: Box<dyn Any + Send + Sync>,
}

struct EngineInner {
    selector: TemporalitySelector,
    config: AggregatorConfig,
    instruments: Mutex<Vec<Registered>>,
}

/// Owns every registered instrument and collects them.
///
/// This is a clonable handle: clones share the same instruments. Instruments
/// are collected in registration order and are never unregistered, so every
/// collection emits the same sequence of instruments.
#[derive(Clone)]
pub struct MetricsEngine {
    inner: Arc<EngineInner>,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        MetricsEngine::builder().build()
    }
}

impl MetricsEngine {
    /// Return default [MetricsEngineBuilder]
    pub fn builder() -> MetricsEngineBuilder {
        MetricsEngineBuilder::default()
    }

    /// Starts registering an instrument recording values of type `N`.
    pub fn instrument<N: Number>(&self, descriptor: Descriptor) -> InstrumentBuilder<'_, N> {
        InstrumentBuilder {
            engine: self,
            descriptor,
            config: None,
            filter: None,
            aggregation: None,
            _number: PhantomData,
        }
    }

    /// The selector deciding the temporality of new instruments.
    pub fn temporality_selector(&self) -> &TemporalitySelector {
        &self.inner.selector
    }

    /// Writes a snapshot of every registered instrument into `output`.
    ///
    /// `output` is overwritten; passing the previous cycle's collection back in
    /// reuses its allocations.
    pub fn collect(&self, output: &mut Collection) {
        output.reset();

        let instruments = lock(&self.inner.instruments);
        let mut points = 0;
        for instrument in instruments.iter() {
            points += instrument.collector.collect(output);
        }

        otel_debug!(
            name: "MetricsEngine.Collected",
            instrument_count = output.len() as u64,
            point_count = points as u64
        );
    }

    fn register<N: Number>(
        &self,
        descriptor: Descriptor,
        aggregation: AggregationKind,
        config: AggregatorConfig,
        filter: Option<KeyFilter>,
    ) -> Recorder<N> {
        let mut instruments = lock(&self.inner.instruments);

        for existing in instruments.iter() {
            let registered = existing.collector.descriptor();
            if registered.same_identity(&descriptor) {
                if let Some(measure) = existing.measure.downcast_ref::<Arc<dyn Measure<N>>>() {
                    existing
                        .collector
                        .merge_description(descriptor.description());
                    otel_debug!(
                        name: "MetricsEngine.ExistingInstrumentReturned",
                        instrument = descriptor.name()
                    );
                    return Recorder {
                        measure: Arc::clone(measure),
                    };
                }
            } else if registered.name().eq_ignore_ascii_case(descriptor.name()) {
                otel_warn!(
                    name: "MetricsEngine.DuplicateInstrument",
                    instrument = descriptor.name(),
                    message = "an instrument with this name but a different kind or number type is already registered; both will be reported"
                );
            }
        }

        let temporality = match self.inner.selector.temporality(descriptor.kind()) {
            Temporality::Undefined => {
                otel_debug!(
                    name: "MetricsEngine.UndefinedTemporality",
                    instrument = descriptor.name(),
                    message = "selector returned no temporality, reporting cumulatively"
                );
                Temporality::Cumulative
            }
            temporality => temporality,
        };

        otel_debug!(
            name: "MetricsEngine.InstrumentRegistered",
            instrument = descriptor.name(),
            delta = temporality == Temporality::Delta
        );

        let (collector, measure) = match aggregation {
            AggregationKind::Sum => compile::<N, SumMethods>(descriptor, config, filter, temporality),
            AggregationKind::PrecomputedSum => {
                compile::<N, PrecomputedSumMethods>(descriptor, config, filter, temporality)
            }
            AggregationKind::LastValue => {
                compile::<N, LastValueMethods>(descriptor, config, filter, temporality)
            }
            AggregationKind::Histogram => {
                compile::<N, HistogramMethods>(descriptor, config, filter, temporality)
            }
        };

        instruments.push(Registered {
            collector,
            measure: Box::new(Arc::clone(&measure)),
        });
        Recorder { measure }
    }
}

fn compile<N, M>(
    descriptor: Descriptor,
    config: AggregatorConfig,
    filter: Option<KeyFilter>,
    temporality: Temporality,
) -> (Arc<dyn Collector>, Arc<dyn Measure<N>>)
where
    N: Number,
    M: Methods<N>,
{
    let storage = Arc::new(InstrumentStorage::<N, M>::new(
        descriptor,
        config,
        filter,
        temporality,
    ));
    let collector: Arc<dyn Collector> = storage.clone();
    let measure: Arc<dyn Measure<N>> = storage;
    (collector, measure)
}

/// The aggregation used for an instrument kind unless one is requested.
pub(crate) fn default_aggregation(kind: InstrumentKind) -> AggregationKind {
    match kind {
        _ if kind.precomputed_sum() => AggregationKind::PrecomputedSum,
        InstrumentKind::Histogram => AggregationKind::Histogram,
        InstrumentKind::ObservableGauge => AggregationKind::LastValue,
        _ => AggregationKind::Sum,
    }
}

impl fmt::Debug for MetricsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = lock(&self.inner.instruments).len();
        f.debug_struct("MetricsEngine")
            .field("selector", &self.inner.selector)
            .field("config", &self.inner.config)
            .field("instruments", &count)
            .finish()
    }
}

/// Configuration options for a [MetricsEngine].
#[derive(Debug, Default)]
pub struct MetricsEngineBuilder {
    selector: Option<TemporalitySelector>,
    config: AggregatorConfig,
}

impl MetricsEngineBuilder {
    /// Decides the temporality of every instrument from its kind.
    ///
    /// Defaults to [TemporalitySelector::cumulative].
    pub fn with_temporality_selector(mut self, selector: TemporalitySelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Shorthand for the selector of a configured preference.
    pub fn with_temporality_preference(self, preference: TemporalityPreference) -> Self {
        self.with_temporality_selector(preference.selector())
    }

    /// The aggregator configuration of instruments that do not set their own.
    pub fn with_aggregator_config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Construct a new engine with this configuration.
    pub fn build(self) -> MetricsEngine {
        otel_debug!(
            name: "MetricsEngine.Building",
            builder = format!("{:?}", &self),
        );
        let engine = MetricsEngine {
            inner: Arc::new(EngineInner {
                selector: self.selector.unwrap_or_default(),
                config: self.config,
                instruments: Mutex::new(Vec::new()),
            }),
        };
        otel_info!(name: "MetricsEngine.Built");
        engine
    }
}

/// Configures an instrument before it is registered with a [MetricsEngine].
pub struct InstrumentBuilder<'a, N> {
    engine: &'a MetricsEngine,
    descriptor: Descriptor,
    config: Option<AggregatorConfig>,
    filter: Option<KeyFilter>,
    aggregation: Option<AggregationKind>,
    _number: PhantomData<N>,
}

impl<N: Number> InstrumentBuilder<'_, N> {
    /// Sets the description of the instrument.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.descriptor = self.descriptor.with_description(description);
        self
    }

    /// Sets the unit of the instrument.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.descriptor = self.descriptor.with_unit(unit);
        self
    }

    /// Removes attributes rejected by `filter` from every measurement.
    pub fn with_key_filter(mut self, filter: KeyFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Overrides the engine's default aggregator configuration.
    pub fn with_aggregator_config(mut self, config: AggregatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the aggregation chosen from the instrument kind.
    pub fn with_aggregation(mut self, aggregation: AggregationKind) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Validates and registers the instrument.
    ///
    /// Registering an instrument with the name, kind and number type of an
    /// existing one returns a recorder for the existing instrument; the longer
    /// of the two descriptions is kept.
    ///
    /// # Errors
    ///
    /// [MetricError::InvalidInstrumentConfiguration] for an invalid name or
    /// unit and [MetricError::Config] for invalid histogram boundaries.
    ///
    /// [MetricError::InvalidInstrumentConfiguration]: crate::MetricError::InvalidInstrumentConfiguration
    /// [MetricError::Config]: crate::MetricError::Config
    pub fn build(self) -> MetricResult<Recorder<N>> {
        let descriptor = self.descriptor.with_number_kind(N::KIND);
        descriptor.validate()?;

        let config = self
            .config
            .unwrap_or_else(|| self.engine.inner.config.clone());
        config.validate()?;

        let aggregation = self
            .aggregation
            .unwrap_or_else(|| default_aggregation(descriptor.kind()));
        Ok(self
            .engine
            .register(descriptor, aggregation, config, self.filter))
    }
}

impl<N> fmt::Debug for InstrumentBuilder<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("descriptor", &self.descriptor)
            .field("config", &self.config)
            .field("filter", &self.filter)
            .field("aggregation", &self.aggregation)
            .finish()
    }
}

/// Records measurements into one instrument.
///
/// For observable instruments each recorded value is an observation made by
/// the instrument's callback: a running total for observable counters, the
/// current value for gauges.
#[derive(Clone)]
pub struct Recorder<N> {
    measure: Arc<dyn Measure<N>>,
}

impl<N: Number> Recorder<N> {
    /// Records `value` for the attribute set `attrs`.
    ///
    /// NaN values, and negative values on counters, are dropped.
    pub fn record(&self, value: N, attrs: &[KeyValue]) {
        self.measure.call(value, attrs)
    }
}

impl<N> fmt::Debug for Recorder<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Recorder")
    }
}

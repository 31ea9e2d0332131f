use std::{
    collections::HashMap,
    marker::PhantomData,
    mem::replace,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use opentelemetry::{otel_debug, KeyValue};

use crate::{
    aggregator::{lock, AggregationKind, AggregatorConfig, Methods, Number},
    attributes::{AttributeSet, KeyFilter},
    data::{Collection, Instrument, Point, ReusableArray},
    instrument::{Descriptor, InstrumentKind},
    temporality::Temporality,
};

use super::{Collector, Measure};

struct State<S> {
    descriptor: Arc<Descriptor>,
    data: HashMap<AttributeSet, Arc<S>>,
    last_collect: SystemTime,
}

/// The attribute-keyed accumulators of one instrument.
///
/// The lock guards the table, the descriptor and the delta interval start. It
/// is held to find or create an accumulator and for a whole collection, never
/// while a measurement is applied to its accumulator.
pub(crate) struct InstrumentStorage<N, M>
where
    N: Number,
    M: Methods<N>,
{
    state: Mutex<State<M::Storage>>,
    name: String,
    kind: InstrumentKind,
    config: AggregatorConfig,
    filter: Option<KeyFilter>,
    temporality: Temporality,
    start_time: SystemTime,
    _methods: PhantomData<fn(N) -> M>,
}

impl<N, M> InstrumentStorage<N, M>
where
    N: Number,
    M: Methods<N>,
{
    /// `temporality` must be [Temporality::Cumulative] or [Temporality::Delta].
    pub(crate) fn new(
        descriptor: Descriptor,
        config: AggregatorConfig,
        filter: Option<KeyFilter>,
        temporality: Temporality,
    ) -> Self {
        let start_time = SystemTime::now();
        InstrumentStorage {
            name: descriptor.name().to_owned(),
            kind: descriptor.kind(),
            state: Mutex::new(State {
                descriptor: Arc::new(descriptor),
                data: HashMap::new(),
                last_collect: start_time,
            }),
            config,
            filter,
            temporality,
            start_time,
            _methods: PhantomData,
        }
    }

    /// Computes the table key for `attrs` now and returns a resolver that
    /// finds, or creates, its accumulator each time it is called.
    pub(crate) fn storage_finder(&self, attrs: &[KeyValue]) -> impl Fn() -> Arc<M::Storage> + '_ {
        let key = match &self.filter {
            Some(filter) => filter.apply(attrs),
            None => AttributeSet::from(attrs),
        };
        move || self.find_storage(&key)
    }

    fn find_storage(&self, key: &AttributeSet) -> Arc<M::Storage> {
        let mut state = lock(&self.state);
        if let Some(storage) = state.data.get(key) {
            return Arc::clone(storage);
        }

        let storage = Arc::new(M::init(&self.config));
        state.data.insert(key.clone(), Arc::clone(&storage));
        storage
    }

    fn append_point(
        &self,
        points: &mut ReusableArray<Point<N>>,
        attrs: &AttributeSet,
        live: &M::Storage,
        start: SystemTime,
        now: SystemTime,
    ) {
        let point = points.reallocate();

        let mut out = point
            .aggregation
            .take()
            .and_then(M::to_storage)
            .unwrap_or_else(|| M::init(&self.config));
        match self.temporality {
            Temporality::Delta => M::move_into(live, &mut out),
            _ => M::copy_into(live, &mut out),
        }

        point.aggregation = Some(M::to_aggregation(out));
        if point.attributes != *attrs {
            point.attributes = attrs.clone();
        }
        point.temporality = self.temporality;
        point.start_time = start;
        point.time = now;
    }

    fn is_valid(&self, measurement: N) -> bool {
        if measurement.into_float().is_nan() {
            otel_debug!(
                name: "Instrument.MeasurementDropped",
                instrument = self.name.as_str(),
                reason = "value is NaN"
            );
            return false;
        }
        if self.kind.monotonic() && measurement < N::default() {
            otel_debug!(
                name: "Instrument.MeasurementDropped",
                instrument = self.name.as_str(),
                reason = "negative value on a monotonic instrument"
            );
            return false;
        }
        true
    }
}

impl<N, M> Measure<N> for InstrumentStorage<N, M>
where
    N: Number,
    M: Methods<N>,
{
    fn call(&self, measurement: N, attrs: &[KeyValue]) {
        if !self.is_valid(measurement) {
            return;
        }

        let storage = self.storage_finder(attrs)();
        M::update(&storage, measurement, &self.config);
    }
}

impl<N, M> Collector for InstrumentStorage<N, M>
where
    N: Number,
    M: Methods<N>,
{
    fn descriptor(&self) -> Arc<Descriptor> {
        Arc::clone(&lock(&self.state).descriptor)
    }

    fn aggregation(&self) -> AggregationKind {
        M::kind()
    }

    fn merge_description(&self, description: &str) {
        let mut state = lock(&self.state);
        if description.len() > state.descriptor.description().len() {
            Arc::make_mut(&mut state.descriptor).merge_description(description);
        }
    }

    fn collect(&self, output: &mut Collection) -> usize {
        let now = SystemTime::now();
        let mut state = lock(&self.state);

        let instrument = output.reallocate_with(|| {
            Instrument::new(Arc::clone(&state.descriptor), M::kind())
        });
        if !Arc::ptr_eq(&instrument.descriptor, &state.descriptor) {
            instrument.descriptor = Arc::clone(&state.descriptor);
        }
        instrument.aggregation = M::kind();
        let points = N::points_mut(&mut instrument.data);
        points.reset();

        let start = match self.temporality {
            Temporality::Delta => replace(&mut state.last_collect, now),
            _ => self.start_time,
        };
        for (attrs, live) in state.data.iter() {
            self.append_point(points, attrs, live, start, now);
        }
        points.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, thread, time::Duration};

    use super::*;
    use crate::{
        aggregator::{HistogramMethods, LastValueMethods, SumMethods},
        data::{self, Aggregation},
        instrument::NumberKind,
    };

    fn counter<N: Number>(temporality: Temporality) -> InstrumentStorage<N, SumMethods>
    where
        SumMethods: Methods<N>,
    {
        let descriptor =
            Descriptor::new("requests", InstrumentKind::Counter).with_number_kind(N::KIND);
        InstrumentStorage::new(descriptor, AggregatorConfig::default(), None, temporality)
    }

    fn sums<N: Number>(collection: &Collection) -> Vec<(usize, N)> {
        collection[0]
            .points::<N>()
            .unwrap()
            .iter()
            .map(|p| match &p.aggregation {
                Some(Aggregation::Sum(sum)) => (p.attributes.len(), sum.value),
                other => panic!("unexpected aggregation {other:?}"),
            })
            .collect()
    }

    #[test]
    fn finder_resolves_the_same_storage() {
        let storage = counter::<u64>(Temporality::Cumulative);
        let attrs = [KeyValue::new("a", 1)];

        let find = storage.storage_finder(&attrs);
        let first = find();
        let second = find();
        let other = storage.storage_finder(&[KeyValue::new("a", 2)])();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(lock(&storage.state).data.len(), 2);
    }

    #[test]
    fn key_filter_collapses_attribute_sets() {
        let descriptor = Descriptor::new("requests", InstrumentKind::Counter)
            .with_number_kind(NumberKind::U64);
        let storage = InstrumentStorage::<u64, SumMethods>::new(
            descriptor,
            AggregatorConfig::default(),
            Some(KeyFilter::allow_keys(["method"])),
            Temporality::Cumulative,
        );

        storage.call(1, &[KeyValue::new("method", "GET"), KeyValue::new("id", 1)]);
        storage.call(2, &[KeyValue::new("method", "GET"), KeyValue::new("id", 2)]);
        storage.call(4, &[KeyValue::new("id", 3), KeyValue::new("method", "GET")]);

        let mut collection = Collection::default();
        assert_eq!(storage.collect(&mut collection), 1);
        assert_eq!(sums::<u64>(&collection), vec![(1, 7)]);
    }

    #[test]
    fn invalid_measurements_are_dropped() {
        let storage = counter::<f64>(Temporality::Cumulative);
        storage.call(f64::NAN, &[]);
        storage.call(-1.0, &[]);
        storage.call(2.5, &[]);

        let mut collection = Collection::default();
        storage.collect(&mut collection);
        assert_eq!(sums::<f64>(&collection), vec![(0, 2.5)]);
    }

    #[test]
    fn delta_intervals_are_contiguous() {
        let storage = counter::<i64>(Temporality::Delta);
        storage.call(1, &[]);

        let mut collection = Collection::default();
        storage.collect(&mut collection);
        let first = collection[0].points::<i64>().unwrap()[0].clone();
        assert_eq!(first.start_time, storage.start_time);

        thread::sleep(Duration::from_millis(2));
        storage.collect(&mut collection);
        let second = &collection[0].points::<i64>().unwrap()[0];

        assert_eq!(second.start_time, first.time);
        assert!(second.time > second.start_time);
        assert_eq!(second.temporality, Temporality::Delta);
        assert_eq!(
            second.aggregation,
            Some(Aggregation::Sum(data::Sum { value: 0 }))
        );
    }

    #[test]
    fn cumulative_intervals_start_at_creation() {
        let storage = counter::<i64>(Temporality::Cumulative);
        storage.call(1, &[]);

        let mut collection = Collection::default();
        storage.collect(&mut collection);
        collection.reset();
        thread::sleep(Duration::from_millis(2));
        storage.collect(&mut collection);

        let point = &collection[0].points::<i64>().unwrap()[0];
        assert_eq!(point.start_time, storage.start_time);
        assert!(point.time > point.start_time);
        assert_eq!(point.temporality, Temporality::Cumulative);
    }

    #[test]
    fn instruments_without_measurements_are_still_emitted() {
        let storage = counter::<u64>(Temporality::Delta);

        let mut collection = Collection::default();
        assert_eq!(storage.collect(&mut collection), 0);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection[0].descriptor.name(), "requests");
        assert!(collection[0].data.is_empty());
    }

    #[test]
    fn output_points_are_recycled() {
        let descriptor = Descriptor::new("latency", InstrumentKind::Histogram)
            .with_number_kind(NumberKind::F64);
        let storage = InstrumentStorage::<f64, HistogramMethods>::new(
            descriptor,
            AggregatorConfig::default(),
            None,
            Temporality::Delta,
        );

        let mut collection = Collection::default();
        let mut bucket_vectors = HashSet::new();
        for _ in 0..10 {
            storage.call(30.0, &[KeyValue::new("route", "/")]);
            collection.reset();
            storage.collect(&mut collection);

            match &collection[0].points::<f64>().unwrap()[0].aggregation {
                Some(Aggregation::Histogram(h)) => {
                    assert_eq!(h.count, 1);
                    assert_eq!(h.sum, 30.0);
                    bucket_vectors.insert(h.bucket_counts.as_ptr() as usize);
                }
                other => panic!("unexpected aggregation {other:?}"),
            }
        }

        // the live and output bucket vectors trade places on every collection
        assert_eq!(bucket_vectors.len(), 2);
        assert_eq!(collection.retained(), 1);
    }

    #[test]
    fn description_merge_is_visible_to_the_next_collection() {
        let descriptor = Descriptor::new("temperature", InstrumentKind::ObservableGauge)
            .with_description("A")
            .with_number_kind(NumberKind::F64);
        let storage = InstrumentStorage::<f64, LastValueMethods>::new(
            descriptor,
            AggregatorConfig::default(),
            None,
            Temporality::Cumulative,
        );

        storage.merge_description("AAA");
        storage.merge_description("AA");

        let mut collection = Collection::default();
        storage.collect(&mut collection);
        assert_eq!(collection[0].descriptor.description(), "AAA");
        assert_eq!(storage.descriptor().description(), "AAA");
    }
}

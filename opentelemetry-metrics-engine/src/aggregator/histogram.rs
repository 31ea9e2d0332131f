use std::sync::{Arc, Mutex, PoisonError};

use crate::data::{self, Aggregation};

use super::{lock, AggregationKind, AggregatorConfig, Methods, Number};

#[derive(Debug)]
struct Buckets<N> {
    counts: Vec<u64>,
    count: u64,
    total: N,
    min: N,
    max: N,
}

impl<N: Number> Buckets<N> {
    /// returns buckets with `n` bins.
    fn new(n: usize) -> Buckets<N> {
        Buckets {
            counts: vec![0; n],
            count: 0,
            total: N::default(),
            min: N::max(),
            max: N::min(),
        }
    }

    fn sum(&mut self, value: N) {
        self.total += value;
    }

    fn bin(&mut self, idx: usize, value: N) {
        self.counts[idx] += 1;
        self.count += 1;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value
        }
    }

    /// Zeroes the buckets in place, keeping `n` bins.
    fn reset(&mut self, n: usize) {
        self.counts.clear();
        self.counts.resize(n, 0);
        self.count = 0;
        self.total = N::default();
        self.min = N::max();
        self.max = N::min();
    }

    fn copy_from(&mut self, other: &Buckets<N>) {
        self.counts.clone_from(&other.counts);
        self.count = other.count;
        self.total = other.total;
        self.min = other.min;
        self.max = other.max;
    }
}

/// Accumulator of the [`HistogramMethods`] aggregation.
///
/// The bucket state sits behind a single mutex; a measurement takes it once to
/// bin the value and update sum, min and max together.
#[derive(Debug)]
pub struct HistogramStorage<N> {
    bounds: Arc<[f64]>,
    record_min_max: bool,
    buckets: Mutex<Buckets<N>>,
}

impl<N: Number> HistogramStorage<N> {
    /// Number of measurements recorded.
    pub fn count(&self) -> u64 {
        lock(&self.buckets).count
    }

    /// Sum of the measurements recorded.
    pub fn sum(&self) -> N {
        lock(&self.buckets).total
    }

    /// Per-bucket counts, `boundaries.len() + 1` entries.
    pub fn bucket_counts(&self) -> Vec<u64> {
        lock(&self.buckets).counts.clone()
    }
}

/// Counts measurements into explicit buckets, tracking sum, min and max.
///
/// A value `v` lands in the first bucket whose upper bound `b` satisfies
/// `v <= b`, or in the overflow bucket past the last bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramMethods;

impl<N: Number> Methods<N> for HistogramMethods {
    type Storage = HistogramStorage<N>;

    fn kind() -> AggregationKind {
        AggregationKind::Histogram
    }

    fn init(config: &AggregatorConfig) -> HistogramStorage<N> {
        HistogramStorage {
            bounds: config.shared_boundaries(),
            record_min_max: config.record_min_max(),
            buckets: Mutex::new(Buckets::new(config.boundaries().len() + 1)),
        }
    }

    fn update(storage: &HistogramStorage<N>, value: N, _: &AggregatorConfig) {
        let f = value.into_float();
        // This search will return an index in the range `[0, bounds.len()]`, where
        // it will return `bounds.len()` if value is greater than the last element
        // of `bounds`. This aligns with the buckets in that the length of buckets
        // is `bounds.len()+1`, with the last bucket representing:
        // `(bounds[bounds.len()-1], +∞)`.
        let idx = storage.bounds.partition_point(|&x| x < f);

        let mut buckets = lock(&storage.buckets);
        buckets.bin(idx, value);
        buckets.sum(value);
    }

    fn move_into(from: &HistogramStorage<N>, to: &mut HistogramStorage<N>) {
        to.bounds = Arc::clone(&from.bounds);
        to.record_min_max = from.record_min_max;

        let out = to.buckets.get_mut().unwrap_or_else(PoisonError::into_inner);
        let mut live = lock(&from.buckets);
        std::mem::swap(&mut *live, out);
        live.reset(from.bounds.len() + 1);
    }

    fn copy_into(from: &HistogramStorage<N>, to: &mut HistogramStorage<N>) {
        to.bounds = Arc::clone(&from.bounds);
        to.record_min_max = from.record_min_max;

        let out = to.buckets.get_mut().unwrap_or_else(PoisonError::into_inner);
        out.copy_from(&lock(&from.buckets));
    }

    fn to_aggregation(storage: HistogramStorage<N>) -> Aggregation<N> {
        let buckets = storage
            .buckets
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let (min, max) = if storage.record_min_max && buckets.count > 0 {
            (Some(buckets.min), Some(buckets.max))
        } else {
            (None, None)
        };
        Aggregation::Histogram(data::Histogram {
            bounds: storage.bounds,
            bucket_counts: buckets.counts,
            count: buckets.count,
            sum: buckets.total,
            min,
            max,
        })
    }

    fn to_storage(aggregation: Aggregation<N>) -> Option<HistogramStorage<N>> {
        match aggregation {
            Aggregation::Histogram(histogram) => Some(HistogramStorage {
                bounds: histogram.bounds,
                record_min_max: histogram.min.is_some(),
                buckets: Mutex::new(Buckets {
                    counts: histogram.bucket_counts,
                    count: histogram.count,
                    total: histogram.sum,
                    min: histogram.min.unwrap_or_else(N::max),
                    max: histogram.max.unwrap_or_else(N::min),
                }),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    type M = HistogramMethods;

    fn config() -> AggregatorConfig {
        AggregatorConfig::default().with_boundaries(vec![1.0, 5.0, 10.0])
    }

    fn snapshot<N: Number>(storage: HistogramStorage<N>) -> data::Histogram<N> {
        match <M as Methods<N>>::to_aggregation(storage) {
            Aggregation::Histogram(histogram) => histogram,
            other => panic!("unexpected aggregation {other:?}"),
        }
    }

    #[test]
    fn bounds_are_inclusive_upper_limits() {
        let config = config();
        let live = <M as Methods<f64>>::init(&config);
        for value in [0.5, 1.0, 1.5, 5.0, 10.0, 11.0, -3.0] {
            <M as Methods<f64>>::update(&live, value, &config);
        }

        assert_eq!(live.bucket_counts(), vec![3, 2, 1, 1]);
        assert_eq!(live.count(), 7);
        assert_eq!(live.sum(), 26.0);

        let histogram = snapshot(live);
        assert_eq!(histogram.min, Some(-3.0));
        assert_eq!(histogram.max, Some(11.0));
        assert_eq!(&*histogram.bounds, &[1.0, 5.0, 10.0]);
    }

    #[test]
    fn move_swaps_and_resets_the_source() {
        let config = config();
        let live = <M as Methods<u64>>::init(&config);
        let mut out = <M as Methods<u64>>::init(&config);
        <M as Methods<u64>>::update(&live, 3, &config);
        <M as Methods<u64>>::update(&live, 30, &config);

        <M as Methods<u64>>::move_into(&live, &mut out);

        assert_eq!(live.count(), 0);
        assert_eq!(live.bucket_counts(), vec![0, 0, 0, 0]);
        assert_eq!(out.bucket_counts(), vec![0, 1, 0, 1]);

        // the drained source is fully usable again
        <M as Methods<u64>>::update(&live, 7, &config);
        let histogram = snapshot(live);
        assert_eq!(histogram.count, 1);
        assert_eq!((histogram.min, histogram.max), (Some(7), Some(7)));
    }

    #[test]
    fn copy_preserves_the_source() {
        let config = config();
        let live = <M as Methods<i64>>::init(&config);
        let mut out = <M as Methods<i64>>::init(&config);
        <M as Methods<i64>>::update(&live, 2, &config);

        <M as Methods<i64>>::copy_into(&live, &mut out);
        <M as Methods<i64>>::update(&live, 4, &config);
        <M as Methods<i64>>::copy_into(&live, &mut out);

        assert_eq!(live.count(), 2);
        let histogram = snapshot(out);
        assert_eq!(histogram.count, 2);
        assert_eq!(histogram.sum, 6);
        assert_eq!(histogram.bucket_counts, vec![0, 2, 0, 0]);
    }

    #[test]
    fn empty_or_unrecorded_min_max_are_absent() {
        let config = config();
        let empty = snapshot(<M as Methods<f64>>::init(&config));
        assert_eq!((empty.min, empty.max), (None, None));

        let config = config.with_record_min_max(false);
        let live = <M as Methods<f64>>::init(&config);
        <M as Methods<f64>>::update(&live, 2.0, &config);
        let histogram = snapshot(live);
        assert_eq!(histogram.count, 1);
        assert_eq!((histogram.min, histogram.max), (None, None));
    }

    #[test]
    fn reclaimed_storage_keeps_its_allocation() {
        let config = config();
        let live = <M as Methods<u64>>::init(&config);
        let out = <M as Methods<u64>>::init(&config);
        <M as Methods<u64>>::update(&live, 1, &config);

        let aggregation = <M as Methods<u64>>::to_aggregation(out);
        let counts_ptr = match &aggregation {
            Aggregation::Histogram(h) => h.bucket_counts.as_ptr(),
            _ => unreachable!(),
        };

        let mut reclaimed = <M as Methods<u64>>::to_storage(aggregation).unwrap();
        <M as Methods<u64>>::copy_into(&live, &mut reclaimed);
        let histogram = snapshot(reclaimed);

        assert_eq!(histogram.bucket_counts.as_ptr(), counts_ptr);
        assert_eq!(histogram.bucket_counts, vec![1, 0, 0, 0]);

        let sum = Aggregation::Sum(data::Sum { value: 1u64 });
        assert!(<M as Methods<u64>>::to_storage(sum).is_none());
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let config = config();
        let live = <M as Methods<u64>>::init(&config);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for i in 0..1000 {
                        <M as Methods<u64>>::update(&live, i % 12, &config);
                    }
                });
            }
        });

        assert_eq!(live.count(), 4000);
        assert_eq!(live.bucket_counts().iter().sum::<u64>(), 4000);
    }
}

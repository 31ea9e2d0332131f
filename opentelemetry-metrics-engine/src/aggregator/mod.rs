//! Aggregation methods and the numbers they aggregate.
//!
//! An aggregation method is a stateless type implementing [`Methods`] over an
//! accumulator type, its [`Methods::Storage`]. The engine keeps one storage
//! per instrument and attribute set, feeds measurements to
//! [`Methods::update`] and, at collection time, either moves (delta) or copies
//! (cumulative) the live storage into an output storage that is then turned
//! into an exportable [`Aggregation`].
//!
//! Each storage type owns its synchronization: updates to the same storage may
//! happen concurrently with each other and with a collection.

use core::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    data::{Aggregation, InstrumentData, Point, ReusableArray},
    error::{MetricError, MetricResult},
    instrument::NumberKind,
};

mod histogram;
mod last_value;
mod precomputed_sum;
mod sum;

pub use histogram::{HistogramMethods, HistogramStorage};
pub use last_value::{LastValueMethods, LastValueStorage};
pub use precomputed_sum::{PrecomputedSumMethods, PrecomputedSumStorage};
pub use sum::{SumMethods, SumStorage};

/// Default boundaries of explicit bucket histograms.
pub const DEFAULT_HISTOGRAM_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

/// Identifies an aggregation method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    /// Adds every measurement to a running sum.
    Sum,
    /// Receives running sums computed by the caller.
    PrecomputedSum,
    /// Keeps the last measurement.
    LastValue,
    /// Counts measurements into explicit buckets.
    Histogram,
}

/// Per-instrument configuration handed to every accumulator.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatorConfig {
    boundaries: Arc<[f64]>,
    record_min_max: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            boundaries: Arc::from(&DEFAULT_HISTOGRAM_BOUNDARIES[..]),
            record_min_max: true,
        }
    }
}

impl AggregatorConfig {
    /// Sets the upper bounds of the histogram buckets.
    ///
    /// Boundaries must be finite and strictly increasing; this is checked when
    /// the instrument is registered.
    pub fn with_boundaries(mut self, boundaries: impl Into<Vec<f64>>) -> Self {
        self.boundaries = Arc::from(boundaries.into());
        self
    }

    /// Whether histograms report the minimum and maximum recorded values.
    pub fn with_record_min_max(mut self, record_min_max: bool) -> Self {
        self.record_min_max = record_min_max;
        self
    }

    /// The histogram bucket boundaries.
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Whether histograms report min and max.
    pub fn record_min_max(&self) -> bool {
        self.record_min_max
    }

    pub(crate) fn shared_boundaries(&self) -> Arc<[f64]> {
        Arc::clone(&self.boundaries)
    }

    pub(crate) fn validate(&self) -> MetricResult<()> {
        if let Some(bound) = self.boundaries.iter().find(|b| !b.is_finite()) {
            return Err(MetricError::Config(format!(
                "histogram boundaries must be finite, found {bound}"
            )));
        }
        for pair in self.boundaries.windows(2) {
            if pair[0] >= pair[1] {
                return Err(MetricError::Config(format!(
                    "histogram boundaries must be strictly increasing: {:?}",
                    self.boundaries
                )));
            }
        }
        Ok(())
    }
}

/// The operations an aggregation method provides over its accumulator.
pub trait Methods<N: Number>: Send + Sync + 'static {
    /// The accumulator type.
    type Storage: Send + Sync + 'static;

    /// The kind of aggregation this method implements.
    fn kind() -> AggregationKind;

    /// Returns a zero-state accumulator sized from `config`.
    fn init(config: &AggregatorConfig) -> Self::Storage;

    /// Applies one measurement. Safe to call concurrently on the same storage.
    fn update(storage: &Self::Storage, value: N, config: &AggregatorConfig);

    /// Transfers the state of `from` into `to`, leaving `from` equivalent to a
    /// fresh accumulator.
    fn move_into(from: &Self::Storage, to: &mut Self::Storage);

    /// Duplicates the state of `from` into `to`, leaving `from` untouched.
    fn copy_into(from: &Self::Storage, to: &mut Self::Storage);

    /// Turns an output accumulator into an exportable snapshot.
    fn to_aggregation(storage: Self::Storage) -> Aggregation<N>;

    /// Reclaims the accumulator behind a previous snapshot.
    ///
    /// `None` when the snapshot was produced by another kind of aggregation,
    /// in which case the caller allocates a fresh one.
    fn to_storage(aggregation: Aggregation<N>) -> Option<Self::Storage>;
}

/// Marks a type that can have a value added and retrieved atomically. Required since
/// different types have different backing atomic mechanisms
pub trait AtomicValue<T>: Sync + Send + 'static {
    /// Adds `value` to the current value.
    fn add(&self, value: T);
    /// Replaces the current value.
    fn store(&self, value: T);
    /// Reads the current value, resetting it to zero when `reset` is set.
    fn get_value(&self, reset: bool) -> T;
}

/// Marks a type that can have an atomic value generated for it
pub trait AtomicallyUpdate<T> {
    /// The backing atomic mechanism.
    type AtomicValue: AtomicValue<T> + fmt::Debug;
    /// Returns an atomic value initialized to `value`.
    fn new_atomic_value(value: T) -> Self::AtomicValue;
}

/// The numbers instruments can be declared over: `i64`, `u64` and `f64`.
pub trait Number:
    Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + PartialOrd
    + fmt::Debug
    + Clone
    + Copy
    + PartialEq
    + Default
    + Send
    + Sync
    + 'static
    + AtomicallyUpdate<Self>
{
    /// The number kind recorded in the descriptor of instruments over `Self`.
    const KIND: NumberKind;

    /// The smallest representable value.
    fn min() -> Self;
    /// The largest representable value.
    fn max() -> Self;

    /// Converts to `f64`, with precision loss for large integers.
    fn into_float(self) -> f64;

    /// The points of `data` when they are of this number type.
    fn points(data: &InstrumentData) -> Option<&ReusableArray<Point<Self>>>;

    /// The points of `data` as this number type, replacing points of any
    /// other type with an empty array.
    #[doc(hidden)]
    fn points_mut(data: &mut InstrumentData) -> &mut ReusableArray<Point<Self>>;
}

macro_rules! impl_number {
    ($t:ty, $kind:ident, $variant:ident) => {
        impl Number for $t {
            const KIND: NumberKind = NumberKind::$kind;

            fn min() -> Self {
                <$t>::MIN
            }

            fn max() -> Self {
                <$t>::MAX
            }

            fn into_float(self) -> f64 {
                // May have precision loss at high values
                self as f64
            }

            fn points(data: &InstrumentData) -> Option<&ReusableArray<Point<Self>>> {
                match data {
                    InstrumentData::$variant(points) => Some(points),
                    _ => None,
                }
            }

            fn points_mut(data: &mut InstrumentData) -> &mut ReusableArray<Point<Self>> {
                if !matches!(data, InstrumentData::$variant(_)) {
                    *data = InstrumentData::$variant(ReusableArray::default());
                }
                match data {
                    InstrumentData::$variant(points) => points,
                    _ => unreachable!("points replaced above"),
                }
            }
        }
    };
}

impl_number!(i64, I64, I64);
impl_number!(u64, U64, U64);
impl_number!(f64, F64, F64);

impl AtomicValue<u64> for AtomicU64 {
    fn add(&self, value: u64) {
        self.fetch_add(value, Ordering::Relaxed);
    }

    fn store(&self, value: u64) {
        AtomicU64::store(self, value, Ordering::Relaxed);
    }

    fn get_value(&self, reset: bool) -> u64 {
        if reset {
            self.swap(0, Ordering::Relaxed)
        } else {
            self.load(Ordering::Relaxed)
        }
    }
}

impl AtomicallyUpdate<u64> for u64 {
    type AtomicValue = AtomicU64;

    fn new_atomic_value(value: u64) -> Self::AtomicValue {
        AtomicU64::new(value)
    }
}

impl AtomicValue<i64> for AtomicI64 {
    fn add(&self, value: i64) {
        self.fetch_add(value, Ordering::Relaxed);
    }

    fn store(&self, value: i64) {
        AtomicI64::store(self, value, Ordering::Relaxed);
    }

    fn get_value(&self, reset: bool) -> i64 {
        if reset {
            self.swap(0, Ordering::Relaxed)
        } else {
            self.load(Ordering::Relaxed)
        }
    }
}

impl AtomicallyUpdate<i64> for i64 {
    type AtomicValue = AtomicI64;

    fn new_atomic_value(value: i64) -> Self::AtomicValue {
        AtomicI64::new(value)
    }
}

/// Floating points don't have true atomics, so a mutex stands in for them.
#[derive(Debug)]
pub struct F64AtomicValue {
    inner: Mutex<f64>,
}

impl AtomicValue<f64> for F64AtomicValue {
    fn add(&self, value: f64) {
        *lock(&self.inner) += value;
    }

    fn store(&self, value: f64) {
        *lock(&self.inner) = value;
    }

    fn get_value(&self, reset: bool) -> f64 {
        let mut guard = lock(&self.inner);
        if reset {
            std::mem::take(&mut *guard)
        } else {
            *guard
        }
    }
}

impl AtomicallyUpdate<f64> for f64 {
    type AtomicValue = F64AtomicValue;

    fn new_atomic_value(value: f64) -> Self::AtomicValue {
        F64AtomicValue {
            inner: Mutex::new(value),
        }
    }
}

/// Locks `mutex`, recovering the data of a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_add_and_get_u64_atomic_value() {
        let atomic = u64::new_atomic_value(0);
        atomic.add(15);
        atomic.add(10);

        assert_eq!(atomic.get_value(false), 25);
    }

    #[test]
    fn can_reset_u64_atomic_value() {
        let atomic = u64::new_atomic_value(0);
        atomic.add(15);

        let value = atomic.get_value(true);
        let value2 = atomic.get_value(false);

        assert_eq!(value, 15, "Incorrect first value");
        assert_eq!(value2, 0, "Incorrect second value");
    }

    #[test]
    fn can_add_and_get_i64_atomic_value() {
        let atomic = i64::new_atomic_value(0);
        atomic.add(15);
        atomic.add(-10);

        assert_eq!(atomic.get_value(false), 5);
    }

    #[test]
    fn can_store_i64_atomic_value() {
        let atomic = i64::new_atomic_value(3);
        AtomicValue::store(&atomic, -7);

        assert_eq!(atomic.get_value(true), -7);
        assert_eq!(atomic.get_value(false), 0);
    }

    #[test]
    fn can_add_and_get_f64_atomic_value() {
        let atomic = f64::new_atomic_value(0.0);
        atomic.add(15.3);
        atomic.add(10.4);

        let value = atomic.get_value(false);

        assert!(f64::abs(25.7 - value) < 0.0001);
    }

    #[test]
    fn can_reset_f64_atomic_value() {
        let atomic = f64::new_atomic_value(0.0);
        atomic.add(15.5);

        let value = atomic.get_value(true);
        let value2 = atomic.get_value(false);

        assert!(f64::abs(15.5 - value) < 0.0001, "Incorrect first value");
        assert!(f64::abs(0.0 - value2) < 0.0001, "Incorrect second value");
    }

    #[test]
    fn points_mut_replaces_other_number_kinds() {
        let mut data = InstrumentData::I64(ReusableArray::default());
        assert!(u64::points(&data).is_none());

        u64::points_mut(&mut data).reallocate();

        assert!(i64::points(&data).is_none());
        assert_eq!(u64::points(&data).map(|p| p.len()), Some(1));
    }

    #[test]
    fn default_config_is_valid() {
        let config = AggregatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.boundaries(), &DEFAULT_HISTOGRAM_BOUNDARIES);
        assert!(config.record_min_max());
    }

    #[test]
    fn rejects_invalid_boundaries() {
        for boundaries in [vec![1.0, 1.0], vec![5.0, 2.0], vec![0.0, f64::NAN]] {
            let config = AggregatorConfig::default().with_boundaries(boundaries.clone());
            assert!(
                matches!(config.validate(), Err(MetricError::Config(_))),
                "{boundaries:?}"
            );
        }
    }
}

//! Types for delivery of collected metric data.
//!
//! Every collection writes into a [`Collection`]: one [`Instrument`] per
//! registered instrument, in registration order, each holding one [`Point`]
//! per attribute set. The arrays backing both levels are reused between
//! collections, so a caller that keeps passing the same `Collection` back to
//! the engine reaches a steady state without further allocation.

use std::{sync::Arc, time::SystemTime};

use crate::{
    aggregator::{AggregationKind, Number},
    attributes::AttributeSet,
    instrument::Descriptor,
    temporality::Temporality,
};

mod reusable;

pub use reusable::ReusableArray;

/// The reusable output of a collection cycle.
pub type Collection = ReusableArray<Instrument>;

/// The sum of all measurements of an attribute set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sum<T> {
    /// The running total (cumulative) or the change over the interval (delta).
    pub value: T,
}

/// The last value observed for an attribute set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gauge<T> {
    /// `None` when nothing was observed (since the previous collection, for
    /// delta temporality).
    pub value: Option<T>,
}

/// The distribution of measurements of an attribute set.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram<T> {
    /// The upper bounds of the buckets of the histogram.
    ///
    /// Because the last boundary is +infinity this one is implied.
    pub bounds: Arc<[f64]>,
    /// The count of each of the buckets, `bounds.len() + 1` entries.
    pub bucket_counts: Vec<u64>,
    /// The number of updates this histogram has been calculated with.
    pub count: u64,
    /// The sum of the values recorded.
    pub sum: T,
    /// The minimum value recorded, `None` when `count` is zero.
    pub min: Option<T>,
    /// The maximum value recorded, `None` when `count` is zero.
    pub max: Option<T>,
}

/// An exportable snapshot of one accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation<T> {
    /// Produced by the sum and precomputed sum aggregators.
    Sum(Sum<T>),
    /// Produced by the last value aggregator.
    Gauge(Gauge<T>),
    /// Produced by the explicit bucket histogram aggregator.
    Histogram(Histogram<T>),
}

impl<T> Aggregation<T> {
    /// The kind of aggregation this snapshot was produced by.
    ///
    /// Sums of observed totals report [AggregationKind::Sum] here; the
    /// instrument's [Instrument::aggregation] tells them apart.
    pub fn kind(&self) -> AggregationKind {
        match self {
            Aggregation::Sum(_) => AggregationKind::Sum,
            Aggregation::Gauge(_) => AggregationKind::LastValue,
            Aggregation::Histogram(_) => AggregationKind::Histogram,
        }
    }
}

/// A single point of a time series.
#[derive(Debug, Clone, PartialEq)]
pub struct Point<T> {
    /// The set of key value pairs that uniquely identify the time series.
    pub attributes: AttributeSet,
    /// The snapshot. Always present on points inside a collected instrument.
    pub aggregation: Option<Aggregation<T>>,
    /// The temporality the snapshot was produced under.
    pub temporality: Temporality,
    /// Inclusive start of the interval the snapshot covers.
    pub start_time: SystemTime,
    /// Exclusive end of the interval the snapshot covers.
    pub time: SystemTime,
}

impl<T> Default for Point<T> {
    fn default() -> Self {
        Point {
            attributes: AttributeSet::default(),
            aggregation: None,
            temporality: Temporality::Undefined,
            start_time: SystemTime::UNIX_EPOCH,
            time: SystemTime::UNIX_EPOCH,
        }
    }
}

/// The points of an instrument, typed by its number kind.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentData {
    /// Points of an `i64` instrument.
    I64(ReusableArray<Point<i64>>),
    /// Points of a `u64` instrument.
    U64(ReusableArray<Point<u64>>),
    /// Points of an `f64` instrument.
    F64(ReusableArray<Point<f64>>),
}

impl InstrumentData {
    /// Number of points collected for the instrument.
    pub fn len(&self) -> usize {
        match self {
            InstrumentData::I64(points) => points.len(),
            InstrumentData::U64(points) => points.len(),
            InstrumentData::F64(points) => points.len(),
        }
    }

    /// Returns `true` when no points were collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One collected instrument: its descriptor and its points.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    /// The descriptor of the instrument, including the merged description.
    pub descriptor: Arc<Descriptor>,
    /// The aggregation the instrument's points were computed with.
    pub aggregation: AggregationKind,
    /// The aggregated points.
    pub data: InstrumentData,
}

impl Instrument {
    pub(crate) fn new(descriptor: Arc<Descriptor>, aggregation: AggregationKind) -> Self {
        Instrument {
            descriptor,
            aggregation,
            data: InstrumentData::I64(ReusableArray::default()),
        }
    }

    /// The points of the instrument when it was declared over `T`.
    pub fn points<T: Number>(&self) -> Option<&[Point<T>]> {
        T::points(&self.data).map(ReusableArray::as_slice)
    }
}

use crate::data::{self, Aggregation};

use super::{AggregationKind, AggregatorConfig, AtomicValue, AtomicallyUpdate, Methods, Number};

/// Accumulator of the [`SumMethods`] aggregation.
///
/// Integer sums are lock-free atomics; `f64` sums sit behind a mutex.
#[derive(Debug)]
pub struct SumStorage<N: Number> {
    value: N::AtomicValue,
}

impl<N: Number> SumStorage<N> {
    /// The current sum.
    pub fn value(&self) -> N {
        self.value.get_value(false)
    }
}

/// Adds every measurement to a running sum.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumMethods;

impl<N: Number> Methods<N> for SumMethods {
    type Storage = SumStorage<N>;

    fn kind() -> AggregationKind {
        AggregationKind::Sum
    }

    fn init(_: &AggregatorConfig) -> SumStorage<N> {
        SumStorage {
            value: N::new_atomic_value(N::default()),
        }
    }

    fn update(storage: &SumStorage<N>, value: N, _: &AggregatorConfig) {
        storage.value.add(value);
    }

    fn move_into(from: &SumStorage<N>, to: &mut SumStorage<N>) {
        to.value.store(from.value.get_value(true));
    }

    fn copy_into(from: &SumStorage<N>, to: &mut SumStorage<N>) {
        to.value.store(from.value.get_value(false));
    }

    fn to_aggregation(storage: SumStorage<N>) -> Aggregation<N> {
        Aggregation::Sum(data::Sum {
            value: storage.value(),
        })
    }

    fn to_storage(aggregation: Aggregation<N>) -> Option<SumStorage<N>> {
        match aggregation {
            Aggregation::Sum(sum) => Some(SumStorage {
                value: N::new_atomic_value(sum.value),
            }),
            _ => None,
        }
    }
}

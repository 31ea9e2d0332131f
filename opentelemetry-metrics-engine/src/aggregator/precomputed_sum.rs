use std::sync::Mutex;

use crate::data::{self, Aggregation};

use super::{lock, AggregationKind, AggregatorConfig, Methods, Number};

#[derive(Debug, Default, Clone, Copy)]
struct Observed<N> {
    // sum of the observations made since the previous collection
    round: N,
    observed: bool,
    current: N,
    reported: N,
}

impl<N: Number> Observed<N> {
    /// Closes the observation round, making its sum the current total.
    fn close_round(&mut self) -> N {
        if self.observed {
            self.current = self.round;
            self.round = N::default();
            self.observed = false;
        }
        self.current
    }
}

/// Accumulator of the [`PrecomputedSumMethods`] aggregation, guarded by a
/// mutex.
///
/// Adds up the totals observed in the current round, and keeps the total of
/// the last closed round and the total last reported as a delta.
#[derive(Debug)]
pub struct PrecomputedSumStorage<N> {
    inner: Mutex<Observed<N>>,
}

impl<N: Number> PrecomputedSumStorage<N> {
    fn with_value(current: N) -> Self {
        PrecomputedSumStorage {
            inner: Mutex::new(Observed {
                current,
                ..Default::default()
            }),
        }
    }

    /// The latest observed total: the sum of the open round when anything was
    /// observed in it, the total of the last round otherwise.
    pub fn value(&self) -> N {
        let observed = lock(&self.inner);
        if observed.observed {
            observed.round
        } else {
            observed.current
        }
    }
}

/// Summarizes running totals observed by callbacks.
///
/// Observations made between two collections are added together, so attribute
/// sets merged by a key filter report their combined total. Each collection
/// closes the round: its sum replaces the previous total. A delta collection
/// reports the change since the previous delta collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecomputedSumMethods;

impl<N: Number> Methods<N> for PrecomputedSumMethods {
    type Storage = PrecomputedSumStorage<N>;

    fn kind() -> AggregationKind {
        AggregationKind::PrecomputedSum
    }

    fn init(_: &AggregatorConfig) -> PrecomputedSumStorage<N> {
        PrecomputedSumStorage::with_value(N::default())
    }

    fn update(storage: &PrecomputedSumStorage<N>, value: N, _: &AggregatorConfig) {
        let mut observed = lock(&storage.inner);
        observed.round += value;
        observed.observed = true;
    }

    fn move_into(from: &PrecomputedSumStorage<N>, to: &mut PrecomputedSumStorage<N>) {
        let mut from = lock(&from.inner);
        let current = from.close_round();
        // a total below the last reported one means the source restarted
        let delta = if current >= from.reported {
            current - from.reported
        } else {
            current
        };
        from.reported = current;

        let to = to.inner.get_mut().unwrap_or_else(|err| err.into_inner());
        *to = Observed {
            current: delta,
            ..Default::default()
        };
    }

    fn copy_into(from: &PrecomputedSumStorage<N>, to: &mut PrecomputedSumStorage<N>) {
        let current = lock(&from.inner).close_round();

        let to = to.inner.get_mut().unwrap_or_else(|err| err.into_inner());
        *to = Observed {
            current,
            ..Default::default()
        };
    }

    fn to_aggregation(storage: PrecomputedSumStorage<N>) -> Aggregation<N> {
        let observed = storage
            .inner
            .into_inner()
            .unwrap_or_else(|err| err.into_inner());
        Aggregation::Sum(data::Sum {
            value: observed.current,
        })
    }

    fn to_storage(aggregation: Aggregation<N>) -> Option<PrecomputedSumStorage<N>> {
        match aggregation {
            Aggregation::Sum(sum) => Some(PrecomputedSumStorage::with_value(sum.value)),
            _ => None,
        }
    }
}

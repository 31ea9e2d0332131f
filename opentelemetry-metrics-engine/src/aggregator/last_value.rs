use std::sync::{Mutex, PoisonError};

use crate::data::{self, Aggregation};

use super::{lock, AggregationKind, AggregatorConfig, Methods, Number};

/// Accumulator of the [`LastValueMethods`] aggregation, guarded by a mutex.
#[derive(Debug)]
pub struct LastValueStorage<N> {
    value: Mutex<Option<N>>,
}

impl<N: Number> LastValueStorage<N> {
    /// The last measurement, if any.
    pub fn value(&self) -> Option<N> {
        *lock(&self.value)
    }
}

/// Keeps the last measurement only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastValueMethods;

impl<N: Number> Methods<N> for LastValueMethods {
    type Storage = LastValueStorage<N>;

    fn kind() -> AggregationKind {
        AggregationKind::LastValue
    }

    fn init(_: &AggregatorConfig) -> LastValueStorage<N> {
        LastValueStorage {
            value: Mutex::new(None),
        }
    }

    fn update(storage: &LastValueStorage<N>, value: N, _: &AggregatorConfig) {
        *lock(&storage.value) = Some(value);
    }

    fn move_into(from: &LastValueStorage<N>, to: &mut LastValueStorage<N>) {
        let value = lock(&from.value).take();
        *to.value.get_mut().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn copy_into(from: &LastValueStorage<N>, to: &mut LastValueStorage<N>) {
        let value = *lock(&from.value);
        *to.value.get_mut().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn to_aggregation(storage: LastValueStorage<N>) -> Aggregation<N> {
        Aggregation::Gauge(data::Gauge {
            value: storage
                .value
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        })
    }

    fn to_storage(aggregation: Aggregation<N>) -> Option<LastValueStorage<N>> {
        match aggregation {
            Aggregation::Gauge(gauge) => Some(LastValueStorage {
                value: Mutex::new(gauge.value),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type M = LastValueMethods;

    #[test]
    fn keeps_the_last_measurement() {
        let config = AggregatorConfig::default();
        let live = <M as Methods<f64>>::init(&config);
        assert_eq!(live.value(), None);

        <M as Methods<f64>>::update(&live, 0.5, &config);
        <M as Methods<f64>>::update(&live, 0.25, &config);

        assert_eq!(live.value(), Some(0.25));
    }

    #[test]
    fn move_empties_and_copy_keeps() {
        let config = AggregatorConfig::default();
        let live = <M as Methods<i64>>::init(&config);
        let mut out = <M as Methods<i64>>::init(&config);
        <M as Methods<i64>>::update(&live, -3, &config);

        <M as Methods<i64>>::copy_into(&live, &mut out);
        assert_eq!((live.value(), out.value()), (Some(-3), Some(-3)));

        <M as Methods<i64>>::move_into(&live, &mut out);
        assert_eq!((live.value(), out.value()), (None, Some(-3)));

        // an idle interval is reported as empty
        <M as Methods<i64>>::move_into(&live, &mut out);
        assert_eq!(
            <M as Methods<i64>>::to_aggregation(out),
            Aggregation::Gauge(data::Gauge { value: None })
        );
    }

    #[test]
    fn reclaims_gauge_snapshots_only() {
        let gauge = Aggregation::Gauge(data::Gauge { value: Some(9u64) });
        assert_eq!(
            <M as Methods<u64>>::to_storage(gauge).and_then(|s| s.value()),
            Some(9)
        );

        let sum = Aggregation::Sum(data::Sum { value: 9u64 });
        assert!(<M as Methods<u64>>::to_storage(sum).is_none());
    }
}

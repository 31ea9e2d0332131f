use std::{fmt, str::FromStr, sync::Arc};

use crate::{
    error::{MetricError, MetricResult},
    instrument::InstrumentKind,
};

/// Defines the window that an aggregation was calculated over.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Temporality {
    /// No temporality was chosen. Never attached to an emitted point.
    #[default]
    Undefined,

    /// A measurement interval that continues to expand forward in time from a
    /// starting point.
    ///
    /// New measurements are added to all previous measurements since a start time.
    Cumulative,

    /// A measurement interval that resets each cycle.
    ///
    /// Measurements from one cycle are recorded independently, measurements from
    /// other cycles do not affect them.
    Delta,
}

type SelectorFn = Arc<dyn Fn(InstrumentKind) -> Temporality + Send + Sync>;

/// Chooses the [Temporality] an instrument is reported in from its kind.
///
/// Up-down-counters, synchronous or not, are always reported as
/// [Temporality::Cumulative] whatever the wrapped function returns: a delta
/// up-down-counter has no total a consumer can rebuild.
#[derive(Clone)]
pub struct TemporalitySelector {
    select: SelectorFn,
}

impl TemporalitySelector {
    /// Wraps an arbitrary kind to temporality function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(InstrumentKind) -> Temporality + Send + Sync + 'static,
    {
        TemporalitySelector {
            select: Arc::new(f),
        }
    }

    /// Uses `sync` for synchronous instruments and `asynchronous` for
    /// observable ones.
    pub fn with_preferences(sync: Temporality, asynchronous: Temporality) -> Self {
        TemporalitySelector::new(move |kind| {
            if kind.synchronous() {
                sync
            } else {
                asynchronous
            }
        })
    }

    /// Reports everything cumulatively.
    pub fn cumulative() -> Self {
        TemporalitySelector::with_preferences(Temporality::Cumulative, Temporality::Cumulative)
    }

    /// Reports everything but up-down-counters as deltas.
    pub fn delta() -> Self {
        TemporalitySelector::with_preferences(Temporality::Delta, Temporality::Delta)
    }

    /// Synchronous instruments report deltas; observable instruments, whose
    /// callbacks already produce totals, stay cumulative.
    pub fn stateless() -> Self {
        TemporalitySelector::with_preferences(Temporality::Delta, Temporality::Cumulative)
    }

    /// The temporality to use for instruments of `kind`.
    pub fn temporality(&self, kind: InstrumentKind) -> Temporality {
        match kind {
            InstrumentKind::UpDownCounter | InstrumentKind::ObservableUpDownCounter => {
                Temporality::Cumulative
            }
            _ => (self.select)(kind),
        }
    }
}

impl Default for TemporalitySelector {
    fn default() -> Self {
        TemporalitySelector::cumulative()
    }
}

impl fmt::Debug for TemporalitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TemporalitySelector")
    }
}

/// The temporality preference named by configuration.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum TemporalityPreference {
    /// Everything cumulative. Selected by `""` and `"cumulative"`.
    #[default]
    Cumulative,
    /// Everything delta except up-down-counters. Selected by `"delta"`.
    Delta,
    /// Synchronous instruments delta, observable instruments cumulative.
    /// Selected by `"stateless"`.
    Stateless,
}

impl TemporalityPreference {
    /// The selector implementing this preference.
    pub fn selector(&self) -> TemporalitySelector {
        match self {
            TemporalityPreference::Cumulative => TemporalitySelector::cumulative(),
            TemporalityPreference::Delta => TemporalitySelector::delta(),
            TemporalityPreference::Stateless => TemporalitySelector::stateless(),
        }
    }
}

impl FromStr for TemporalityPreference {
    type Err = MetricError;

    fn from_str(s: &str) -> MetricResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "cumulative" => Ok(TemporalityPreference::Cumulative),
            "delta" => Ok(TemporalityPreference::Delta),
            "stateless" => Ok(TemporalityPreference::Stateless),
            _ => Err(MetricError::Config(format!(
                "invalid temporality preference: {s}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ALL_KINDS: [InstrumentKind; 6] = [
        InstrumentKind::Counter,
        InstrumentKind::UpDownCounter,
        InstrumentKind::Histogram,
        InstrumentKind::ObservableCounter,
        InstrumentKind::ObservableUpDownCounter,
        InstrumentKind::ObservableGauge,
    ];

    #[rstest]
    #[case("", TemporalityPreference::Cumulative)]
    #[case("cumulative", TemporalityPreference::Cumulative)]
    #[case("Delta", TemporalityPreference::Delta)]
    #[case("STATELESS", TemporalityPreference::Stateless)]
    fn parses_known_preferences(#[case] input: &str, #[case] expected: TemporalityPreference) {
        assert_eq!(input.parse::<TemporalityPreference>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_preference() {
        let err = "lowmemory".parse::<TemporalityPreference>().unwrap_err();
        assert!(matches!(err, MetricError::Config(msg) if msg.contains("lowmemory")));
    }

    #[rstest]
    #[case(TemporalityPreference::Cumulative)]
    #[case(TemporalityPreference::Delta)]
    #[case(TemporalityPreference::Stateless)]
    fn up_down_counters_are_always_cumulative(#[case] preference: TemporalityPreference) {
        let selector = preference.selector();
        assert_eq!(
            selector.temporality(InstrumentKind::UpDownCounter),
            Temporality::Cumulative
        );
        assert_eq!(
            selector.temporality(InstrumentKind::ObservableUpDownCounter),
            Temporality::Cumulative
        );
    }

    #[test]
    fn stateless_splits_sync_and_async() {
        let selector = TemporalityPreference::Stateless.selector();
        assert_eq!(
            selector.temporality(InstrumentKind::Counter),
            Temporality::Delta
        );
        assert_eq!(
            selector.temporality(InstrumentKind::Histogram),
            Temporality::Delta
        );
        assert_eq!(
            selector.temporality(InstrumentKind::ObservableCounter),
            Temporality::Cumulative
        );
        assert_eq!(
            selector.temporality(InstrumentKind::ObservableGauge),
            Temporality::Cumulative
        );
    }

    #[test]
    fn custom_selector_cannot_make_up_down_counters_delta() {
        let selector = TemporalitySelector::new(|_| Temporality::Delta);
        for kind in ALL_KINDS {
            let expected = match kind {
                InstrumentKind::UpDownCounter | InstrumentKind::ObservableUpDownCounter => {
                    Temporality::Cumulative
                }
                _ => Temporality::Delta,
            };
            assert_eq!(selector.temporality(kind), expected, "{kind:?}");
        }
    }
}

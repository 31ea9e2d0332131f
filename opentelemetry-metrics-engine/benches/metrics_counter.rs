use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use opentelemetry::KeyValue;
use opentelemetry_metrics_engine::{
    data::Collection, Descriptor, InstrumentKind, KeyFilter, MetricsEngine, Recorder,
    TemporalityPreference,
};
use rand::{
    rngs::{self},
    Rng, SeedableRng,
};
use std::cell::RefCell;

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

static ATTRIBUTE_VALUES: [&str; 10] = [
    "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
    "value10",
];

// Run this benchmark with:
// cargo bench --bench metrics_counter
fn create_counter(engine: &MetricsEngine, name: &'static str) -> Recorder<u64> {
    engine
        .instrument::<u64>(Descriptor::new(name, InstrumentKind::Counter))
        .build()
        .expect("valid instrument")
}

fn random_indexes() -> [usize; 4] {
    // 4*4*10*10 = 1600 time series.
    CURRENT_RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        [
            rng.random_range(0..4),
            rng.random_range(0..4),
            rng.random_range(0..10),
            rng.random_range(0..10),
        ]
    })
}

fn criterion_benchmark(c: &mut Criterion) {
    counter_add_sorted(c);
    counter_add_unsorted(c);
    counter_add_filtered(c);
    counter_collect(c);
}

fn counter_add_sorted(c: &mut Criterion) {
    let engine = MetricsEngine::default();
    let counter = create_counter(&engine, "Counter_Add_Sorted");
    c.bench_function("Counter_Add_Sorted", |b| {
        b.iter_batched(
            random_indexes,
            |rands| {
                counter.record(
                    1,
                    &[
                        KeyValue::new("attribute1", ATTRIBUTE_VALUES[rands[0]]),
                        KeyValue::new("attribute2", ATTRIBUTE_VALUES[rands[1]]),
                        KeyValue::new("attribute3", ATTRIBUTE_VALUES[rands[2]]),
                        KeyValue::new("attribute4", ATTRIBUTE_VALUES[rands[3]]),
                    ],
                );
            },
            BatchSize::SmallInput,
        );
    });
}

fn counter_add_unsorted(c: &mut Criterion) {
    let engine = MetricsEngine::default();
    let counter = create_counter(&engine, "Counter_Add_Unsorted");
    c.bench_function("Counter_Add_Unsorted", |b| {
        b.iter_batched(
            random_indexes,
            |rands| {
                counter.record(
                    1,
                    &[
                        KeyValue::new("attribute2", ATTRIBUTE_VALUES[rands[1]]),
                        KeyValue::new("attribute3", ATTRIBUTE_VALUES[rands[2]]),
                        KeyValue::new("attribute1", ATTRIBUTE_VALUES[rands[0]]),
                        KeyValue::new("attribute4", ATTRIBUTE_VALUES[rands[3]]),
                    ],
                );
            },
            BatchSize::SmallInput,
        );
    });
}

fn counter_add_filtered(c: &mut Criterion) {
    let engine = MetricsEngine::default();
    let counter = engine
        .instrument::<u64>(Descriptor::new("Counter_Add_Filtered", InstrumentKind::Counter))
        .with_key_filter(KeyFilter::allow_keys(["attribute1", "attribute2"]))
        .build()
        .expect("valid instrument");
    c.bench_function("Counter_Add_Filtered", |b| {
        b.iter_batched(
            random_indexes,
            |rands| {
                counter.record(
                    1,
                    &[
                        KeyValue::new("attribute1", ATTRIBUTE_VALUES[rands[0]]),
                        KeyValue::new("attribute2", ATTRIBUTE_VALUES[rands[1]]),
                        KeyValue::new("attribute3", ATTRIBUTE_VALUES[rands[2]]),
                        KeyValue::new("attribute4", ATTRIBUTE_VALUES[rands[3]]),
                    ],
                );
            },
            BatchSize::SmallInput,
        );
    });
}

fn counter_collect(c: &mut Criterion) {
    for preference in [TemporalityPreference::Delta, TemporalityPreference::Cumulative] {
        let engine = MetricsEngine::builder()
            .with_temporality_preference(preference)
            .build();
        let counter = create_counter(&engine, "Counter_Collect");
        for first in 0..4 {
            for second in 0..4 {
                for third in 0..10 {
                    for fourth in 0..10 {
                        counter.record(
                            1,
                            &[
                                KeyValue::new("attribute1", ATTRIBUTE_VALUES[first]),
                                KeyValue::new("attribute2", ATTRIBUTE_VALUES[second]),
                                KeyValue::new("attribute3", ATTRIBUTE_VALUES[third]),
                                KeyValue::new("attribute4", ATTRIBUTE_VALUES[fourth]),
                            ],
                        );
                    }
                }
            }
        }

        let mut collection = Collection::default();
        c.bench_function(&format!("Counter_Collect_1600_{preference:?}"), |b| {
            b.iter(|| engine.collect(&mut collection));
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

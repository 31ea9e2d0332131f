//! # OpenTelemetry Metrics Engine
//!
//! The in-memory core of a metrics pipeline: instrument storage keyed by
//! attribute set, pluggable aggregation methods, and the cumulative/delta
//! conversion performed on every collection cycle.
//!
//! Measurements enter through a [`Recorder`], are resolved to a per attribute
//! set accumulator under a short instrument lock, and are applied to that
//! accumulator outside of the lock. A collection walks every registered
//! instrument and either *moves* (delta) or *copies* (cumulative) each
//! accumulator into a reusable output [`data::Point`].
//!
//! ## Getting Started
//!
//! ```
//! use opentelemetry::KeyValue;
//! use opentelemetry_metrics_engine::{
//!     data::Collection, Descriptor, InstrumentKind, MetricsEngine, TemporalityPreference,
//! };
//!
//! # fn main() -> opentelemetry_metrics_engine::MetricResult<()> {
//! let preference: TemporalityPreference = "delta".parse()?;
//! let engine = MetricsEngine::builder()
//!     .with_temporality_selector(preference.selector())
//!     .build();
//!
//! let requests = engine
//!     .instrument::<u64>(Descriptor::new("http.requests", InstrumentKind::Counter))
//!     .with_description("Number of handled requests")
//!     .build()?;
//! requests.record(1, &[KeyValue::new("http.method", "GET")]);
//!
//! let mut collection = Collection::default();
//! engine.collect(&mut collection);
//! assert_eq!(collection.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Feature Flags
//!
//! * `internal-logs`: emits the engine's own diagnostics through
//!   `opentelemetry`'s internal logging macros (enabled by default).
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

pub mod aggregator;
mod attributes;
mod config;
pub mod data;
mod engine;
mod error;
pub mod exporter;
pub mod global;
pub mod in_memory_exporter;
mod instrument;
pub(crate) mod internal;
mod manual_reader;
mod periodic_reader;
mod temporality;

pub use attributes::{AttributeSet, KeyFilter};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{InstrumentBuilder, MetricsEngine, MetricsEngineBuilder, Recorder};
pub use error::{MetricError, MetricResult};
pub use in_memory_exporter::{InMemoryMetricExporter, InMemoryMetricExporterBuilder};
pub use instrument::{Descriptor, InstrumentKind, NumberKind};
pub use manual_reader::ManualReader;
pub use periodic_reader::{PeriodicReader, PeriodicReaderBuilder};
pub use temporality::{Temporality, TemporalityPreference, TemporalitySelector};

use std::{env, time::Duration};

use crate::{
    engine::MetricsEngineBuilder,
    error::{MetricError, MetricResult},
    temporality::{TemporalityPreference, TemporalitySelector},
    MetricsEngine,
};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const METRICS_TEMPORALITY_PREFERENCE_NAME: &str = "OTEL_METRICS_TEMPORALITY_PREFERENCE";
const METRIC_EXPORT_INTERVAL_NAME: &str = "OTEL_METRIC_EXPORT_INTERVAL";
const METRIC_EXPORT_TIMEOUT_NAME: &str = "OTEL_METRIC_EXPORT_TIMEOUT";

/// Validated settings of a measurement pipeline.
///
/// By default everything is reported cumulatively, collected every 30 seconds,
/// and each export may take up to 30 seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    temporality_preference: TemporalityPreference,
    interval: Duration,
    timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            temporality_preference: TemporalityPreference::default(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Return default [EngineConfigBuilder]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Reads the configuration from the environment.
    ///
    /// * `OTEL_METRICS_TEMPORALITY_PREFERENCE`: `cumulative` (default), `delta`
    ///   or `stateless`.
    /// * `OTEL_METRIC_EXPORT_INTERVAL`: milliseconds between collections.
    /// * `OTEL_METRIC_EXPORT_TIMEOUT`: milliseconds an export may take.
    ///
    /// # Errors
    ///
    /// [MetricError::Config] for an unknown preference or a duration that is
    /// not a positive integer.
    pub fn from_env() -> MetricResult<Self> {
        EngineConfigBuilder::from_env()?.build()
    }

    /// The configured temporality preference.
    pub fn temporality_preference(&self) -> TemporalityPreference {
        self.temporality_preference
    }

    /// The selector implementing the configured preference.
    pub fn temporality_selector(&self) -> TemporalitySelector {
        self.temporality_preference.selector()
    }

    /// Time between two periodic collections.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time an export may take.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// An engine builder using the configured temporality preference.
    pub fn engine_builder(&self) -> MetricsEngineBuilder {
        MetricsEngine::builder().with_temporality_preference(self.temporality_preference)
    }
}

/// Configuration options for an [EngineConfig].
#[derive(Clone, Debug, Default)]
pub struct EngineConfigBuilder {
    temporality_preference: Option<TemporalityPreference>,
    interval: Option<Duration>,
    timeout: Option<Duration>,
}

impl EngineConfigBuilder {
    /// A builder seeded from the environment, see [EngineConfig::from_env].
    pub fn from_env() -> MetricResult<Self> {
        let temporality_preference = match env::var(METRICS_TEMPORALITY_PREFERENCE_NAME) {
            Ok(value) => Some(value.parse()?),
            Err(_) => None,
        };
        Ok(EngineConfigBuilder {
            temporality_preference,
            interval: millis_from_env(METRIC_EXPORT_INTERVAL_NAME)?,
            timeout: millis_from_env(METRIC_EXPORT_TIMEOUT_NAME)?,
        })
    }

    /// Sets the temporality preference.
    ///
    /// This option overrides any value set for the
    /// `OTEL_METRICS_TEMPORALITY_PREFERENCE` environment variable.
    pub fn with_temporality_preference(mut self, preference: TemporalityPreference) -> Self {
        self.temporality_preference = Some(preference);
        self
    }

    /// Configures the intervening time between collections.
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_INTERVAL`
    /// environment variable.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Configures the time an export may take.
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_TIMEOUT`
    /// environment variable.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// [MetricError::Config] when the interval or timeout is zero.
    pub fn build(self) -> MetricResult<EngineConfig> {
        let interval = self.interval.unwrap_or(DEFAULT_INTERVAL);
        if interval.is_zero() {
            return Err(MetricError::Config(
                "invalid metric reporting period: must be positive".into(),
            ));
        }
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(MetricError::Config(
                "invalid metric export timeout: must be positive".into(),
            ));
        }

        Ok(EngineConfig {
            temporality_preference: self.temporality_preference.unwrap_or_default(),
            interval,
            timeout,
        })
    }
}

fn millis_from_env(name: &str) -> MetricResult<Option<Duration>> {
    let Ok(value) = env::var(name) else {
        return Ok(None);
    };
    match value.trim().parse::<i64>() {
        Ok(millis) if millis > 0 => Ok(Some(Duration::from_millis(millis.unsigned_abs()))),
        Ok(_) => Err(MetricError::Config(format!(
            "invalid metric reporting period: {name}={value} must be positive"
        ))),
        Err(_) => Err(MetricError::Config(format!(
            "invalid {name}: {value} is not a number of milliseconds"
        ))),
    }
}

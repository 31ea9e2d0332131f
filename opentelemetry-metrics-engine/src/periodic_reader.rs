use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, Weak,
    },
    thread,
    time::{Duration, Instant},
};

use opentelemetry::{otel_debug, otel_error, otel_info, otel_warn};

use crate::{
    aggregator::lock,
    config::EngineConfig,
    data::Collection,
    engine::MetricsEngine,
    error::{MetricError, MetricResult},
    exporter::PushMetricExporter,
};

/// Configuration options for [PeriodicReader].
///
/// A periodic reader collects the engine and exports the result to the
/// exporter at a defined interval.
///
/// By default, the returned reader will collect and export data every
/// 30 seconds. The export time is not counted towards the interval between
/// attempts. PeriodicReader itself does not enforce timeout. Instead timeout
/// bounds how long flush and shutdown wait for the export they trigger.
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    interval: Duration,
    timeout: Duration,
    exporter: E,
    engine: MetricsEngine,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: PushMetricExporter,
{
    fn new(exporter: E, engine: MetricsEngine) -> Self {
        let defaults = EngineConfig::default();
        PeriodicReaderBuilder {
            interval: defaults.interval(),
            timeout: defaults.timeout(),
            exporter,
            engine,
        }
    }

    /// Takes the interval and timeout of a validated configuration.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.interval = config.interval();
        self.timeout = config.timeout();
        self
    }

    /// Configures the intervening time between exports for a [PeriodicReader].
    ///
    /// If `interval` is equal to zero the current value is kept.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Configures how long flush and shutdown wait for their export.
    ///
    /// If `timeout` is equal to zero the current value is kept.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Create a [PeriodicReader] with the given config and start its thread.
    pub fn build(self) -> PeriodicReader<E> {
        PeriodicReader::new(self.exporter, self.engine, self.interval, self.timeout)
    }
}

/// Continuously collects an engine and exports the data at a set interval.
///
/// The reader runs on a dedicated thread. [force_flush] triggers an
/// immediate export; [shutdown] performs a final export, stops the thread and
/// shuts the exporter down. Dropping the last handle without calling shutdown
/// does the same.
///
/// [force_flush]: PeriodicReader::force_flush
/// [shutdown]: PeriodicReader::shutdown
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use opentelemetry_metrics_engine::{InMemoryMetricExporter, MetricsEngine, PeriodicReader};
///
/// let engine = MetricsEngine::default();
/// let reader = PeriodicReader::builder(InMemoryMetricExporter::default(), engine)
///     .with_interval(Duration::from_secs(10))
///     .build();
/// reader.shutdown().unwrap();
/// ```
pub struct PeriodicReader<E: PushMetricExporter> {
    inner: Arc<PeriodicReaderInner<E>>,
}

impl<E: PushMetricExporter> Clone for PeriodicReader<E> {
    fn clone(&self) -> Self {
        PeriodicReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: PushMetricExporter> fmt::Debug for PeriodicReader<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader").finish()
    }
}

impl<E> PeriodicReader<E>
where
    E: PushMetricExporter,
{
    /// Configuration options for a periodic reader
    pub fn builder(exporter: E, engine: MetricsEngine) -> PeriodicReaderBuilder<E> {
        PeriodicReaderBuilder::new(exporter, engine)
    }

    fn new(exporter: E, engine: MetricsEngine, interval: Duration, timeout: Duration) -> Self {
        let (message_sender, message_receiver): (Sender<Message>, Receiver<Message>) =
            mpsc::channel();
        let reader = PeriodicReader {
            inner: Arc::new(PeriodicReaderInner {
                exporter,
                engine,
                collection: Mutex::new(Collection::default()),
                message_sender: Mutex::new(message_sender),
                is_shutdown: AtomicBool::new(false),
                timeout,
            }),
        };
        // the thread must not keep the reader alive, see `Drop for PeriodicReaderInner`
        let weak_reader = Arc::downgrade(&reader.inner);

        let result_thread_creation = thread::Builder::new()
            .name("OpenTelemetry.Metrics.PeriodicReader".to_string())
            .spawn(move || {
                let mut interval_start = Instant::now();
                let mut remaining_interval = interval;
                otel_info!(
                    name: "PeriodReaderThreadStarted",
                    interval_in_millisecs = interval.as_millis() as u64,
                    timeout_in_millisecs = timeout.as_millis() as u64
                );
                loop {
                    otel_debug!(
                        name: "PeriodReaderThreadLoopAlive",
                        message = "Next export will happen after interval, unless flush or shutdown is triggered.",
                        interval_in_millisecs = remaining_interval.as_millis() as u64
                    );
                    match message_receiver.recv_timeout(remaining_interval) {
                        Ok(Message::Flush(response_sender)) => {
                            otel_debug!(name: "PeriodReaderThreadExportingDueToFlush");
                            let result = export_with(&weak_reader);
                            let _ = response_sender.send(matches!(result, Some(Ok(()))));

                            // Adjust the remaining interval after the flush
                            let elapsed = interval_start.elapsed();
                            if elapsed < interval {
                                remaining_interval = interval - elapsed;
                            } else {
                                // the flush ran past the next scheduled export,
                                // which happens immediately instead
                                interval_start = Instant::now();
                                remaining_interval = Duration::ZERO;
                            }
                        }
                        Ok(Message::Shutdown(response_sender)) => {
                            // Perform final export and break out of loop and exit the thread
                            otel_debug!(name: "PeriodReaderThreadExportingDueToShutdown");
                            let result = export_with(&weak_reader);
                            let _ = response_sender.send(matches!(result, Some(Ok(()))));
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let export_start = Instant::now();
                            otel_debug!(name: "PeriodReaderThreadExportingDueToTimer");

                            match export_with(&weak_reader) {
                                Some(Ok(())) => {}
                                Some(Err(_)) => {
                                    otel_debug!(name: "PeriodReaderThreadExportingDueToTimerFailed");
                                }
                                // every handle is gone
                                None => break,
                            }

                            let time_taken_for_export = export_start.elapsed();
                            if time_taken_for_export > interval {
                                otel_debug!(
                                    name: "PeriodReaderThreadExportTookLongerThanInterval"
                                );
                                remaining_interval = Duration::ZERO;
                            } else {
                                remaining_interval = interval - time_taken_for_export;
                            }
                            interval_start = Instant::now();
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => {
                            // Some other error. Break out and exit the thread.
                            break;
                        }
                    }
                }
                otel_info!(name: "PeriodReaderThreadStopped");
            });

        if let Err(e) = result_thread_creation {
            otel_error!(
                name: "PeriodReaderThreadStartError",
                error = format!("{e:?}")
            );
        }
        reader
    }

    /// Collects and exports immediately, then flushes the exporter.
    pub fn force_flush(&self) -> MetricResult<()> {
        self.inner.force_flush()
    }

    /// Performs a final export, stops the reader thread and shuts the exporter
    /// down.
    pub fn shutdown(&self) -> MetricResult<()> {
        self.inner.shutdown()
    }
}

fn export_with<E: PushMetricExporter>(
    reader: &Weak<PeriodicReaderInner<E>>,
) -> Option<MetricResult<()>> {
    reader.upgrade().map(|inner| inner.collect_and_export())
}

struct PeriodicReaderInner<E: PushMetricExporter> {
    exporter: E,
    engine: MetricsEngine,
    collection: Mutex<Collection>,
    message_sender: Mutex<Sender<Message>>,
    is_shutdown: AtomicBool,
    timeout: Duration,
}

impl<E> PeriodicReaderInner<E>
where
    E: PushMetricExporter,
{
    fn collect_and_export(&self) -> MetricResult<()> {
        let mut collection = lock(&self.collection);
        self.engine.collect(&mut collection);

        if collection.is_empty() {
            otel_debug!(name: "NoMetricsCollected");
            return Ok(());
        }

        // Relying on futures executor to execute async call. No timeout is
        // enforced here. The exporter is responsible for enforcing the timeout.
        let exporter_result = futures_executor::block_on(self.exporter.export(&collection));
        if let Err(e) = exporter_result {
            otel_warn!(
                name: "PeriodReaderExportError",
                error = format!("{e}")
            );
            return Err(e);
        }

        Ok(())
    }

    fn send_and_wait(&self, message: fn(Sender<bool>) -> Message) -> MetricResult<bool> {
        let (response_tx, response_rx) = mpsc::channel();
        match self.message_sender.lock() {
            Ok(sender) => {
                sender
                    .send(message(response_tx))
                    .map_err(|e| MetricError::Other(e.to_string()))?;
            }
            Err(e) => return Err(MetricError::Other(e.to_string())),
        }

        response_rx
            .recv_timeout(self.timeout)
            .map_err(|e| MetricError::Other(format!("no response from reader thread: {e}")))
    }

    fn force_flush(&self) -> MetricResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }

        if !self.send_and_wait(Message::Flush)? {
            return Err(MetricError::Other("Failed to flush".into()));
        }
        self.exporter.force_flush()
    }

    fn shutdown(&self) -> MetricResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }

        let exported = self.send_and_wait(Message::Shutdown);
        let exporter_result = self.exporter.shutdown_with_timeout(self.timeout);
        match exported {
            Ok(true) => exporter_result,
            Ok(false) => Err(MetricError::Other("Failed to shutdown".into())),
            Err(e) => {
                otel_error!(
                    name: "PeriodReaderShutdownError",
                    error = format!("{e}")
                );
                Err(e)
            }
        }
    }
}

impl<E: PushMetricExporter> Drop for PeriodicReaderInner<E> {
    fn drop(&mut self) {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            otel_debug!(
                name: "PeriodicReader.Drop.AlreadyShutdown",
                message = "PeriodicReader was already shut down; drop will not attempt shutdown again."
            );
            return;
        }

        otel_info!(
            name: "PeriodicReader.Drop",
            message = "Last reference of PeriodicReader dropped, exporting one last time."
        );
        // The reader thread cannot reach this value anymore; it exits once the
        // message sender is dropped along with it.
        let exported = self.collect_and_export();
        let result = exported.and(self.exporter.shutdown_with_timeout(self.timeout));
        if let Err(err) = result {
            otel_error!(
                name: "PeriodicReader.Drop.ShutdownFailed",
                reason = format!("{err}")
            );
        }
    }
}

#[derive(Debug)]
enum Message {
    Flush(Sender<bool>),
    Shutdown(Sender<bool>),
}

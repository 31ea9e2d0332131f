//! Process wide handling of errors that cannot be returned to a caller.
//!
//! Measurement recording and collection never fail. Problems discovered on
//! those paths, and partial failures reported by exporters, are handed to the
//! handler installed here instead.
use std::sync::RwLock;

use opentelemetry::otel_error;

use crate::error::MetricError;

static GLOBAL_ERROR_HANDLER: RwLock<Option<ErrorHandler>> = RwLock::new(None);

struct ErrorHandler(Box<dyn Fn(MetricError) + Send + Sync>);

/// Handle error using the globally configured error handler.
///
/// Logs through the internal `otel_error!` event when no handler is set.
pub fn handle_error<T: Into<MetricError>>(err: T) {
    let err = err.into();
    match GLOBAL_ERROR_HANDLER.read() {
        Ok(handler) if handler.is_some() => {
            if let Some(handler) = handler.as_ref() {
                (handler.0)(err)
            }
        }
        _ => {
            otel_error!(name: "MetricsError", error = format!("{err}"));
        }
    }
}

/// Set global error handler.
pub fn set_error_handler<F>(f: F) -> Result<(), MetricError>
where
    F: Fn(MetricError) + Send + Sync + 'static,
{
    GLOBAL_ERROR_HANDLER
        .write()
        .map(|mut handler| *handler = Some(ErrorHandler(Box::new(f))))
        .map_err(Into::into)
}

/// Removes any handler installed with [`set_error_handler`].
pub fn reset_error_handler() {
    let mut handler = GLOBAL_ERROR_HANDLER
        .write()
        .unwrap_or_else(|err| err.into_inner());
    *handler = None;
}

//! Diagnostic sinks for resolution traceability.
//!
//! Sinks observe operation and request lifecycles without participating in
//! them: every call is fire-and-forget and must not suspend. Keep
//! implementations lightweight; resolution invokes them inline.

use std::sync::Arc;

use crate::error::DiError;
use crate::service::Service;

/// Observer of resolve-operation and resolve-request lifecycles.
///
/// Register implementations with
/// [`ContainerBuilder::register_diagnostic_sink`](crate::ContainerBuilder::register_diagnostic_sink).
/// A sink reporting `is_enabled() == false` costs one boolean check per
/// operation and nothing else.
///
/// # Examples
///
/// ```rust
/// use arbor_di::{ContainerBuilder, DiagnosticSink, Service};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct CountingSink {
///     requests: AtomicUsize,
/// }
///
/// impl DiagnosticSink for CountingSink {
///     fn request_start(&self, _service: &Service) {
///         self.requests.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let sink = Arc::new(CountingSink::default());
/// let mut builder = ContainerBuilder::new();
/// builder.register::<u32, _>(|_| Ok(7));
/// builder.register_diagnostic_sink(sink.clone());
/// let container = builder.build();
/// let _ = container.resolve::<u32>().unwrap();
/// assert_eq!(sink.requests.load(Ordering::Relaxed), 1);
/// ```
pub trait DiagnosticSink: Send + Sync {
    /// Whether this sink currently wants events.
    fn is_enabled(&self) -> bool {
        true
    }

    /// A user-initiated resolve operation is starting.
    fn operation_start(&self, _service: &Service) {}

    /// The operation's outermost request returned successfully.
    fn operation_success(&self, _service: &Service) {}

    /// The operation failed.
    fn operation_failure(&self, _service: &Service, _error: &DiError) {}

    /// A request (outermost or nested) is entering its pipeline.
    fn request_start(&self, _service: &Service) {}

    /// The request's pipeline produced an instance (or a permitted absence).
    fn request_success(&self, _service: &Service) {}

    /// The request's pipeline failed.
    fn request_failure(&self, _service: &Service, _error: &DiError) {}
}

/// Fan-out over the container's registered sinks.
pub(crate) struct DiagnosticHub {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl DiagnosticHub {
    pub(crate) fn new(sinks: Vec<Arc<dyn DiagnosticSink>>) -> Self {
        Self { sinks }
    }

    #[inline]
    pub(crate) fn enabled(&self) -> bool {
        self.sinks.iter().any(|sink| sink.is_enabled())
    }

    pub(crate) fn operation_start(&self, service: &Service) {
        for sink in self.sinks.iter().filter(|s| s.is_enabled()) {
            sink.operation_start(service);
        }
    }

    pub(crate) fn operation_success(&self, service: &Service) {
        for sink in self.sinks.iter().filter(|s| s.is_enabled()) {
            sink.operation_success(service);
        }
    }

    pub(crate) fn operation_failure(&self, service: &Service, error: &DiError) {
        for sink in self.sinks.iter().filter(|s| s.is_enabled()) {
            sink.operation_failure(service, error);
        }
    }

    pub(crate) fn request_start(&self, service: &Service) {
        for sink in self.sinks.iter().filter(|s| s.is_enabled()) {
            sink.request_start(service);
        }
    }

    pub(crate) fn request_success(&self, service: &Service) {
        for sink in self.sinks.iter().filter(|s| s.is_enabled()) {
            sink.request_success(service);
        }
    }

    pub(crate) fn request_failure(&self, service: &Service, error: &DiError) {
        for sink in self.sinks.iter().filter(|s| s.is_enabled()) {
            sink.request_failure(service, error);
        }
    }
}

/// A sink that forwards events to the `log` facade at debug level.
pub struct LoggingDiagnosticSink;

impl DiagnosticSink for LoggingDiagnosticSink {
    fn is_enabled(&self) -> bool {
        log::log_enabled!(log::Level::Debug)
    }

    fn operation_start(&self, service: &Service) {
        log::debug!("resolve operation starting: {}", service.display_name());
    }

    fn operation_success(&self, service: &Service) {
        log::debug!("resolve operation succeeded: {}", service.display_name());
    }

    fn operation_failure(&self, service: &Service, error: &DiError) {
        log::debug!(
            "resolve operation failed: {}: {}",
            service.display_name(),
            error
        );
    }

    fn request_start(&self, service: &Service) {
        log::trace!("resolve request starting: {}", service.display_name());
    }

    fn request_success(&self, service: &Service) {
        log::trace!("resolve request succeeded: {}", service.display_name());
    }

    fn request_failure(&self, service: &Service, error: &DiError) {
        log::trace!(
            "resolve request failed: {}: {}",
            service.display_name(),
            error
        );
    }
}

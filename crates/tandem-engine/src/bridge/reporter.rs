//! Process-wide exception reporter
//!
//! Receives script exceptions that reach native code while the VM runs
//! with [`ExceptionStrategy::Report`](crate::options::ExceptionStrategy).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::error;

use super::exception::BridgeException;

/// Callback receiving reported exceptions
pub type ExceptionHandler = Arc<dyn Fn(&BridgeException) + Send + Sync>;

static SHARED: Lazy<Reporter> = Lazy::new(Reporter::new);

/// Singleton sink for reported exceptions
pub struct Reporter {
    handler: Mutex<Option<ExceptionHandler>>,
    reported: AtomicUsize,
}

impl Reporter {
    fn new() -> Self {
        Self {
            handler: Mutex::new(None),
            reported: AtomicUsize::new(0),
        }
    }

    /// The process-wide reporter
    pub fn shared() -> &'static Reporter {
        &SHARED
    }

    /// Install a handler, replacing the previous one
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&BridgeException) + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Go back to logging reported exceptions
    pub fn clear_handler(&self) {
        *self.handler.lock() = None;
    }

    /// Deliver an exception to the handler
    pub fn report(&self, exception: &BridgeException) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        // The lock is released before the handler runs; handlers may
        // report again
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(exception),
            None => error!(%exception, "uncaught script exception"),
        }
    }

    /// Number of exceptions reported so far
    pub fn reported_count(&self) -> usize {
        self.reported.load(Ordering::Relaxed)
    }
}

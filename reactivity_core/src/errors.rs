use std::{any::Any, cell::RefCell, fmt, rc::Rc};
use thiserror::Error;

/// Errors raised by the reactive graph itself (as opposed to errors
/// thrown by user callbacks, which are wrapped in [`CallbackError`]).
///
/// These are surfaced as panic payloads from the infallible accessors
/// (`get`, `set`, …) and can be downcast at a
/// [`catch_unwind`](std::panic::catch_unwind) boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactivityError {
    /// A reactive computation notified itself before it finished: a
    /// derived value read itself during its own evaluation, or a watcher
    /// wrote to a signal it subscribes to.
    #[error(
        "cycle detected: a reactive computation triggered itself before it \
         finished"
    )]
    CycleDetected,
    /// The node behind a handle has been disposed.
    #[error("tried to access a reactive node that has been disposed")]
    Disposed,
    /// The stored value could not be cast back to the requested type.
    /// Indicates a misuse of the internal hooks and is treated as fatal.
    #[error("error casting reactive value to type {0}")]
    Type(&'static str),
}

/// An error thrown by a user-provided callback: a compute function, an
/// effect body, a watch selector or callback, a cleanup, or a
/// synchronized subscribe/unsubscribe.
///
/// The panic payload itself cannot be kept (payloads are consumed when
/// re-raised and are not generally clonable), so the message is extracted
/// and preserved. Cached computed errors re-raise as a `CallbackError`
/// panic payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else if let Some(err) = payload.downcast_ref::<CallbackError>() {
            err.message.clone()
        } else if let Some(err) = payload.downcast_ref::<ReactivityError>() {
            err.to_string()
        } else {
            "reactive callback panicked".to_string()
        };
        Self { message }
    }

    /// The panic message of the original error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error in reactive callback: {}", self.message)
    }
}

impl std::error::Error for CallbackError {}

type ErrorReporter = Rc<dyn Fn(&CallbackError, Option<&str>)>;

thread_local! {
    static ERROR_REPORTER: RefCell<Option<ErrorReporter>> =
        const { RefCell::new(None) };
}

/// Reports an error raised asynchronously by a user callback: from an
/// async effect or watch re-execution, a cancelled-drain callback, or a
/// synchronized subscription handler.
///
/// Routed through the reporter installed with [`set_error_reporter`]; the
/// default reporter emits a `tracing` error event.
pub fn report_callback_error(error: CallbackError, context: Option<&str>) {
    let reporter = ERROR_REPORTER.with(|r| r.borrow().clone());
    match reporter {
        Some(reporter) => reporter(&error, context),
        None => {
            tracing::error!(
                context = context.unwrap_or("reactive callback"),
                %error,
                "uncaught error in reactive callback"
            );
        }
    }
}

/// Replaces the callback-error reporter, returning the previous one.
/// Pass `None` to restore the default `tracing` reporter.
///
/// Intended for tests and host integrations that need to intercept
/// asynchronously reported errors.
pub fn set_error_reporter(
    reporter: Option<Rc<dyn Fn(&CallbackError, Option<&str>)>>,
) -> Option<Rc<dyn Fn(&CallbackError, Option<&str>)>> {
    ERROR_REPORTER.with(|r| r.replace(reporter))
}

#![forbid(unsafe_code)]

//! The macro-task dispatch queue behind async effects, async watches and
//! [`dispatch_async_callback`].
//!
//! Callbacks enqueued here run together in a single later task spawned
//! on the local executor, after already-scheduled micro-work (resolved
//! futures, in-flight task continuations) has had a chance to complete.
//! Entries appended while a drain is running are serviced by the next
//! drain, never re-entrantly.

use crate::errors::{report_callback_error, CallbackError};
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    panic::{catch_unwind, AssertUnwindSafe},
    rc::Rc,
};

thread_local! {
    static DISPATCH_QUEUE: TaskQueue = TaskQueue::default();
}

#[derive(Default)]
struct TaskQueue {
    entries: RefCell<VecDeque<QueueEntry>>,
    scheduled: Cell<bool>,
}

struct QueueEntry {
    callback: Box<dyn FnOnce()>,
    cancelled: Rc<Cell<bool>>,
}

/// Cancellation handle for a queued callback. Destroying it marks the
/// entry cancelled; the callback is skipped at drain time whether or not
/// the drain already started.
#[derive(Clone, Debug)]
pub struct AsyncCallbackHandle {
    cancelled: Rc<Cell<bool>>,
}

impl AsyncCallbackHandle {
    /// Cancels the queued callback. Idempotent.
    pub fn destroy(&self) {
        self.cancelled.set(true);
    }
}

impl std::fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEntry")
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}

/// Enqueues `callback` to run in a later macro-task, returning a handle
/// that can cancel it.
///
/// Callbacks from one burst of enqueues run in insertion order within a
/// single drain; a panicking callback is reported via
/// [`report_callback_error`](crate::report_callback_error) and does not
/// disturb the rest of the drain.
///
/// On native targets the drain task is spawned with
/// `tokio::task::spawn_local` and therefore requires a running
/// `LocalSet` (or other local task context).
pub fn dispatch_async_callback(
    callback: impl FnOnce() + 'static,
) -> AsyncCallbackHandle {
    let cancelled = Rc::new(Cell::new(false));
    DISPATCH_QUEUE.with(|queue| {
        queue.entries.borrow_mut().push_back(QueueEntry {
            callback: Box::new(callback),
            cancelled: Rc::clone(&cancelled),
        });
        if !queue.scheduled.get() {
            queue.scheduled.set(true);
            crate::spawn::spawn_local(async {
                drain();
            });
        }
    });
    AsyncCallbackHandle { cancelled }
}

/// Returns a future resolved by a callback enqueued right now: awaiting
/// it parks the caller until the queue has drained past this point.
/// Useful for tests and for synchronizing external code with async
/// observers.
///
/// ```no_run
/// # async fn example() {
/// reactivity_core::next_tick().await;
/// # }
/// ```
pub async fn next_tick() {
    let (tx, rx) = futures::channel::oneshot::channel();
    dispatch_async_callback(move || {
        _ = tx.send(());
    });
    _ = rx.await;
}

fn drain() {
    let entries = DISPATCH_QUEUE.with(|queue| {
        // entries enqueued from here on belong to the next drain
        queue.scheduled.set(false);
        queue.entries.take()
    });
    for entry in entries {
        if entry.cancelled.get() {
            continue;
        }
        if let Err(payload) =
            catch_unwind(AssertUnwindSafe(entry.callback))
        {
            report_callback_error(
                CallbackError::from_panic(payload),
                Some("async callback"),
            );
        }
    }
}

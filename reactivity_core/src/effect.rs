#![forbid(unsafe_code)]

use crate::{
    dispatch::{dispatch_async_callback, AsyncCallbackHandle},
    errors::{report_callback_error, CallbackError, ReactivityError},
    node::{AnyComputation, AnyWatcherNotify, NodeId},
    runtime::{untracked, with_runtime},
};
use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt::Debug,
    panic::{catch_unwind, panic_any, resume_unwind, AssertUnwindSafe},
    rc::{Rc, Weak},
};

/// When an observer re-executes after a dependency change.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// Re-execute before the triggering write returns (at batch end if
    /// batched, immediately otherwise).
    #[default]
    Sync,
    /// Coalesce notifications and re-execute once in a later macro-task
    /// via the dispatch queue.
    Async,
}

/// Options accepted by [`create_effect_with`].
#[derive(Copy, Clone, Debug, Default)]
pub struct EffectOptions {
    pub dispatch: Dispatch,
}

/// What an effect body or watch callback hands back: nothing, or a
/// cleanup function that runs exactly once before the next execution or
/// during destroy.
pub enum CallbackResult {
    NoCleanup,
    Cleanup(Box<dyn FnOnce()>),
}

impl CallbackResult {
    /// Wraps a cleanup function.
    pub fn cleanup(f: impl FnOnce() + 'static) -> Self {
        Self::Cleanup(Box::new(f))
    }
}

impl From<()> for CallbackResult {
    fn from(_: ()) -> Self {
        Self::NoCleanup
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EffectState {
    Initial,
    Idle,
    Executing,
    /// Async only: a re-execution sits in the dispatch queue.
    Pending,
    Destroyed,
}

/// Creates an effect: runs `body` once immediately, tracking every
/// signal it reads, and re-runs it synchronously whenever one of them
/// changes.
///
/// The body receives an [`EffectContext`] through which it can destroy
/// its own effect mid-run, and returns a [`CallbackResult`]; a returned
/// cleanup runs exactly once, before the next execution or on destroy.
///
/// A body that panics during this initial run destroys the effect and
/// propagates the panic to the caller. Writing to a signal the effect
/// depends on panics with [`ReactivityError::CycleDetected`].
///
/// ```
/// use reactivity_core::{create_effect, create_writable, CallbackResult, SignalGet, SignalSet};
/// use std::{cell::RefCell, rc::Rc};
///
/// let count = create_writable(1);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let handle = create_effect({
///     let seen = Rc::clone(&seen);
///     move |_| {
///         seen.borrow_mut().push(count.get());
///         CallbackResult::NoCleanup
///     }
/// });
///
/// count.set(2);
/// assert_eq!(*seen.borrow(), vec![1, 2]);
///
/// handle.destroy();
/// count.set(3);
/// assert_eq!(*seen.borrow(), vec![1, 2]);
/// ```
#[track_caller]
pub fn create_effect(
    body: impl Fn(&EffectContext) -> CallbackResult + 'static,
) -> EffectHandle {
    create_effect_with(body, EffectOptions::default())
}

/// Creates an effect with async dispatch: the initial run is still
/// synchronous, but subsequent re-executions are coalesced onto the
/// dispatch queue and run once per macro-task drain no matter how many
/// dependencies changed.
#[track_caller]
pub fn create_async_effect(
    body: impl Fn(&EffectContext) -> CallbackResult + 'static,
) -> EffectHandle {
    create_effect_with(
        body,
        EffectOptions {
            dispatch: Dispatch::Async,
        },
    )
}

/// Creates an effect with explicit options.
#[cfg_attr(
    debug_assertions,
    tracing::instrument(
        level = "trace",
        skip_all,
        fields(dispatch = ?options.dispatch)
    )
)]
#[track_caller]
pub fn create_effect_with(
    body: impl Fn(&EffectContext) -> CallbackResult + 'static,
    options: EffectOptions,
) -> EffectHandle {
    let inner = Rc::new(EffectInner {
        id: Cell::new(NodeId::default()),
        state: Cell::new(EffectState::Initial),
        dispatch: options.dispatch,
        body: Box::new(body),
        cleanup: RefCell::new(None),
        queued: RefCell::new(None),
    });

    let id = with_runtime(|runtime| {
        runtime.create_watcher_node(
            Rc::clone(&inner) as Rc<dyn AnyComputation>,
            Rc::clone(&inner) as Rc<dyn AnyWatcherNotify>,
        )
    });
    inner.id.set(id);

    // run the effect for the first time; a panic here has already
    // destroyed the effect and belongs to the caller
    if let Err(err) = with_runtime(|runtime| runtime.update_if_necessary(id))
    {
        panic_any(err);
    }

    EffectHandle { inner }
}

/// A handle to a running effect or watch. Destroying it is idempotent;
/// dropping the handle does *not* destroy the effect.
#[derive(Clone)]
pub struct EffectHandle {
    inner: Rc<EffectInner>,
}

impl EffectHandle {
    /// Stops the effect: tears down its dependency subscriptions, runs
    /// the last cleanup exactly once, and skips any queued async
    /// execution. Idempotent.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("id", &self.inner.id.get())
            .finish()
    }
}

/// Passed to every effect body; allows the body to destroy its own
/// effect mid-run. After a mid-run destroy no further notifications are
/// accepted, and a cleanup returned by the in-flight body still runs.
pub struct EffectContext {
    inner: Weak<EffectInner>,
}

impl EffectContext {
    /// Destroys the effect this body belongs to.
    pub fn destroy(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.destroy();
        }
    }
}

pub(crate) struct EffectInner {
    id: Cell<NodeId>,
    state: Cell<EffectState>,
    dispatch: Dispatch,
    #[allow(clippy::type_complexity)]
    body: Box<dyn Fn(&EffectContext) -> CallbackResult>,
    cleanup: RefCell<Option<Box<dyn FnOnce()>>>,
    queued: RefCell<Option<AsyncCallbackHandle>>,
}

impl EffectInner {
    fn destroy(self: &Rc<Self>) {
        if self.state.get() == EffectState::Destroyed {
            return;
        }
        let cleanup = self.cleanup.borrow_mut().take();
        self.state.set(EffectState::Destroyed);
        if let Some(queued) = self.queued.borrow_mut().take() {
            queued.destroy();
        }
        with_runtime(|runtime| runtime.dispose_node(self.id.get()));
        // the last cleanup runs exactly once; a panic here propagates to
        // the destroy caller
        if let Some(cleanup) = cleanup {
            untracked(cleanup);
        }
    }

    /// Tears the effect down from inside its own execution paths, where
    /// the cleanup has already been taken care of.
    fn destroy_without_cleanup(&self) {
        if self.state.get() == EffectState::Destroyed {
            return;
        }
        self.state.set(EffectState::Destroyed);
        if let Some(queued) = self.queued.borrow_mut().take() {
            queued.destroy();
        }
        with_runtime(|runtime| runtime.dispose_node(self.id.get()));
    }
}

impl AnyComputation for EffectInner {
    // The re-execute routine: previous cleanup (untracked), then the
    // body inside the already-open tracking window.
    fn run(self: Rc<Self>, _value: Option<Rc<RefCell<dyn Any>>>) -> bool {
        match self.state.get() {
            EffectState::Destroyed => return false,
            EffectState::Executing => {
                panic_any(ReactivityError::CycleDetected)
            }
            _ => {}
        }
        let initial = self.state.get() == EffectState::Initial;

        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            if let Err(payload) =
                catch_unwind(AssertUnwindSafe(|| untracked(cleanup)))
            {
                // a failing cleanup is fatal to this observer
                self.destroy_without_cleanup();
                match self.dispatch {
                    Dispatch::Sync => resume_unwind(payload),
                    Dispatch::Async => {
                        report_callback_error(
                            CallbackError::from_panic(payload),
                            Some("effect cleanup"),
                        );
                        return false;
                    }
                }
            }
        }
        if self.state.get() == EffectState::Destroyed {
            // destroyed from within its own cleanup
            return false;
        }

        self.state.set(EffectState::Executing);
        let context = EffectContext {
            inner: Rc::downgrade(&self),
        };
        let result =
            catch_unwind(AssertUnwindSafe(|| (self.body)(&context)));

        if self.state.get() == EffectState::Destroyed {
            // destroyed from within its own body; the cleanup it just
            // returned still runs, once
            if let Ok(CallbackResult::Cleanup(cleanup)) = result {
                let _ = catch_unwind(AssertUnwindSafe(|| untracked(cleanup)));
            }
            return false;
        }

        match result {
            Ok(callback_result) => {
                if let CallbackResult::Cleanup(cleanup) = callback_result {
                    *self.cleanup.borrow_mut() = Some(cleanup);
                }
                self.state.set(EffectState::Idle);
                true
            }
            Err(payload) => {
                if initial {
                    self.destroy_without_cleanup();
                    resume_unwind(payload);
                }
                self.state.set(EffectState::Idle);
                match self.dispatch {
                    Dispatch::Sync => resume_unwind(payload),
                    Dispatch::Async => {
                        report_callback_error(
                            CallbackError::from_panic(payload),
                            Some("async effect"),
                        );
                        false
                    }
                }
            }
        }
    }
}

impl AnyWatcherNotify for EffectInner {
    fn notify(self: Rc<Self>) {
        match self.state.get() {
            EffectState::Destroyed => return,
            EffectState::Executing => {
                panic_any(ReactivityError::CycleDetected)
            }
            // already queued: notifications coalesce
            EffectState::Pending => return,
            _ => {}
        }
        match self.dispatch {
            Dispatch::Sync => {
                let id = self.id.get();
                if let Err(err) =
                    with_runtime(|runtime| runtime.update_if_necessary(id))
                {
                    panic_any(err);
                }
            }
            Dispatch::Async => {
                self.state.set(EffectState::Pending);
                let inner = Rc::clone(&self);
                let handle = dispatch_async_callback(move || {
                    if inner.state.get() != EffectState::Pending {
                        return;
                    }
                    inner.state.set(EffectState::Idle);
                    *inner.queued.borrow_mut() = None;
                    let id = inner.id.get();
                    if let Err(err) = with_runtime(|runtime| {
                        runtime.update_if_necessary(id)
                    }) {
                        panic_any(err);
                    }
                });
                *self.queued.borrow_mut() = Some(handle);
            }
        }
    }
}

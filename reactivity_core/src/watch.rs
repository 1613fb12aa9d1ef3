#![forbid(unsafe_code)]

use crate::{
    computed::create_derived,
    effect::{
        create_effect_with, CallbackResult, Dispatch, EffectHandle,
        EffectOptions,
    },
    equality::SameValue,
    errors::{report_callback_error, CallbackError},
    node::NodeId,
    runtime::{untracked, with_runtime},
    signal::{EqualFn, SignalOptions},
};
use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    marker::PhantomData,
    panic::{catch_unwind, AssertUnwindSafe},
    rc::Rc,
};

/// Options accepted by the `watch*_with` constructors.
pub struct WatchOptions<T> {
    /// Invoke the callback on the first execution, with `old` set to
    /// `None`. When `false` (the default), the first execution only
    /// captures the baseline value.
    pub immediate: bool,
    /// Sync or async re-execution; see [`Dispatch`].
    pub dispatch: Dispatch,
    /// Custom equality for successive selector values; defaults to
    /// [`SameValue`](crate::SameValue).
    pub equal: Option<EqualFn<T>>,
}

impl<T> Default for WatchOptions<T> {
    fn default() -> Self {
        Self {
            immediate: false,
            dispatch: Dispatch::Sync,
            equal: None,
        }
    }
}

/// A handle to a running watch; destroying it is idempotent.
#[derive(Clone)]
pub struct WatchHandle {
    effect: EffectHandle,
    selector: NodeId,
}

impl WatchHandle {
    /// Stops the watch, running its last cleanup exactly once.
    pub fn destroy(&self) {
        self.effect.destroy();
        with_runtime(|runtime| runtime.dispose_node(self.selector));
    }
}

impl Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish()
    }
}

/// Watches a single selector and invokes `callback` with the new and
/// previous values whenever the selected value actually changes.
///
/// The selector runs tracked (through an internal derived node, so
/// unchanged recomputations never reach the callback); the callback runs
/// with dependency capture suspended and may return a cleanup via
/// [`CallbackResult`].
///
/// ```
/// use reactivity_core::{create_writable, watch_value, CallbackResult, SignalGet, SignalSet};
/// use std::{cell::RefCell, rc::Rc};
///
/// let count = create_writable(1);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let handle = watch_value(move || count.get(), {
///     let log = Rc::clone(&log);
///     move |new, old| {
///         log.borrow_mut().push((*new, old.copied()));
///         CallbackResult::NoCleanup
///     }
/// });
///
/// count.set(1); // unchanged: no call
/// count.set(2);
/// assert_eq!(*log.borrow(), vec![(2, Some(1))]);
///
/// handle.destroy();
/// ```
#[track_caller]
pub fn watch_value<T>(
    selector: impl Fn() -> T + 'static,
    callback: impl Fn(&T, Option<&T>) -> CallbackResult + 'static,
) -> WatchHandle
where
    T: SameValue + Clone + 'static,
{
    watch_value_with(selector, callback, WatchOptions::default())
}

/// Like [`watch_value`], with explicit options.
#[track_caller]
pub fn watch_value_with<T>(
    selector: impl Fn() -> T + 'static,
    callback: impl Fn(&T, Option<&T>) -> CallbackResult + 'static,
    options: WatchOptions<T>,
) -> WatchHandle
where
    T: SameValue + Clone + 'static,
{
    build_watch(selector, callback, options)
}

/// Watches several values at once: the selector returns an ordered
/// sequence (a tuple, array or `Vec` of selected values), compared
/// element-wise between runs. Otherwise identical to [`watch_value`].
#[track_caller]
pub fn watch<W>(
    selector: impl Fn() -> W + 'static,
    callback: impl Fn(&W, Option<&W>) -> CallbackResult + 'static,
) -> WatchHandle
where
    W: SameValue + Clone + 'static,
{
    watch_with(selector, callback, WatchOptions::default())
}

/// Like [`watch`], with explicit options.
#[track_caller]
pub fn watch_with<W>(
    selector: impl Fn() -> W + 'static,
    callback: impl Fn(&W, Option<&W>) -> CallbackResult + 'static,
    options: WatchOptions<W>,
) -> WatchHandle
where
    W: SameValue + Clone + 'static,
{
    build_watch(selector, callback, options)
}

fn build_watch<T>(
    selector: impl Fn() -> T + 'static,
    callback: impl Fn(&T, Option<&T>) -> CallbackResult + 'static,
    options: WatchOptions<T>,
) -> WatchHandle
where
    T: SameValue + Clone + 'static,
{
    // the selector runs through a derived node so that equal
    // recomputations are suppressed before they ever wake the effect
    let selector_id = create_derived(
        selector,
        SignalOptions {
            equal: options.equal.clone(),
            ..Default::default()
        },
    );
    let selector_handle = crate::Computed::<T> {
        id: selector_id,
        ty: PhantomData,
    };

    let previous: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let first_run = Rc::new(Cell::new(true));
    let immediate = options.immediate;

    let effect = create_effect_with(
        {
            use crate::signal::SignalGet;

            move |_| {
                let first = first_run.get();

                let new_value = if first {
                    // initial selector errors belong to the caller
                    selector_handle.get()
                } else {
                    match catch_unwind(AssertUnwindSafe(|| {
                        selector_handle.get()
                    })) {
                        Ok(value) => value,
                        Err(payload) => {
                            report_callback_error(
                                CallbackError::from_panic(payload),
                                Some("watch selector"),
                            );
                            return CallbackResult::NoCleanup;
                        }
                    }
                };

                let old_value = previous.borrow_mut().take();

                let result = if first {
                    first_run.set(false);
                    if immediate {
                        // an immediate callback error is part of
                        // construction and propagates
                        untracked(|| callback(&new_value, None))
                    } else {
                        CallbackResult::NoCleanup
                    }
                } else {
                    match catch_unwind(AssertUnwindSafe(|| {
                        untracked(|| {
                            callback(&new_value, old_value.as_ref())
                        })
                    })) {
                        Ok(result) => result,
                        Err(payload) => {
                            report_callback_error(
                                CallbackError::from_panic(payload),
                                Some("watch callback"),
                            );
                            CallbackResult::NoCleanup
                        }
                    }
                };

                *previous.borrow_mut() = Some(new_value);
                result
            }
        },
        EffectOptions {
            dispatch: options.dispatch,
        },
    );

    WatchHandle {
        effect,
        selector: selector_id,
    }
}

#![forbid(unsafe_code)]

use crate::{
    computed::{create_derived, with_computed_slot},
    equality::SameValue,
    node::NodeId,
    runtime::{trigger_node, untracked, with_runtime},
    signal::{
        SignalGet, SignalGetUntracked, SignalOptions, SignalWith,
        SignalWithUntracked,
    },
};
use std::{fmt::Debug, marker::PhantomData, panic::panic_any};

/// Creates a signal over a foreign value the engine cannot observe: a
/// lazy getter paired with a manual invalidation handle.
///
/// The getter runs with dependency capture suspended, so the signal
/// depends on nothing but its own hidden invalidation source. Call
/// [`trigger`](External::trigger) whenever the foreign value may have
/// changed; the cached value is invalidated and observers re-run.
///
/// ```
/// use reactivity_core::{create_external, SignalGet};
/// use std::{cell::Cell, rc::Rc};
///
/// let store = Rc::new(Cell::new(7));
/// let signal = create_external({
///     let store = Rc::clone(&store);
///     move || store.get()
/// });
///
/// assert_eq!(signal.get(), 7);
///
/// store.set(8);
/// assert_eq!(signal.get(), 7); // cached until triggered
///
/// signal.trigger();
/// assert_eq!(signal.get(), 8);
/// ```
#[track_caller]
pub fn create_external<T>(getter: impl Fn() -> T + 'static) -> External<T>
where
    T: SameValue + 'static,
{
    create_external_with(getter, SignalOptions::default())
}

/// Like [`create_external`], with a custom equality predicate and/or
/// watch-lifecycle callbacks.
#[track_caller]
pub fn create_external_with<T>(
    getter: impl Fn() -> T + 'static,
    options: SignalOptions<T>,
) -> External<T>
where
    T: SameValue + 'static,
{
    let source =
        with_runtime(|runtime| runtime.create_source_node(None, None));
    let id = create_derived(
        move || {
            // depend only on the invalidation source; the getter itself
            // is opaque to the graph
            with_runtime(|runtime| runtime.subscribe_node(source));
            untracked(&getter)
        },
        options,
    );
    External {
        id,
        source,
        ty: PhantomData,
    }
}

/// A lazily cached signal over a foreign value, invalidated manually via
/// [`trigger`](External::trigger). `Copy`, like all handles.
pub struct External<T>
where
    T: 'static,
{
    pub(crate) id: NodeId,
    pub(crate) source: NodeId,
    pub(crate) ty: PhantomData<T>,
}

impl<T> Clone for External<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for External<T> {}

impl<T> Debug for External<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("External").field("id", &self.id).finish()
    }
}

impl<T> External<T> {
    /// Invalidates the cached value and notifies observers. The getter
    /// re-runs on the next read.
    pub fn trigger(&self) {
        trigger_node(self.source);
    }

    /// Returns a free-standing trigger callable without the handle, for
    /// use as an event listener or callback.
    pub fn trigger_fn(&self) -> impl Fn() + Clone + 'static {
        let source = self.source;
        move || trigger_node(source)
    }
}

impl<T: Clone> SignalGet<T> for External<T> {
    fn get(&self) -> T {
        self.with(T::clone)
    }

    fn try_get(&self) -> Option<T> {
        self.try_with(T::clone)
    }
}

impl<T> SignalWith<T> for External<T> {
    fn with<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, true, f))
            .unwrap_or_else(|err| panic_any(err))
    }

    fn try_with<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, true, f))
            .ok()
    }
}

impl<T: Clone> SignalGetUntracked<T> for External<T> {
    fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }

    fn try_get_untracked(&self) -> Option<T> {
        self.try_with_untracked(T::clone)
    }
}

impl<T> SignalWithUntracked<T> for External<T> {
    fn with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, false, f))
            .unwrap_or_else(|err| panic_any(err))
    }

    fn try_with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, false, f))
            .ok()
    }
}

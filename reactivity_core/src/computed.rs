#![forbid(unsafe_code)]

use crate::{
    equality::SameValue,
    errors::{CallbackError, ReactivityError},
    node::{AnyComputation, NodeId},
    runtime::{with_runtime, Runtime},
    signal::{
        SignalGet, SignalGetUntracked, SignalHooks, SignalOptions, SignalWith,
        SignalWithUntracked,
    },
};
use std::{
    any::{type_name, Any},
    cell::RefCell,
    fmt::Debug,
    marker::PhantomData,
    panic::{catch_unwind, panic_any, resume_unwind, AssertUnwindSafe},
    rc::Rc,
};

/// The cache slot of a derived node: `None` until the first evaluation,
/// then the last computed value or the cached error of a failed
/// evaluation.
pub(crate) type ComputedSlot<T> = Option<Result<T, CallbackError>>;

/// Creates a derived reactive value.
///
/// A computed runs lazily: the body does not execute until the value is
/// first read, and re-executes only when a dependency has actually
/// changed since the last run. If a re-run produces a value equal to the
/// cached one, the cache keeps its identity and observers are not
/// notified.
///
/// A body that panics poisons the cache: subsequent reads re-raise the
/// captured error until a dependency changes. A body that reads its own
/// value panics with [`ReactivityError::CycleDetected`].
///
/// ```
/// use reactivity_core::{create_computed, create_writable, SignalGet, SignalSet};
///
/// let a = create_writable(1);
/// let b = create_writable(2);
/// let sum = create_computed(move || a.get() + b.get());
///
/// assert_eq!(sum.get(), 3);
/// a.set(3);
/// assert_eq!(sum.get(), 5);
/// ```
#[track_caller]
pub fn create_computed<T>(f: impl Fn() -> T + 'static) -> Computed<T>
where
    T: SameValue + 'static,
{
    create_computed_with(f, SignalOptions::default())
}

/// Like [`create_computed`], with a custom equality predicate and/or
/// watch-lifecycle callbacks.
#[cfg_attr(
    debug_assertions,
    tracing::instrument(level = "trace", skip_all)
)]
#[track_caller]
pub fn create_computed_with<T>(
    f: impl Fn() -> T + 'static,
    options: SignalOptions<T>,
) -> Computed<T>
where
    T: SameValue + 'static,
{
    Computed {
        id: create_derived(f, options),
        ty: PhantomData,
    }
}

/// Inserts a derived node for `f` and returns its id; shared with the
/// other computed-shaped primitives (external, synchronized, linked).
pub(crate) fn create_derived<T>(
    f: impl Fn() -> T + 'static,
    options: SignalOptions<T>,
) -> NodeId
where
    T: SameValue + 'static,
{
    let equal = options.equal.clone();
    create_derived_raw(f, equal, SignalHooks::from_options(options))
}

/// Lower-level variant taking the node hooks directly, for primitives
/// with their own watch-lifecycle behavior (synchronized).
pub(crate) fn create_derived_raw<T>(
    f: impl Fn() -> T + 'static,
    equal: Option<crate::signal::EqualFn<T>>,
    hooks: Option<Rc<dyn crate::node::AnyWatchHooks>>,
) -> NodeId
where
    T: SameValue + 'static,
{
    with_runtime(|runtime| {
        runtime.create_derived_node(
            Rc::new(RefCell::new(None::<Result<T, CallbackError>>))
                as Rc<RefCell<dyn Any>>,
            Rc::new(DerivedComputation {
                f,
                equal,
                ty: PhantomData,
            }),
            hooks,
        )
    })
}

struct DerivedComputation<T, F>
where
    T: 'static,
    F: Fn() -> T,
{
    f: F,
    equal: Option<crate::signal::EqualFn<T>>,
    ty: PhantomData<T>,
}

impl<T, F> AnyComputation for DerivedComputation<T, F>
where
    T: SameValue + 'static,
    F: Fn() -> T,
{
    fn run(self: Rc<Self>, value: Option<Rc<RefCell<dyn Any>>>) -> bool {
        let value = value.expect("derived node to have a value slot");
        let result = catch_unwind(AssertUnwindSafe(|| (self.f)()));

        let mut slot = value.borrow_mut();
        let slot = slot
            .downcast_mut::<ComputedSlot<T>>()
            .expect("to downcast derived value");

        match result {
            Ok(new_value) => {
                let unchanged = matches!(
                    &*slot,
                    Some(Ok(old)) if with_runtime(|runtime| {
                        runtime.untrack(|| self.values_equal(old, &new_value))
                    })
                );
                if unchanged {
                    // keep the previous cache identity, propagate nothing
                    false
                } else {
                    *slot = Some(Ok(new_value));
                    true
                }
            }
            Err(payload) => {
                // a cycle (or any other graph error) raised by a nested
                // read is not a user error: re-raise it with its payload
                // type intact rather than caching it
                if payload.is::<ReactivityError>() {
                    resume_unwind(payload);
                }
                *slot = Some(Err(CallbackError::from_panic(payload)));
                // an error is a change: dependents must re-pull and see it
                true
            }
        }
    }
}

impl<T, F> DerivedComputation<T, F>
where
    T: SameValue + 'static,
    F: Fn() -> T,
{
    fn values_equal(&self, a: &T, b: &T) -> bool {
        match &self.equal {
            Some(equal) => equal(a, b),
            None => a.same_value(b),
        }
    }
}

/// A lazily evaluated derived reactive value. `Copy`, like all handles.
pub struct Computed<T>
where
    T: 'static,
{
    pub(crate) id: NodeId,
    pub(crate) ty: PhantomData<T>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Computed<T> {}

impl<T> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed").field("id", &self.id).finish()
    }
}

impl<T> PartialEq for Computed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Computed<T> {}

/// Resolves a derived node and applies `f` to its cached value,
/// re-raising a cached evaluation error.
pub(crate) fn with_computed_slot<T, U>(
    runtime: &Runtime,
    id: NodeId,
    subscribe: bool,
    f: impl FnOnce(&T) -> U,
) -> Result<U, ReactivityError>
where
    T: 'static,
{
    if subscribe {
        runtime.subscribe_node(id);
    }
    runtime.update_if_necessary(id)?;
    let value = runtime.node_value(id).ok_or(ReactivityError::Disposed)?;
    let value = value.borrow();
    let slot = value
        .downcast_ref::<ComputedSlot<T>>()
        .ok_or(ReactivityError::Type(type_name::<T>()))?;
    match slot {
        Some(Ok(value)) => Ok(f(value)),
        Some(Err(err)) => panic_any(err.clone()),
        None => unreachable!("derived value read before first evaluation"),
    }
}

impl<T: Clone> SignalGet<T> for Computed<T> {
    fn get(&self) -> T {
        self.with(T::clone)
    }

    fn try_get(&self) -> Option<T> {
        self.try_with(T::clone)
    }
}

impl<T> SignalWith<T> for Computed<T> {
    fn with<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, true, f))
            .unwrap_or_else(|err| panic_any(err))
    }

    fn try_with<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, true, f))
            .ok()
    }
}

impl<T: Clone> SignalGetUntracked<T> for Computed<T> {
    fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }

    fn try_get_untracked(&self) -> Option<T> {
        self.try_with_untracked(T::clone)
    }
}

impl<T> SignalWithUntracked<T> for Computed<T> {
    fn with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, false, f))
            .unwrap_or_else(|err| panic_any(err))
    }

    fn try_with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, false, f))
            .ok()
    }
}

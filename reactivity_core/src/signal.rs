#![forbid(unsafe_code)]

use crate::{
    equality::SameValue,
    errors::ReactivityError,
    node::{AnyWatchHooks, NodeId},
    runtime::{with_runtime, Runtime},
};
use std::{
    any::{type_name, Any},
    cell::RefCell,
    fmt::Debug,
    marker::PhantomData,
    panic::panic_any,
    rc::Rc,
};

/// Equality predicate stored in a signal's options.
pub type EqualFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Optional configuration accepted by every signal constructor with a
/// `_with` suffix.
pub struct SignalOptions<T> {
    /// Custom change-suppression predicate; defaults to
    /// [`SameValue`](crate::SameValue) when absent. Always invoked with
    /// dependency capture suspended.
    pub equal: Option<EqualFn<T>>,
    /// Invoked when the signal gains its first subscriber (0→1).
    pub on_first_watch: Option<Rc<dyn Fn()>>,
    /// Invoked when the signal loses its last subscriber (1→0).
    pub on_last_unwatch: Option<Rc<dyn Fn()>>,
}

impl<T> Default for SignalOptions<T> {
    fn default() -> Self {
        Self {
            equal: None,
            on_first_watch: None,
            on_last_unwatch: None,
        }
    }
}

impl<T> SignalOptions<T> {
    /// Shorthand for options that only override the equality predicate.
    pub fn with_equal(equal: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            equal: Some(Rc::new(equal)),
            ..Default::default()
        }
    }
}

/// The typed per-node options record, attached to the node so `Copy`
/// handles can reach it.
pub(crate) struct SignalHooks<T> {
    pub equal: Option<EqualFn<T>>,
    pub on_first_watch: Option<Rc<dyn Fn()>>,
    pub on_last_unwatch: Option<Rc<dyn Fn()>>,
}

impl<T: 'static> SignalHooks<T> {
    pub(crate) fn from_options(
        options: SignalOptions<T>,
    ) -> Option<Rc<dyn AnyWatchHooks>> {
        if options.equal.is_none()
            && options.on_first_watch.is_none()
            && options.on_last_unwatch.is_none()
        {
            return None;
        }
        Some(Rc::new(Self {
            equal: options.equal,
            on_first_watch: options.on_first_watch,
            on_last_unwatch: options.on_last_unwatch,
        }))
    }
}

impl<T: 'static> AnyWatchHooks for SignalHooks<T> {
    fn first_watch(&self) {
        if let Some(f) = &self.on_first_watch {
            f();
        }
    }

    fn last_unwatch(&self) {
        if let Some(f) = &self.on_last_unwatch {
            f();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Looks up the custom equality predicate of a node, if any.
pub(crate) fn node_equal_fn<T: 'static>(
    runtime: &Runtime,
    node: NodeId,
) -> Option<EqualFn<T>> {
    let nodes = runtime.nodes.borrow();
    let hooks = nodes.get(node)?.hooks.as_ref()?;
    let hooks = hooks.as_any().downcast_ref::<SignalHooks<T>>()?;
    hooks.equal.clone()
}

/// Compares two values with the node's equality predicate (or
/// [`SameValue`]), with dependency capture suspended.
pub(crate) fn values_equal<T: SameValue + 'static>(
    runtime: &Runtime,
    node: NodeId,
    a: &T,
    b: &T,
) -> bool {
    match node_equal_fn::<T>(runtime, node) {
        Some(equal) => runtime.untrack(|| equal(a, b)),
        None => a.same_value(b),
    }
}

/// Creates a writable signal, the basic reactive primitive.
///
/// A signal is a piece of data that may change over time and notifies
/// observers when it has changed. Writes that store a
/// [`SameValue`]-equal replacement are suppressed entirely: the held
/// value keeps its identity and no observer wakes up.
///
/// ```
/// use reactivity_core::{create_writable, SignalGet, SignalSet, SignalUpdate};
///
/// let count = create_writable(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(1);
/// assert_eq!(count.get(), 1);
///
/// count.update(|n| *n += 1);
/// assert_eq!(count.get(), 2);
/// ```
#[track_caller]
pub fn create_writable<T>(value: T) -> Writable<T>
where
    T: SameValue + 'static,
{
    create_writable_with(value, SignalOptions::default())
}

/// Like [`create_writable`], with a custom equality predicate and/or
/// watch-lifecycle callbacks.
#[cfg_attr(
    debug_assertions,
    tracing::instrument(level = "trace", skip_all)
)]
#[track_caller]
pub fn create_writable_with<T>(
    value: T,
    options: SignalOptions<T>,
) -> Writable<T>
where
    T: SameValue + 'static,
{
    let id = with_runtime(|runtime| {
        runtime.create_source_node(
            Some(Rc::new(RefCell::new(value)) as Rc<RefCell<dyn Any>>),
            SignalHooks::from_options(options),
        )
    });
    Writable {
        id,
        ty: PhantomData,
    }
}

/// A writable reactive value.
///
/// `Writable` is `Copy` and `'static`, so it can be moved into closures
/// or copied into structs freely; all handles refer to the same
/// underlying node.
pub struct Writable<T>
where
    T: 'static,
{
    pub(crate) id: NodeId,
    pub(crate) ty: PhantomData<T>,
}

impl<T> Clone for Writable<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Writable<T> {}

impl<T> Debug for Writable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writable").field("id", &self.id).finish()
    }
}

impl<T> PartialEq for Writable<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Writable<T> {}

impl<T> Writable<T>
where
    T: SameValue + 'static,
{
    fn write(&self, new_value: T) -> Result<(), ReactivityError> {
        with_runtime(|runtime| {
            let value = runtime
                .node_value(self.id)
                .ok_or(ReactivityError::Disposed)?;
            {
                let current = value.borrow();
                let current = current
                    .downcast_ref::<T>()
                    .ok_or(ReactivityError::Type(type_name::<T>()))?;
                if values_equal(runtime, self.id, current, &new_value) {
                    // suppressed: keep the held value's identity, wake
                    // nothing up
                    return Ok(());
                }
            }
            *value
                .borrow_mut()
                .downcast_mut::<T>()
                .ok_or(ReactivityError::Type(type_name::<T>()))? = new_value;
            runtime.mark_dirty(self.id)?;
            runtime.run_effects();
            Ok(())
        })
    }
}

/// This trait allows getting an owned clone of a signal's value,
/// subscribing the running observer to it.
pub trait SignalGet<T> {
    /// Clones and returns the current value, subscribing the running
    /// observer to this signal.
    ///
    /// # Panics
    /// Panics if the signal has been disposed, or with
    /// [`ReactivityError::CycleDetected`] when the read re-enters an
    /// evaluation already on the stack.
    #[track_caller]
    fn get(&self) -> T;

    /// Clones and returns the value, or `None` if the signal has been
    /// disposed.
    fn try_get(&self) -> Option<T>;
}

/// This trait allows applying a function to a reference to the signal's
/// value without cloning it.
pub trait SignalWith<T> {
    /// Applies `f` to the current value, subscribing the running
    /// observer to this signal.
    #[track_caller]
    fn with<O>(&self, f: impl FnOnce(&T) -> O) -> O;

    /// Applies `f` to the current value, or returns `None` if the signal
    /// has been disposed.
    fn try_with<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O>;
}

/// Untracked variant of [`SignalGet`]: a "peek" that does not subscribe
/// the running observer.
pub trait SignalGetUntracked<T> {
    /// Clones and returns the current value without registering a
    /// dependency.
    #[track_caller]
    fn get_untracked(&self) -> T;

    /// Clones and returns the value without registering a dependency, or
    /// `None` if the signal has been disposed.
    fn try_get_untracked(&self) -> Option<T>;
}

/// Untracked variant of [`SignalWith`].
pub trait SignalWithUntracked<T> {
    /// Applies `f` to the current value without registering a
    /// dependency.
    #[track_caller]
    fn with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> O;

    /// Applies `f` to the current value without registering a
    /// dependency, or returns `None` if the signal has been disposed.
    fn try_with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O>;
}

/// This trait allows setting the value of a writable signal.
pub trait SignalSet<T> {
    /// Stores a new value and notifies subscribers, unless the signal's
    /// equality predicate considers it unchanged, in which case the
    /// write is suppressed entirely.
    #[track_caller]
    fn set(&self, new_value: T);

    /// Like `set`; returns the value back if the signal has been
    /// disposed.
    fn try_set(&self, new_value: T) -> Option<T>;
}

/// This trait allows updating a writable signal's value in place.
pub trait SignalUpdate<T> {
    /// Mutates the value in place and notifies subscribers.
    ///
    /// **Note:** `update()` does not auto-suppress: subscribers are
    /// notified even if the closure left the value unchanged.
    #[track_caller]
    fn update(&self, f: impl FnOnce(&mut T));

    /// Mutates the value in place and notifies subscribers, returning
    /// the closure's return value, or `None` if the signal has been
    /// disposed.
    fn try_update<O>(&self, f: impl FnOnce(&mut T) -> O) -> Option<O>;
}

impl<T: Clone> SignalGet<T> for Writable<T> {
    fn get(&self) -> T {
        self.with(T::clone)
    }

    fn try_get(&self) -> Option<T> {
        self.try_with(T::clone)
    }
}

impl<T> SignalWith<T> for Writable<T> {
    fn with<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        with_runtime(|runtime| self.id.try_with(runtime, f))
            .unwrap_or_else(|err| panic_any(err))
    }

    fn try_with<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        with_runtime(|runtime| self.id.try_with(runtime, f)).ok()
    }
}

impl<T: Clone> SignalGetUntracked<T> for Writable<T> {
    fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }

    fn try_get_untracked(&self) -> Option<T> {
        self.try_with_untracked(T::clone)
    }
}

impl<T> SignalWithUntracked<T> for Writable<T> {
    fn with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        with_runtime(|runtime| self.id.try_with_no_subscription(runtime, f))
            .unwrap_or_else(|err| panic_any(err))
    }

    fn try_with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        with_runtime(|runtime| self.id.try_with_no_subscription(runtime, f))
            .ok()
    }
}

impl<T: SameValue + 'static> SignalSet<T> for Writable<T> {
    fn set(&self, new_value: T) {
        if let Err(err) = self.write(new_value) {
            panic_any(err);
        }
    }

    fn try_set(&self, new_value: T) -> Option<T> {
        // a disposed node is the only failure `set` survives; cycles
        // still panic
        let alive =
            with_runtime(|runtime| runtime.node_value(self.id).is_some());
        if !alive {
            return Some(new_value);
        }
        match self.write(new_value) {
            Ok(()) | Err(ReactivityError::Disposed) => None,
            Err(err) => panic_any(err),
        }
    }
}

impl<T: 'static> SignalUpdate<T> for Writable<T> {
    fn update(&self, f: impl FnOnce(&mut T)) {
        _ = self.try_update(f);
    }

    fn try_update<O>(&self, f: impl FnOnce(&mut T) -> O) -> Option<O> {
        with_runtime(|runtime| {
            let value = runtime.node_value(self.id)?;
            let result = {
                let mut value = value.borrow_mut();
                let value = value.downcast_mut::<T>()?;
                f(value)
            };
            if let Err(err) = runtime.mark_dirty(self.id) {
                panic_any(err);
            }
            runtime.run_effects();
            Some(result)
        })
    }
}

impl NodeId {
    /// Resolves the node (pulling stale sources) and applies `f` to its
    /// value without subscribing the running observer.
    pub(crate) fn try_with_no_subscription<T, U>(
        &self,
        runtime: &Runtime,
        f: impl FnOnce(&T) -> U,
    ) -> Result<U, ReactivityError>
    where
        T: 'static,
    {
        runtime.update_if_necessary(*self)?;
        let value = runtime
            .node_value(*self)
            .ok_or(ReactivityError::Disposed)?;
        let value = value.borrow();
        let value = value
            .downcast_ref::<T>()
            .ok_or(ReactivityError::Type(type_name::<T>()))?;
        Ok(f(value))
    }

    /// Tracked read: subscribes the running observer, then resolves.
    pub(crate) fn try_with<T, U>(
        &self,
        runtime: &Runtime,
        f: impl FnOnce(&T) -> U,
    ) -> Result<U, ReactivityError>
    where
        T: 'static,
    {
        runtime.subscribe_node(*self);
        self.try_with_no_subscription(runtime, f)
    }
}

#![forbid(unsafe_code)]

use crate::{
    computed::Computed,
    external::External,
    linked::Linked,
    signal::{SignalGet, SignalGetUntracked, SignalWith, Writable},
    synchronized::Synchronized,
};
use std::{fmt::Debug, rc::Rc};

/// A type-erased, read-only handle over any readable reactive primitive
/// or derived closure.
///
/// Use this at API boundaries that accept "some reactive value" without
/// caring whether it is writable, computed, or derived on the fly.
pub struct Signal<T>
where
    T: 'static,
{
    inner: SignalKinds<T>,
}

enum SignalKinds<T>
where
    T: 'static,
{
    Writable(Writable<T>),
    Computed(Computed<T>),
    External(External<T>),
    Synchronized(Synchronized<T>),
    Linked(Linked<T>),
    Derived(Rc<dyn Fn() -> T>),
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: match &self.inner {
                SignalKinds::Writable(s) => SignalKinds::Writable(*s),
                SignalKinds::Computed(s) => SignalKinds::Computed(*s),
                SignalKinds::External(s) => SignalKinds::External(*s),
                SignalKinds::Synchronized(s) => {
                    SignalKinds::Synchronized(*s)
                }
                SignalKinds::Linked(s) => SignalKinds::Linked(*s),
                SignalKinds::Derived(f) => {
                    SignalKinds::Derived(Rc::clone(f))
                }
            },
        }
    }
}

impl<T> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").finish()
    }
}

impl<T> Signal<T> {
    /// Wraps a plain derivation closure: reads inside it are tracked at
    /// the caller, exactly like reading the signals directly.
    pub fn derive(f: impl Fn() -> T + 'static) -> Self {
        Self {
            inner: SignalKinds::Derived(Rc::new(f)),
        }
    }
}

impl<T: Clone> SignalGet<T> for Signal<T> {
    fn get(&self) -> T {
        match &self.inner {
            SignalKinds::Writable(s) => s.get(),
            SignalKinds::Computed(s) => s.get(),
            SignalKinds::External(s) => s.get(),
            SignalKinds::Synchronized(s) => s.get(),
            SignalKinds::Linked(s) => s.get(),
            SignalKinds::Derived(f) => f(),
        }
    }

    fn try_get(&self) -> Option<T> {
        match &self.inner {
            SignalKinds::Writable(s) => s.try_get(),
            SignalKinds::Computed(s) => s.try_get(),
            SignalKinds::External(s) => s.try_get(),
            SignalKinds::Synchronized(s) => s.try_get(),
            SignalKinds::Linked(s) => s.try_get(),
            SignalKinds::Derived(f) => Some(f()),
        }
    }
}

impl<T: Clone> SignalGetUntracked<T> for Signal<T> {
    fn get_untracked(&self) -> T {
        match &self.inner {
            SignalKinds::Writable(s) => s.get_untracked(),
            SignalKinds::Computed(s) => s.get_untracked(),
            SignalKinds::External(s) => s.get_untracked(),
            SignalKinds::Synchronized(s) => s.get_untracked(),
            SignalKinds::Linked(s) => s.get_untracked(),
            SignalKinds::Derived(f) => crate::untracked(|| f()),
        }
    }

    fn try_get_untracked(&self) -> Option<T> {
        match &self.inner {
            SignalKinds::Writable(s) => s.try_get_untracked(),
            SignalKinds::Computed(s) => s.try_get_untracked(),
            SignalKinds::External(s) => s.try_get_untracked(),
            SignalKinds::Synchronized(s) => s.try_get_untracked(),
            SignalKinds::Linked(s) => s.try_get_untracked(),
            SignalKinds::Derived(f) => Some(crate::untracked(|| f())),
        }
    }
}

impl<T: Clone> SignalWith<T> for Signal<T> {
    fn with<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        match &self.inner {
            SignalKinds::Writable(s) => s.with(f),
            SignalKinds::Computed(s) => s.with(f),
            SignalKinds::External(s) => s.with(f),
            SignalKinds::Synchronized(s) => s.with(f),
            SignalKinds::Linked(s) => s.with(f),
            SignalKinds::Derived(derive) => f(&derive()),
        }
    }

    fn try_with<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        match &self.inner {
            SignalKinds::Writable(s) => s.try_with(f),
            SignalKinds::Computed(s) => s.try_with(f),
            SignalKinds::External(s) => s.try_with(f),
            SignalKinds::Synchronized(s) => s.try_with(f),
            SignalKinds::Linked(s) => s.try_with(f),
            SignalKinds::Derived(derive) => Some(f(&derive())),
        }
    }
}

impl<T> From<Writable<T>> for Signal<T> {
    fn from(value: Writable<T>) -> Self {
        Self {
            inner: SignalKinds::Writable(value),
        }
    }
}

impl<T> From<Computed<T>> for Signal<T> {
    fn from(value: Computed<T>) -> Self {
        Self {
            inner: SignalKinds::Computed(value),
        }
    }
}

impl<T> From<External<T>> for Signal<T> {
    fn from(value: External<T>) -> Self {
        Self {
            inner: SignalKinds::External(value),
        }
    }
}

impl<T> From<Synchronized<T>> for Signal<T> {
    fn from(value: Synchronized<T>) -> Self {
        Self {
            inner: SignalKinds::Synchronized(value),
        }
    }
}

impl<T> From<Linked<T>> for Signal<T> {
    fn from(value: Linked<T>) -> Self {
        Self {
            inner: SignalKinds::Linked(value),
        }
    }
}

/// Either a plain value or a reactive signal: the argument type for APIs
/// that accept both.
///
/// ```
/// use reactivity_core::{create_writable, get_value, MaybeSignal, SignalSet};
///
/// fn label(source: impl Into<MaybeSignal<String>>) -> MaybeSignal<String> {
///     source.into()
/// }
///
/// let fixed = label("constant".to_string());
/// assert_eq!(get_value(&fixed), "constant");
/// assert!(fixed.is_static());
///
/// let name = create_writable("dynamic".to_string());
/// let reactive = label(name);
/// assert_eq!(get_value(&reactive), "dynamic");
/// name.set("changed".to_string());
/// assert_eq!(get_value(&reactive), "changed");
/// ```
#[derive(Clone, Debug)]
pub enum MaybeSignal<T>
where
    T: 'static,
{
    /// An unchanging value.
    Static(T),
    /// A reactive value.
    Dynamic(Signal<T>),
}

impl<T: Default> Default for MaybeSignal<T> {
    fn default() -> Self {
        Self::Static(T::default())
    }
}

impl<T> MaybeSignal<T> {
    /// Whether this wraps a plain, non-reactive value.
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Static(_))
    }
}

impl<T: Clone> SignalGet<T> for MaybeSignal<T> {
    fn get(&self) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Dynamic(signal) => signal.get(),
        }
    }

    fn try_get(&self) -> Option<T> {
        match self {
            Self::Static(value) => Some(value.clone()),
            Self::Dynamic(signal) => signal.try_get(),
        }
    }
}

impl<T: Clone> SignalGetUntracked<T> for MaybeSignal<T> {
    fn get_untracked(&self) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Dynamic(signal) => signal.get_untracked(),
        }
    }

    fn try_get_untracked(&self) -> Option<T> {
        match self {
            Self::Static(value) => Some(value.clone()),
            Self::Dynamic(signal) => signal.try_get_untracked(),
        }
    }
}

impl<T> From<T> for MaybeSignal<T> {
    fn from(value: T) -> Self {
        Self::Static(value)
    }
}

impl<T> From<Signal<T>> for MaybeSignal<T> {
    fn from(value: Signal<T>) -> Self {
        Self::Dynamic(value)
    }
}

impl<T> From<Writable<T>> for MaybeSignal<T> {
    fn from(value: Writable<T>) -> Self {
        Self::Dynamic(value.into())
    }
}

impl<T> From<Computed<T>> for MaybeSignal<T> {
    fn from(value: Computed<T>) -> Self {
        Self::Dynamic(value.into())
    }
}

impl<T> From<External<T>> for MaybeSignal<T> {
    fn from(value: External<T>) -> Self {
        Self::Dynamic(value.into())
    }
}

impl<T> From<Synchronized<T>> for MaybeSignal<T> {
    fn from(value: Synchronized<T>) -> Self {
        Self::Dynamic(value.into())
    }
}

impl<T> From<Linked<T>> for MaybeSignal<T> {
    fn from(value: Linked<T>) -> Self {
        Self::Dynamic(value.into())
    }
}

/// Clones the current value out of a value-or-signal, tracked.
pub fn get_value<T: Clone>(value: &MaybeSignal<T>) -> T {
    value.get()
}

/// Clones the current value out of a value-or-signal without
/// registering a dependency.
pub fn peek_value<T: Clone>(value: &MaybeSignal<T>) -> T {
    value.get_untracked()
}

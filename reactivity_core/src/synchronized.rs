#![forbid(unsafe_code)]

use crate::{
    computed::{create_derived_raw, with_computed_slot},
    equality::SameValue,
    errors::{report_callback_error, CallbackError},
    node::{AnyWatchHooks, NodeId},
    runtime::{trigger_node, untracked, with_runtime},
    signal::{
        SignalGet, SignalGetUntracked, SignalOptions, SignalWith,
        SignalWithUntracked,
    },
};
use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt::Debug,
    marker::PhantomData,
    panic::{catch_unwind, panic_any, AssertUnwindSafe},
    rc::Rc,
};

/// Notification callback handed to a [`Synchronized`] subscribe
/// function; invoking it invalidates the cached value.
pub type NotifyFn = Rc<dyn Fn()>;

/// Teardown returned by a [`Synchronized`] subscribe function; invoked
/// when the last watcher leaves.
pub type UnsubscribeFn = Box<dyn FnOnce()>;

/// Creates a signal bridging a foreign data source that can push change
/// notifications, with caching tied to the watcher lifecycle.
///
/// While nothing watches the signal, every read invokes `getter` afresh
/// (no caching — the foreign source is the single source of truth). The
/// moment the first watcher subscribes, the library invokes
/// `subscribe(notify)` exactly once and starts caching: reads share one
/// evaluation until `notify()` is called. When the last watcher leaves,
/// the unsubscribe function returned by `subscribe` is invoked and the
/// cache is invalidated.
#[track_caller]
pub fn create_synchronized<T>(
    getter: impl Fn() -> T + 'static,
    subscribe: impl Fn(NotifyFn) -> UnsubscribeFn + 'static,
) -> Synchronized<T>
where
    T: SameValue + 'static,
{
    create_synchronized_with(getter, subscribe, SignalOptions::default())
}

/// Like [`create_synchronized`], with a custom equality predicate and/or
/// watch-lifecycle callbacks.
#[track_caller]
pub fn create_synchronized_with<T>(
    getter: impl Fn() -> T + 'static,
    subscribe: impl Fn(NotifyFn) -> UnsubscribeFn + 'static,
    options: SignalOptions<T>,
) -> Synchronized<T>
where
    T: SameValue + 'static,
{
    let source =
        with_runtime(|runtime| runtime.create_source_node(None, None));
    let hooks = Rc::new(SynchronizedHooks {
        facade: Cell::new(NodeId::default()),
        source,
        subscribe: Box::new(subscribe),
        unsubscribe: RefCell::new(None),
        on_first_watch: options.on_first_watch.clone(),
        on_last_unwatch: options.on_last_unwatch.clone(),
    });
    let id = create_derived_raw(
        move || {
            with_runtime(|runtime| runtime.subscribe_node(source));
            untracked(&getter)
        },
        options.equal.clone(),
        Some(Rc::clone(&hooks) as Rc<dyn AnyWatchHooks>),
    );
    hooks.facade.set(id);
    Synchronized {
        id,
        ty: PhantomData,
    }
}

struct SynchronizedHooks {
    facade: Cell<NodeId>,
    source: NodeId,
    subscribe: Box<dyn Fn(NotifyFn) -> UnsubscribeFn>,
    unsubscribe: RefCell<Option<UnsubscribeFn>>,
    on_first_watch: Option<Rc<dyn Fn()>>,
    on_last_unwatch: Option<Rc<dyn Fn()>>,
}

impl AnyWatchHooks for SynchronizedHooks {
    fn first_watch(&self) {
        // entering watched mode starts from a fresh evaluation
        with_runtime(|runtime| runtime.invalidate_node(self.facade.get()));

        let notify: NotifyFn = {
            let source = self.source;
            Rc::new(move || trigger_node(source))
        };
        match catch_unwind(AssertUnwindSafe(|| (self.subscribe)(notify))) {
            Ok(unsubscribe) => {
                *self.unsubscribe.borrow_mut() = Some(unsubscribe);
            }
            Err(payload) => report_callback_error(
                CallbackError::from_panic(payload),
                Some("synchronized subscribe"),
            ),
        }

        if let Some(f) = &self.on_first_watch {
            f();
        }
    }

    fn last_unwatch(&self) {
        if let Some(unsubscribe) = self.unsubscribe.borrow_mut().take() {
            // the unsubscribe counts as done even if it threw
            if let Err(payload) =
                catch_unwind(AssertUnwindSafe(unsubscribe))
            {
                report_callback_error(
                    CallbackError::from_panic(payload),
                    Some("synchronized unsubscribe"),
                );
            }
        }
        with_runtime(|runtime| runtime.invalidate_node(self.facade.get()));

        if let Some(f) = &self.on_last_unwatch {
            f();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A two-mode bridge to a foreign data source: pull-per-read while
/// unwatched, cached with push invalidation while watched. `Copy`, like
/// all handles.
pub struct Synchronized<T>
where
    T: 'static,
{
    pub(crate) id: NodeId,
    pub(crate) ty: PhantomData<T>,
}

impl<T> Clone for Synchronized<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Synchronized<T> {}

impl<T> Debug for Synchronized<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronized").field("id", &self.id).finish()
    }
}

impl<T> Synchronized<T>
where
    T: 'static,
{
    fn read<O>(
        &self,
        subscribe: bool,
        f: impl FnOnce(&T) -> O,
    ) -> Result<O, crate::ReactivityError> {
        with_runtime(|runtime| {
            if subscribe {
                runtime.subscribe_node(self.id);
            }
            if !runtime.has_subscribers(self.id) {
                // unwatched: the foreign source is authoritative, force a
                // fresh getter call
                runtime.invalidate_node(self.id);
            }
            with_computed_slot(runtime, self.id, false, f)
        })
    }
}

impl<T: Clone> SignalGet<T> for Synchronized<T> {
    fn get(&self) -> T {
        self.with(T::clone)
    }

    fn try_get(&self) -> Option<T> {
        self.try_with(T::clone)
    }
}

impl<T> SignalWith<T> for Synchronized<T> {
    fn with<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        self.read(true, f).unwrap_or_else(|err| panic_any(err))
    }

    fn try_with<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        self.read(true, f).ok()
    }
}

impl<T: Clone> SignalGetUntracked<T> for Synchronized<T> {
    fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }

    fn try_get_untracked(&self) -> Option<T> {
        self.try_with_untracked(T::clone)
    }
}

impl<T> SignalWithUntracked<T> for Synchronized<T> {
    fn with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        self.read(false, f).unwrap_or_else(|err| panic_any(err))
    }

    fn try_with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        self.read(false, f).ok()
    }
}

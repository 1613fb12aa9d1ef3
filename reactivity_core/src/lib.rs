#![forbid(unsafe_code)]

//! A fine-grained reactivity engine.
//!
//! This crate maintains a dynamic dependency graph between mutable cells
//! ("writables"), derived cells ("computeds") and observers ("effects"
//! and "watches"), and propagates changes through that graph with
//! precise, deterministic semantics: push-based invalidation combined
//! with pull-based lazy recomputation.
//!
//! ## Signals
//!
//! 1. *Writables:* [`create_writable`] returns a [`Writable`], the basic
//!    mutable cell. Writes that store an equal value (by
//!    [`SameValue`] or a custom predicate) are suppressed entirely.
//! 2. *Computeds:* [`create_computed`] returns a lazily evaluated
//!    [`Computed`] that re-runs only when a dependency actually changed,
//!    and suppresses propagation when its own result is unchanged.
//! 3. *Foreign sources:* [`create_external`] bridges a value the engine
//!    cannot observe (invalidate manually with `trigger`);
//!    [`create_synchronized`] bridges a source that can push
//!    notifications, caching only while watched.
//! 4. *Linked:* [`create_linked`] combines a writable slot with
//!    automatic reset when an upstream source changes.
//!
//! ## Observers
//!
//! [`create_effect`] runs a body immediately and re-runs it when its
//! dependencies change; [`watch_value`] and [`watch`] compare successive
//! selector values and invoke a non-tracked callback only on real
//! changes. Both support cleanup functions ([`CallbackResult`]) and
//! detect cycles. Async variants coalesce bursts of changes into one run
//! per macro-task drain (see [`create_async_effect`] and
//! [`dispatch_async_callback`]).
//!
//! ## Batching
//!
//! [`batch`] defers all observer wake-ups to the end of the outermost
//! batch scope; [`untracked`] suspends dependency capture.
//!
//! ```
//! use reactivity_core::{
//!     batch, create_computed, create_effect, create_writable,
//!     CallbackResult, SignalGet, SignalSet,
//! };
//! use std::{cell::RefCell, rc::Rc};
//!
//! let a = create_writable(1);
//! let b = create_writable(2);
//! let sum = create_computed(move || a.get() + b.get());
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! create_effect({
//!     let log = Rc::clone(&log);
//!     move |_| {
//!         log.borrow_mut().push(sum.get());
//!         CallbackResult::NoCleanup
//!     }
//! });
//!
//! // both writes coalesce into a single observer run
//! batch(|| {
//!     a.set(10);
//!     b.set(20);
//! });
//! assert_eq!(*log.borrow(), vec![3, 30]);
//! ```
//!
//! The engine is single-threaded and cooperative: every thread owns an
//! independent reactive graph, and all reads, writes and callbacks run
//! on the thread that created the signal.

mod computed;
mod dispatch;
mod effect;
mod equality;
mod errors;
mod external;
mod linked;
mod node;
mod runtime;
mod signal;
mod spawn;
mod synchronized;
mod trackers;
mod watch;
mod wrappers;

pub use computed::{create_computed, create_computed_with, Computed};
pub use dispatch::{
    dispatch_async_callback, next_tick, AsyncCallbackHandle,
};
pub use effect::{
    create_async_effect, create_effect, create_effect_with, CallbackResult,
    Dispatch, EffectContext, EffectHandle, EffectOptions,
};
pub use equality::SameValue;
pub use errors::{
    report_callback_error, set_error_reporter, CallbackError,
    ReactivityError,
};
pub use external::{create_external, create_external_with, External};
pub use linked::{create_linked, create_linked_with, Linked};
pub use runtime::{batch, untracked};
pub use signal::{
    create_writable, create_writable_with, EqualFn, SignalGet,
    SignalGetUntracked, SignalOptions, SignalSet, SignalUpdate, SignalWith,
    SignalWithUntracked, Writable,
};
pub use synchronized::{
    create_synchronized, create_synchronized_with, NotifyFn, Synchronized,
    UnsubscribeFn,
};
pub use trackers::Trackers;
pub use watch::{
    watch, watch_value, watch_value_with, watch_with, WatchHandle,
    WatchOptions,
};
pub use wrappers::{get_value, peek_value, MaybeSignal, Signal};

#![forbid(unsafe_code)]

use crate::{
    computed::{create_derived_raw, with_computed_slot},
    equality::SameValue,
    errors::ReactivityError,
    node::NodeId,
    runtime::{untracked, with_runtime},
    signal::{
        values_equal, SignalGet, SignalGetUntracked, SignalOptions,
        SignalSet, SignalWith, SignalWithUntracked,
    },
};
use std::{
    any::{type_name, Any},
    cell::RefCell,
    fmt::Debug,
    marker::PhantomData,
    panic::panic_any,
    rc::Rc,
};

/// The hidden write slot of a [`Linked`] signal.
struct LinkedSlot<T> {
    value: Option<T>,
    /// Whether the facade has ever been written from outside; the very
    /// first external write bypasses the equality check.
    written: bool,
}

/// Creates a writable signal that automatically resets to its source
/// whenever the source produces a new value.
///
/// Reading the facade evaluates `source()` in a tracked context. When
/// the source value differs from the previous snapshot (or on the first
/// evaluation), the writable slot is reset to it; otherwise the slot
/// keeps whatever was last written. Writes first force a read, so a
/// source change that raced the write cannot clobber it.
///
/// ```
/// use reactivity_core::{create_linked, create_writable, SignalGet, SignalSet};
///
/// let options = create_writable(vec!["a".to_string(), "b".to_string()]);
/// let current = create_linked(move || options.get()[0].clone());
///
/// assert_eq!(current.get(), "a");
///
/// current.set("b".to_string());
/// assert_eq!(current.get(), "b");
///
/// options.set(vec!["x".to_string(), "y".to_string()]);
/// assert_eq!(current.get(), "x");
/// ```
#[track_caller]
pub fn create_linked<T>(source: impl Fn() -> T + 'static) -> Linked<T>
where
    T: SameValue + Clone + 'static,
{
    create_linked_with(
        source,
        |source: &T, _previous| source.clone(),
        SignalOptions::default(),
    )
}

/// Like [`create_linked`], with an explicit reset function mapping the
/// source value (and the previous slot value, `None` on the first
/// evaluation) to the new slot value, plus signal options for the slot
/// type.
#[track_caller]
pub fn create_linked_with<T, S>(
    source: impl Fn() -> S + 'static,
    reset: impl Fn(&S, Option<T>) -> T + 'static,
    options: SignalOptions<T>,
) -> Linked<T>
where
    T: SameValue + Clone + 'static,
    S: SameValue + 'static,
{
    let slot = with_runtime(|runtime| {
        runtime.create_source_node(
            Some(Rc::new(RefCell::new(LinkedSlot::<T> {
                value: None,
                written: false,
            })) as Rc<RefCell<dyn Any>>),
            None,
        )
    });

    let previous_source = RefCell::new(None::<S>);
    // the user's `equal` governs facade writes only (see `write`); the
    // facade's own propagation compares with same-value semantics
    let facade_hooks = crate::signal::SignalHooks::from_options(options);
    let facade = create_derived_raw(
        move || {
            let source_value = source();
            let mut previous = previous_source.borrow_mut();
            let source_changed = match &*previous {
                None => true,
                Some(previous) => !previous.same_value(&source_value),
            };
            with_runtime(|runtime| {
                runtime.subscribe_node(slot);
                let slot_value = runtime
                    .node_value(slot)
                    .expect("linked write slot to be alive");
                if source_changed {
                    let previous_value = slot_value
                        .borrow_mut()
                        .downcast_mut::<LinkedSlot<T>>()
                        .expect("to downcast linked write slot")
                        .value
                        .take();
                    let new_value =
                        untracked(|| reset(&source_value, previous_value));
                    *previous = Some(source_value);
                    // internal reset: stored silently, the facade's own
                    // propagation carries the change
                    slot_value
                        .borrow_mut()
                        .downcast_mut::<LinkedSlot<T>>()
                        .expect("to downcast linked write slot")
                        .value = Some(new_value.clone());
                    new_value
                } else {
                    let slot_value = slot_value.borrow();
                    slot_value
                        .downcast_ref::<LinkedSlot<T>>()
                        .expect("to downcast linked write slot")
                        .value
                        .clone()
                        .expect("linked write slot to be initialized")
                }
            })
        },
        None,
        facade_hooks,
    );

    Linked {
        id: facade,
        slot,
        ty: PhantomData,
    }
}

/// A writable signal with automatic reset on upstream change. `Copy`,
/// like all handles.
pub struct Linked<T>
where
    T: 'static,
{
    pub(crate) id: NodeId,
    pub(crate) slot: NodeId,
    pub(crate) ty: PhantomData<T>,
}

impl<T> Clone for Linked<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Linked<T> {}

impl<T> Debug for Linked<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linked").field("id", &self.id).finish()
    }
}

impl<T> Linked<T>
where
    T: SameValue + Clone + 'static,
{
    fn write(&self, new_value: T) -> Result<(), ReactivityError> {
        // force upstream reconciliation first, so a stale source cannot
        // clobber this write on the next read
        _ = self.try_get_untracked();

        with_runtime(|runtime| {
            let slot_value = runtime
                .node_value(self.slot)
                .ok_or(ReactivityError::Disposed)?;
            {
                let slot = slot_value.borrow();
                let slot = slot
                    .downcast_ref::<LinkedSlot<T>>()
                    .ok_or(ReactivityError::Type(type_name::<T>()))?;
                if slot.written {
                    if let Some(current) = &slot.value {
                        if values_equal(runtime, self.id, current, &new_value)
                        {
                            return Ok(());
                        }
                    }
                }
            }
            {
                let mut slot = slot_value.borrow_mut();
                let slot = slot
                    .downcast_mut::<LinkedSlot<T>>()
                    .ok_or(ReactivityError::Type(type_name::<T>()))?;
                slot.value = Some(new_value);
                slot.written = true;
            }
            runtime.mark_dirty(self.slot)?;
            runtime.run_effects();
            Ok(())
        })
    }
}

impl<T: SameValue + Clone + 'static> SignalSet<T> for Linked<T> {
    fn set(&self, new_value: T) {
        if let Err(err) = self.write(new_value) {
            panic_any(err);
        }
    }

    fn try_set(&self, new_value: T) -> Option<T> {
        match self.write(new_value) {
            Ok(()) | Err(ReactivityError::Disposed) => None,
            Err(err) => panic_any(err),
        }
    }
}

impl<T: Clone> SignalGet<T> for Linked<T> {
    fn get(&self) -> T {
        self.with(T::clone)
    }

    fn try_get(&self) -> Option<T> {
        self.try_with(T::clone)
    }
}

impl<T> SignalWith<T> for Linked<T> {
    fn with<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, true, f))
            .unwrap_or_else(|err| panic_any(err))
    }

    fn try_with<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, true, f))
            .ok()
    }
}

impl<T: Clone> SignalGetUntracked<T> for Linked<T> {
    fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }

    fn try_get_untracked(&self) -> Option<T> {
        self.try_with_untracked(T::clone)
    }
}

impl<T> SignalWithUntracked<T> for Linked<T> {
    fn with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, false, f))
            .unwrap_or_else(|err| panic_any(err))
    }

    fn try_with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> Option<O> {
        with_runtime(|runtime| with_computed_slot(runtime, self.id, false, f))
            .ok()
    }
}

use reactivity_core::{
    create_effect, create_external, CallbackResult, SignalGet,
};
use std::{cell::Cell, rc::Rc};

#[test]
fn getter_is_cached_until_triggered() {
    let store = Rc::new(Cell::new(7));
    let getter_calls = Rc::new(Cell::new(0));

    let signal = create_external({
        let store = Rc::clone(&store);
        let getter_calls = Rc::clone(&getter_calls);
        move || {
            getter_calls.set(getter_calls.get() + 1);
            store.get()
        }
    });

    // lazy until first read
    assert_eq!(getter_calls.get(), 0);
    assert_eq!(signal.get(), 7);
    assert_eq!(signal.get(), 7);
    assert_eq!(getter_calls.get(), 1);

    // stale until someone says otherwise
    store.set(8);
    assert_eq!(signal.get(), 7);
    assert_eq!(getter_calls.get(), 1);

    signal.trigger();
    assert_eq!(signal.get(), 8);
    assert_eq!(getter_calls.get(), 2);
}

#[test]
fn trigger_wakes_observers() {
    let store = Rc::new(Cell::new(1));
    let seen = Rc::new(Cell::new(0));

    let signal = create_external({
        let store = Rc::clone(&store);
        move || store.get()
    });

    create_effect({
        let seen = Rc::clone(&seen);
        move |_| {
            seen.set(signal.get());
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(seen.get(), 1);

    store.set(2);
    signal.trigger();
    assert_eq!(seen.get(), 2);
}

#[test]
fn trigger_fn_is_receiver_free() {
    let store = Rc::new(Cell::new(1));
    let signal = create_external({
        let store = Rc::clone(&store);
        move || store.get()
    });
    assert_eq!(signal.get(), 1);

    let invalidate = signal.trigger_fn();
    let invalidate_clone = invalidate.clone();

    store.set(2);
    invalidate();
    assert_eq!(signal.get(), 2);

    store.set(3);
    invalidate_clone();
    assert_eq!(signal.get(), 3);
}

#[test]
fn equal_refresh_does_not_wake_observers() {
    let store = Rc::new(Cell::new(5));
    let runs = Rc::new(Cell::new(0));

    let signal = create_external({
        let store = Rc::clone(&store);
        move || store.get()
    });

    create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            signal.get();
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    // the getter re-runs but produces the same value
    signal.trigger();
    assert_eq!(runs.get(), 1);

    store.set(6);
    signal.trigger();
    assert_eq!(runs.get(), 2);
}

use reactivity_core::{
    batch, create_computed, create_effect, create_writable, CallbackResult,
    SignalGet, SignalGetUntracked, SignalSet,
};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

#[test]
fn batch_returns_the_closure_value() {
    let a = create_writable(1);
    let doubled = batch(|| {
        a.set(21);
        a.get() * 2
    });
    assert_eq!(doubled, 42);
}

#[test]
fn batch_coalesces_observer_runs() {
    let runs = Rc::new(Cell::new(0));
    let a = create_writable(1);
    let b = create_writable(2);
    let sum = create_computed(move || a.get() + b.get());

    create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            sum.get();
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    batch(|| {
        a.set(10);
        b.set(20);
        a.set(11);
    });
    assert_eq!(runs.get(), 2);
    assert_eq!(sum.get(), 31);
}

#[test]
fn writes_are_visible_inside_the_batch() {
    let runs = Rc::new(Cell::new(0));
    let a = create_writable(1);

    create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            a.get();
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });

    batch(|| {
        a.set(5);
        // the value mutated immediately, but the observer is deferred
        assert_eq!(a.get_untracked(), 5);
        assert_eq!(runs.get(), 1);
    });
    assert_eq!(runs.get(), 2);
}

#[test]
fn nested_batches_drain_only_at_the_outermost_exit() {
    let runs = Rc::new(Cell::new(0));
    let a = create_writable(0);

    create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            a.get();
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    batch(|| {
        batch(|| {
            a.set(1);
        });
        // inner exit does not drain
        assert_eq!(runs.get(), 1);
        a.set(2);
    });
    assert_eq!(runs.get(), 2);
}

#[test]
fn observers_wake_in_registration_order() {
    let log: Rc<RefCell<Vec<&'static str>>> =
        Rc::new(RefCell::new(Vec::new()));
    let a = create_writable(0);

    create_effect({
        let log = Rc::clone(&log);
        move |_| {
            a.get();
            log.borrow_mut().push("first");
            CallbackResult::NoCleanup
        }
    });
    create_effect({
        let log = Rc::clone(&log);
        move |_| {
            a.get();
            log.borrow_mut().push("second");
            CallbackResult::NoCleanup
        }
    });
    log.borrow_mut().clear();

    batch(|| a.set(1));
    assert_eq!(*log.borrow(), vec!["first", "second"]);

    log.borrow_mut().clear();
    a.set(2);
    assert_eq!(*log.borrow(), vec!["first", "second"]);
}

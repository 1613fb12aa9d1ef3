use reactivity_core::{
    create_effect, create_writable, untracked, CallbackResult, SignalGet,
    SignalSet,
};
use std::{cell::Cell, rc::Rc};

#[test]
fn untracked_read_does_not_subscribe() {
    let runs = Rc::new(Cell::new(0));
    let a = create_writable(0);

    create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            untracked(|| a.get());
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    a.set(1);
    assert_eq!(runs.get(), 1);
}

#[test]
fn tracking_resumes_after_untracked() {
    let runs = Rc::new(Cell::new(0));
    let muted = create_writable(0);
    let tracked = create_writable(0);

    create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            untracked(|| muted.get());
            tracked.get();
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    muted.set(1);
    assert_eq!(runs.get(), 1);

    tracked.set(1);
    assert_eq!(runs.get(), 2);
}

#[test]
fn untracked_returns_the_closure_value() {
    let a = create_writable(7);
    assert_eq!(untracked(|| a.get() * 6), 42);
}

use reactivity_core::{
    create_computed, create_effect, create_writable, CallbackResult,
    ReactivityError, SignalGet, SignalSet,
};
use std::{
    cell::{Cell, RefCell},
    panic::{catch_unwind, AssertUnwindSafe},
    rc::Rc,
};

#[test]
fn effect_runs() {
    let a = create_writable(-1);

    // simulate an arbitrary side effect
    let b = Rc::new(RefCell::new(String::new()));

    create_effect({
        let b = Rc::clone(&b);
        move |_| {
            *b.borrow_mut() = format!("Value is {}", a.get());
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(b.borrow().as_str(), "Value is -1");

    a.set(1);
    assert_eq!(b.borrow().as_str(), "Value is 1");
}

#[test]
fn effect_tracks_computed() {
    let a = create_writable(-1);
    let b = create_computed(move || format!("Value is {}", a.get()));
    let c = Rc::new(RefCell::new(String::new()));

    create_effect({
        let c = Rc::clone(&c);
        move |_| {
            *c.borrow_mut() = b.get();
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(c.borrow().as_str(), "Value is -1");

    a.set(1);
    assert_eq!(c.borrow().as_str(), "Value is 1");
}

#[test]
fn dependencies_are_rebuilt_each_run() {
    let runs = Rc::new(Cell::new(0));
    let use_first = create_writable(true);
    let first = create_writable("a");
    let second = create_writable("b");

    create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            if use_first.get() {
                first.get();
            } else {
                second.get();
            }
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    // not currently a dependency
    second.set("b2");
    assert_eq!(runs.get(), 1);

    use_first.set(false);
    assert_eq!(runs.get(), 2);

    // first is no longer a dependency after the re-run
    first.set("a2");
    assert_eq!(runs.get(), 2);

    second.set("b3");
    assert_eq!(runs.get(), 3);
}

#[test]
fn destroy_stops_notifications_and_is_idempotent() {
    let runs = Rc::new(Cell::new(0));
    let a = create_writable(0);

    let handle = create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            a.get();
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    handle.destroy();
    handle.destroy();

    a.set(1);
    assert_eq!(runs.get(), 1);
}

#[test]
fn initial_run_error_destroys_and_propagates() {
    let a = create_writable(0);

    let result = catch_unwind(AssertUnwindSafe(|| {
        create_effect(move |_| {
            a.get();
            panic!("initial failure");
        });
    }));
    assert!(result.is_err());

    // the effect was torn down; writes go nowhere
    a.set(1);
}

#[test]
fn writing_own_dependency_is_a_cycle() {
    let value = create_writable(0);

    let result = catch_unwind(AssertUnwindSafe(|| {
        create_effect(move |_| {
            let current = value.get();
            value.set(current + 1);
            CallbackResult::NoCleanup
        });
    }));
    let payload = result.unwrap_err();
    assert_eq!(
        payload.downcast_ref::<ReactivityError>(),
        Some(&ReactivityError::CycleDetected)
    );
}

#[test]
fn rerun_cycle_surfaces_at_the_triggering_write() {
    let value = create_writable(0);
    let gate = create_writable(false);

    create_effect(move |_| {
        let current = value.get();
        if gate.get() {
            value.set(current + 1);
        }
        CallbackResult::NoCleanup
    });

    let result = catch_unwind(AssertUnwindSafe(|| gate.set(true)));
    let payload = result.unwrap_err();
    assert_eq!(
        payload.downcast_ref::<ReactivityError>(),
        Some(&ReactivityError::CycleDetected)
    );
}

#[test]
fn effect_can_destroy_itself_mid_run() {
    let runs = Rc::new(Cell::new(0));
    let cleanups = Rc::new(Cell::new(0));
    let value = create_writable(0);

    create_effect({
        let runs = Rc::clone(&runs);
        let cleanups = Rc::clone(&cleanups);
        move |context| {
            let current = value.get();
            runs.set(runs.get() + 1);
            if current >= 1 {
                context.destroy();
            }
            let cleanups = Rc::clone(&cleanups);
            CallbackResult::cleanup(move || {
                cleanups.set(cleanups.get() + 1)
            })
        }
    });
    assert_eq!((runs.get(), cleanups.get()), (1, 0));

    // the re-run destroys the effect; its in-flight cleanup still runs
    value.set(1);
    assert_eq!((runs.get(), cleanups.get()), (2, 2));

    value.set(2);
    assert_eq!((runs.get(), cleanups.get()), (2, 2));
}

#[test]
fn later_sync_errors_propagate_but_keep_the_effect_alive() {
    let runs = Rc::new(Cell::new(0));
    let value = create_writable(0);

    create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            let current = value.get();
            runs.set(runs.get() + 1);
            if current == 1 {
                panic!("run failure");
            }
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    let result = catch_unwind(AssertUnwindSafe(|| value.set(1)));
    assert!(result.is_err());
    assert_eq!(runs.get(), 2);

    // still alive for future notifications
    value.set(2);
    assert_eq!(runs.get(), 3);
}

use reactivity_core::{
    create_writable, set_error_reporter, watch, watch_value,
    watch_value_with, CallbackResult, SignalGet, SignalSet, WatchOptions,
};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

#[test]
fn immediate_watch_fires_with_no_previous_value() {
    let log: Rc<RefCell<Vec<(i32, Option<i32>)>>> =
        Rc::new(RefCell::new(Vec::new()));
    let a = create_writable(1);

    watch_value_with(
        move || a.get(),
        {
            let log = Rc::clone(&log);
            move |new, old| {
                log.borrow_mut().push((*new, old.copied()));
                CallbackResult::NoCleanup
            }
        },
        WatchOptions {
            immediate: true,
            ..Default::default()
        },
    );
    assert_eq!(*log.borrow(), vec![(1, None)]);

    // same value: no call
    a.set(1);
    assert_eq!(*log.borrow(), vec![(1, None)]);

    a.set(2);
    assert_eq!(*log.borrow(), vec![(1, None), (2, Some(1))]);
}

#[test]
fn non_immediate_watch_captures_a_baseline() {
    let log: Rc<RefCell<Vec<(i32, Option<i32>)>>> =
        Rc::new(RefCell::new(Vec::new()));
    let a = create_writable(1);

    watch_value(move || a.get(), {
        let log = Rc::clone(&log);
        move |new, old| {
            log.borrow_mut().push((*new, old.copied()));
            CallbackResult::NoCleanup
        }
    });
    assert!(log.borrow().is_empty());

    a.set(2);
    assert_eq!(*log.borrow(), vec![(2, Some(1))]);
}

#[test]
fn callback_reads_are_not_tracked() {
    let calls = Rc::new(Cell::new(0));
    let a = create_writable(0);
    let noise = create_writable(0);

    watch_value(move || a.get(), {
        let calls = Rc::clone(&calls);
        move |_, _| {
            noise.get();
            calls.set(calls.get() + 1);
            CallbackResult::NoCleanup
        }
    });

    a.set(1);
    assert_eq!(calls.get(), 1);

    noise.set(1);
    assert_eq!(calls.get(), 1);

    a.set(2);
    assert_eq!(calls.get(), 2);
}

#[test]
fn custom_equality_suppresses_callbacks() {
    let calls = Rc::new(Cell::new(0));
    let a = create_writable(2);

    watch_value_with(
        move || a.get(),
        {
            let calls = Rc::clone(&calls);
            move |_, _| {
                calls.set(calls.get() + 1);
                CallbackResult::NoCleanup
            }
        },
        WatchOptions {
            equal: Some(Rc::new(|a: &i32, b: &i32| a % 10 == b % 10)),
            ..Default::default()
        },
    );

    // 12 ≡ 2 (mod 10): no real change
    a.set(12);
    assert_eq!(calls.get(), 0);

    a.set(13);
    assert_eq!(calls.get(), 1);
}

#[test]
fn multi_value_watch_compares_elementwise() {
    let log: Rc<RefCell<Vec<(i32, i32)>>> = Rc::new(RefCell::new(Vec::new()));
    let a = create_writable(1);
    let b = create_writable(2);

    watch(move || (a.get(), b.get()), {
        let log = Rc::clone(&log);
        move |new, _| {
            log.borrow_mut().push(*new);
            CallbackResult::NoCleanup
        }
    });
    assert!(log.borrow().is_empty());

    b.set(3);
    assert_eq!(*log.borrow(), vec![(1, 3)]);

    // writing the same pair back is suppressed at the write
    b.set(3);
    assert_eq!(*log.borrow(), vec![(1, 3)]);
}

#[test]
fn watch_cleanup_runs_per_epoch_and_on_destroy() {
    let cleanups = Rc::new(Cell::new(0));
    let a = create_writable(0);

    let handle = watch_value(move || a.get(), {
        let cleanups = Rc::clone(&cleanups);
        move |_, _| {
            let cleanups = Rc::clone(&cleanups);
            CallbackResult::cleanup(move || {
                cleanups.set(cleanups.get() + 1)
            })
        }
    });

    a.set(1);
    assert_eq!(cleanups.get(), 0);

    a.set(2);
    assert_eq!(cleanups.get(), 1);

    handle.destroy();
    assert_eq!(cleanups.get(), 2);

    a.set(3);
    assert_eq!(cleanups.get(), 2);
}

#[test]
fn later_selector_errors_are_reported_and_watch_survives() {
    let reported = Rc::new(Cell::new(0));
    let previous_reporter = set_error_reporter(Some(Rc::new({
        let reported = Rc::clone(&reported);
        move |_, _: Option<&str>| reported.set(reported.get() + 1)
    })));

    let calls = Rc::new(Cell::new(0));
    let a = create_writable(0);

    watch_value(
        move || {
            let value = a.get();
            if value == 1 {
                panic!("selector failure");
            }
            value
        },
        {
            let calls = Rc::clone(&calls);
            move |_, _| {
                calls.set(calls.get() + 1);
                CallbackResult::NoCleanup
            }
        },
    );

    a.set(1);
    assert_eq!(reported.get(), 1);
    assert_eq!(calls.get(), 0);

    // the watch is still alive and picks up the next good value
    a.set(2);
    assert_eq!(calls.get(), 1);

    set_error_reporter(previous_reporter);
}

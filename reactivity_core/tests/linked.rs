use reactivity_core::{
    create_effect, create_linked, create_linked_with, create_writable,
    CallbackResult, SignalGet, SignalOptions, SignalSet,
};
use std::{cell::Cell, rc::Rc};

#[test]
fn linked_resets_when_the_source_changes() {
    let options = create_writable(vec![
        "a".to_string(),
        "b".to_string(),
        "c".to_string(),
    ]);
    let current = create_linked(move || options.get()[0].clone());

    assert_eq!(current.get(), "a");

    current.set("b".to_string());
    assert_eq!(current.get(), "b");

    options.set(vec!["x".to_string(), "y".to_string()]);
    assert_eq!(current.get(), "x");
}

#[test]
fn unchanged_source_keeps_the_written_value() {
    let source = create_writable(1);
    let noise = create_writable(0);
    let linked = create_linked(move || {
        noise.get();
        source.get()
    });

    assert_eq!(linked.get(), 1);
    linked.set(42);
    assert_eq!(linked.get(), 42);

    // the source re-evaluates but produces the same value: no reset
    noise.set(1);
    assert_eq!(linked.get(), 42);

    source.set(2);
    assert_eq!(linked.get(), 2);
}

#[test]
fn reset_receives_the_previous_value() {
    let source = create_writable(10);
    let accumulated = create_linked_with(
        move || source.get(),
        |source, previous| source + previous.unwrap_or(0),
        SignalOptions::default(),
    );

    assert_eq!(accumulated.get(), 10);

    source.set(5);
    assert_eq!(accumulated.get(), 15);

    source.set(1);
    assert_eq!(accumulated.get(), 16);
}

#[test]
fn writes_notify_observers() {
    let seen = Rc::new(Cell::new(0));
    let source = create_writable(1);
    let linked = create_linked(move || source.get());

    create_effect({
        let seen = Rc::clone(&seen);
        move |_| {
            seen.set(linked.get());
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(seen.get(), 1);

    linked.set(7);
    assert_eq!(seen.get(), 7);

    source.set(3);
    assert_eq!(seen.get(), 3);
}

#[test]
fn equal_writes_are_suppressed_after_the_first() {
    let runs = Rc::new(Cell::new(0));
    let source = create_writable(0);
    let linked = create_linked_with(
        move || source.get(),
        |source, _| *source,
        SignalOptions::with_equal(|a: &i32, b: &i32| a % 10 == b % 10),
    );

    create_effect({
        let runs = Rc::clone(&runs);
        move |_| {
            linked.get();
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    // 10 ≡ 0 (mod 10), but the very first write bypasses equality
    linked.set(10);
    assert_eq!(runs.get(), 2);
    assert_eq!(linked.get(), 10);

    // later equal writes are suppressed
    linked.set(20);
    assert_eq!(runs.get(), 2);
    assert_eq!(linked.get(), 10);

    linked.set(3);
    assert_eq!(runs.get(), 3);
    assert_eq!(linked.get(), 3);
}

use reactivity_core::{
    batch, create_effect, CallbackResult, Trackers,
};
use std::{cell::Cell, rc::Rc};

#[test]
fn track_and_trigger_are_key_scoped() {
    let trackers: Trackers<&'static str> = Trackers::new();
    let runs_a = Rc::new(Cell::new(0));
    let runs_b = Rc::new(Cell::new(0));

    create_effect({
        let trackers = trackers.clone();
        let runs_a = Rc::clone(&runs_a);
        move |_| {
            trackers.track(&"a");
            runs_a.set(runs_a.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    create_effect({
        let trackers = trackers.clone();
        let runs_b = Rc::clone(&runs_b);
        move |_| {
            trackers.track(&"b");
            runs_b.set(runs_b.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!((runs_a.get(), runs_b.get()), (1, 1));

    trackers.trigger(&"a");
    assert_eq!((runs_a.get(), runs_b.get()), (2, 1));

    trackers.trigger(&"b");
    assert_eq!((runs_a.get(), runs_b.get()), (2, 2));

    // untracked keys are a no-op
    trackers.trigger(&"c");
    assert_eq!((runs_a.get(), runs_b.get()), (2, 2));
}

#[test]
fn trigger_all_wakes_every_tracked_key() {
    let trackers: Trackers<u32> = Trackers::new();
    let runs = Rc::new(Cell::new(0));

    for key in 0..3 {
        create_effect({
            let trackers = trackers.clone();
            let runs = Rc::clone(&runs);
            move |_| {
                trackers.track(&key);
                runs.set(runs.get() + 1);
                CallbackResult::NoCleanup
            }
        });
    }
    assert_eq!(runs.get(), 3);

    trackers.trigger_all();
    assert_eq!(runs.get(), 6);
}

#[test]
fn triggers_coalesce_inside_a_batch() {
    let trackers: Trackers<&'static str> = Trackers::new();
    let runs = Rc::new(Cell::new(0));

    create_effect({
        let trackers = trackers.clone();
        let runs = Rc::clone(&runs);
        move |_| {
            trackers.track(&"k");
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 1);

    batch(|| {
        trackers.trigger(&"k");
        trackers.trigger(&"k");
    });
    assert_eq!(runs.get(), 2);
}

#[test]
fn abandoned_keys_are_swept() {
    let trackers: Trackers<&'static str> = Trackers::new();
    let runs = Rc::new(Cell::new(0));

    let handle = create_effect({
        let trackers = trackers.clone();
        let runs = Rc::clone(&runs);
        move |_| {
            trackers.track(&"k");
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert!(trackers.is_tracked(&"k"));

    handle.destroy();

    // the abandoned entry disappears and triggering it is a no-op
    assert!(!trackers.is_tracked(&"k"));
    trackers.trigger(&"k");
    assert_eq!(runs.get(), 1);
}

#[test]
fn retracking_after_a_sweep_works() {
    let trackers: Trackers<&'static str> = Trackers::new();
    let runs = Rc::new(Cell::new(0));

    let first = create_effect({
        let trackers = trackers.clone();
        let runs = Rc::clone(&runs);
        move |_| {
            trackers.track(&"k");
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    first.destroy();
    assert!(!trackers.is_tracked(&"k"));

    create_effect({
        let trackers = trackers.clone();
        let runs = Rc::clone(&runs);
        move |_| {
            trackers.track(&"k");
            runs.set(runs.get() + 1);
            CallbackResult::NoCleanup
        }
    });
    assert_eq!(runs.get(), 2);

    trackers.trigger(&"k");
    assert_eq!(runs.get(), 3);
}

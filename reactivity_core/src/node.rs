use std::{any::Any, cell::RefCell, rc::Rc};

slotmap::new_key_type! {
    /// Unique ID assigned to a node in the reactive graph.
    pub struct NodeId;
}

/// One entry in the graph arena: a source (writable or invalidation
/// signal), a derived value, or a watcher.
#[derive(Clone)]
pub(crate) struct ReactiveNode {
    pub value: Option<Rc<RefCell<dyn Any>>>,
    pub state: ReactiveNodeState,
    pub kind: ReactiveNodeKind,
    /// Set for the duration of a derived/watcher evaluation; a second
    /// evaluation starting while this is set is a cycle.
    pub computing: bool,
    pub hooks: Option<Rc<dyn AnyWatchHooks>>,
}

#[derive(Clone)]
pub(crate) enum ReactiveNodeKind {
    /// Holds a value written from outside the graph. Invalidation
    /// signals (triggers) are sources with no value.
    Source,
    /// Lazily evaluated from other nodes.
    Derived { f: Rc<dyn AnyComputation> },
    /// Records dependencies during its run and is notified when any of
    /// them may have changed.
    Watcher {
        f: Rc<dyn AnyComputation>,
        notify: Rc<dyn AnyWatcherNotify>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum ReactiveNodeState {
    Clean,
    /// Maybe stale: some transitive source changed, sources must be
    /// polled before deciding whether to re-run.
    Check,
    Dirty,

    /// Dirty and already visited by the current propagation.
    DirtyMarked,
}

/// Type-erased computation attached to a derived or watcher node.
/// Returns whether the node's value changed (derived nodes compare with
/// their equality predicate; watchers always count as changed).
pub(crate) trait AnyComputation {
    fn run(self: Rc<Self>, value: Option<Rc<RefCell<dyn Any>>>) -> bool;
}

/// Notify discipline of a watcher node: decides whether a pending
/// notification re-executes during the current drain or is parked on the
/// async dispatch queue.
pub(crate) trait AnyWatcherNotify {
    fn notify(self: Rc<Self>);
}

/// Watch-count lifecycle callbacks attached to a node, fired on 0→1 and
/// 1→0 subscriber transitions.
pub(crate) trait AnyWatchHooks {
    fn first_watch(&self);
    fn last_unwatch(&self);
    fn as_any(&self) -> &dyn Any;
}

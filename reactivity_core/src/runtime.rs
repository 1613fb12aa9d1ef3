#![forbid(unsafe_code)]

use crate::{
    errors::ReactivityError,
    node::{
        AnyComputation, AnyWatchHooks, AnyWatcherNotify, NodeId, ReactiveNode,
        ReactiveNodeKind, ReactiveNodeState,
    },
};
use core::hash::BuildHasherDefault;
use indexmap::IndexSet;
use rustc_hash::FxHasher;
use slotmap::{SecondaryMap, SlotMap};
use std::{
    any::Any,
    cell::{Cell, RefCell},
    rc::Rc,
};

type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

thread_local! {
    pub(crate) static RUNTIME: Runtime = Runtime::default();
}

// The data structure that owns all the signals, derived values and
// watchers of the current thread.
#[derive(Default)]
pub(crate) struct Runtime {
    pub observer: Cell<Option<NodeId>>,
    pub nodes: RefCell<SlotMap<NodeId, ReactiveNode>>,
    pub node_subscribers:
        RefCell<SecondaryMap<NodeId, RefCell<FxIndexSet<NodeId>>>>,
    pub node_sources:
        RefCell<SecondaryMap<NodeId, RefCell<FxIndexSet<NodeId>>>>,
    pub pending_watchers: RefCell<Vec<NodeId>>,
    pub batching: Cell<bool>,
    /// One frame per in-flight re-evaluation. Sources that lose their
    /// last subscriber during the run are parked here: re-subscribing
    /// within the same run cancels the transition, so watch-lifecycle
    /// hooks fire only for genuine 1→0 changes.
    pub deferred_unwatch: RefCell<Vec<Vec<NodeId>>>,
}

#[inline(always)]
pub(crate) fn with_runtime<T>(f: impl FnOnce(&Runtime) -> T) -> T {
    RUNTIME.with(f)
}

// This impl block handles all the work of marking and updating the
// reactive graph.
//
// In terms of concept and algorithm, the marking protocol follows
// Reactively (https://github.com/modderme123/reactively): writes push
// `Check`/`Dirty` marks down the graph, reads pull, re-running only the
// nodes whose sources actually changed.
impl Runtime {
    pub(crate) fn update_if_necessary(
        &self,
        node_id: NodeId,
    ) -> Result<(), ReactivityError> {
        if self.current_state(node_id) == ReactiveNodeState::Check {
            let sources = {
                let sources = self.node_sources.borrow();
                sources.get(node_id).map(|sources| {
                    let sources = sources.borrow();
                    sources.iter().copied().collect::<Vec<_>>()
                })
            };

            for source in sources.into_iter().flatten() {
                if source == node_id {
                    continue;
                }
                self.update_if_necessary(source)?;
                if self.current_state(node_id) >= ReactiveNodeState::Dirty {
                    // as soon as a single source has marked us dirty, we
                    // can stop polling the rest to avoid over-re-running
                    break;
                }
            }
        }

        // if we're dirty at this point, update
        if self.current_state(node_id) >= ReactiveNodeState::Dirty {
            self.update(node_id)?;
        }

        // now we're clean
        self.mark_clean(node_id);
        Ok(())
    }

    pub(crate) fn update(
        &self,
        node_id: NodeId,
    ) -> Result<(), ReactivityError> {
        let node = {
            let nodes = self.nodes.borrow();
            nodes.get(node_id).cloned()
        };
        let Some(node) = node else {
            return Ok(());
        };

        // derived values and watchers re-run; sources simply have their
        // value
        let changed = match node.kind {
            ReactiveNodeKind::Source => true,
            ReactiveNodeKind::Derived { ref f }
            | ReactiveNodeKind::Watcher { ref f, .. } => {
                {
                    let mut nodes = self.nodes.borrow_mut();
                    match nodes.get_mut(node_id) {
                        Some(node) if node.computing => {
                            return Err(ReactivityError::CycleDetected)
                        }
                        Some(node) => node.computing = true,
                        None => return Ok(()),
                    }
                }
                let computing = ClearComputingOnDrop(node_id);
                self.deferred_unwatch.borrow_mut().push(Vec::new());
                let deferred = FireDeferredUnwatchOnDrop;

                let f = Rc::clone(f);
                let value = node.value.clone();
                // set this node as the observer and rebuild its
                // dependency set from scratch
                let changed = self.with_observer(node_id, move || {
                    self.cleanup_sources(node_id);
                    f.run(value)
                });

                drop(deferred);
                drop(computing);
                changed
            }
        };

        // mark children dirty
        if changed {
            let subs = self.node_subscribers.borrow();
            if let Some(subs) = subs.get(node_id) {
                let mut nodes = self.nodes.borrow_mut();
                for sub_id in subs.borrow().iter() {
                    if let Some(sub) = nodes.get_mut(*sub_id) {
                        sub.state = ReactiveNodeState::Dirty;
                    }
                }
            }
        }

        // mark clean
        self.mark_clean(node_id);
        Ok(())
    }

    /// Removes `node_id` from the subscriber sets of all its sources and
    /// clears its source set, firing `on_last_unwatch` hooks for sources
    /// that lost their last subscriber.
    pub(crate) fn cleanup_sources(&self, node_id: NodeId) {
        let mut unwatched = Vec::new();
        {
            let sources = self.node_sources.borrow();
            let Some(sources) = sources.get(node_id) else {
                return;
            };
            let mut sources = sources.borrow_mut();
            let subs = self.node_subscribers.borrow();
            for source in sources.iter() {
                if let Some(source_subs) = subs.get(*source) {
                    let mut source_subs = source_subs.borrow_mut();
                    if source_subs.shift_remove(&node_id)
                        && source_subs.is_empty()
                    {
                        unwatched.push(*source);
                    }
                }
            }
            sources.clear();
        }
        if unwatched.is_empty() {
            return;
        }
        let mut deferred = self.deferred_unwatch.borrow_mut();
        if let Some(frame) = deferred.last_mut() {
            frame.extend(unwatched);
        } else {
            drop(deferred);
            for source in unwatched {
                self.fire_watch_hook(source, false);
            }
        }
    }

    /// Registers the current observer as a subscriber of `node`, firing
    /// its `on_first_watch` hook on the 0→1 transition.
    pub(crate) fn subscribe_node(&self, node: NodeId) {
        let Some(observer) = self.observer.get() else {
            return;
        };
        if observer == node {
            return;
        }
        let mut became_watched = false;
        {
            let mut subs = self.node_subscribers.borrow_mut();
            match subs.entry(node) {
                Some(entry) => {
                    let set = entry.or_default().get_mut();
                    let was_empty = set.is_empty();
                    set.insert(observer);
                    became_watched = was_empty;
                }
                // node has been disposed
                None => return,
            }

            let mut sources = self.node_sources.borrow_mut();
            if let Some(entry) = sources.entry(observer) {
                entry.or_default().get_mut().insert(node);
            }
        }
        if became_watched {
            // a source re-subscribed within the same run never actually
            // lost its watchers; cancel the parked transition
            let mut resubscribed = false;
            {
                let mut deferred = self.deferred_unwatch.borrow_mut();
                for frame in deferred.iter_mut() {
                    if let Some(position) =
                        frame.iter().position(|&parked| parked == node)
                    {
                        frame.remove(position);
                        resubscribed = true;
                        break;
                    }
                }
            }
            if !resubscribed {
                self.fire_watch_hook(node, true);
            }
        }
    }

    pub(crate) fn has_subscribers(&self, node: NodeId) -> bool {
        self.node_subscribers
            .borrow()
            .get(node)
            .map(|subs| !subs.borrow().is_empty())
            .unwrap_or(false)
    }

    fn fire_watch_hook(&self, node: NodeId, first: bool) {
        let hooks = {
            let nodes = self.nodes.borrow();
            nodes.get(node).and_then(|node| node.hooks.clone())
        };
        if let Some(hooks) = hooks {
            if first {
                hooks.first_watch();
            } else {
                hooks.last_unwatch();
            }
        }
    }

    fn current_state(&self, node: NodeId) -> ReactiveNodeState {
        match self.nodes.borrow().get(node) {
            None => ReactiveNodeState::Clean,
            Some(node) => node.state,
        }
    }

    pub(crate) fn with_observer<T>(
        &self,
        observer: NodeId,
        f: impl FnOnce() -> T,
    ) -> T {
        let prev = SetObserverOnDrop(self.observer.replace(Some(observer)));
        let value = f();
        self.observer.set(prev.0);
        std::mem::forget(prev);
        value
    }

    pub(crate) fn untrack<T>(&self, f: impl FnOnce() -> T) -> T {
        let prev = SetObserverOnDrop(self.observer.take());
        let value = f();
        self.observer.set(prev.0);
        std::mem::forget(prev);
        value
    }

    fn mark_clean(&self, node: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(node) = nodes.get_mut(node) {
            node.state = ReactiveNodeState::Clean;
        }
    }

    /// Upgrades a node to `Dirty` without propagating; the next pull
    /// re-evaluates it.
    pub(crate) fn invalidate_node(&self, node: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(node) = nodes.get_mut(node) {
            if node.state < ReactiveNodeState::Dirty {
                node.state = ReactiveNodeState::Dirty;
            }
        }
    }

    /// Push phase: marks `node` dirty, its transitive subscribers
    /// maybe-stale, and queues every watcher reached (once per watcher
    /// per propagation). Fails if the propagation reaches the node whose
    /// evaluation is currently on the stack.
    pub(crate) fn mark_dirty(
        &self,
        node: NodeId,
    ) -> Result<(), ReactivityError> {
        let current_observer = self.observer.get();
        let mut nodes = self.nodes.borrow_mut();
        let subscribers = self.node_subscribers.borrow();
        let mut pending = self.pending_watchers.borrow_mut();

        let Some(current_node) = nodes.get_mut(node) else {
            return Ok(());
        };
        if current_node.state == ReactiveNodeState::DirtyMarked {
            return Ok(());
        }

        tracing::trace!(?node, "propagating invalidation");

        // mark self dirty
        Self::mark(node, current_node, ReactiveNodeState::Dirty, &mut pending);

        Self::mark_descendants(
            &mut nodes,
            &subscribers,
            node,
            &mut pending,
            current_observer,
        )
    }

    fn mark_descendants(
        nodes: &mut SlotMap<NodeId, ReactiveNode>,
        subscribers: &SecondaryMap<NodeId, RefCell<FxIndexSet<NodeId>>>,
        node: NodeId,
        pending: &mut Vec<NodeId>,
        current_observer: Option<NodeId>,
    ) -> Result<(), ReactivityError> {
        let Some(children) = subscribers.get(node) else {
            return Ok(());
        };
        let children = children.borrow();
        for &child in children.iter() {
            if current_observer == Some(child) {
                return Err(ReactivityError::CycleDetected);
            }
            let Some(child_node) = nodes.get_mut(child) else {
                continue;
            };
            if matches!(
                child_node.state,
                ReactiveNodeState::Check | ReactiveNodeState::DirtyMarked
            ) {
                continue;
            }
            Self::mark(child, child_node, ReactiveNodeState::Check, pending);
            Self::mark_descendants(
                nodes,
                subscribers,
                child,
                pending,
                current_observer,
            )?;
        }
        Ok(())
    }

    #[inline(always)] // small function, used in hot loop
    fn mark(
        node_id: NodeId,
        node: &mut ReactiveNode,
        level: ReactiveNodeState,
        pending: &mut Vec<NodeId>,
    ) {
        if level > node.state {
            node.state = level;
        }

        if matches!(node.kind, ReactiveNodeKind::Watcher { .. }) {
            pending.push(node_id);
        }

        if node.state == ReactiveNodeState::Dirty {
            node.state = ReactiveNodeState::DirtyMarked;
        }
    }

    /// Drain phase: delivers queued notifications in insertion order.
    /// No-op while a batch is open; the outermost batch exit drains.
    pub(crate) fn run_effects(&self) {
        if self.batching.get() {
            return;
        }
        let watchers = self.pending_watchers.take();
        if !watchers.is_empty() {
            tracing::trace!(count = watchers.len(), "draining watchers");
        }
        for node_id in watchers {
            let notify = {
                let nodes = self.nodes.borrow();
                match nodes.get(node_id) {
                    Some(ReactiveNode {
                        kind: ReactiveNodeKind::Watcher { notify, .. },
                        ..
                    }) => Some(Rc::clone(notify)),
                    _ => None,
                }
            };
            if let Some(notify) = notify {
                notify.notify();
            }
        }
    }

    pub(crate) fn node_value(
        &self,
        node_id: NodeId,
    ) -> Option<Rc<RefCell<dyn Any>>> {
        let nodes = self.nodes.borrow();
        nodes.get(node_id).and_then(|node| node.value.clone())
    }

    pub(crate) fn dispose_node(&self, node: NodeId) {
        self.cleanup_sources(node);
        self.node_sources.borrow_mut().remove(node);
        self.node_subscribers.borrow_mut().remove(node);
        self.nodes.borrow_mut().remove(node);
    }

    pub(crate) fn create_source_node(
        &self,
        value: Option<Rc<RefCell<dyn Any>>>,
        hooks: Option<Rc<dyn AnyWatchHooks>>,
    ) -> NodeId {
        self.nodes.borrow_mut().insert(ReactiveNode {
            value,
            state: ReactiveNodeState::Clean,
            kind: ReactiveNodeKind::Source,
            computing: false,
            hooks,
        })
    }

    pub(crate) fn create_derived_node(
        &self,
        value: Rc<RefCell<dyn Any>>,
        f: Rc<dyn AnyComputation>,
        hooks: Option<Rc<dyn AnyWatchHooks>>,
    ) -> NodeId {
        self.nodes.borrow_mut().insert(ReactiveNode {
            value: Some(value),
            // derived values are lazy, so are dirty when created; they
            // run the first time something asks for them
            state: ReactiveNodeState::Dirty,
            kind: ReactiveNodeKind::Derived { f },
            computing: false,
            hooks,
        })
    }

    pub(crate) fn create_watcher_node(
        &self,
        f: Rc<dyn AnyComputation>,
        notify: Rc<dyn AnyWatcherNotify>,
    ) -> NodeId {
        self.nodes.borrow_mut().insert(ReactiveNode {
            value: None,
            state: ReactiveNodeState::Dirty,
            kind: ReactiveNodeKind::Watcher { f, notify },
            computing: false,
            hooks: None,
        })
    }
}

/// Marks a source node dirty and drains: the shared write path of
/// triggers, synchronized invalidations and key-scoped trackers.
pub(crate) fn trigger_node(node: NodeId) {
    with_runtime(|runtime| {
        if let Err(err) = runtime.mark_dirty(node) {
            std::panic::panic_any(err);
        }
        runtime.run_effects();
    })
}

/// Executes `f`, deferring all observer wake-ups it causes until the
/// outermost `batch` call exits, then returns `f`'s return value.
///
/// Reentrant: only the outermost exit drains. Writes inside the batch
/// still mutate signal values immediately; only the dispatch to effect
/// and watch callbacks is held, and each observer runs at most once per
/// drain no matter how many of its dependencies were written.
///
/// ```
/// use reactivity_core::{batch, create_writable, SignalGet, SignalSet};
///
/// let a = create_writable(1);
/// let b = create_writable(2);
/// let sum = batch(|| {
///     a.set(10);
///     b.set(20);
///     a.get() + b.get()
/// });
/// assert_eq!(sum, 30);
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_runtime(|runtime| {
        let batching = SetBatchingOnDrop(runtime.batching.get());
        runtime.batching.set(true);

        let value = f();

        runtime.batching.set(batching.0);
        std::mem::forget(batching);

        runtime.run_effects();
        value
    })
}

/// Executes `f` with dependency capture suspended: signal reads inside
/// `f` do not subscribe the currently running observer.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    with_runtime(|runtime| runtime.untrack(f))
}

struct SetBatchingOnDrop(bool);

impl Drop for SetBatchingOnDrop {
    fn drop(&mut self) {
        with_runtime(|runtime| runtime.batching.set(self.0));
    }
}

struct SetObserverOnDrop(Option<NodeId>);

impl Drop for SetObserverOnDrop {
    fn drop(&mut self) {
        with_runtime(|runtime| runtime.observer.set(self.0));
    }
}

struct ClearComputingOnDrop(NodeId);

impl Drop for ClearComputingOnDrop {
    fn drop(&mut self) {
        with_runtime(|runtime| {
            if let Some(node) = runtime.nodes.borrow_mut().get_mut(self.0) {
                node.computing = false;
            }
        });
    }
}

struct FireDeferredUnwatchOnDrop;

impl Drop for FireDeferredUnwatchOnDrop {
    fn drop(&mut self) {
        with_runtime(|runtime| {
            let frame = runtime.deferred_unwatch.borrow_mut().pop();
            for node in frame.into_iter().flatten() {
                if !runtime.has_subscribers(node) {
                    runtime.fire_watch_hook(node, false);
                }
            }
        });
    }
}

#![forbid(unsafe_code)]

use crate::runtime::{batch, with_runtime, Runtime};
use rustc_hash::FxHashMap;
use std::{cell::RefCell, fmt::Debug, hash::Hash, rc::Rc};

use crate::node::NodeId;

/// A map from arbitrary keys to per-key notifier signals, enabling
/// "subscribe to key K" / "notify key K" semantics without permanent
/// per-key state.
///
/// [`track`](Trackers::track) reads (creating on demand) the per-key
/// signal, subscribing the running observer to that key;
/// [`trigger`](Trackers::trigger) notifies everything tracking it.
/// Entries whose consumers have all gone away are swept from the read
/// and trigger paths, so abandoned keys eventually disappear and
/// triggering them becomes a no-op.
///
/// Reactive containers use this to notify per-element without keeping a
/// signal alive for every element ever accessed.
pub struct Trackers<K> {
    map: Rc<RefCell<FxHashMap<K, NodeId>>>,
}

impl<K> Clone for Trackers<K> {
    fn clone(&self) -> Self {
        Self {
            map: Rc::clone(&self.map),
        }
    }
}

impl<K> Default for Trackers<K> {
    fn default() -> Self {
        Self {
            map: Rc::new(RefCell::new(FxHashMap::default())),
        }
    }
}

impl<K> Debug for Trackers<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trackers")
            .field("len", &self.map.borrow().len())
            .finish()
    }
}

impl<K> Trackers<K>
where
    K: Eq + Hash + Clone + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes the running observer to `key`, creating the per-key
    /// signal if needed. Outside a tracking context this is a no-op
    /// apart from the sweep.
    pub fn track(&self, key: &K) {
        with_runtime(|runtime| {
            self.sweep(runtime);
            let id = {
                let mut map = self.map.borrow_mut();
                *map.entry(key.clone()).or_insert_with(|| {
                    runtime.create_source_node(None, None)
                })
            };
            runtime.subscribe_node(id);
        })
    }

    /// Notifies every observer currently tracking `key`. A no-op for
    /// keys nothing tracks (including swept ones).
    pub fn trigger(&self, key: &K) {
        with_runtime(|runtime| self.sweep(runtime));
        let id = self.map.borrow().get(key).copied();
        if let Some(id) = id {
            batch(|| {
                with_runtime(|runtime| {
                    if let Err(err) = runtime.mark_dirty(id) {
                        std::panic::panic_any(err);
                    }
                });
            });
        }
    }

    /// Notifies every observer tracking any key, coalesced into one
    /// batch.
    pub fn trigger_all(&self) {
        with_runtime(|runtime| self.sweep(runtime));
        let ids: Vec<NodeId> = self.map.borrow().values().copied().collect();
        batch(|| {
            with_runtime(|runtime| {
                for id in ids {
                    if let Err(err) = runtime.mark_dirty(id) {
                        std::panic::panic_any(err);
                    }
                }
            });
        });
    }

    /// Whether a live per-key signal exists for `key`, i.e. something
    /// still tracks it.
    pub fn is_tracked(&self, key: &K) -> bool {
        with_runtime(|runtime| self.sweep(runtime));
        self.map.borrow().contains_key(key)
    }

    /// Drops per-key signals that no observer subscribes to anymore.
    fn sweep(&self, runtime: &Runtime) {
        self.map.borrow_mut().retain(|_, id| {
            if runtime.has_subscribers(*id) {
                true
            } else {
                runtime.dispose_node(*id);
                false
            }
        });
    }
}

#![forbid(unsafe_code)]

use cfg_if::cfg_if;
use std::future::Future;

/// Spawns a `!Send` future onto the current thread's local executor.
///
/// Only used to schedule dispatch-queue drains; sync-only programs never
/// reach this.
pub(crate) fn spawn_local<F>(fut: F)
where
    F: Future<Output = ()> + 'static,
{
    cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            wasm_bindgen_futures::spawn_local(fut)
        } else {
            _ = tokio::task::spawn_local(fut);
        }
    }
}

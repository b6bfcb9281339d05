//! Process-wide accounting of live solver handles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Counts live native handles for leak detection. Every handle
/// acquisition and release updates the count exactly once.
///
/// Sessions share the process-wide instance from [`Runtime::global`] by
/// default; tests can hand each session a private instance instead.
#[derive(Debug, Default)]
pub struct Runtime {
    live: AtomicUsize,
}

impl Runtime {
    pub fn new() -> Runtime {
        Runtime {
            live: AtomicUsize::new(0),
        }
    }

    /// The shared process-wide instance.
    pub fn global() -> Arc<Runtime> {
        static GLOBAL: OnceLock<Arc<Runtime>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Runtime::new())))
    }

    /// Number of handles currently alive under this runtime.
    pub fn live_objects(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn register(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn unregister(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_unregister_pairs_balance() {
        let rt = Runtime::new();
        assert_eq!(rt.live_objects(), 0);
        rt.register();
        rt.register();
        assert_eq!(rt.live_objects(), 2);
        rt.unregister();
        assert_eq!(rt.live_objects(), 1);
        rt.unregister();
        assert_eq!(rt.live_objects(), 0);
    }

    #[test]
    fn global_is_shared() {
        let a = Runtime::global();
        let b = Runtime::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}

//! Listener trait and identity wrapper.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::EventKind;

/// Consumer of filesystem events for one or more subscriptions.
///
/// Callbacks run on the subscribing thread (base path, initial paths) or
/// on the dispatch thread (initial paths of new subdirectories, events).
/// Implementations should return quickly; a slow listener stalls dispatch
/// for every other subscription.
pub trait WatchListener: Send + Sync {
    /// Effective absolute root, called once per subscribe before any snapshot.
    fn handle_base_path(&self, _path: &Path) {}

    /// Children of a directory at the moment it was registered.
    fn handle_initial_paths(&self, _paths: &[PathBuf]) {}

    /// A change below a watched directory.
    fn handle_path_event(&self, path: &Path, kind: EventKind);
}

/// Shared listener reference compared by allocation identity.
#[derive(Clone)]
pub struct ListenerRef(Arc<dyn WatchListener>);

impl ListenerRef {
    pub fn new(listener: Arc<dyn WatchListener>) -> Self {
        Self(listener)
    }

    pub fn is(&self, other: &Arc<dyn WatchListener>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(other))
    }
}

impl std::ops::Deref for ListenerRef {
    type Target = dyn WatchListener;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for ListenerRef {
    fn eq(&self, other: &Self) -> bool {
        self.is(&other.0)
    }
}

impl Eq for ListenerRef {}

impl fmt::Debug for ListenerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl WatchListener for Noop {
        fn handle_path_event(&self, _path: &Path, _kind: EventKind) {}
    }

    #[test]
    fn test_identity_not_value_equality() {
        let a: Arc<dyn WatchListener> = Arc::new(Noop);
        let b: Arc<dyn WatchListener> = Arc::new(Noop);

        let ref_a = ListenerRef::new(a.clone());
        assert!(ref_a.is(&a));
        assert!(!ref_a.is(&b));
        assert_eq!(ref_a, ListenerRef::new(a));
        assert_ne!(ref_a, ListenerRef::new(b));
    }
}

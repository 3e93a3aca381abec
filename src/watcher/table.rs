//! Handle table: maps live watch handles to their subscriptions.
//!
//! A single readers-writer lock guards the map. Dispatch reads on every
//! event; registration, unsubscribe and shutdown write. The `*_with`
//! variants run OS-side work (register, cancel) while the write lock is
//! held so that the table and the OS registrations never drift apart.
//!
//! A directory is watched at most once per subscription. Registrars
//! `claim` a directory before snapshotting it; a claim fails while an
//! equal subscription is live or claimed elsewhere.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::queue::WatchHandle;
use super::subscription::Subscription;

/// Outcome of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Added(WatchHandle),
    /// An equal subscription already owns a handle.
    AlreadyWatched,
    /// The anchor handle left the table first.
    AnchorGone,
}

#[derive(Debug, Default)]
struct Entries {
    live: HashMap<WatchHandle, Subscription>,
    claims: Vec<Subscription>,
}

impl Entries {
    fn is_watched(&self, subscription: &Subscription) -> bool {
        self.live.values().any(|s| s.same_watch(subscription))
    }

    fn is_claimed(&self, subscription: &Subscription) -> bool {
        self.claims.iter().any(|s| s.same_watch(subscription))
    }

    fn drop_claim(&mut self, subscription: &Subscription) {
        if let Some(i) = self.claims.iter().position(|s| s.same_watch(subscription)) {
            self.claims.swap_remove(i);
        }
    }

    fn insert_with<E>(
        &mut self,
        subscription: Subscription,
        register: impl FnOnce(&Subscription) -> Result<WatchHandle, E>,
    ) -> Result<Insert, E> {
        self.drop_claim(&subscription);
        if self.is_watched(&subscription) {
            return Ok(Insert::AlreadyWatched);
        }
        let handle = register(&subscription)?;
        self.live.insert(handle, subscription);
        Ok(Insert::Added(handle))
    }
}

#[derive(Debug, Default)]
pub struct WatchHandleTable {
    entries: RwLock<Entries>,
}

impl WatchHandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, handle: WatchHandle, subscription: Subscription) {
        self.entries.write().live.insert(handle, subscription);
    }

    /// Reserve `subscription`'s directory. `false` if an equal subscription
    /// is already live or claimed.
    pub fn claim(&self, subscription: &Subscription) -> bool {
        let mut entries = self.entries.write();
        if entries.is_watched(subscription) || entries.is_claimed(subscription) {
            return false;
        }
        entries.claims.push(subscription.clone());
        true
    }

    /// Give up a claim without inserting.
    pub fn release_claim(&self, subscription: &Subscription) {
        self.entries.write().drop_claim(subscription);
    }

    /// Register and insert under one write lock, consuming any claim.
    ///
    /// `register` receives the subscription and returns the handle to key it
    /// by. It is not called when an equal subscription is already live. On
    /// error nothing is inserted.
    pub fn put_with<E>(
        &self,
        subscription: Subscription,
        register: impl FnOnce(&Subscription) -> Result<WatchHandle, E>,
    ) -> Result<Insert, E> {
        self.entries.write().insert_with(subscription, register)
    }

    /// Like [`put_with`](Self::put_with), but only while `anchor` is still
    /// in the table.
    pub fn put_anchored_with<E>(
        &self,
        anchor: WatchHandle,
        subscription: Subscription,
        register: impl FnOnce(&Subscription) -> Result<WatchHandle, E>,
    ) -> Result<Insert, E> {
        let mut entries = self.entries.write();
        if !entries.live.contains_key(&anchor) {
            entries.drop_claim(&subscription);
            return Ok(Insert::AnchorGone);
        }
        entries.insert_with(subscription, register)
    }

    pub fn get(&self, handle: WatchHandle) -> Option<Subscription> {
        self.entries.read().live.get(&handle).cloned()
    }

    pub fn contains(&self, handle: WatchHandle) -> bool {
        self.entries.read().live.contains_key(&handle)
    }

    pub fn remove_all(&self, predicate: impl Fn(&Subscription) -> bool) -> Vec<WatchHandle> {
        self.remove_all_with(predicate, |_| {})
    }

    /// Remove matching entries, calling `on_removed` for each while locked.
    pub fn remove_all_with(
        &self,
        predicate: impl Fn(&Subscription) -> bool,
        mut on_removed: impl FnMut(WatchHandle),
    ) -> Vec<WatchHandle> {
        let mut entries = self.entries.write();
        let removed: Vec<WatchHandle> = entries
            .live
            .iter()
            .filter(|(_, subscription)| predicate(subscription))
            .map(|(handle, _)| *handle)
            .collect();

        for handle in &removed {
            entries.live.remove(handle);
            on_removed(*handle);
        }
        removed
    }

    pub fn clear_all(&self) -> Vec<WatchHandle> {
        self.clear_all_with(|_| {})
    }

    pub fn clear_all_with(&self, mut on_removed: impl FnMut(WatchHandle)) -> Vec<WatchHandle> {
        let mut entries = self.entries.write();
        entries.claims.clear();
        let handles: Vec<WatchHandle> = entries.live.drain().map(|(handle, _)| handle).collect();
        for handle in &handles {
            on_removed(*handle);
        }
        handles
    }

    pub fn len(&self) -> usize {
        self.entries.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::{EventKind, EventKinds, ListenerRef, WatchListener};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    struct Noop;

    impl WatchListener for Noop {
        fn handle_path_event(&self, _path: &Path, _kind: EventKind) {}
    }

    fn subscription(listener: &Arc<dyn WatchListener>, root: &str) -> Subscription {
        Subscription {
            listener: ListenerRef::new(listener.clone()),
            root_path: PathBuf::from(root),
            kinds: EventKinds::all(),
            pattern: None,
            recursive: false,
        }
    }

    #[test]
    fn test_put_and_get() {
        let table = WatchHandleTable::new();
        let listener: Arc<dyn WatchListener> = Arc::new(Noop);

        table.put(WatchHandle::from_raw(1), subscription(&listener, "/a"));

        let found = table.get(WatchHandle::from_raw(1)).unwrap();
        assert_eq!(found.root_path, PathBuf::from("/a"));
        assert!(table.contains(WatchHandle::from_raw(1)));
        assert!(table.get(WatchHandle::from_raw(2)).is_none());
        assert!(!table.contains(WatchHandle::from_raw(2)));
    }

    #[test]
    fn test_remove_all_by_listener() {
        let table = WatchHandleTable::new();
        let first: Arc<dyn WatchListener> = Arc::new(Noop);
        let second: Arc<dyn WatchListener> = Arc::new(Noop);

        table.put(WatchHandle::from_raw(1), subscription(&first, "/a"));
        table.put(WatchHandle::from_raw(2), subscription(&first, "/a/b"));
        table.put(WatchHandle::from_raw(3), subscription(&second, "/a"));

        let target = ListenerRef::new(first.clone());
        let mut cancelled = Vec::new();
        let mut removed =
            table.remove_all_with(|s| s.listener == target, |handle| cancelled.push(handle));
        removed.sort_by_key(|h| h.raw());
        cancelled.sort_by_key(|h| h.raw());

        assert_eq!(removed, vec![WatchHandle::from_raw(1), WatchHandle::from_raw(2)]);
        assert_eq!(cancelled, removed);
        assert_eq!(table.len(), 1);
        assert!(table.get(WatchHandle::from_raw(3)).is_some());
    }

    #[test]
    fn test_clear_all_twice() {
        let table = WatchHandleTable::new();
        let listener: Arc<dyn WatchListener> = Arc::new(Noop);
        table.put(WatchHandle::from_raw(7), subscription(&listener, "/a"));

        assert_eq!(table.clear_all(), vec![WatchHandle::from_raw(7)]);
        assert!(table.clear_all().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_put_with_error_inserts_nothing() {
        let table = WatchHandleTable::new();
        let listener: Arc<dyn WatchListener> = Arc::new(Noop);

        let result: Result<Insert, &str> =
            table.put_with(subscription(&listener, "/a"), |_| Err("denied"));

        assert!(result.is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_put_anchored_requires_anchor() {
        let table = WatchHandleTable::new();
        let listener: Arc<dyn WatchListener> = Arc::new(Noop);

        let missing: Result<Insert, ()> = table.put_anchored_with(
            WatchHandle::from_raw(1),
            subscription(&listener, "/a/b"),
            |_| panic!("must not register without anchor"),
        );
        assert_eq!(missing, Ok(Insert::AnchorGone));

        table.put(WatchHandle::from_raw(1), subscription(&listener, "/a"));
        let added: Result<Insert, ()> = table.put_anchored_with(
            WatchHandle::from_raw(1),
            subscription(&listener, "/a/b"),
            |_| Ok(WatchHandle::from_raw(2)),
        );
        assert_eq!(added, Ok(Insert::Added(WatchHandle::from_raw(2))));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_claim_blocks_duplicate_directory() {
        let table = WatchHandleTable::new();
        let listener: Arc<dyn WatchListener> = Arc::new(Noop);
        let other: Arc<dyn WatchListener> = Arc::new(Noop);

        assert!(table.claim(&subscription(&listener, "/a")));
        assert!(!table.claim(&subscription(&listener, "/a")));
        assert!(table.claim(&subscription(&other, "/a")));

        let added: Result<Insert, ()> =
            table.put_with(subscription(&listener, "/a"), |_| Ok(WatchHandle::from_raw(1)));
        assert_eq!(added, Ok(Insert::Added(WatchHandle::from_raw(1))));

        // Live now, so claiming again still fails.
        assert!(!table.claim(&subscription(&listener, "/a")));

        let duplicate: Result<Insert, ()> = table.put_with(subscription(&listener, "/a"), |_| {
            panic!("must not register a watched directory twice")
        });
        assert_eq!(duplicate, Ok(Insert::AlreadyWatched));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_released_claim_can_be_retaken() {
        let table = WatchHandleTable::new();
        let listener: Arc<dyn WatchListener> = Arc::new(Noop);

        assert!(table.claim(&subscription(&listener, "/a")));
        table.release_claim(&subscription(&listener, "/a"));
        assert!(table.claim(&subscription(&listener, "/a")));

        table.clear_all();
        assert!(table.claim(&subscription(&listener, "/a")));
    }

    #[test]
    fn test_different_settings_are_separate_watches() {
        let table = WatchHandleTable::new();
        let listener: Arc<dyn WatchListener> = Arc::new(Noop);

        let mut recursive = subscription(&listener, "/a");
        recursive.recursive = true;

        assert!(table.claim(&subscription(&listener, "/a")));
        assert!(table.claim(&recursive));
    }
}

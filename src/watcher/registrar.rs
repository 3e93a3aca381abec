//! Turns subscribe requests into directory registrations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use super::error::{Result, WatchError};
use super::lifecycle::WatchCore;
use super::listener::{ListenerRef, WatchListener};
use super::queue::WatchHandle;
use super::subscription::{Subscription, SubscriptionRequest};
use super::table::Insert;

impl WatchCore {
    pub(crate) fn subscribe(
        &self,
        listener: Arc<dyn WatchListener>,
        request: SubscriptionRequest,
    ) -> Result<()> {
        if request.path.as_os_str().is_empty() {
            return Err(WatchError::EmptyPath);
        }
        let root =
            std::path::absolute(&request.path).map_err(|e| WatchError::io(&request.path, e))?;

        let subscription = Subscription {
            listener: ListenerRef::new(listener),
            root_path: root.clone(),
            kinds: request.kinds,
            pattern: request.pattern,
            recursive: request.recursive,
        };

        if !self.gate.wait(self.activation_timeout) {
            tracing::error!("[registrar] watcher not activated: {subscription:?}");
            return Err(WatchError::ActivationTimeout {
                path: root,
                timeout: self.activation_timeout,
            });
        }
        if self.is_stopped() {
            return Err(WatchError::Stopped);
        }

        subscription.listener.handle_base_path(&root);
        crate::log_event!("registrar", "subscription", "{subscription:?}");

        if subscription.recursive {
            self.register_tree(&subscription, None).map(|_| ())
        } else {
            self.register_dir(subscription, None).map(|_| ())
        }
    }

    /// Register every directory below `subscription.root_path`, root first.
    ///
    /// With an `anchor`, registration stops as soon as the anchor handle
    /// has left the table. Returns the number of directories registered.
    pub(crate) fn register_tree(
        &self,
        subscription: &Subscription,
        anchor: Option<WatchHandle>,
    ) -> Result<usize> {
        let root = &subscription.root_path;
        crate::log_event!("registrar", "register tree", "{}", root.display());

        let mut registered = 0;
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(root, e))?;
            if !entry.file_type().is_dir() {
                if entry.depth() == 0 {
                    return Err(WatchError::io(
                        root,
                        std::io::Error::new(
                            std::io::ErrorKind::NotADirectory,
                            "watch root is not a directory",
                        ),
                    ));
                }
                continue;
            }

            match self.register_dir(subscription.with_root(entry.into_path()), anchor)? {
                Insert::Added(_) => registered += 1,
                // Its children may still be new, keep walking.
                Insert::AlreadyWatched => {}
                Insert::AnchorGone => break,
            }
        }
        Ok(registered)
    }

    /// Claim one directory, snapshot it, then register it and insert the entry.
    fn register_dir(
        &self,
        subscription: Subscription,
        anchor: Option<WatchHandle>,
    ) -> Result<Insert> {
        let dir = subscription.root_path.clone();
        let kinds = subscription.kinds;

        if !self.table.claim(&subscription) {
            crate::debug_event!("registrar", "already watched", "{}", dir.display());
            return Ok(Insert::AlreadyWatched);
        }

        let children = match list_children(&dir) {
            Ok(children) => children,
            Err(e) => {
                self.table.release_claim(&subscription);
                return Err(e);
            }
        };
        subscription.listener.handle_initial_paths(&children);

        let register = |_: &Subscription| {
            if self.is_stopped() {
                return Err(WatchError::Stopped);
            }
            self.queue.register(&dir, kinds)
        };

        let outcome = match anchor {
            Some(anchor) => self.table.put_anchored_with(anchor, subscription, register)?,
            None => self.table.put_with(subscription, register)?,
        };

        match outcome {
            Insert::Added(handle) => {
                crate::debug_event!("registrar", "registered", "{handle:?} {}", dir.display())
            }
            Insert::AlreadyWatched => {
                crate::debug_event!("registrar", "already watched", "{}", dir.display())
            }
            Insert::AnchorGone => {
                crate::debug_event!("registrar", "parent gone", "{}", dir.display())
            }
        }
        Ok(outcome)
    }

    pub(crate) fn unsubscribe(&self, listener: &Arc<dyn WatchListener>) -> usize {
        let target = ListenerRef::new(listener.clone());

        let removed = self.table.remove_all_with(
            |subscription| subscription.listener == target,
            |handle| {
                crate::debug_event!("registrar", "cancel", "{handle:?}");
                self.queue.cancel(handle);
            },
        );

        crate::log_event!("registrar", "unsubscribed", "{} handles", removed.len());
        removed.len()
    }
}

/// Immediate children of `dir`, sorted.
fn list_children(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| WatchError::io(dir, e))?;
    let mut children = entries
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| WatchError::io(dir, e))?;
    children.sort();
    Ok(children)
}

fn walk_error(root: &Path, error: walkdir::Error) -> WatchError {
    let path = error.path().unwrap_or(root).to_path_buf();
    let source = error
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
    WatchError::io(path, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_children_sorted() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b"), "").unwrap();
        fs::write(temp.path().join("a"), "").unwrap();
        fs::create_dir(temp.path().join("c")).unwrap();

        let children = list_children(temp.path()).unwrap();
        assert_eq!(
            children,
            vec![
                temp.path().join("a"),
                temp.path().join("b"),
                temp.path().join("c"),
            ]
        );
    }

    #[test]
    fn test_list_children_missing_dir() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");

        let err = list_children(&missing).unwrap_err();
        assert!(matches!(err, WatchError::Io { path, .. } if path == missing));
    }
}

//! `WatchQueue` backed by the platform watcher from `notify`.
//!
//! Every directory is watched non-recursively. Events from the notify
//! thread are routed to the handles registered for the event's parent
//! directory, buffered per handle, and the handle is queued as ready the
//! first time an event lands after a `rearm`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::error::{Result, WatchError};
use super::kind::{EventKind, EventKinds, RawEventKind};
use super::queue::{RawEvent, WatchHandle, WatchQueue};

enum Signal {
    Ready(WatchHandle),
    Closed,
}

#[derive(Debug)]
struct HandleState {
    dir: PathBuf,
    kinds: EventKinds,
    pending: Vec<RawEvent>,
    signalled: bool,
    valid: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    handles: HashMap<WatchHandle, HandleState>,
    /// Live handles per directory. Several subscriptions may share one.
    by_dir: HashMap<PathBuf, Vec<WatchHandle>>,
    /// Watched directories whose removal was already delivered to the parent.
    removed_dirs: HashSet<PathBuf>,
}

/// State shared with the notify callback.
struct Inner {
    state: Mutex<QueueState>,
    ready_tx: Sender<Signal>,
    ready_rx: Receiver<Signal>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Inner {
    fn new() -> Self {
        let (ready_tx, ready_rx) = unbounded();
        Self {
            state: Mutex::new(QueueState::default()),
            ready_tx,
            ready_rx,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Allocate a handle for `dir`. Returns `true` if the directory had no
    /// live handle yet and therefore still needs an OS watch.
    fn reserve(&self, dir: &Path, kinds: EventKinds) -> (WatchHandle, bool) {
        let handle = WatchHandle::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock();
        state.handles.insert(
            handle,
            HandleState {
                dir: dir.to_path_buf(),
                kinds,
                pending: Vec::new(),
                signalled: false,
                valid: true,
            },
        );
        let siblings = state.by_dir.entry(dir.to_path_buf()).or_default();
        siblings.push(handle);
        (handle, siblings.len() == 1)
    }

    /// Drop a handle. Returns the directory if no live handle remains on it.
    fn release(&self, handle: WatchHandle) -> Option<PathBuf> {
        let mut state = self.state.lock();
        let removed = state.handles.remove(&handle)?;
        let siblings = state.by_dir.get_mut(&removed.dir)?;
        siblings.retain(|h| *h != handle);
        if siblings.is_empty() {
            state.by_dir.remove(&removed.dir);
            Some(removed.dir)
        } else {
            None
        }
    }

    fn route(&self, result: notify::Result<Event>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let event = match result {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("[queue] watch backend error: {e}");
                return;
            }
        };

        if event.need_rescan() {
            self.overflow_all();
            return;
        }

        for (path, kind) in normalize(&event) {
            self.deliver(&path, kind);
        }
    }

    fn overflow_all(&self) {
        let mut state = self.state.lock();
        for (handle, handle_state) in state.handles.iter_mut() {
            if handle_state.valid {
                push_event(handle_state, RawEvent::overflow());
                self.signal(*handle, handle_state);
            }
        }
    }

    fn deliver(&self, path: &Path, kind: EventKind) {
        let mut state = self.state.lock();

        // A watched directory's removal is reported on the directory itself
        // and on its parent, in either order. The first report invalidates
        // its handles and goes to the parent; the second is dropped.
        match kind {
            EventKind::Deleted => {
                if let Some(dead) = state.by_dir.remove(path) {
                    for handle in dead {
                        if let Some(handle_state) = state.handles.get_mut(&handle) {
                            handle_state.valid = false;
                            self.signal(handle, handle_state);
                        }
                    }
                    state.removed_dirs.insert(path.to_path_buf());
                } else if state.removed_dirs.remove(path) {
                    return;
                }
            }
            EventKind::Created => {
                state.removed_dirs.remove(path);
            }
            EventKind::Modified => {}
        }

        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        let Some(targets) = state.by_dir.get(parent).cloned() else {
            return;
        };

        for handle in targets {
            let Some(handle_state) = state.handles.get_mut(&handle) else {
                continue;
            };
            if handle_state.valid && handle_state.kinds.contains_kind(kind) {
                push_event(handle_state, RawEvent::new(RawEventKind::Entry(kind), name));
                self.signal(handle, handle_state);
            }
        }
    }

    fn signal(&self, handle: WatchHandle, handle_state: &mut HandleState) {
        if !handle_state.signalled {
            handle_state.signalled = true;
            let _ = self.ready_tx.send(Signal::Ready(handle));
        }
    }
}

/// Coalesce with the previous pending event when identical.
fn push_event(handle_state: &mut HandleState, event: RawEvent) {
    if let Some(last) = handle_state.pending.last_mut() {
        if last.kind == event.kind && last.context == event.context {
            last.count = last.count.saturating_add(1);
            return;
        }
    }
    handle_state.pending.push(event);
}

/// Project a notify event onto created/deleted/modified.
fn normalize(event: &Event) -> Vec<(PathBuf, EventKind)> {
    use notify::EventKind as N;

    let fixed = |kind: EventKind| {
        event
            .paths
            .iter()
            .map(|path| (path.clone(), kind))
            .collect::<Vec<_>>()
    };

    match event.kind {
        N::Create(_) => fixed(EventKind::Created),
        N::Remove(_) => fixed(EventKind::Deleted),
        N::Modify(ModifyKind::Name(RenameMode::From)) => fixed(EventKind::Deleted),
        N::Modify(ModifyKind::Name(RenameMode::To)) => fixed(EventKind::Created),
        // Backends that emit `Both` also emit the separate From/To halves.
        N::Modify(ModifyKind::Name(RenameMode::Both)) => Vec::new(),
        N::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                let kind = if path.symlink_metadata().is_ok() {
                    EventKind::Created
                } else {
                    EventKind::Deleted
                };
                (path.clone(), kind)
            })
            .collect(),
        N::Modify(_) => fixed(EventKind::Modified),
        N::Access(_) | N::Any | N::Other => Vec::new(),
    }
}

/// Production watch queue.
pub struct NotifyQueue {
    inner: Arc<Inner>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl NotifyQueue {
    pub fn new() -> Result<Self> {
        let inner = Arc::new(Inner::new());
        let callback_inner = inner.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            callback_inner.route(res);
        })?;

        Ok(Self {
            inner,
            watcher: Mutex::new(Some(watcher)),
        })
    }
}

fn watch_error(dir: &Path, error: notify::Error) -> WatchError {
    match error.kind {
        notify::ErrorKind::Io(source) => WatchError::io(dir, source),
        notify::ErrorKind::PathNotFound => WatchError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "path not found"),
        ),
        other => WatchError::PathWatchFailed {
            path: dir.to_path_buf(),
            reason: format!("{other:?}"),
        },
    }
}

impl WatchQueue for NotifyQueue {
    fn register(&self, dir: &Path, kinds: EventKinds) -> Result<WatchHandle> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(WatchError::QueueClosed);
        }

        // The handle exists before the OS watch so no early event is lost.
        let (handle, first) = self.inner.reserve(dir, kinds);
        if first {
            // Never hold the state lock here: the backend may be blocked in
            // our callback waiting for it.
            let outcome = match self.watcher.lock().as_mut() {
                Some(watcher) => watcher
                    .watch(dir, RecursiveMode::NonRecursive)
                    .map_err(|e| watch_error(dir, e)),
                None => Err(WatchError::QueueClosed),
            };
            if let Err(e) = outcome {
                self.inner.release(handle);
                return Err(e);
            }
        }

        crate::debug_event!("queue", "registered", "{handle:?} {}", dir.display());
        Ok(handle)
    }

    fn take(&self) -> Result<WatchHandle> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(WatchError::QueueClosed);
        }
        match self.inner.ready_rx.recv() {
            Ok(Signal::Ready(handle)) => Ok(handle),
            Ok(Signal::Closed) => {
                // Leave the marker for any other taker.
                let _ = self.inner.ready_tx.send(Signal::Closed);
                Err(WatchError::QueueClosed)
            }
            Err(e) => Err(WatchError::Interrupted {
                reason: e.to_string(),
            }),
        }
    }

    fn poll_events(&self, handle: WatchHandle) -> Vec<RawEvent> {
        let mut state = self.inner.state.lock();
        state
            .handles
            .get_mut(&handle)
            .map(|handle_state| std::mem::take(&mut handle_state.pending))
            .unwrap_or_default()
    }

    fn rearm(&self, handle: WatchHandle) -> bool {
        let mut state = self.inner.state.lock();
        let Some(handle_state) = state.handles.get_mut(&handle) else {
            return false;
        };
        if !handle_state.valid {
            return false;
        }
        if handle_state.pending.is_empty() {
            handle_state.signalled = false;
        } else {
            let _ = self.inner.ready_tx.send(Signal::Ready(handle));
        }
        true
    }

    fn cancel(&self, handle: WatchHandle) {
        if let Some(dir) = self.inner.release(handle) {
            if let Some(watcher) = self.watcher.lock().as_mut() {
                if let Err(e) = watcher.unwatch(&dir) {
                    crate::debug_event!("queue", "unwatch failed", "{}: {e}", dir.display());
                }
            }
        }
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let watcher = self.watcher.lock().take();
        drop(watcher);

        let mut state = self.inner.state.lock();
        state.handles.clear();
        state.by_dir.clear();
        state.removed_dirs.clear();
        drop(state);

        let _ = self.inner.ready_tx.send(Signal::Closed);
    }
}

impl Drop for NotifyQueue {
    fn drop(&mut self) {
        self.close();
    }
}

//! Startup, shutdown and the public watcher handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::activation::ActivationGate;
use super::dispatch::LoopState;
use super::error::{Result, WatchError};
use super::listener::WatchListener;
use super::notify_queue::NotifyQueue;
use super::queue::WatchQueue;
use super::subscription::{SubscriptionProps, SubscriptionRequest};
use super::table::WatchHandleTable;
use crate::config::WatcherConfig;

/// State shared by the dispatch thread and caller threads.
pub(crate) struct WatchCore {
    pub(crate) table: WatchHandleTable,
    pub(crate) gate: ActivationGate,
    pub(crate) queue: Arc<dyn WatchQueue>,
    pub(crate) activation_timeout: Duration,
    stopped: AtomicBool,
    state: AtomicU8,
}

impl WatchCore {
    fn new(queue: Arc<dyn WatchQueue>, activation_timeout: Duration) -> Self {
        Self {
            table: WatchHandleTable::new(),
            gate: ActivationGate::new(),
            queue,
            activation_timeout,
            stopped: AtomicBool::new(false),
            state: AtomicU8::new(LoopState::NotStarted as u8),
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Cancel every handle, clear the table and close the queue. Idempotent.
    pub(crate) fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        crate::log_event!("lifecycle", "shutdown", "start");

        let cancelled = self.table.clear_all_with(|handle| {
            crate::debug_event!("lifecycle", "cancel", "{handle:?}");
            self.queue.cancel(handle);
        });

        crate::debug_event!("lifecycle", "close queue");
        self.queue.close();

        crate::log_event!(
            "lifecycle",
            "shutdown",
            "end, {} handles cancelled",
            cancelled.len()
        );
    }
}

/// Recursive filesystem watcher with a single dispatch thread.
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use treewatch::{EventKind, FileWatcher, SubscriptionRequest, WatchListener};
///
/// struct Print;
///
/// impl WatchListener for Print {
///     fn handle_path_event(&self, path: &Path, kind: EventKind) {
///         println!("{kind} {}", path.display());
///     }
/// }
///
/// let watcher = FileWatcher::builder().build()?;
/// watcher.start()?;
///
/// let listener: Arc<dyn WatchListener> = Arc::new(Print);
/// watcher.subscribe(listener.clone(), SubscriptionRequest::new("./src").recursive(true))?;
/// // ...
/// watcher.unsubscribe(&listener);
/// watcher.stop();
/// # Ok::<(), treewatch::WatchError>(())
/// ```
pub struct FileWatcher {
    core: Arc<WatchCore>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    pub fn builder() -> FileWatcherBuilder {
        FileWatcherBuilder::new()
    }

    /// Build with the default queue and start the dispatch loop.
    pub fn spawn(config: &WatcherConfig) -> Result<Self> {
        let watcher = Self::builder().config(config).build()?;
        watcher.start()?;
        Ok(watcher)
    }

    /// Spawn the dispatch thread.
    pub fn start(&self) -> Result<()> {
        let mut thread = self.thread.lock();
        if self.core.is_stopped() {
            return Err(WatchError::Stopped);
        }
        if thread.is_some() {
            return Err(WatchError::AlreadyStarted);
        }

        let core = self.core.clone();
        let handle = thread::Builder::new()
            .name("treewatch-dispatch".to_string())
            .spawn(move || core.run_dispatch())
            .map_err(|e| WatchError::InitFailed {
                reason: format!("failed to spawn dispatch thread: {e}"),
            })?;
        *thread = Some(handle);

        crate::log_event!("lifecycle", "started");
        Ok(())
    }

    /// Watch `request.path` for `listener`.
    ///
    /// Blocks until the dispatch loop is running, up to the activation
    /// timeout. A recursive request registers every directory below the
    /// root before returning.
    pub fn subscribe(
        &self,
        listener: Arc<dyn WatchListener>,
        request: SubscriptionRequest,
    ) -> Result<()> {
        self.core.subscribe(listener, request)
    }

    pub fn subscribe_props(
        &self,
        listener: Arc<dyn WatchListener>,
        props: &SubscriptionProps,
    ) -> Result<()> {
        self.core.subscribe(listener, props.to_request()?)
    }

    /// Cancel every watch owned by `listener`. Returns how many were removed.
    pub fn unsubscribe(&self, listener: &Arc<dyn WatchListener>) -> usize {
        self.core.unsubscribe(listener)
    }

    /// Stop dispatching and release all watches. Safe to call repeatedly.
    pub fn stop(&self) {
        self.core.shutdown();

        let handle = self.thread.lock().take();
        match handle {
            Some(handle) if handle.thread().id() != thread::current().id() => {
                if handle.join().is_err() {
                    tracing::error!("[lifecycle] dispatch thread panicked");
                }
            }
            // Called from a listener on the dispatch thread; it exits on its own.
            Some(_) => {}
            None => {
                if self.core.state() == LoopState::NotStarted {
                    self.core.set_state(LoopState::Stopped);
                }
            }
        }
    }

    /// Block until the dispatch loop ends.
    pub fn wait(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("[lifecycle] dispatch thread panicked");
            }
        }
    }

    pub fn state(&self) -> LoopState {
        self.core.state()
    }

    pub fn is_active(&self) -> bool {
        self.core.gate.is_open() && !self.core.is_stopped()
    }

    /// Number of live directory watches.
    pub fn watch_count(&self) -> usize {
        self.core.table.len()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for constructing a FileWatcher.
pub struct FileWatcherBuilder {
    activation_timeout: Duration,
    queue: Option<Arc<dyn WatchQueue>>,
}

impl FileWatcherBuilder {
    pub fn new() -> Self {
        Self {
            activation_timeout: WatcherConfig::default().activation_timeout(),
            queue: None,
        }
    }

    pub fn config(mut self, config: &WatcherConfig) -> Self {
        self.activation_timeout = config.activation_timeout();
        self
    }

    /// How long `subscribe` waits for the dispatch loop.
    pub fn activation_timeout(mut self, timeout: Duration) -> Self {
        self.activation_timeout = timeout;
        self
    }

    /// Use a custom watch queue instead of the platform one.
    pub fn queue(mut self, queue: Arc<dyn WatchQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Build the watcher. The dispatch loop is not started.
    pub fn build(self) -> Result<FileWatcher> {
        let queue = match self.queue {
            Some(queue) => queue,
            None => Arc::new(NotifyQueue::new()?),
        };

        Ok(FileWatcher {
            core: Arc::new(WatchCore::new(queue, self.activation_timeout)),
            thread: Mutex::new(None),
        })
    }
}

impl Default for FileWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! The dispatch loop: routes ready handles to listeners.

use std::fs;
use std::path::Path;

use super::error::{Result, WatchError};
use super::kind::{EventKind, RawEventKind};
use super::lifecycle::WatchCore;
use super::queue::{RawEvent, WatchHandle};
use super::subscription::Subscription;

/// Dispatch loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    NotStarted = 0,
    Running = 1,
    StoppedDraining = 2,
    Stopped = 3,
}

impl LoopState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::NotStarted,
            1 => LoopState::Running,
            2 => LoopState::StoppedDraining,
            _ => LoopState::Stopped,
        }
    }
}

impl WatchCore {
    /// Body of the dispatch thread.
    pub(crate) fn run_dispatch(&self) {
        crate::log_event!("dispatch", "run", "start");
        self.set_state(LoopState::Running);
        self.gate.open();

        let outcome = self.dispatch_until_stopped();
        self.set_state(LoopState::StoppedDraining);

        match outcome {
            Ok(()) => crate::debug_event!("dispatch", "stop flag observed"),
            Err(WatchError::QueueClosed) => crate::log_event!("dispatch", "queue closed"),
            Err(e) => tracing::error!("[dispatch] take interrupted for unknown reason: {e}"),
        }

        self.shutdown();
        self.set_state(LoopState::Stopped);
        crate::log_event!("dispatch", "run", "end");
    }

    fn dispatch_until_stopped(&self) -> Result<()> {
        while !self.is_stopped() {
            let handle = self.queue.take()?;
            self.dispatch_ready(handle);
        }
        Ok(())
    }

    fn dispatch_ready(&self, handle: WatchHandle) {
        let Some(subscription) = self.table.get(handle) else {
            tracing::warn!("[dispatch] no subscription for {handle:?}");
            return;
        };

        crate::debug_event!(
            "dispatch",
            "ready",
            "{handle:?} {}",
            subscription.root_path.display()
        );

        for event in self.queue.poll_events(handle) {
            self.dispatch_event(handle, &subscription, event);
        }

        if !self.queue.rearm(handle) {
            tracing::warn!(
                "[dispatch] invalid handle on rearm: {handle:?} {}",
                subscription.root_path.display()
            );
        }
    }

    fn dispatch_event(&self, handle: WatchHandle, subscription: &Subscription, event: RawEvent) {
        crate::debug_event!(
            "dispatch",
            "event",
            "{handle:?} {:?} {:?} x{}",
            event.kind,
            event.context,
            event.count
        );

        let kind = match event.kind {
            RawEventKind::Overflow => {
                tracing::warn!(
                    "[dispatch] overflow on {}, events were lost",
                    subscription.root_path.display()
                );
                return;
            }
            RawEventKind::Entry(kind) => kind,
        };

        let Some(context) = event.context else {
            tracing::warn!("[dispatch] {kind} event without a path, skipped");
            return;
        };

        if !subscription.wants(kind) {
            return;
        }

        let path = subscription.root_path.join(context);

        if subscription.recursive && kind == EventKind::Created && is_directory(&path) {
            let child = subscription.with_root(path.clone());
            if let Err(e) = self.register_tree(&child, Some(handle)) {
                match e {
                    WatchError::Stopped => {
                        crate::debug_event!("dispatch", "stopped during registration")
                    }
                    e => tracing::error!(
                        "[dispatch] failed to register {} with subdirectories: {e}",
                        path.display()
                    ),
                }
            }
        }

        if !subscription.accepts(&path) {
            return;
        }
        // The batch shares one lookup; an unsubscribe may have landed since.
        if !self.table.contains(handle) {
            crate::debug_event!("dispatch", "cancelled mid-batch", "{handle:?}");
            return;
        }
        subscription.listener.handle_path_event(&path, kind);
    }
}

fn is_directory(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

//! Recursive watch engine.
//!
//! # Architecture
//!
//! ```text
//! caller --subscribe--> registrar --put--> WatchHandleTable <--get-- dispatch loop
//!                           |                                            |
//!                     WatchQueue::register                     WatchQueue::take/poll
//!                           ^                                            |
//!                           +------ new subdirectory (recursive) --------+
//! ```
//!
//! `FileWatcher` owns the dispatch thread. Subscriptions wait for the
//! loop to signal activation before touching the table, and every
//! directory of a recursive subscription gets its own handle.

mod activation;
mod dispatch;
mod error;
mod kind;
mod lifecycle;
mod listener;
mod notify_queue;
mod queue;
mod registrar;
mod subscription;
mod table;

pub use activation::ActivationGate;
pub use dispatch::LoopState;
pub use error::{Result, WatchError};
pub use kind::{EventKind, EventKinds, RawEventKind};
pub use lifecycle::{FileWatcher, FileWatcherBuilder};
pub use listener::{ListenerRef, WatchListener};
pub use notify_queue::NotifyQueue;
pub use queue::{RawEvent, WatchHandle, WatchQueue};
pub use subscription::{PathPattern, Subscription, SubscriptionProps, SubscriptionRequest};
pub use table::{Insert, WatchHandleTable};

pub mod cli;
pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{LoggingConfig, Settings, WatcherConfig};
pub use watcher::{
    EventKind, EventKinds, FileWatcher, FileWatcherBuilder, LoopState, SubscriptionProps,
    SubscriptionRequest, WatchError, WatchListener, WatchQueue,
};

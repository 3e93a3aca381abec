//! Watch command - print events for the given or configured paths.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Serialize;

use crate::config::Settings;
use crate::watcher::{EventKind, FileWatcher, SubscriptionProps, WatchListener};

/// Flags of `treewatch watch`.
pub struct WatchArgs {
    pub paths: Vec<PathBuf>,
    pub recursive: bool,
    pub pattern: Option<String>,
    pub kinds: Vec<String>,
    pub json: bool,
    pub timeout: Option<u64>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    Base { path: &'a Path },
    Initial { paths: &'a [PathBuf] },
    Event { path: &'a Path, kind: EventKind },
}

/// Writes every callback to stdout, as text or JSON lines.
pub struct PrintListener {
    json: bool,
}

impl PrintListener {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn emit(&self, line: Line<'_>) {
        let mut out = std::io::stdout().lock();
        let written = if self.json {
            serde_json::to_string(&line)
                .map_err(std::io::Error::other)
                .and_then(|s| writeln!(out, "{s}"))
        } else {
            match line {
                Line::Base { path } => writeln!(out, "watching {}", path.display()),
                Line::Initial { paths } => paths
                    .iter()
                    .try_for_each(|p| writeln!(out, "existing {}", p.display())),
                Line::Event { path, kind } => writeln!(out, "{kind:<8} {}", path.display()),
            }
        };

        if let Err(e) = written {
            tracing::debug!("[watch] stdout write failed: {e}");
        }
    }
}

impl WatchListener for PrintListener {
    fn handle_base_path(&self, path: &Path) {
        self.emit(Line::Base { path });
    }

    fn handle_initial_paths(&self, paths: &[PathBuf]) {
        if !paths.is_empty() {
            self.emit(Line::Initial { paths });
        }
    }

    fn handle_path_event(&self, path: &Path, kind: EventKind) {
        self.emit(Line::Event { path, kind });
    }
}

/// Subscriptions for the command line, or the configured ones when no path was given.
pub fn subscriptions_for(args: &WatchArgs, settings: &Settings) -> Vec<SubscriptionProps> {
    if args.paths.is_empty() {
        return settings.subscriptions.clone();
    }

    for name in &args.kinds {
        if EventKind::from_entry_name(name).is_none() {
            tracing::warn!("[watch] unknown event kind {name:?} ignored");
        }
    }

    args.paths
        .iter()
        .map(|path| SubscriptionProps {
            path: path.to_string_lossy().into_owned(),
            recursive: args.recursive,
            pattern: args.pattern.clone(),
            kinds: (!args.kinds.is_empty()).then(|| args.kinds.clone()),
        })
        .collect()
}

pub fn run_watch(args: WatchArgs, settings: &Settings) -> anyhow::Result<()> {
    let subscriptions = subscriptions_for(&args, settings);
    if subscriptions.is_empty() {
        bail!("no paths given and no [[subscriptions]] configured");
    }

    let watcher = FileWatcher::spawn(&settings.watcher).context("failed to start watcher")?;
    let listener: Arc<dyn WatchListener> = Arc::new(PrintListener::new(args.json));

    let mut active = 0;
    for props in &subscriptions {
        match watcher.subscribe_props(listener.clone(), props) {
            Ok(()) => active += 1,
            Err(e) => tracing::warn!("[watch] skipping {:?}: {e}", props.path),
        }
    }

    if active == 0 {
        watcher.stop();
        bail!("none of the {} subscriptions could be started", subscriptions.len());
    }

    crate::log_event!(
        "watch",
        "subscribed",
        "{active} paths, {} directories",
        watcher.watch_count()
    );

    match args.timeout {
        Some(secs) => {
            std::thread::sleep(Duration::from_secs(secs));
            watcher.stop();
        }
        None => watcher.wait(),
    }

    Ok(())
}

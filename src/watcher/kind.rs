//! Normalized event kinds and the kind sets subscriptions filter on.

use std::fmt;

use bitflags::bitflags;
use serde::Serialize;

/// A change delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Deleted,
    Modified,
}

impl EventKind {
    /// Name used in subscription properties.
    pub fn entry_name(self) -> &'static str {
        match self {
            EventKind::Created => "ENTRY_CREATE",
            EventKind::Deleted => "ENTRY_DELETE",
            EventKind::Modified => "ENTRY_MODIFY",
        }
    }

    /// Parse a property name. Unknown names yield `None`.
    pub fn from_entry_name(name: &str) -> Option<Self> {
        match name {
            "ENTRY_CREATE" => Some(EventKind::Created),
            "ENTRY_DELETE" => Some(EventKind::Deleted),
            "ENTRY_MODIFY" => Some(EventKind::Modified),
            _ => None,
        }
    }

    fn flag(self) -> EventKinds {
        match self {
            EventKind::Created => EventKinds::CREATED,
            EventKind::Deleted => EventKinds::DELETED,
            EventKind::Modified => EventKinds::MODIFIED,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Created => "created",
            EventKind::Deleted => "deleted",
            EventKind::Modified => "modified",
        };
        f.pad(name)
    }
}

bitflags! {
    /// Set of event kinds a subscription is interested in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventKinds: u8 {
        const CREATED = 0b001;
        const DELETED = 0b010;
        const MODIFIED = 0b100;
    }
}

impl EventKinds {
    pub fn contains_kind(self, kind: EventKind) -> bool {
        self.contains(kind.flag())
    }

    /// Build a set from property names, silently skipping unknown names.
    pub fn from_entry_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| EventKind::from_entry_name(name.as_ref()))
            .fold(EventKinds::empty(), |acc, kind| acc | kind.flag())
    }

    pub fn kinds(self) -> impl Iterator<Item = EventKind> {
        [EventKind::Created, EventKind::Deleted, EventKind::Modified]
            .into_iter()
            .filter(move |kind| self.contains_kind(*kind))
    }
}

impl From<EventKind> for EventKinds {
    fn from(kind: EventKind) -> Self {
        kind.flag()
    }
}

impl Default for EventKinds {
    fn default() -> Self {
        EventKinds::all()
    }
}

/// Kind of a raw event as reported by the watch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Entry(EventKind),
    /// The queue dropped events. Never delivered to listeners.
    Overflow,
}

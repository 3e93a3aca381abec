//! Subscription values and the property bag they are built from.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use super::error::{Result, WatchError};
use super::kind::{EventKind, EventKinds};
use super::listener::ListenerRef;

/// Regular expression that must match the whole path string.
#[derive(Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex =
            Regex::new(&format!("^(?:{pattern})$")).map_err(|e| WatchError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Blank patterns mean "no filter".
    pub fn parse_optional(pattern: Option<&str>) -> Result<Option<Self>> {
        match pattern {
            Some(p) if !p.trim().is_empty() => Self::new(p).map(Some),
            _ => Ok(None),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.regex.is_match(&path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

/// Binding of one listener to one watched directory.
///
/// Recursive subscriptions produce one value per directory, all sharing
/// the listener, kinds, pattern and recursive flag.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub listener: ListenerRef,
    pub root_path: PathBuf,
    pub kinds: EventKinds,
    pub pattern: Option<PathPattern>,
    pub recursive: bool,
}

impl Subscription {
    /// Same settings, rooted at a subdirectory.
    pub fn with_root(&self, root_path: PathBuf) -> Self {
        Self {
            listener: self.listener.clone(),
            root_path,
            kinds: self.kinds,
            pattern: self.pattern.clone(),
            recursive: self.recursive,
        }
    }

    /// Whether an event on `path` passes the pattern filter.
    pub fn accepts(&self, path: &Path) -> bool {
        self.pattern.as_ref().is_none_or(|p| p.matches(path))
    }

    pub fn wants(&self, kind: EventKind) -> bool {
        self.kinds.contains_kind(kind)
    }

    /// Same listener, directory and settings.
    pub fn same_watch(&self, other: &Subscription) -> bool {
        self.listener == other.listener
            && self.root_path == other.root_path
            && self.kinds == other.kinds
            && self.recursive == other.recursive
            && self.pattern.as_ref().map(PathPattern::as_str)
                == other.pattern.as_ref().map(PathPattern::as_str)
    }
}

/// Typed subscribe request.
#[derive(Clone, Debug)]
pub struct SubscriptionRequest {
    pub path: PathBuf,
    pub recursive: bool,
    pub pattern: Option<PathPattern>,
    pub kinds: EventKinds,
}

impl SubscriptionRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: false,
            pattern: None,
            kinds: EventKinds::all(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        self.pattern = PathPattern::parse_optional(Some(pattern))?;
        Ok(self)
    }

    pub fn kinds(mut self, kinds: EventKinds) -> Self {
        self.kinds = kinds;
        self
    }
}

/// Subscription configuration as read from settings files or callers.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SubscriptionProps {
    #[serde(default)]
    pub path: String,

    #[serde(default, deserialize_with = "bool_like")]
    pub recursive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<String>>,
}

impl SubscriptionProps {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Apply defaults and compile the pattern.
    pub fn to_request(&self) -> Result<SubscriptionRequest> {
        if self.path.trim().is_empty() {
            return Err(WatchError::EmptyPath);
        }

        let kinds = match &self.kinds {
            Some(names) => EventKinds::from_entry_names(names),
            None => EventKinds::all(),
        };

        Ok(SubscriptionRequest {
            path: PathBuf::from(&self.path),
            recursive: self.recursive,
            pattern: PathPattern::parse_optional(self.pattern.as_deref())?,
            kinds,
        })
    }
}

/// Accepts `true`/`false` or any string; only a case-insensitive "true" is true.
fn bool_like<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolLike {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<BoolLike>::deserialize(deserializer)? {
        Some(BoolLike::Bool(b)) => b,
        Some(BoolLike::Text(s)) => s.trim().eq_ignore_ascii_case("true"),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_full_match() {
        let pattern = PathPattern::new(r".*\.txt$").unwrap();
        assert!(pattern.matches(Path::new("a/b.txt")));
        assert!(!pattern.matches(Path::new("a/b.log")));
        assert!(!pattern.matches(Path::new("a/b.txt.bak")));
    }

    #[test]
    fn test_pattern_is_anchored() {
        let pattern = PathPattern::new("b").unwrap();
        assert!(!pattern.matches(Path::new("abc")));
        assert!(pattern.matches(Path::new("b")));
    }

    #[test]
    fn test_blank_pattern_is_no_filter() {
        assert!(PathPattern::parse_optional(Some("   ")).unwrap().is_none());
        assert!(PathPattern::parse_optional(None).unwrap().is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PathPattern::new("(unclosed").unwrap_err();
        assert!(matches!(err, WatchError::InvalidPattern { .. }));
    }

    #[test]
    fn test_props_defaults() {
        let props: SubscriptionProps = toml::from_str(r#"path = "/tmp/watched""#).unwrap();
        let request = props.to_request().unwrap();

        assert_eq!(request.path, PathBuf::from("/tmp/watched"));
        assert!(!request.recursive);
        assert!(request.pattern.is_none());
        assert_eq!(request.kinds, EventKinds::all());
    }

    #[test]
    fn test_props_empty_path_rejected() {
        let props = SubscriptionProps::new("  ");
        assert!(matches!(props.to_request(), Err(WatchError::EmptyPath)));
    }

    #[test]
    fn test_props_bool_like_recursive() {
        let props: SubscriptionProps =
            toml::from_str("path = \"x\"\nrecursive = \"TRUE\"").unwrap();
        assert!(props.recursive);

        let props: SubscriptionProps =
            toml::from_str("path = \"x\"\nrecursive = \"yes\"").unwrap();
        assert!(!props.recursive);

        let props: SubscriptionProps = toml::from_str("path = \"x\"\nrecursive = true").unwrap();
        assert!(props.recursive);
    }

    #[test]
    fn test_props_kinds_skip_unknown() {
        let props: SubscriptionProps =
            toml::from_str("path = \"x\"\nkinds = [\"ENTRY_DELETE\", \"ENTRY_RENAME\"]").unwrap();
        let request = props.to_request().unwrap();
        assert_eq!(request.kinds, EventKinds::DELETED);
    }
}

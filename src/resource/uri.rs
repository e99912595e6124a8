use crate::error::{RepositoryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Revision tag of a stored resource.
///
/// Numbered as `Live = 0`, `Work = 1`, explicit revisions from 2 upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Version {
    Live,
    Work,
    Revision(RevisionNumber),
}

/// An explicit revision number. Never below 2, so it cannot share a uid with `Live` or `Work`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct RevisionNumber(u64);

impl RevisionNumber {
    pub const FIRST: u64 = 2;

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for RevisionNumber {
    type Error = RepositoryError;

    fn try_from(number: u64) -> Result<Self> {
        if number < Self::FIRST {
            return Err(RepositoryError::InvalidArgument(format!(
                "Revision numbers start at {}, got {}",
                Self::FIRST,
                number
            )));
        }
        Ok(Self(number))
    }
}

impl From<RevisionNumber> for u64 {
    fn from(number: RevisionNumber) -> u64 {
        number.0
    }
}

impl Version {
    /// Explicit revision `number`. `InvalidArgument` below 2.
    pub fn revision(number: u64) -> Result<Self> {
        Ok(Version::Revision(RevisionNumber::try_from(number)?))
    }

    pub fn number(&self) -> u64 {
        match self {
            Version::Live => 0,
            Version::Work => 1,
            Version::Revision(n) => n.get(),
        }
    }

    pub fn from_number(number: u64) -> Self {
        match number {
            0 => Version::Live,
            1 => Version::Work,
            n => Version::Revision(RevisionNumber(n)),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Live => write!(f, "live"),
            Version::Work => write!(f, "work"),
            Version::Revision(n) => write!(f, "{}", n.get()),
        }
    }
}

/// The logical resource a revision belongs to.
///
/// Locks and per-resource operation ordering are keyed by this, never by path,
/// since the path can change while an operation is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub site: String,
    pub identifier: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site, self.identifier)
    }
}

/// Identity of one resource revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceUri {
    pub site: String,
    pub path: Option<String>,
    pub identifier: String,
    pub version: Version,
}

impl ResourceUri {
    /// Creates a LIVE uri at `path` with a freshly generated identifier.
    pub fn new(site: &str, path: &str) -> Self {
        Self {
            site: site.to_string(),
            path: Some(normalize_path(path)),
            identifier: uuid::Uuid::new_v4().to_string(),
            version: Version::Live,
        }
    }

    /// Creates a path-less LIVE uri for an existing identifier.
    pub fn with_identifier(site: &str, identifier: &str) -> Self {
        Self {
            site: site.to_string(),
            path: None,
            identifier: identifier.to_string(),
            version: Version::Live,
        }
    }

    pub fn at_path(mut self, path: &str) -> Self {
        self.path = Some(normalize_path(path));
        self
    }

    /// Same resource, different revision.
    pub fn at_version(&self, version: Version) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            site: self.site.clone(),
            identifier: self.identifier.clone(),
        }
    }

    /// Index document key: `<identifier>.<version-number>`.
    pub fn uid(&self) -> String {
        format!("{}.{}", self.identifier, self.version.number())
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}:{} ({})", self.site, path, self.version),
            None => write!(f, "{}:{} ({})", self.site, self.identifier, self.version),
        }
    }
}

/// Absolute path, single leading slash, no trailing slash except for the root.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let mut normalized = String::with_capacity(trimmed.len() + 1);
    if !trimmed.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(trimmed);
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Parent of a normalized path, `None` for the root.
pub fn parent_path(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// True if `path` equals `prefix` or lives below it.
pub fn is_same_or_descendant(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// Validates a move target: non-blank and absolute.
pub fn validate_target_path(target: &str) -> Result<String> {
    if target.trim().is_empty() {
        return Err(RepositoryError::InvalidArgument(
            "Cannot move resource to empty path".to_string(),
        ));
    }
    if !target.starts_with('/') {
        return Err(RepositoryError::InvalidArgument(format!(
            "Cannot move resource to relative path '{}'",
            target
        )));
    }
    Ok(normalize_path(target))
}

/// Rewrites `path` from below `old_prefix` to below `new_prefix`.
pub fn rebase_path(path: &str, old_prefix: &str, new_prefix: &str) -> String {
    let suffix = if old_prefix == "/" {
        path
    } else {
        &path[old_prefix.len()..]
    };
    if suffix.is_empty() {
        new_prefix.to_string()
    } else if new_prefix == "/" {
        normalize_path(suffix)
    } else {
        normalize_path(&format!("{}/{}", new_prefix, suffix.trim_start_matches('/')))
    }
}

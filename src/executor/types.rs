use crate::resource::{Language, Resource, ResourceContent, ResourceKey, ResourceUri, User};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide, monotonically increasing operation identifier.
///
/// Used for logging and handle equality, never for cross-resource ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl OperationId {
    pub fn next() -> Self {
        Self(NEXT_OPERATION_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Lifecycle state of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Submitted, waiting for its lane.
    Pending,
    /// Executing on a worker.
    Running,
    Completed,
    Failed { error: String },
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed { .. })
    }
}

/// Every state-changing request the repository executes.
#[derive(Debug, Clone)]
pub enum Mutation {
    Put {
        resource: Resource,
    },
    PutContent {
        uri: ResourceUri,
        content: ResourceContent,
        data: Vec<u8>,
    },
    DeleteContent {
        uri: ResourceUri,
        language: Language,
    },
    Delete {
        uri: ResourceUri,
        all_revisions: bool,
    },
    Move {
        uri: ResourceUri,
        target_path: String,
        move_children: bool,
    },
    Lock {
        uri: ResourceUri,
        user: User,
    },
    Unlock {
        uri: ResourceUri,
        user: User,
    },
}

impl Mutation {
    pub fn uri(&self) -> &ResourceUri {
        match self {
            Mutation::Put { resource } => &resource.uri,
            Mutation::PutContent { uri, .. }
            | Mutation::DeleteContent { uri, .. }
            | Mutation::Delete { uri, .. }
            | Mutation::Move { uri, .. }
            | Mutation::Lock { uri, .. }
            | Mutation::Unlock { uri, .. } => uri,
        }
    }

    /// Serialization key: the logical resource, never the path.
    pub fn key(&self) -> ResourceKey {
        self.uri().key()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Put { .. } => "put",
            Mutation::PutContent { .. } => "put_content",
            Mutation::DeleteContent { .. } => "delete_content",
            Mutation::Delete { .. } => "delete",
            Mutation::Move { .. } => "move",
            Mutation::Lock { .. } => "lock",
            Mutation::Unlock { .. } => "unlock",
        }
    }
}

/// Value an operation completes with.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// Stored revision after put, put_content, delete_content or lock.
    Stored(Resource),
    Deleted(bool),
    /// Revisions that changed path, with their new paths.
    Moved(Vec<ResourceUri>),
    Unlocked {
        resource: Resource,
        previous_owner: Option<User>,
    },
}

impl OperationOutcome {
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            OperationOutcome::Stored(resource) | OperationOutcome::Unlocked { resource, .. } => Some(resource),
            _ => None,
        }
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

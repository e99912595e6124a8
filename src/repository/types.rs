use crate::search::IndexHealth;
use serde::{Deserialize, Serialize};

/// Point-in-time counters reported by the stats endpoint and the background reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub site: String,
    /// Distinct identifiers stored for the site.
    pub resources: usize,
    pub revisions: usize,
    pub locks: usize,
    pub pending_operations: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub index: IndexHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

use crate::resource::{Resource, Version};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub uid: String,
    pub identifier: String,
    pub path: Option<String>,
    pub version: Version,
    pub resource_type: String,
    pub score: f64,
    /// Deserialized from the index, no store round-trip.
    pub resource: Option<Resource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Total number of matching documents.
    pub hits: usize,
    pub offset: usize,
    pub limit: Option<usize>,
    /// 1-based page derived from offset and limit.
    pub page: usize,
    pub items: Vec<SearchResultItem>,
}

impl SearchResult {
    pub fn new(hits: usize, offset: usize, limit: Option<usize>, items: Vec<SearchResultItem>) -> Self {
        let page = match limit {
            Some(limit) if limit > 0 => offset / limit + 1,
            _ => 1,
        };
        Self {
            hits,
            offset,
            limit,
            page,
            items,
        }
    }

    /// Documents returned on this page.
    pub fn documents(&self) -> usize {
        self.items.len()
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.identifier.as_str()).collect()
    }
}

/// Synchronization state of the index relative to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHealth {
    /// Identities with a refresh queued or running.
    pub pending: usize,
    /// Identities whose last refresh failed after all retries.
    pub stale: usize,
    pub last_error: Option<String>,
    pub healthy: bool,
}

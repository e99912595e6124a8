use super::builder::build_query;
use super::engine::SearchIndex;
use super::query::SearchQuery;
use super::sync::bounded;
use crate::error::{RepositoryError, Result};
use crate::resource::{RESOURCE_REFERENCE_PROPERTY, ResourceUri, Version};
use crate::storage::ContentStore;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Rejects destructive deletes of resources that live content still points at.
///
/// Fails closed: if the index cannot be asked, the delete is refused.
pub struct IntegrityChecker {
    index: Arc<dyn SearchIndex>,
    timeout: Duration,
}

impl IntegrityChecker {
    pub fn new(index: Arc<dyn SearchIndex>, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    /// A delete is destructive when it removes all revisions, the live revision,
    /// or the last remaining one.
    pub async fn is_destructive(&self, store: &dyn ContentStore, uri: &ResourceUri, all_revisions: bool) -> Result<bool> {
        if all_revisions || uri.version == Version::Live {
            return Ok(true);
        }
        let versions = bounded(self.timeout, store.list_versions(uri)).await?;
        Ok(versions.len() <= 1)
    }

    /// Identifiers of live resources whose structured content references `identifier`.
    pub async fn referrers(&self, identifier: &str) -> Result<Vec<String>> {
        let query = build_query(
            &SearchQuery::new()
                .with_version(Version::Live)
                .with_property(RESOURCE_REFERENCE_PROPERTY, identifier),
        );
        let result = bounded(self.timeout, self.index.query(&query))
            .await
            .map_err(|e| RepositoryError::IndexUnavailable(format!("Cannot verify references: {}", e)))?;

        let referrers: BTreeSet<String> = result
            .items
            .into_iter()
            .map(|item| item.identifier)
            .filter(|id| id != identifier)
            .collect();
        Ok(referrers.into_iter().collect())
    }

    pub async fn check_delete(&self, store: &dyn ContentStore, uri: &ResourceUri, all_revisions: bool) -> Result<()> {
        if !self.is_destructive(store, uri, all_revisions).await? {
            return Ok(());
        }
        let referrers = self.referrers(&uri.identifier).await?;
        if referrers.is_empty() {
            return Ok(());
        }
        tracing::info!(
            "Refusing to delete {}: referenced by {} resource(s)",
            uri,
            referrers.len()
        );
        Err(RepositoryError::ReferentialIntegrity {
            identifier: uri.identifier.clone(),
            referrers,
        })
    }
}

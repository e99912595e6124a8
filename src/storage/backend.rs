use crate::error::Result;
use crate::resource::{Language, Resource, ResourceBody, ResourceContent, ResourceKey, ResourceUri, User, Version};

use async_trait::async_trait;

/// The abstract backing store interface.
///
/// Every method either completes fully or leaves the store as it was. Errors are
/// surfaced as they happen, this layer never retries.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Exact version lookup. `NotFound` if that revision is not stored.
    async fn get(&self, uri: &ResourceUri) -> Result<Resource>;

    /// Header part of a revision (structured content stripped).
    async fn get_header(&self, uri: &ResourceUri) -> Result<Resource> {
        Ok(self.get(uri).await?.split().0)
    }

    /// Structured content of a revision.
    async fn get_body(&self, uri: &ResourceUri) -> Result<ResourceBody> {
        Ok(self.get(uri).await?.split().1)
    }

    /// Resolves a path within `(site, version)` to the revision stored there.
    async fn resolve_path(&self, site: &str, path: &str, version: Version) -> Result<Option<ResourceUri>>;

    async fn exists(&self, uri: &ResourceUri) -> Result<bool>;

    async fn exists_any_version(&self, uri: &ResourceUri) -> Result<bool>;

    /// Create-or-update of a revision.
    ///
    /// New resources need an existing parent path and no content variants. Updates
    /// must keep the stored content-variant set, `put_content` is the only way to add one.
    async fn put(&self, resource: Resource) -> Result<Resource>;

    /// Attaches (or replaces) the content variant for `content.language` on an existing revision.
    async fn put_content(&self, uri: &ResourceUri, content: ResourceContent, data: Vec<u8>) -> Result<Resource>;

    async fn delete_content(&self, uri: &ResourceUri, language: &Language) -> Result<Resource>;

    async fn get_content(&self, uri: &ResourceUri, language: &Language) -> Result<Vec<u8>>;

    /// All stored revisions sharing the uri's identifier.
    async fn list_versions(&self, uri: &ResourceUri) -> Result<Vec<ResourceUri>>;

    /// Every stored revision of a site.
    async fn list(&self, site: &str) -> Result<Vec<ResourceUri>>;

    /// Removes `uri.version`, or every revision of the identifier.
    ///
    /// Returns `false` if nothing was stored. Referential integrity is checked by the
    /// caller before the store is touched.
    async fn delete(&self, uri: &ResourceUri, all_revisions: bool) -> Result<bool>;

    /// Renames the path of every revision of `uri`, and of every resource below it
    /// when `move_children` is set. Returns the moved revisions with their new paths.
    async fn move_resource(&self, uri: &ResourceUri, target_path: &str, move_children: bool) -> Result<Vec<ResourceUri>>;

    /// Stamps `owner` as lock owner on every revision of the logical resource.
    async fn lock(&self, key: &ResourceKey, owner: &User) -> Result<Vec<Resource>>;

    /// Clears the lock owner on every revision of the logical resource.
    async fn unlock(&self, key: &ResourceKey) -> Result<Vec<Resource>>;
}

use super::backend::ContentStore;
use crate::error::{RepositoryError, Result};
use crate::resource::{
    Language, Resource, ResourceContent, ResourceKey, ResourceUri, User, Version, is_same_or_descendant, normalize_path,
    parent_path, rebase_path, validate_target_path,
};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Everything the engine holds, cloned wholesale when a move needs a staging copy.
#[derive(Debug, Clone, Default)]
struct StoreState {
    /// Logical resource -> revisions.
    resources: HashMap<ResourceKey, BTreeMap<Version, Resource>>,
    /// `(site, version, path)` -> identifier.
    paths: HashMap<(String, Version, String), String>,
    /// `(site, uid, language)` -> content bytes.
    content: HashMap<(String, String, Language), Vec<u8>>,
}

impl StoreState {
    fn revision(&self, uri: &ResourceUri) -> Option<&Resource> {
        self.resources
            .get(&uri.key())
            .and_then(|revisions| revisions.get(&uri.version))
    }

    fn revision_mut(&mut self, uri: &ResourceUri) -> Result<&mut Resource> {
        self.resources
            .get_mut(&uri.key())
            .and_then(|revisions| revisions.get_mut(&uri.version))
            .ok_or_else(|| RepositoryError::not_found(uri))
    }

    fn path_owner(&self, site: &str, version: Version, path: &str) -> Option<&String> {
        self.paths
            .get(&(site.to_string(), version, path.to_string()))
    }

    fn path_exists_any_version(&self, site: &str, path: &str) -> bool {
        self.paths
            .keys()
            .any(|(s, _, p)| s == site && p == path)
    }

    fn unindex_path(&mut self, resource: &Resource) {
        if let Some(path) = resource.uri.path() {
            let key = (resource.uri.site.clone(), resource.version(), path.to_string());
            if self.paths.get(&key) == Some(&resource.uri.identifier) {
                self.paths.remove(&key);
            }
        }
    }

    fn index_path(&mut self, resource: &Resource) {
        if let Some(path) = resource.uri.path() {
            self.paths.insert(
                (resource.uri.site.clone(), resource.version(), path.to_string()),
                resource.uri.identifier.clone(),
            );
        }
    }

    fn drop_content(&mut self, uri: &ResourceUri) {
        let uid = uri.uid();
        self.content
            .retain(|(site, owner, _), _| !(site == &uri.site && owner == &uid));
    }

    fn remove_revision(&mut self, uri: &ResourceUri) -> bool {
        let key = uri.key();
        let removed = match self.resources.get_mut(&key) {
            Some(revisions) => revisions.remove(&uri.version),
            None => None,
        };
        if self.resources.get(&key).is_some_and(|r| r.is_empty()) {
            self.resources.remove(&key);
        }
        match removed {
            Some(resource) => {
                self.unindex_path(&resource);
                self.drop_content(&resource.uri);
                true
            }
            None => false,
        }
    }
}

/// Fault switches for exercising failure paths.
#[derive(Debug, Default)]
struct Faults {
    /// Number of upcoming writes that fail with an I/O error.
    failing_writes: AtomicUsize,
    /// Fail a move when renaming the n-th entry (1-based, 0 disables).
    fail_move_at: AtomicUsize,
    /// Artificial latency applied to every call.
    delay_ms: AtomicU64,
}

/// In-memory backing store.
///
/// A single `RwLock` guards the whole state so each call observes and leaves a
/// consistent path index.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` write calls fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.faults.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Makes the next move fail when it reaches its `step`-th rename.
    pub fn fail_move_at(&self, step: usize) {
        self.faults.fail_move_at.store(step, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.faults
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        let delay = self.faults.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    async fn check_write(&self, operation: &str) -> Result<()> {
        self.simulate_latency().await;
        let failed = self
            .faults
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            tracing::warn!("Injected store failure on {}", operation);
            return Err(RepositoryError::Io(format!("{} failed", operation)));
        }
        Ok(())
    }

    /// Revisions of the identifier, cloned.
    pub async fn revisions(&self, key: &ResourceKey) -> Vec<Resource> {
        let state = self.state.read().await;
        state
            .resources
            .get(key)
            .map(|revisions| revisions.values().cloned().collect())
            .unwrap_or_default()
    }

    fn validate_put(state: &StoreState, resource: &Resource) -> Result<()> {
        let uri = &resource.uri;
        let path = uri
            .path()
            .ok_or_else(|| RepositoryError::InvalidArgument(format!("Resource {} has no path", uri)))?;

        if let Some(owner) = state.path_owner(&uri.site, uri.version, path)
            && owner != &uri.identifier
        {
            return Err(RepositoryError::Conflict(format!(
                "Path {} is already taken in version {}",
                path, uri.version
            )));
        }

        let revisions = state.resources.get(&uri.key());
        let existing = revisions.and_then(|r| r.get(&uri.version));

        match existing {
            Some(stored) => {
                let stored_languages: HashSet<&Language> = stored.contents.keys().collect();
                let new_languages: HashSet<&Language> = resource.contents.keys().collect();
                if stored_languages != new_languages {
                    return Err(RepositoryError::IllegalState(
                        "The resource content cannot be modified using put".to_string(),
                    ));
                }
            }
            None => {
                if !resource.contents.is_empty() {
                    return Err(RepositoryError::IllegalState(
                        "Cannot add content metadata without content".to_string(),
                    ));
                }
                let is_new_resource = revisions.is_none_or(|r| r.is_empty());
                if is_new_resource
                    && let Some(parent) = parent_path(path)
                    && !state.path_exists_any_version(&uri.site, &parent)
                {
                    return Err(RepositoryError::IllegalState(format!(
                        "Cannot create resource at {} without parent {}",
                        path, parent
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get(&self, uri: &ResourceUri) -> Result<Resource> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        state
            .revision(uri)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(uri))
    }

    async fn resolve_path(&self, site: &str, path: &str, version: Version) -> Result<Option<ResourceUri>> {
        self.simulate_latency().await;
        let path = normalize_path(path);
        let state = self.state.read().await;
        Ok(state.path_owner(site, version, &path).map(|identifier| ResourceUri {
            site: site.to_string(),
            path: Some(path.clone()),
            identifier: identifier.clone(),
            version,
        }))
    }

    async fn exists(&self, uri: &ResourceUri) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.revision(uri).is_some())
    }

    async fn exists_any_version(&self, uri: &ResourceUri) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .resources
            .get(&uri.key())
            .is_some_and(|revisions| !revisions.is_empty()))
    }

    async fn put(&self, mut resource: Resource) -> Result<Resource> {
        self.check_write("put").await?;
        if let Some(path) = resource.uri.path.take() {
            resource.uri.path = Some(normalize_path(&path));
        }

        let mut state = self.state.write().await;
        Self::validate_put(&state, &resource)?;

        if let Some(previous) = state.revision(&resource.uri).cloned() {
            state.unindex_path(&previous);
            // Content metadata is owned by put_content.
            resource.contents = previous.contents;
        }
        state.index_path(&resource);
        state
            .resources
            .entry(resource.uri.key())
            .or_default()
            .insert(resource.version(), resource.clone());

        tracing::debug!("Stored {}", resource.uri);
        Ok(resource)
    }

    async fn put_content(&self, uri: &ResourceUri, mut content: ResourceContent, data: Vec<u8>) -> Result<Resource> {
        self.check_write("put_content").await?;
        let mut state = self.state.write().await;

        let language = content.language.clone();
        content.size = data.len() as u64;
        let resource = state.revision_mut(uri).map_err(|_| {
            RepositoryError::IllegalState(format!("Cannot add content to missing resource {}", uri))
        })?;
        resource.contents.insert(language.clone(), content);
        let updated = resource.clone();

        state
            .content
            .insert((uri.site.clone(), uri.uid(), language), data);
        Ok(updated)
    }

    async fn delete_content(&self, uri: &ResourceUri, language: &Language) -> Result<Resource> {
        self.check_write("delete_content").await?;
        let mut state = self.state.write().await;

        let resource = state.revision_mut(uri)?;
        if resource.contents.remove(language).is_none() {
            return Err(RepositoryError::not_found(format!("{} content of {}", language, uri)));
        }
        let updated = resource.clone();

        state
            .content
            .remove(&(uri.site.clone(), uri.uid(), language.clone()));
        Ok(updated)
    }

    async fn get_content(&self, uri: &ResourceUri, language: &Language) -> Result<Vec<u8>> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        state
            .content
            .get(&(uri.site.clone(), uri.uid(), language.clone()))
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("{} content of {}", language, uri)))
    }

    async fn list_versions(&self, uri: &ResourceUri) -> Result<Vec<ResourceUri>> {
        let state = self.state.read().await;
        Ok(state
            .resources
            .get(&uri.key())
            .map(|revisions| revisions.values().map(|r| r.uri.clone()).collect())
            .unwrap_or_default())
    }

    async fn list(&self, site: &str) -> Result<Vec<ResourceUri>> {
        let state = self.state.read().await;
        let mut uris: Vec<ResourceUri> = state
            .resources
            .iter()
            .filter(|(key, _)| key.site == site)
            .flat_map(|(_, revisions)| revisions.values().map(|r| r.uri.clone()))
            .collect();
        uris.sort_by(|a, b| a.path.cmp(&b.path).then(a.version.cmp(&b.version)));
        Ok(uris)
    }

    async fn delete(&self, uri: &ResourceUri, all_revisions: bool) -> Result<bool> {
        self.check_write("delete").await?;
        let mut state = self.state.write().await;

        if !all_revisions {
            return Ok(state.remove_revision(uri));
        }

        let versions: Vec<Version> = state
            .resources
            .get(&uri.key())
            .map(|revisions| revisions.keys().copied().collect())
            .unwrap_or_default();
        let mut removed = false;
        for version in versions {
            removed |= state.remove_revision(&uri.at_version(version));
        }
        Ok(removed)
    }

    async fn move_resource(&self, uri: &ResourceUri, target_path: &str, move_children: bool) -> Result<Vec<ResourceUri>> {
        self.check_write("move").await?;
        let target = validate_target_path(target_path)?;

        let mut state = self.state.write().await;
        let source = state
            .revision(uri)
            .ok_or_else(|| RepositoryError::not_found(uri))?;
        let source_path = source
            .uri
            .path()
            .map(str::to_string)
            .ok_or_else(|| RepositoryError::InvalidArgument("Cannot move resource with null path".to_string()))?;

        if source_path == target {
            return Ok(Vec::new());
        }
        if move_children && is_same_or_descendant(&target, &source_path) {
            return Err(RepositoryError::InvalidArgument(format!(
                "Cannot move {} below itself to {}",
                source_path, target
            )));
        }

        // Every revision of every moved identifier, with its new path.
        let source_key = uri.key();
        let mut renames: Vec<(Resource, String)> = Vec::new();
        for (key, revisions) in state.resources.iter() {
            if key.site != uri.site {
                continue;
            }
            let is_source = key == &source_key;
            let is_child = move_children
                && !is_source
                && revisions
                    .values()
                    .filter_map(|r| r.uri.path())
                    .any(|p| is_same_or_descendant(p, &source_path));
            if !is_source && !is_child {
                continue;
            }
            for resource in revisions.values() {
                let new_path = match resource.uri.path() {
                    Some(p) if is_same_or_descendant(p, &source_path) => rebase_path(p, &source_path, &target),
                    _ if is_source => target.clone(),
                    _ => continue,
                };
                renames.push((resource.clone(), new_path));
            }
        }

        let moving: HashSet<&String> = renames
            .iter()
            .map(|(r, _)| &r.uri.identifier)
            .collect();
        for (resource, new_path) in &renames {
            if let Some(owner) = state.path_owner(&uri.site, resource.version(), new_path)
                && !moving.contains(owner)
            {
                return Err(RepositoryError::Conflict(format!(
                    "Path {} is already taken in version {}",
                    new_path,
                    resource.version()
                )));
            }
        }

        // Renames go to a staging copy that replaces the live state only once every entry moved.
        let mut staged = state.clone();
        for (resource, _) in &renames {
            staged.unindex_path(resource);
        }
        let fail_at = self.faults.fail_move_at.swap(0, Ordering::SeqCst);
        let mut moved = Vec::with_capacity(renames.len());
        for (step, (resource, new_path)) in renames.into_iter().enumerate() {
            if fail_at == step + 1 {
                tracing::warn!("Injected store failure while moving {}", resource.uri);
                return Err(RepositoryError::Io(format!("move of {} failed", resource.uri)));
            }
            let mut renamed = resource;
            renamed.uri.path = Some(new_path);
            staged.index_path(&renamed);
            moved.push(renamed.uri.clone());
            staged.resources
                .entry(renamed.uri.key())
                .or_default()
                .insert(renamed.version(), renamed);
        }
        *state = staged;

        tracing::debug!("Moved {} to {} ({} revisions)", source_path, target, moved.len());
        Ok(moved)
    }

    async fn lock(&self, key: &ResourceKey, owner: &User) -> Result<Vec<Resource>> {
        self.check_write("lock").await?;
        let mut state = self.state.write().await;
        let revisions = state
            .resources
            .get_mut(key)
            .ok_or_else(|| RepositoryError::not_found(key))?;
        Ok(revisions
            .values_mut()
            .map(|resource| {
                resource.lock_owner = Some(owner.clone());
                resource.clone()
            })
            .collect())
    }

    async fn unlock(&self, key: &ResourceKey) -> Result<Vec<Resource>> {
        self.check_write("unlock").await?;
        let mut state = self.state.write().await;
        let revisions = state
            .resources
            .get_mut(key)
            .ok_or_else(|| RepositoryError::not_found(key))?;
        Ok(revisions
            .values_mut()
            .map(|resource| {
                resource.lock_owner = None;
                resource.clone()
            })
            .collect())
    }
}

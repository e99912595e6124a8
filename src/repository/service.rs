use super::types::RepositoryStats;
use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, Result};
use crate::executor::{Mutation, MutationHandler, Operation, OperationOutcome, OperationQueue};
use crate::locking::{LockManager, LockOutcome};
use crate::resource::{
    Language, Resource, ResourceBody, ResourceContent, ResourceKey, ResourceUri, User, Version,
};
use crate::search::schema::suggestion_field;
use crate::search::sync::bounded;
use crate::search::{
    IndexHealth, IndexSynchronizer, IntegrityChecker, MemoryIndex, SearchIndex, SearchQuery, SearchResult,
    build_query,
};
use crate::security::{AllowAll, Capability, CapabilityCheck, Guard, SystemPrincipal};
use crate::storage::{ContentStore, MemoryStore, ResourceCache};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Executes mutations. Owned by the queue, shared with the read path.
struct RepositoryCore {
    site: String,
    create_homepage: bool,
    store: Arc<dyn ContentStore>,
    cache: ResourceCache,
    locks: LockManager,
    synchronizer: IndexSynchronizer,
    integrity: IntegrityChecker,
    guard: Guard,
    read_timeout: Duration,
}

/// The repository: store, lock table, search index and operation queue wired together.
///
/// Every mutation has two forms. `*_async` submits it and returns the `Operation`
/// handle at once; the plain form submits, waits for the terminal state and
/// returns its value or error.
pub struct ContentRepository {
    core: Arc<RepositoryCore>,
    queue: OperationQueue,
}

impl ContentRepository {
    pub fn new(
        config: &RepositoryConfig,
        store: Arc<dyn ContentStore>,
        index: Arc<dyn SearchIndex>,
        check: Box<dyn CapabilityCheck>,
    ) -> Self {
        let system = SystemPrincipal::new(&config.site.site);
        let synchronizer = IndexSynchronizer::new(store.clone(), index.clone(), config.index.sync_settings());
        let core = Arc::new(RepositoryCore {
            site: config.site.site.clone(),
            create_homepage: config.site.create_homepage,
            cache: ResourceCache::new(store.clone(), config.cache.capacity),
            store,
            locks: LockManager::new(),
            synchronizer,
            integrity: IntegrityChecker::new(index, config.index.timeout()),
            guard: Guard::new(check, system),
            read_timeout: config.store.timeout(),
        });
        let queue = OperationQueue::new(core.clone(), config.queue.worker_count);
        tracing::info!("Repository for site {} created", config.site.site);
        Self { core, queue }
    }

    /// In-memory store and index, every capability permitted.
    pub fn in_memory(config: &RepositoryConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryIndex::new()),
            Box::new(AllowAll),
        )
    }

    pub fn site(&self) -> &str {
        &self.core.site
    }

    pub fn system(&self) -> &SystemPrincipal {
        self.core.guard.system()
    }

    /// Uri for an existing identifier in this repository's site.
    pub fn uri(&self, identifier: &str) -> ResourceUri {
        ResourceUri::with_identifier(&self.core.site, identifier)
    }

    /// Prepares index and lock table and creates the homepage if the site has none.
    pub async fn connect(&self) -> Result<()> {
        let core = &self.core;
        match core.synchronizer.ensure_sentinel().await {
            Ok(version) => tracing::info!("Search index at version {}", version),
            Err(e) => tracing::warn!("Search index unavailable on connect: {}", e),
        }

        if core.create_homepage {
            self.ensure_homepage().await?;
        }

        let locks = core.locks.hydrate(core.store.as_ref(), &core.site).await?;
        tracing::info!("Repository {} connected ({} locks)", core.site, locks);
        Ok(())
    }

    async fn ensure_homepage(&self) -> Result<()> {
        let site = self.core.site.clone();
        let uris = bounded(self.core.read_timeout, self.core.store.list(&site)).await?;
        if uris.iter().any(|uri| uri.path() == Some("/")) {
            return Ok(());
        }

        let system = self.system().user().clone();
        let now = Utc::now();
        let mut homepage = Resource::page(ResourceUri::new(&site, "/"));
        homepage.set_created(system.clone(), now);
        homepage.set_published(system, now, None);
        let homepage = self.put(homepage).await?;
        tracing::info!("Created homepage {} for site {}", homepage.identifier(), site);
        Ok(())
    }

    // ------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------

    pub fn submit(&self, mutation: Mutation) -> Operation {
        self.queue.submit(mutation)
    }

    pub fn put_async(&self, resource: Resource) -> Operation {
        self.submit(Mutation::Put { resource })
    }

    pub async fn put(&self, resource: Resource) -> Result<Resource> {
        stored(self.put_async(resource).wait().await?)
    }

    pub fn put_content_async(&self, uri: &ResourceUri, content: ResourceContent, data: Vec<u8>) -> Operation {
        self.submit(Mutation::PutContent {
            uri: uri.clone(),
            content,
            data,
        })
    }

    pub async fn put_content(&self, uri: &ResourceUri, content: ResourceContent, data: Vec<u8>) -> Result<Resource> {
        stored(self.put_content_async(uri, content, data).wait().await?)
    }

    pub fn delete_content_async(&self, uri: &ResourceUri, language: &Language) -> Operation {
        self.submit(Mutation::DeleteContent {
            uri: uri.clone(),
            language: language.clone(),
        })
    }

    pub async fn delete_content(&self, uri: &ResourceUri, language: &Language) -> Result<Resource> {
        stored(self.delete_content_async(uri, language).wait().await?)
    }

    pub fn delete_async(&self, uri: &ResourceUri, all_revisions: bool) -> Operation {
        self.submit(Mutation::Delete {
            uri: uri.clone(),
            all_revisions,
        })
    }

    /// `false` if nothing was stored under `uri`.
    pub async fn delete(&self, uri: &ResourceUri, all_revisions: bool) -> Result<bool> {
        match self.delete_async(uri, all_revisions).wait().await? {
            OperationOutcome::Deleted(deleted) => Ok(deleted),
            other => Err(unexpected(other)),
        }
    }

    pub fn move_async(&self, uri: &ResourceUri, target_path: &str, move_children: bool) -> Operation {
        self.submit(Mutation::Move {
            uri: uri.clone(),
            target_path: target_path.to_string(),
            move_children,
        })
    }

    /// Returns every revision that changed path.
    pub async fn move_resource(&self, uri: &ResourceUri, target_path: &str, move_children: bool) -> Result<Vec<ResourceUri>> {
        match self.move_async(uri, target_path, move_children).wait().await? {
            OperationOutcome::Moved(moved) => Ok(moved),
            other => Err(unexpected(other)),
        }
    }

    pub fn lock_async(&self, uri: &ResourceUri, user: &User) -> Operation {
        self.submit(Mutation::Lock {
            uri: uri.clone(),
            user: user.clone(),
        })
    }

    pub async fn lock(&self, uri: &ResourceUri, user: &User) -> Result<Resource> {
        stored(self.lock_async(uri, user).wait().await?)
    }

    pub fn unlock_async(&self, uri: &ResourceUri, user: &User) -> Operation {
        self.submit(Mutation::Unlock {
            uri: uri.clone(),
            user: user.clone(),
        })
    }

    /// Returns the previous lock owner, `None` if the resource was not locked.
    pub async fn unlock(&self, uri: &ResourceUri, user: &User) -> Result<Option<User>> {
        match self.unlock_async(uri, user).wait().await? {
            OperationOutcome::Unlocked { previous_owner, .. } => Ok(previous_owner),
            other => Err(unexpected(other)),
        }
    }

    // ------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------

    pub async fn get(&self, uri: &ResourceUri) -> Result<Resource> {
        bounded(self.core.read_timeout, self.core.cache.load(uri)).await
    }

    pub async fn get_header(&self, uri: &ResourceUri) -> Result<Arc<Resource>> {
        bounded(self.core.read_timeout, self.core.cache.load_header(uri)).await
    }

    pub async fn get_body(&self, uri: &ResourceUri) -> Result<Arc<ResourceBody>> {
        bounded(self.core.read_timeout, self.core.cache.load_body(uri)).await
    }

    pub async fn get_content(&self, uri: &ResourceUri, language: &Language) -> Result<Vec<u8>> {
        bounded(self.core.read_timeout, self.core.store.get_content(uri, language)).await
    }

    /// Resolves `path` in this site's `version`.
    pub async fn resolve(&self, path: &str, version: Version) -> Result<Option<ResourceUri>> {
        bounded(
            self.core.read_timeout,
            self.core.store.resolve_path(&self.core.site, path, version),
        )
        .await
    }

    pub async fn list_versions(&self, uri: &ResourceUri) -> Result<Vec<ResourceUri>> {
        bounded(self.core.read_timeout, self.core.store.list_versions(uri)).await
    }

    pub async fn exists(&self, uri: &ResourceUri) -> Result<bool> {
        bounded(self.core.read_timeout, self.core.store.exists(uri)).await
    }

    pub async fn exists_any_version(&self, uri: &ResourceUri) -> Result<bool> {
        bounded(self.core.read_timeout, self.core.store.exists_any_version(uri)).await
    }

    pub fn lock_owner(&self, uri: &ResourceUri) -> Option<User> {
        self.core.locks.owner(&uri.key())
    }

    pub fn locked_by(&self, user: &User) -> Vec<ResourceKey> {
        self.core.locks.locked_by(&user.login)
    }

    /// Runs the query against the index. Results may trail recent mutations.
    pub async fn find(&self, query: &SearchQuery) -> Result<SearchResult> {
        let native = build_query(query);
        let synchronizer = &self.core.synchronizer;
        synchronizer.bounded(synchronizer.index().query(&native)).await
    }

    /// Up to `limit` values of the dictionary starting with `seed`, most frequent first.
    pub async fn suggest(&self, dictionary: &str, seed: &str, limit: usize) -> Result<Vec<String>> {
        if dictionary.trim().is_empty() {
            return Err(RepositoryError::InvalidArgument("Dictionary must not be blank".to_string()));
        }
        if seed.trim().is_empty() {
            return Err(RepositoryError::InvalidArgument("Seed must not be blank".to_string()));
        }
        let field = suggestion_field(dictionary)
            .ok_or_else(|| RepositoryError::InvalidArgument(format!("Unknown dictionary {}", dictionary)))?;
        let synchronizer = &self.core.synchronizer;
        synchronizer
            .bounded(synchronizer.index().suggest(field, seed.trim(), limit))
            .await
    }

    /// Distinct identifiers stored for the site.
    pub async fn resource_count(&self) -> Result<usize> {
        let uris = bounded(self.core.read_timeout, self.core.store.list(&self.core.site)).await?;
        let keys: BTreeSet<ResourceKey> = uris.iter().map(ResourceUri::key).collect();
        Ok(keys.len())
    }

    pub async fn revision_count(&self) -> Result<usize> {
        let uris = bounded(self.core.read_timeout, self.core.store.list(&self.core.site)).await?;
        Ok(uris.len())
    }

    pub async fn stats(&self) -> Result<RepositoryStats> {
        let uris = bounded(self.core.read_timeout, self.core.store.list(&self.core.site)).await?;
        let keys: BTreeSet<ResourceKey> = uris.iter().map(ResourceUri::key).collect();
        let queue = self.queue.stats();
        Ok(RepositoryStats {
            site: self.core.site.clone(),
            resources: keys.len(),
            revisions: uris.len(),
            locks: self.core.locks.len(),
            pending_operations: self.queue.pending(),
            submitted: queue.submitted.load(Ordering::Relaxed),
            completed: queue.completed.load(Ordering::Relaxed),
            failed: queue.failed.load(Ordering::Relaxed),
            index: self.index_health(),
        })
    }

    // ------------------------------------------------------------
    // Index maintenance
    // ------------------------------------------------------------

    pub async fn rebuild_index(&self) -> Result<usize> {
        self.core.synchronizer.rebuild(&self.core.site).await
    }

    pub fn resync_stale(&self) -> usize {
        self.core.synchronizer.resync_stale()
    }

    pub fn index_health(&self) -> IndexHealth {
        self.core.synchronizer.health()
    }

    pub async fn index_version(&self) -> Result<Option<i64>> {
        self.core.synchronizer.index_version().await
    }

    pub fn is_index_stale(&self, uri: &ResourceUri) -> bool {
        self.core.synchronizer.is_stale(&uri.key())
    }

    /// Waits until the queue is drained and no index refresh is pending.
    pub async fn settle(&self) {
        while self.queue.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.core.synchronizer.settle().await;
    }
}

#[async_trait]
impl MutationHandler for RepositoryCore {
    async fn execute(&self, mutation: Mutation) -> Result<OperationOutcome> {
        match mutation {
            Mutation::Put { resource } => self.put(resource).await,
            Mutation::PutContent { uri, content, data } => self.put_content(&uri, content, data).await,
            Mutation::DeleteContent { uri, language } => self.delete_content(&uri, &language).await,
            Mutation::Delete { uri, all_revisions } => self.delete(&uri, all_revisions).await,
            Mutation::Move {
                uri,
                target_path,
                move_children,
            } => self.move_resource(&uri, &target_path, move_children).await,
            Mutation::Lock { uri, user } => self.lock(&uri, &user).await,
            Mutation::Unlock { uri, user } => self.unlock(&uri, &user).await,
        }
    }
}

impl RepositoryCore {
    async fn put(&self, mut resource: Resource) -> Result<OperationOutcome> {
        let key = resource.uri.key();
        // Lock state is owned by the lock table, never by the header.
        resource.lock_owner = self.locks.owner(&key);

        let stored = self.store.put(resource).await?;
        self.cache.evict(&stored.uri);
        self.synchronizer.schedule(key);
        Ok(OperationOutcome::Stored(stored))
    }

    async fn put_content(&self, uri: &ResourceUri, content: ResourceContent, data: Vec<u8>) -> Result<OperationOutcome> {
        let stored = self.store.put_content(uri, content, data).await?;
        self.cache.evict(uri);
        self.synchronizer.schedule(uri.key());
        Ok(OperationOutcome::Stored(stored))
    }

    async fn delete_content(&self, uri: &ResourceUri, language: &Language) -> Result<OperationOutcome> {
        let stored = self.store.delete_content(uri, language).await?;
        self.cache.evict(uri);
        self.synchronizer.schedule(uri.key());
        Ok(OperationOutcome::Stored(stored))
    }

    async fn delete(&self, uri: &ResourceUri, all_revisions: bool) -> Result<OperationOutcome> {
        self.integrity
            .check_delete(self.store.as_ref(), uri, all_revisions)
            .await?;

        let deleted = self.store.delete(uri, all_revisions).await?;
        if !deleted {
            return Ok(OperationOutcome::Deleted(false));
        }
        self.synchronizer.remove(uri, all_revisions).await;

        let key = uri.key();
        if all_revisions {
            self.cache.evict_resource(&key);
        } else {
            self.cache.evict(uri);
        }
        // The store has already changed, a failed lookup keeps the lock and the delete stands.
        let remaining = if all_revisions {
            false
        } else {
            match self.store.exists_any_version(uri).await {
                Ok(remaining) => remaining,
                Err(e) => {
                    tracing::warn!("Cannot tell whether {} has revisions left, keeping its lock: {}", uri, e);
                    true
                }
            }
        };
        if !remaining {
            self.locks.release(&key);
        }
        tracing::debug!("Deleted {} (all revisions: {})", uri, all_revisions);
        Ok(OperationOutcome::Deleted(true))
    }

    async fn move_resource(&self, uri: &ResourceUri, target_path: &str, move_children: bool) -> Result<OperationOutcome> {
        let moved = self.store.move_resource(uri, target_path, move_children).await?;
        let keys: BTreeSet<ResourceKey> = moved.iter().map(ResourceUri::key).collect();
        for key in keys {
            self.cache.evict_resource(&key);
            self.synchronizer.schedule(key);
        }
        Ok(OperationOutcome::Moved(moved))
    }

    async fn lock(&self, uri: &ResourceUri, user: &User) -> Result<OperationOutcome> {
        self.guard.require(user, Capability::Lock, uri)?;
        let key = uri.key();
        let outcome = self.locks.acquire(&key, user)?;

        let revisions = match self.store.lock(&key, user).await {
            Ok(revisions) => revisions,
            Err(e) => {
                if outcome == LockOutcome::Acquired {
                    self.locks.release(&key);
                }
                return Err(e);
            }
        };
        self.cache.evict_resource(&key);
        self.synchronizer.schedule(key);
        Ok(OperationOutcome::Stored(revision_at(revisions, uri)?))
    }

    async fn unlock(&self, uri: &ResourceUri, user: &User) -> Result<OperationOutcome> {
        self.guard.require(user, Capability::Unlock, uri)?;
        let key = uri.key();
        let previous_owner = self.locks.release(&key);

        let revisions = match self.store.unlock(&key).await {
            Ok(revisions) => revisions,
            Err(e) => {
                if let Some(owner) = &previous_owner {
                    self.locks.acquire(&key, owner)?;
                }
                return Err(e);
            }
        };
        self.cache.evict_resource(&key);
        self.synchronizer.schedule(key);
        Ok(OperationOutcome::Unlocked {
            resource: revision_at(revisions, uri)?,
            previous_owner,
        })
    }
}

/// The revision `uri` names, or any revision of the resource if that one is not stored.
fn revision_at(revisions: Vec<Resource>, uri: &ResourceUri) -> Result<Resource> {
    let position = revisions
        .iter()
        .position(|resource| resource.version() == uri.version)
        .unwrap_or(0);
    revisions
        .into_iter()
        .nth(position)
        .ok_or_else(|| RepositoryError::not_found(uri))
}

fn stored(outcome: OperationOutcome) -> Result<Resource> {
    match outcome {
        OperationOutcome::Stored(resource) => Ok(resource),
        other => Err(unexpected(other)),
    }
}

fn unexpected(outcome: OperationOutcome) -> RepositoryError {
    RepositoryError::IllegalState(format!("Unexpected operation outcome {:?}", outcome))
}

//! Index Synchronizer
//!
//! Keeps the search index an eventually consistent projection of the store.
//!
//! ## Responsibilities
//! - **Refresh**: re-reads every stored revision of an identity and upserts its
//!   documents, removing documents of revisions that no longer exist.
//! - **Coalescing lanes**: at most one refresh per identity runs at a time. Requests
//!   arriving during a refresh mark the lane dirty and trigger exactly one more pass,
//!   so the last pass always sees the latest store state.
//! - **Retry**: failed index calls are retried with exponential backoff and jitter.
//!   Identities that still fail are recorded as stale for a later resync.
//! - **Isolation**: refreshes run on their own tasks and permits, a slow index never
//!   holds up store mutations.

use super::builder::{Clause, NativeQuery};
use super::document::{build_document, sentinel_document};
use super::engine::SearchIndex;
use super::schema::*;
use super::types::IndexHealth;
use crate::error::{RepositoryError, Result};
use crate::resource::{ResourceKey, ResourceUri, Version};
use crate::storage::ContentStore;

use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub worker_count: usize,
    pub timeout: Duration,
    pub retry_attempts: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            worker_count: 2,
            timeout: Duration::from_millis(5000),
            retry_attempts: 3,
        }
    }
}

struct SyncShared {
    store: Arc<dyn ContentStore>,
    index: Arc<dyn SearchIndex>,
    settings: SyncSettings,
    /// Identity -> dirty flag. Present while a refresh is scheduled or running.
    lanes: DashMap<ResourceKey, bool>,
    /// Identity -> last error.
    stale: DashMap<ResourceKey, String>,
    last_error: Mutex<Option<String>>,
    permits: Semaphore,
}

#[derive(Clone)]
pub struct IndexSynchronizer {
    shared: Arc<SyncShared>,
}

impl IndexSynchronizer {
    pub fn new(store: Arc<dyn ContentStore>, index: Arc<dyn SearchIndex>, settings: SyncSettings) -> Self {
        let permits = Semaphore::new(settings.worker_count.max(1));
        Self {
            shared: Arc::new(SyncShared {
                store,
                index,
                settings,
                lanes: DashMap::new(),
                stale: DashMap::new(),
                last_error: Mutex::new(None),
                permits,
            }),
        }
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.shared.index
    }

    /// Index call bounded by the configured timeout.
    pub async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        bounded(self.shared.settings.timeout, call).await
    }

    /// Writes the sentinel document if the index has none. Returns the index version.
    pub async fn ensure_sentinel(&self) -> Result<i64> {
        let index = &self.shared.index;
        if let Some(version) = self.index_version().await? {
            return Ok(version);
        }
        self.bounded(index.upsert(sentinel_document(INDEX_VERSION)))
            .await?;
        tracing::info!("Initialized search index at version {}", INDEX_VERSION);
        Ok(INDEX_VERSION)
    }

    pub async fn index_version(&self) -> Result<Option<i64>> {
        let sentinel = self
            .bounded(self.shared.index.get(SENTINEL_UID))
            .await?;
        Ok(sentinel.and_then(|doc| doc.first_number(INDEX_VERSION_FIELD)))
    }

    /// Queues a refresh of the identity. Returns at once.
    pub fn schedule(&self, key: ResourceKey) {
        use dashmap::mapref::entry::Entry;
        match self.shared.lanes.entry(key.clone()) {
            Entry::Occupied(mut lane) => {
                *lane.get_mut() = true;
                tracing::trace!("Index refresh of {} coalesced", key);
            }
            Entry::Vacant(lane) => {
                lane.insert(false);
                let synchronizer = self.clone();
                tokio::spawn(async move {
                    synchronizer.run_lane(key).await;
                });
            }
        }
    }

    async fn run_lane(&self, key: ResourceKey) {
        loop {
            match self.shared.permits.acquire().await {
                Ok(_permit) => self.refresh_with_retry(&key).await,
                Err(_) => {
                    self.shared.lanes.remove(&key);
                    return;
                }
            }

            if self
                .shared
                .lanes
                .remove_if(&key, |_, dirty| !*dirty)
                .is_some()
            {
                return;
            }
            if let Some(mut dirty) = self.shared.lanes.get_mut(&key) {
                *dirty = false;
            }
        }
    }

    async fn refresh_with_retry(&self, key: &ResourceKey) {
        let attempts = self.shared.settings.retry_attempts.max(1);
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            match self.refresh(key).await {
                Ok(documents) => {
                    if self.shared.stale.remove(key).is_some() {
                        tracing::info!("Index entry of {} resynchronized", key);
                    }
                    tracing::debug!("Indexed {} revision(s) of {}", documents, key);
                    return;
                }
                Err(e) => {
                    if attempt + 1 == attempts {
                        self.mark_stale(key, &e);
                        return;
                    }
                    tracing::debug!("Index refresh of {} failed (attempt {}): {}", key, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }
    }

    fn mark_stale(&self, key: &ResourceKey, error: &RepositoryError) {
        tracing::warn!("Index entry of {} is stale: {}", key, error);
        self.shared.stale.insert(key.clone(), error.to_string());
        if let Ok(mut last_error) = self.shared.last_error.lock() {
            *last_error = Some(error.to_string());
        }
    }

    /// Reprojects every stored revision of the identity and prunes documents of removed ones.
    pub async fn refresh(&self, key: &ResourceKey) -> Result<usize> {
        let store = &self.shared.store;
        let index = &self.shared.index;
        let timeout = self.shared.settings.timeout;
        let lookup = ResourceUri::with_identifier(&key.site, &key.identifier);

        let uris = bounded(timeout, store.list_versions(&lookup)).await?;
        let versions: Vec<Version> = uris.iter().map(|uri| uri.version).collect();

        let mut stored = HashSet::new();
        for uri in &uris {
            let resource = match bounded(timeout, store.get(uri)).await {
                Ok(resource) => resource,
                // Deleted between listing and reading, pruned below.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            let document = build_document(&resource, &versions)?;
            stored.insert(document.uid.clone());
            bounded(timeout, index.upsert(document)).await?;
        }

        for uid in self.indexed_uids(&key.identifier).await? {
            if !stored.contains(&uid) {
                bounded(timeout, index.delete(&uid)).await?;
                tracing::debug!("Removed index entry {}", uid);
            }
        }
        Ok(stored.len())
    }

    async fn indexed_uids(&self, identifier: &str) -> Result<Vec<String>> {
        let mut query = NativeQuery::all();
        query.query.must.push(Clause::term(ID, identifier));
        let result = self.bounded(self.shared.index.query(&query)).await?;
        Ok(result.items.into_iter().map(|item| item.uid).collect())
    }

    /// Removes the documents of deleted revisions, ordered right after the store removal.
    ///
    /// Never fails: an index error marks the identity stale instead.
    pub async fn remove(&self, uri: &ResourceUri, all_revisions: bool) {
        let uids = if all_revisions {
            match self.indexed_uids(&uri.identifier).await {
                Ok(uids) => uids,
                Err(e) => {
                    self.mark_stale(&uri.key(), &e);
                    return;
                }
            }
        } else {
            vec![uri.uid()]
        };

        for uid in uids {
            if let Err(e) = self.bounded(self.shared.index.delete(&uid)).await {
                self.mark_stale(&uri.key(), &e);
                return;
            }
        }
        // Remaining revisions drop the removed one as alternate version, and the
        // pass prunes anything a refresh already in flight wrote back.
        self.schedule(uri.key());
    }

    /// Clears the index and reprojects every stored revision of `site`.
    pub async fn rebuild(&self, site: &str) -> Result<usize> {
        tracing::info!("Rebuilding search index for site {}", site);
        self.bounded(self.shared.index.clear()).await?;
        self.ensure_sentinel().await?;

        let uris = bounded(self.shared.settings.timeout, self.shared.store.list(site)).await?;
        let keys: BTreeSet<ResourceKey> = uris.iter().map(ResourceUri::key).collect();
        let mut documents = 0;
        for key in &keys {
            documents += self.refresh(key).await?;
            self.shared.stale.remove(key);
        }
        tracing::info!("Rebuilt search index with {} documents", documents);
        Ok(documents)
    }

    /// Schedules a refresh of every stale identity. Returns how many were queued.
    pub fn resync_stale(&self) -> usize {
        let keys: Vec<ResourceKey> = self
            .shared
            .stale
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in &keys {
            self.schedule(key.clone());
        }
        if !keys.is_empty() {
            tracing::info!("Resynchronizing {} stale index entries", keys.len());
        }
        keys.len()
    }

    /// Waits until no refresh is queued or running.
    pub async fn settle(&self) {
        while !self.shared.lanes.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn health(&self) -> IndexHealth {
        let stale = self.shared.stale.len();
        let last_error = self
            .shared
            .last_error
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default();
        IndexHealth {
            pending: self.shared.lanes.len(),
            stale,
            last_error,
            healthy: stale == 0,
        }
    }

    pub fn is_stale(&self, key: &ResourceKey) -> bool {
        self.shared.stale.contains_key(key)
    }
}

/// Runs `call` under `timeout`, mapping expiry to `RepositoryError::Timeout`.
pub async fn bounded<T>(timeout: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, call).await?
}

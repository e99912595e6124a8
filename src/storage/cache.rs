use super::backend::ContentStore;
use crate::error::Result;
use crate::resource::{Resource, ResourceBody, ResourceKey, ResourceUri};

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone)]
struct CacheEntry {
    header: Option<Arc<Resource>>,
    body: Option<Arc<ResourceBody>>,
    last_used: u64,
}

/// Two-phase resource loader.
///
/// Headers and bodies are fetched and cached independently, so listing pages never
/// pulls structured content. Entries are addressed by `(site, uid)` and stay until
/// evicted explicitly or pushed out once `capacity` is reached.
pub struct ResourceCache {
    store: Arc<dyn ContentStore>,
    entries: DashMap<(String, String), CacheEntry>,
    capacity: usize,
    clock: AtomicU64,
    /// Bumped by every eviction. A load that spans an eviction does not keep its result.
    epoch: AtomicU64,
}

impl ResourceCache {
    pub fn new(store: Arc<dyn ContentStore>, capacity: usize) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    fn cache_key(uri: &ResourceUri) -> (String, String) {
        (uri.site.clone(), uri.uid())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn load_header(&self, uri: &ResourceUri) -> Result<Arc<Resource>> {
        let key = Self::cache_key(uri);
        if let Some(mut entry) = self.entries.get_mut(&key)
            && let Some(header) = entry.header.clone()
        {
            entry.last_used = self.tick();
            return Ok(header);
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let header = Arc::new(self.store.get_header(uri).await?);
        if self.epoch.load(Ordering::Acquire) != epoch {
            return Ok(header);
        }
        self.make_room(&key);
        let tick = self.tick();
        self.entries
            .entry(key.clone())
            .and_modify(|entry| {
                entry.header = Some(header.clone());
                entry.last_used = tick;
            })
            .or_insert_with(|| CacheEntry {
                header: Some(header.clone()),
                body: None,
                last_used: tick,
            });
        self.discard_if_evicted(&key, epoch);
        Ok(header)
    }

    pub async fn load_body(&self, uri: &ResourceUri) -> Result<Arc<ResourceBody>> {
        let key = Self::cache_key(uri);
        if let Some(mut entry) = self.entries.get_mut(&key)
            && let Some(body) = entry.body.clone()
        {
            entry.last_used = self.tick();
            return Ok(body);
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let body = Arc::new(self.store.get_body(uri).await?);
        if self.epoch.load(Ordering::Acquire) != epoch {
            return Ok(body);
        }
        self.make_room(&key);
        let tick = self.tick();
        self.entries
            .entry(key.clone())
            .and_modify(|entry| {
                entry.body = Some(body.clone());
                entry.last_used = tick;
            })
            .or_insert_with(|| CacheEntry {
                header: None,
                body: Some(body.clone()),
                last_used: tick,
            });
        self.discard_if_evicted(&key, epoch);
        Ok(body)
    }

    /// Header and body joined back into a full resource.
    pub async fn load(&self, uri: &ResourceUri) -> Result<Resource> {
        let header = self.load_header(uri).await?;
        let body = self.load_body(uri).await?;
        Ok(header.as_ref().clone().with_body(body.as_ref().clone()))
    }

    pub fn evict(&self, uri: &ResourceUri) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.remove(&Self::cache_key(uri));
    }

    /// An eviction that raced the insert may have missed it.
    fn discard_if_evicted(&self, key: &(String, String), epoch: u64) {
        if self.epoch.load(Ordering::Acquire) != epoch {
            self.entries.remove(key);
        }
    }

    /// Drops every cached revision of the logical resource.
    pub fn evict_resource(&self, key: &ResourceKey) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let prefix = format!("{}.", key.identifier);
        self.entries
            .retain(|(site, uid), _| !(site == &key.site && uid.starts_with(&prefix)));
    }

    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts the least recently used entry when inserting `incoming` would exceed capacity.
    fn make_room(&self, incoming: &(String, String)) {
        if self.entries.contains_key(incoming) || self.entries.len() < self.capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_used)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            tracing::debug!("Evicting cached resource {}", key.1);
            self.entries.remove(&key);
        }
    }
}

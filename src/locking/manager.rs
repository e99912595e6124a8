use crate::error::{RepositoryError, Result};
use crate::resource::{ResourceKey, User};
use crate::storage::ContentStore;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock was free and now belongs to the caller.
    Acquired,
    /// The caller already held it.
    AlreadyHeld,
}

/// Lock table keyed by logical resource.
///
/// Acquire and release are atomic per key through the `DashMap` entry API.
#[derive(Default)]
pub struct LockManager {
    locks: DashMap<ResourceKey, User>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unlocked -> locked by `user`. Re-acquiring by the same user is a no-op.
    pub fn acquire(&self, key: &ResourceKey, user: &User) -> Result<LockOutcome> {
        match self.locks.entry(key.clone()) {
            Entry::Occupied(entry) => {
                if entry.get().login == user.login {
                    Ok(LockOutcome::AlreadyHeld)
                } else {
                    Err(RepositoryError::AlreadyLocked {
                        identifier: key.identifier.clone(),
                        owner: entry.get().login.clone(),
                    })
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(user.clone());
                tracing::debug!("{} locked by {}", key, user);
                Ok(LockOutcome::Acquired)
            }
        }
    }

    /// Locked -> unlocked regardless of who holds it. Returns the previous owner.
    pub fn release(&self, key: &ResourceKey) -> Option<User> {
        let previous = self.locks.remove(key).map(|(_, user)| user);
        if let Some(user) = &previous {
            tracing::debug!("{} unlocked (was held by {})", key, user);
        }
        previous
    }

    pub fn owner(&self, key: &ResourceKey) -> Option<User> {
        self.locks.get(key).map(|entry| entry.value().clone())
    }

    pub fn is_locked(&self, key: &ResourceKey) -> bool {
        self.locks.contains_key(key)
    }

    /// Keys locked by `login`.
    pub fn locked_by(&self, login: &str) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self
            .locks
            .iter()
            .filter(|entry| entry.value().login == login)
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Rebuilds the table from the lock owners stamped on stored revisions.
    pub async fn hydrate(&self, store: &dyn ContentStore, site: &str) -> Result<usize> {
        self.locks.clear();
        for uri in store.list(site).await? {
            let resource = store.get_header(&uri).await?;
            if let Some(owner) = resource.lock_owner {
                self.locks.entry(uri.key()).or_insert(owner);
            }
        }
        tracing::info!("Restored {} lock(s) for site {}", self.locks.len(), site);
        Ok(self.locks.len())
    }
}

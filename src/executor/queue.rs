//! Operation Queue
//!
//! Accepts mutations and executes them on background workers without blocking the caller.
//!
//! ## Responsibilities
//! - **Lanes**: one FIFO per logical resource. Only the lane's drainer executes its
//!   jobs, so at most one mutation per identity is in flight.
//! - **Concurrency bound**: a semaphore of `worker_count` permits caps how many lanes
//!   execute at once. Idle lanes hold neither a task nor a map entry.
//! - **Dispatch**: every job goes through the single `MutationHandler::execute` entry point.
//! - **Failure capture**: handler errors and panics become the operation's `Failed` state.
//!   Nothing is retried here.

use super::operation::Operation;
use super::types::*;
use crate::error::{RepositoryError, Result};
use crate::resource::ResourceKey;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Semaphore;

/// Executes one mutation against the store and its projections.
#[async_trait]
pub trait MutationHandler: Send + Sync {
    async fn execute(&self, mutation: Mutation) -> Result<OperationOutcome>;
}

#[derive(Clone)]
struct Job {
    operation: Operation,
    mutation: Mutation,
}

#[derive(Debug, Default)]
pub struct QueueStats {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
}

pub struct OperationQueue {
    handler: Arc<dyn MutationHandler>,
    lanes: Arc<DashMap<ResourceKey, VecDeque<Job>>>,
    permits: Arc<Semaphore>,
    stats: Arc<QueueStats>,
    worker_count: usize,
}

impl OperationQueue {
    pub fn new(handler: Arc<dyn MutationHandler>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        tracing::info!("Operation queue started with {} workers", worker_count);
        Self {
            handler,
            lanes: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(worker_count)),
            stats: Arc::new(QueueStats::default()),
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Enqueues the mutation and returns its handle at once.
    ///
    /// The identifier is drawn while the lane entry is held, so identifiers within
    /// one lane increase in execution order.
    pub fn submit(&self, mutation: Mutation) -> Operation {
        let key = mutation.key();
        let (operation, start_drainer) = {
            let mut lane = self.lanes.entry(key.clone()).or_default();
            let operation = Operation::new(OperationId::next(), &mutation);
            let start_drainer = lane.is_empty();
            lane.push_back(Job {
                operation: operation.clone(),
                mutation,
            });
            (operation, start_drainer)
        };
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Submitted {} ({} {})", operation.id(), operation.name(), key);

        if start_drainer {
            let lanes = self.lanes.clone();
            let handler = self.handler.clone();
            let permits = self.permits.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                drain_lane(lanes, handler, permits, stats, key).await;
            });
        }
        operation
    }

    /// Operations submitted but not yet terminal, across all lanes.
    pub fn pending(&self) -> usize {
        self.lanes.iter().map(|lane| lane.value().len()).sum()
    }

    /// Lanes that currently hold work.
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

/// Runs the jobs of one lane in order, then retires the lane.
///
/// The job stays at the front of its lane while it executes, so a concurrent
/// `submit` sees a busy lane and does not start a second drainer.
async fn drain_lane(
    lanes: Arc<DashMap<ResourceKey, VecDeque<Job>>>,
    handler: Arc<dyn MutationHandler>,
    permits: Arc<Semaphore>,
    stats: Arc<QueueStats>,
    key: ResourceKey,
) {
    tracing::trace!("Lane {} opened", key);
    loop {
        let next = lanes
            .get(&key)
            .and_then(|lane| lane.front().cloned());
        let Some(job) = next else {
            break;
        };

        run_job(&handler, &permits, &stats, job).await;

        // Pop and retire under one entry guard, a concurrent submit either lands
        // before (lane stays) or after (lane is gone and it starts a new drainer).
        if let Entry::Occupied(mut lane) = lanes.entry(key.clone()) {
            lane.get_mut().pop_front();
            if lane.get().is_empty() {
                lane.remove();
                break;
            }
        } else {
            break;
        }
    }
    tracing::trace!("Lane {} closed", key);
}

async fn run_job(handler: &Arc<dyn MutationHandler>, permits: &Semaphore, stats: &QueueStats, job: Job) {
    let Job { operation, mutation } = job;
    // Pending until a worker permit is held, so a waiting operation can still be cancelled.
    let _permit = match permits.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            operation.finish(Err(RepositoryError::IllegalState("Operation queue is shut down".to_string())));
            stats.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    if !operation.begin() {
        tracing::debug!("Skipping cancelled {}", operation.id());
        stats.failed.fetch_add(1, Ordering::Relaxed);
        return;
    }

    tracing::debug!("Executing {} ({} {})", operation.id(), operation.name(), operation.target());
    let handler = handler.clone();
    let outcome = match tokio::spawn(async move { handler.execute(mutation).await }).await {
        Ok(outcome) => outcome,
        Err(e) => Err(RepositoryError::IllegalState(format!("Operation panicked: {}", e))),
    };

    match &outcome {
        Ok(_) => {
            stats.completed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) if e.is_not_found() || matches!(e, RepositoryError::AlreadyLocked { .. }) => {
            tracing::debug!("{} failed: {}", operation.id(), e);
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            tracing::error!("{} ({} {}) failed: {}", operation.id(), operation.name(), operation.target(), e);
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
    operation.finish(outcome);
}

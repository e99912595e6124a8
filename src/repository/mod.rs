//! Repository Module
//!
//! The public façade over the store, the operation queue, the lock table and
//! the search index.
//!
//! ## Request Flow
//! - **Mutations** are submitted to the `OperationQueue`, which serializes them per
//!   logical resource and dispatches each one to a single handler. The handler checks
//!   capabilities and referential integrity, writes the store, evicts the cache and
//!   schedules the index refresh.
//! - **Reads** go to the store through the header/body cache, bounded by the configured
//!   store timeout. `find` and `suggest` go to the index and may trail recent writes.
//! - **Index failures** never fail a mutation. They surface through `index_health()`
//!   and are retried by `resync_stale()`.
//!
//! ## Submodules
//! - **`service`**: `ContentRepository`.
//! - **`handlers`**: axum handlers for health, stats, lookup and search.
//! - **`types`**: response types.

pub mod handlers;
pub mod service;
pub mod types;

pub use service::ContentRepository;
pub use types::RepositoryStats;

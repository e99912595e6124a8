//! Backing Store Module
//!
//! Defines the contract a storage engine must satisfy and ships an in-memory engine.
//! The store is the system of record: the search index is a disposable projection of it.
//!
//! ## Core Concepts
//! - **Exact version lookup**: revisions are addressed by `(site, identifier, version)`.
//! - **Path index**: a secondary index, unique per `(site, version)` at any instant.
//! - **No orphans**: a resource that does not exist yet needs an existing parent path.
//! - **All-or-nothing moves**: a failed cascade leaves no entry renamed.
//!
//! ## Submodules
//! - **`backend`**: the `ContentStore` trait.
//! - **`memory`**: `MemoryStore`, a lock-protected in-memory engine with fault injection.
//! - **`cache`**: `ResourceCache`, the two-phase header/body loader with explicit eviction.

pub mod backend;
pub mod cache;
pub mod memory;

pub use backend::ContentStore;
pub use cache::ResourceCache;
pub use memory::MemoryStore;

//! Versioned Content Repository Library
//!
//! This library crate defines the core modules of the content repository. It serves
//! as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`resource`**: The data model. Resource identity (site, path, identifier, version),
//!   header fields, structured content and language content variants.
//! - **`storage`**: The backing store contract (`ContentStore`), the in-memory engine and
//!   the two-phase header/body cache.
//! - **`executor`**: The operation queue. Mutations run asynchronously, serialized per
//!   logical resource, and report to listeners exactly once.
//! - **`locking`**: The identifier-wide lock table.
//! - **`search`**: The derived search index: document projection, query translation,
//!   synchronization with the store and referential integrity checks.
//! - **`repository`**: The façade that wires everything together, plus HTTP handlers.
//! - **`security`**: Capability checks and the system principal.
//! - **`config`** / **`error`**: Layered configuration and the shared error type.

pub mod config;
pub mod error;
pub mod executor;
pub mod locking;
pub mod repository;
pub mod resource;
pub mod search;
pub mod security;
pub mod storage;

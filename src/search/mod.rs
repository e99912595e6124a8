//! Search Module
//!
//! The derived search index: document projection, query translation, the index
//! service contract and the components that keep it consistent with the store.
//!
//! ## Overview
//! The index is never the system of record. Documents are regenerated from the
//! store on every mutation and the whole index can be rebuilt from it.
//!
//! ## Submodules
//! - **`schema`**: field names and the sentinel document constants.
//! - **`document`**: `IndexDocument` and the resource projection rules.
//! - **`tokenizer`**: text normalization shared by indexing and free-text queries.
//! - **`query`**: the declarative `SearchQuery` builder.
//! - **`builder`**: translation into the native boolean query.
//! - **`engine`**: the `SearchIndex` trait and `MemoryIndex`.
//! - **`sync`**: `IndexSynchronizer`, retry and staleness tracking.
//! - **`integrity`**: `IntegrityChecker` for destructive deletes.
//! - **`types`**: result and health types.

pub mod builder;
pub mod document;
pub mod engine;
pub mod integrity;
pub mod query;
pub mod schema;
pub mod sync;
pub mod tokenizer;
pub mod types;

pub use builder::{NativeQuery, build_query};
pub use document::{IndexDocument, build_document};
pub use engine::{MemoryIndex, SearchIndex};
pub use integrity::IntegrityChecker;
pub use query::{DateRange, Limit, Quantifier, SearchQuery, SortOrder};
pub use sync::{IndexSynchronizer, SyncSettings};
pub use types::{IndexHealth, SearchResult, SearchResultItem};

#[cfg(test)]
mod tests;

//! Resource Model Module
//!
//! Identity, versioning, content-variant and structured-content data types shared
//! by every other subsystem.
//!
//! ## Core Concepts
//! - **ResourceUri**: `(site, path, identifier, version)`. The identifier is stable,
//!   the path is a secondary, mutable index.
//! - **Version**: `Live` (published), `Work` (draft) or an explicit numbered revision.
//! - **ResourceKey**: `(site, identifier)`, the logical resource every revision belongs to.
//!   Locks and operation serialization are keyed by it.
//! - **Resource**: header fields, audit trail, lock owner, tags, structured content
//!   (composers holding pagelets) and zero or more language content variants.
//!
//! ## Submodules
//! - **`uri`**: identity types and path normalization.
//! - **`types`**: the resource entity and its parts.

pub mod types;
pub mod uri;

pub use types::*;
pub use uri::*;

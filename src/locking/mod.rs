//! Locking Module
//!
//! Exclusive, user-scoped edit locks on logical resources.
//!
//! A lock covers every revision of an identifier. The table here is the single
//! source of truth for contention; the lock owner stamped on stored revisions
//! mirrors it and is only read back on startup.

pub mod manager;

pub use manager::{LockManager, LockOutcome};

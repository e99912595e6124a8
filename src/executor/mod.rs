//! Operation Executor Module
//!
//! Asynchronous execution of repository mutations with per-resource serialization.
//!
//! ## Architecture Overview
//! 1. **Submission**: a `Mutation` is handed to the `OperationQueue`, which returns an
//!    `Operation` handle immediately.
//! 2. **Lanes**: mutations are appended to the FIFO lane of their logical resource
//!    (site + identifier). Operations on one resource run in submission order.
//! 3. **Execution**: a drainer task per busy lane runs each job through the
//!    `MutationHandler`, bounded by a shared pool of worker permits.
//! 4. **Completion**: the terminal result is stored on the handle, then listeners and
//!    waiters are notified.
//!
//! ## Submodules
//! - **`types`**: operation identifiers, statuses, mutations and outcomes.
//! - **`operation`**: the `Operation` handle and the `OperationListener` callback trait.
//! - **`queue`**: `OperationQueue`, lanes and the `MutationHandler` dispatch trait.

pub mod operation;
pub mod queue;
pub mod types;

pub use operation::{ListenerId, Operation, OperationListener};
pub use queue::{MutationHandler, OperationQueue, QueueStats};
pub use types::{Mutation, OperationId, OperationOutcome, OperationStatus};

#[cfg(test)]
mod tests;

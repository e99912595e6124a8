//! Operation Handle
//!
//! The caller-facing side of a submitted mutation. A handle is cheap to clone and
//! every clone observes the same terminal result.
//!
//! ## Guarantees
//! - Terminal states are written once and never change.
//! - Each registered listener is invoked exactly once. A listener added after
//!   completion is invoked immediately on the caller's thread.
//! - `result()` and `error()` fail with `IllegalState` until the operation is terminal.

use super::types::*;
use crate::error::{RepositoryError, Result};
use crate::resource::ResourceUri;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Receives the outcome of an operation from the worker that finished it.
///
/// Callbacks run on a worker and must not block indefinitely.
pub trait OperationListener: Send + Sync {
    fn on_success(&self, operation: &Operation, outcome: &OperationOutcome);
    fn on_failure(&self, operation: &Operation, error: &RepositoryError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct OperationState {
    status: OperationStatus,
    outcome: Option<Result<OperationOutcome>>,
    listeners: Vec<(ListenerId, Arc<dyn OperationListener>)>,
    next_listener: u64,
}

struct OperationInner {
    id: OperationId,
    name: &'static str,
    target: ResourceUri,
    created_at: u64,
    state: Mutex<OperationState>,
    done: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct Operation {
    inner: Arc<OperationInner>,
}

impl Operation {
    pub(crate) fn new(id: OperationId, mutation: &Mutation) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(OperationInner {
                id,
                name: mutation.name(),
                target: mutation.uri().clone(),
                created_at: now_ms(),
                state: Mutex::new(OperationState {
                    status: OperationStatus::Pending,
                    outcome: None,
                    listeners: Vec::new(),
                    next_listener: 0,
                }),
                done,
            }),
        }
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    /// Mutation kind, e.g. `put` or `move`.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn target(&self) -> &ResourceUri {
        &self.inner.target
    }

    pub fn created_at(&self) -> u64 {
        self.inner.created_at
    }

    fn state(&self) -> MutexGuard<'_, OperationState> {
        // A poisoned lock only means a panic elsewhere, the state itself stays consistent.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> OperationStatus {
        self.state().status.clone()
    }

    pub fn is_done(&self) -> bool {
        self.state().status.is_terminal()
    }

    /// The completion value. Fails loudly while the operation is still in flight.
    pub fn result(&self) -> Result<OperationOutcome> {
        match &self.state().outcome {
            Some(outcome) => outcome.clone(),
            None => Err(RepositoryError::IllegalState(format!(
                "Operation {} has not finished yet",
                self.inner.id
            ))),
        }
    }

    /// The failure, `None` if the operation completed successfully.
    pub fn error(&self) -> Result<Option<RepositoryError>> {
        match &self.state().outcome {
            Some(Ok(_)) => Ok(None),
            Some(Err(error)) => Ok(Some(error.clone())),
            None => Err(RepositoryError::IllegalState(format!(
                "Operation {} has not finished yet",
                self.inner.id
            ))),
        }
    }

    /// Suspends the caller until the operation is terminal.
    pub async fn wait(&self) -> Result<OperationOutcome> {
        let mut done = self.inner.done.subscribe();
        // The sender lives in `inner`, so it cannot be dropped while we hold the handle.
        let _ = done.wait_for(|finished| *finished).await;
        self.result()
    }

    pub fn add_listener(&self, listener: Arc<dyn OperationListener>) -> ListenerId {
        let mut state = self.state();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;

        match state.outcome.clone() {
            Some(outcome) => {
                drop(state);
                self.notify(&listener, &outcome);
            }
            None => state.listeners.push((id, listener)),
        }
        id
    }

    /// Returns false if the listener already fired or was never registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() != before
    }

    /// Cancels an operation that has not started. Running operations finish normally.
    pub fn cancel(&self) -> bool {
        let state = self.state();
        if state.status != OperationStatus::Pending {
            return false;
        }
        tracing::debug!("Cancelling {} ({} {})", self.inner.id, self.inner.name, self.inner.target);
        self.settle(state, Err(RepositoryError::Cancelled));
        true
    }

    /// Pending -> Running. False if the operation was cancelled meanwhile.
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.state();
        if state.status != OperationStatus::Pending {
            return false;
        }
        state.status = OperationStatus::Running;
        true
    }

    pub(crate) fn finish(&self, outcome: Result<OperationOutcome>) {
        let state = self.state();
        if state.status.is_terminal() {
            tracing::warn!("Operation {} finished twice, keeping first result", self.inner.id);
            return;
        }
        self.settle(state, outcome);
    }

    /// Writes the terminal state, then notifies listeners and waiters outside the lock.
    fn settle(&self, mut state: MutexGuard<'_, OperationState>, outcome: Result<OperationOutcome>) {
        state.status = match &outcome {
            Ok(_) => OperationStatus::Completed,
            Err(error) => OperationStatus::Failed {
                error: error.to_string(),
            },
        };
        state.outcome = Some(outcome.clone());
        let listeners = std::mem::take(&mut state.listeners);
        drop(state);

        for (_, listener) in &listeners {
            self.notify(listener, &outcome);
        }
        self.inner.done.send_replace(true);
    }

    fn notify(&self, listener: &Arc<dyn OperationListener>, outcome: &Result<OperationOutcome>) {
        let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| match outcome {
            Ok(value) => listener.on_success(self, value),
            Err(error) => listener.on_failure(self, error),
        }));
        if delivered.is_err() {
            tracing::error!("Listener of {} panicked", self.inner.id);
        }
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Operation {}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("target", &self.inner.target)
            .field("status", &self.status())
            .finish()
    }
}

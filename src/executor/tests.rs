//! Executor Module Tests
//!
//! ## Test Scopes
//! - **Operation handle**: lifecycle, early result access, cancellation.
//! - **Listeners**: exactly-once delivery, late registration, removal.
//! - **Queue**: per-identity ordering, cross-identity overlap, failure capture.

#[cfg(test)]
mod tests {
    use crate::error::RepositoryError;
    use crate::executor::*;
    use crate::resource::{Resource, ResourceUri};

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Records `(identifier, sequence)` per executed put, with optional latency and a gate.
    #[derive(Default)]
    struct RecordingHandler {
        log: Mutex<Vec<(String, String)>>,
        delay: Option<Duration>,
        gate: Option<Arc<Semaphore>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        executed: AtomicUsize,
    }

    #[async_trait]
    impl MutationHandler for RecordingHandler {
        async fn execute(&self, mutation: Mutation) -> crate::error::Result<OperationOutcome> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                let permit = gate.acquire().await.unwrap();
                permit.forget();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            match mutation {
                Mutation::Put { resource } => {
                    let sequence = resource.template.clone().unwrap_or_default();
                    if sequence == "fail" {
                        return Err(RepositoryError::Io("disk full".to_string()));
                    }
                    if sequence == "panic" {
                        panic!("handler blew up");
                    }
                    self.log
                        .lock()
                        .unwrap()
                        .push((resource.uri.identifier.clone(), sequence));
                    Ok(OperationOutcome::Stored(resource))
                }
                Mutation::Delete { .. } => Ok(OperationOutcome::Deleted(true)),
                other => Err(RepositoryError::InvalidArgument(other.name().to_string())),
            }
        }
    }

    #[derive(Default)]
    struct CountingListener {
        successes: AtomicUsize,
        failures: AtomicUsize,
    }

    impl OperationListener for CountingListener {
        fn on_success(&self, _operation: &Operation, _outcome: &OperationOutcome) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _operation: &Operation, _error: &RepositoryError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn put(uri: &ResourceUri, sequence: &str) -> Mutation {
        let mut resource = Resource::page(uri.clone());
        resource.template = Some(sequence.to_string());
        Mutation::Put { resource }
    }

    // ============================================================
    // OPERATION HANDLE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_result_before_completion_fails_loudly() {
        // ARRANGE: a handler that blocks until the gate opens
        let gate = Arc::new(Semaphore::new(0));
        let handler = Arc::new(RecordingHandler {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let queue = OperationQueue::new(handler, 2);
        let uri = ResourceUri::new("test", "/a");

        // ACT
        let operation = queue.submit(put(&uri, "0"));

        // ASSERT: neither accessor blocks, both report a programming error
        assert!(matches!(operation.result(), Err(RepositoryError::IllegalState(_))));
        assert!(matches!(operation.error(), Err(RepositoryError::IllegalState(_))));

        gate.add_permits(1);
        let outcome = operation.wait().await.unwrap();
        assert!(matches!(outcome, OperationOutcome::Stored(_)));
        assert_eq!(operation.status(), OperationStatus::Completed);
        assert_eq!(operation.error().unwrap(), None);
    }

    #[tokio::test]
    async fn test_identifiers_increase() {
        let queue = OperationQueue::new(Arc::new(RecordingHandler::default()), 2);
        let uri = ResourceUri::new("test", "/a");

        let first = queue.submit(put(&uri, "0"));
        let second = queue.submit(put(&uri, "1"));

        assert!(second.id() > first.id());
        assert_ne!(first, second);
        second.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_pending_operation() {
        // ARRANGE: the first operation holds the lane, the second waits behind it
        let gate = Arc::new(Semaphore::new(0));
        let handler = Arc::new(RecordingHandler {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let queue = OperationQueue::new(handler.clone(), 2);
        let uri = ResourceUri::new("test", "/a");
        let running = queue.submit(put(&uri, "0"));
        let waiting = queue.submit(put(&uri, "1"));
        let listener = Arc::new(CountingListener::default());
        waiting.add_listener(listener.clone());

        // ACT
        assert!(waiting.cancel());
        gate.add_permits(1);
        running.wait().await.unwrap();

        // ASSERT
        assert!(matches!(waiting.wait().await, Err(RepositoryError::Cancelled)));
        assert!(!waiting.cancel(), "terminal operations cannot be cancelled");
        assert!(!running.cancel());
        assert_eq!(listener.failures.load(Ordering::SeqCst), 1);
        assert_eq!(handler.executed.load(Ordering::SeqCst), 1);
    }

    // ============================================================
    // LISTENER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_listener_invoked_once_on_completion() {
        let gate = Arc::new(Semaphore::new(0));
        let handler = Arc::new(RecordingHandler {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let queue = OperationQueue::new(handler, 2);
        let operation = queue.submit(put(&ResourceUri::new("test", "/a"), "0"));
        let listener = Arc::new(CountingListener::default());
        operation.add_listener(listener.clone());

        gate.add_permits(1);
        operation.wait().await.unwrap();

        assert_eq!(listener.successes.load(Ordering::SeqCst), 1);
        assert_eq!(listener.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listener_added_after_completion_fires_immediately() {
        // ARRANGE: a finished operation
        let queue = OperationQueue::new(Arc::new(RecordingHandler::default()), 2);
        let operation = queue.submit(put(&ResourceUri::new("test", "/a"), "0"));
        operation.wait().await.unwrap();
        let listener = Arc::new(CountingListener::default());

        // ACT: no await between registration and the assertion
        operation.add_listener(listener.clone());

        // ASSERT: delivered synchronously, exactly once
        assert_eq!(listener.successes.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(listener.successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_removed_listener_is_not_invoked() {
        let gate = Arc::new(Semaphore::new(0));
        let handler = Arc::new(RecordingHandler {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let queue = OperationQueue::new(handler, 2);
        let operation = queue.submit(put(&ResourceUri::new("test", "/a"), "0"));
        let listener = Arc::new(CountingListener::default());
        let id = operation.add_listener(listener.clone());

        assert!(operation.remove_listener(id));
        gate.add_permits(1);
        operation.wait().await.unwrap();

        assert_eq!(listener.successes.load(Ordering::SeqCst), 0);
        assert!(!operation.remove_listener(id));
    }

    // ============================================================
    // QUEUE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_same_identity_runs_in_submission_order() {
        // ARRANGE
        let handler = Arc::new(RecordingHandler {
            delay: Some(Duration::from_millis(2)),
            ..Default::default()
        });
        let queue = OperationQueue::new(handler.clone(), 4);
        let uri = ResourceUri::new("test", "/a");

        // ACT
        let operations: Vec<Operation> = (0..20)
            .map(|i| queue.submit(put(&uri, &i.to_string())))
            .collect();
        for operation in &operations {
            operation.wait().await.unwrap();
        }

        // ASSERT: executed in order, never two at once
        let log = handler.log.lock().unwrap().clone();
        let sequence: Vec<String> = log.into_iter().map(|(_, s)| s).collect();
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(sequence, expected);
        assert_eq!(handler.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(queue.active_lanes(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_identity_from_concurrent_callers() {
        // ARRANGE
        let handler = Arc::new(RecordingHandler::default());
        let queue = Arc::new(OperationQueue::new(handler.clone(), 4));
        let uri = ResourceUri::new("test", "/a");

        // ACT: eight submitters racing on one identity
        let submitters: Vec<_> = (0..8)
            .map(|caller| {
                let queue = queue.clone();
                let uri = uri.clone();
                tokio::spawn(async move {
                    let mut operations = Vec::new();
                    for i in 0..25 {
                        operations.push(queue.submit(put(&uri, &format!("{}-{}", caller, i))));
                        tokio::task::yield_now().await;
                    }
                    operations
                })
            })
            .collect();
        let mut operations = Vec::new();
        for submitter in submitters {
            operations.extend(submitter.await.unwrap());
        }
        for operation in &operations {
            operation.wait().await.unwrap();
        }

        // ASSERT: one at a time, nothing lost, each caller's order kept
        assert_eq!(handler.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(handler.executed.load(Ordering::SeqCst), 200);
        assert_eq!(queue.stats().failed.load(Ordering::SeqCst), 0);
        assert_eq!(queue.active_lanes(), 0);
        let log = handler.log.lock().unwrap().clone();
        for caller in 0..8 {
            let prefix = format!("{}-", caller);
            let sequence: Vec<usize> = log
                .iter()
                .filter_map(|(_, s)| s.strip_prefix(&prefix))
                .filter_map(|n| n.parse().ok())
                .collect();
            assert_eq!(sequence, (0..25).collect::<Vec<usize>>());
        }
    }

    #[tokio::test]
    async fn test_operation_waiting_for_worker_stays_cancellable() {
        // ARRANGE: one worker, held by a gated operation
        let gate = Arc::new(Semaphore::new(0));
        let handler = Arc::new(RecordingHandler {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let queue = OperationQueue::new(handler.clone(), 1);
        let first = queue.submit(put(&ResourceUri::new("test", "/a"), "0"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // ACT: a second identity queues behind the worker permit
        let second = queue.submit(put(&ResourceUri::new("test", "/b"), "0"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // ASSERT
        assert_eq!(first.status(), OperationStatus::Running);
        assert_eq!(second.status(), OperationStatus::Pending);
        assert!(second.cancel());

        gate.add_permits(1);
        first.wait().await.unwrap();
        assert!(matches!(second.wait().await, Err(RepositoryError::Cancelled)));
        assert_eq!(handler.executed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_identities_overlap() {
        let handler = Arc::new(RecordingHandler {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let queue = OperationQueue::new(handler.clone(), 4);

        let operations: Vec<Operation> = (0..4)
            .map(|i| queue.submit(put(&ResourceUri::new("test", &format!("/p{}", i)), "0")))
            .collect();
        for operation in &operations {
            operation.wait().await.unwrap();
        }

        assert!(handler.max_active.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_worker_count_bounds_concurrency() {
        let handler = Arc::new(RecordingHandler {
            delay: Some(Duration::from_millis(30)),
            ..Default::default()
        });
        let queue = OperationQueue::new(handler.clone(), 1);

        let operations: Vec<Operation> = (0..3)
            .map(|i| queue.submit(put(&ResourceUri::new("test", &format!("/p{}", i)), "0")))
            .collect();
        for operation in &operations {
            operation.wait().await.unwrap();
        }

        assert_eq!(handler.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_fails_operation() {
        let queue = OperationQueue::new(Arc::new(RecordingHandler::default()), 2);
        let uri = ResourceUri::new("test", "/a");
        let listener = Arc::new(CountingListener::default());

        let failed = queue.submit(put(&uri, "fail"));
        failed.add_listener(listener.clone());
        let next = queue.submit(put(&uri, "1"));

        assert!(matches!(failed.wait().await, Err(RepositoryError::Io(_))));
        assert!(matches!(failed.status(), OperationStatus::Failed { .. }));
        assert_eq!(listener.failures.load(Ordering::SeqCst), 1);
        assert!(next.wait().await.is_ok(), "a failure does not block the lane");
    }

    #[tokio::test]
    async fn test_handler_panic_is_captured() {
        let queue = OperationQueue::new(Arc::new(RecordingHandler::default()), 2);
        let uri = ResourceUri::new("test", "/a");

        let panicked = queue.submit(put(&uri, "panic"));
        let next = queue.submit(Mutation::Delete {
            uri: uri.clone(),
            all_revisions: true,
        });

        assert!(matches!(panicked.wait().await, Err(RepositoryError::IllegalState(_))));
        assert_eq!(next.wait().await.unwrap(), OperationOutcome::Deleted(true));
    }
}

// Startup sequencing
// Decision: The sequencer is the only writer of the startup state and is consumed by `run`,
// so the database check happens exactly once per process
// Decision: No retry on connectivity failure; the process aborts and the supervisor restarts it
//
// State machine: uninitialized -> ready | failed (both terminal).

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use gatehouse_storage::{Persistence, StorageError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::common::ErrorResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupState {
    Uninitialized,
    Ready,
    Failed,
}

/// Fatal startup failures. Never sent to clients.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("startup connectivity failure: {0}")]
    Connectivity(#[from] StorageError),

    #[error("startup connectivity check timed out after {0:?}")]
    TimedOut(Duration),
}

/// Read-only view of the startup state, shared with the request pipeline
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: watch::Receiver<StartupState>,
}

impl Lifecycle {
    pub fn state(&self) -> StartupState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == StartupState::Ready
    }

    /// Resolve once the state has left `uninitialized`
    pub async fn settled(&mut self) -> StartupState {
        let settled = self
            .state
            .wait_for(|state| *state != StartupState::Uninitialized)
            .await
            .map(|state| *state);

        // An error means the sequencer was dropped without running
        settled.unwrap_or_else(|_| self.state())
    }
}

/// One-shot initializer that gates traffic on database connectivity
#[derive(Debug)]
pub struct StartupSequencer {
    state: watch::Sender<StartupState>,
    timeout: Duration,
}

impl StartupSequencer {
    /// Create a sequencer in the `uninitialized` state together with its reader handle
    pub fn new(timeout: Duration) -> (Self, Lifecycle) {
        let (tx, rx) = watch::channel(StartupState::Uninitialized);
        (Self { state: tx, timeout }, Lifecycle { state: rx })
    }

    /// Run the entry action: check persistence connectivity within the timeout.
    pub async fn run<P>(self, persistence: &P) -> Result<(), StartupError>
    where
        P: Persistence + ?Sized,
    {
        tracing::info!(timeout = ?self.timeout, "Checking database connectivity");

        let result = match tokio::time::timeout(self.timeout, persistence.init_db()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StartupError::Connectivity(e)),
            Err(_) => Err(StartupError::TimedOut(self.timeout)),
        };

        match &result {
            Ok(()) => {
                self.state.send_replace(StartupState::Ready);
                tracing::info!("Connected to database, ready to serve");
            }
            Err(e) => {
                self.state.send_replace(StartupState::Failed);
                tracing::error!(error = %e, "Startup failed");
            }
        }

        result
    }
}

/// Middleware answering 503 until the lifecycle is `ready`
pub async fn require_ready(
    State(lifecycle): State<Lifecycle>,
    request: Request,
    next: Next,
) -> Response {
    if !lifecycle.is_ready() {
        tracing::warn!(state = ?lifecycle.state(), "Rejecting request before startup completed");
        return ErrorResponse::new("Service is not ready")
            .with_status(StatusCode::SERVICE_UNAVAILABLE);
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDb {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingDb {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl Persistence for CountingDb {
        async fn init_db(&self) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(StorageError::Connectivity(sqlx::Error::PoolClosed))
            } else {
                Ok(())
            }
        }
    }

    struct HangingDb;

    #[async_trait]
    impl Persistence for HangingDb {
        async fn init_db(&self) -> Result<(), StorageError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_starts_uninitialized() {
        let (_sequencer, lifecycle) = StartupSequencer::new(Duration::from_secs(1));
        assert_eq!(lifecycle.state(), StartupState::Uninitialized);
        assert!(!lifecycle.is_ready());
    }

    #[tokio::test]
    async fn test_success_transitions_to_ready_once() {
        let db = CountingDb::new(false);
        let (sequencer, mut lifecycle) = StartupSequencer::new(Duration::from_secs(1));

        sequencer.run(&db).await.unwrap();

        assert_eq!(db.calls.load(Ordering::SeqCst), 1);
        assert!(lifecycle.is_ready());
        assert_eq!(lifecycle.settled().await, StartupState::Ready);
    }

    #[tokio::test]
    async fn test_failure_transitions_to_failed() {
        let db = CountingDb::new(true);
        let (sequencer, lifecycle) = StartupSequencer::new(Duration::from_secs(1));

        let err = sequencer.run(&db).await.unwrap_err();

        assert!(matches!(err, StartupError::Connectivity(_)));
        assert_eq!(db.calls.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), StartupState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_transitions_to_failed() {
        let (sequencer, lifecycle) = StartupSequencer::new(Duration::from_secs(5));

        let err = sequencer.run(&HangingDb).await.unwrap_err();

        assert!(matches!(err, StartupError::TimedOut(d) if d == Duration::from_secs(5)));
        assert_eq!(lifecycle.state(), StartupState::Failed);
    }

    #[tokio::test]
    async fn test_readers_observe_transition() {
        let (sequencer, lifecycle) = StartupSequencer::new(Duration::from_secs(1));
        let mut waiter = lifecycle.clone();
        let handle = tokio::spawn(async move { waiter.settled().await });

        sequencer.run(&CountingDb::new(false)).await.unwrap();

        assert_eq!(handle.await.unwrap(), StartupState::Ready);
        assert!(lifecycle.is_ready());
    }

    #[tokio::test]
    async fn test_dropped_sequencer_leaves_state_uninitialized() {
        let (sequencer, mut lifecycle) = StartupSequencer::new(Duration::from_secs(1));
        drop(sequencer);
        assert_eq!(lifecycle.settled().await, StartupState::Uninitialized);
    }
}

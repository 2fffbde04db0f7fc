//! Cooperative cancellation for render jobs.
//!
//! Cancellation is best-effort: a worker that already started a job may
//! finish it, and whoever consumes the result must check whether it is still
//! wanted.

use crate::JobId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cancellation flag. Clones observe the same state.
///
/// ```
/// use pagedeck_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Idempotent; every clone observes the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps live job ids to their tokens so jobs can be cancelled by id.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job and returns the token handed to its worker.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().insert(job_id, token.clone());
        token
    }

    /// Returns `true` if the job was registered.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.tokens.lock().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_many(&self, job_ids: &[JobId]) -> usize {
        let tokens = self.tokens.lock();
        job_ids
            .iter()
            .filter_map(|job_id| tokens.get(job_id))
            .inspect(|token| token.cancel())
            .count()
    }

    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens.lock();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    pub fn unregister(&self, job_id: JobId) -> bool {
        self.tokens.lock().remove(&job_id).is_some()
    }

    pub fn get(&self, job_id: JobId) -> Option<CancellationToken> {
        self.tokens.lock().get(&job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }

    /// Forgets every token without cancelling it.
    pub fn clear(&self) {
        self.tokens.lock().clear();
    }
}

//! Global bound on in-flight page operations across all lanes.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::capture_types::CaptureError;

/// Counting semaphore shared by every lane
///
/// A lane holds one permit for the duration of one capture attempt, from
/// navigation through persistence. The permit is released on drop, so it is
/// returned on both the success and the failure path.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    budget: usize,
}

impl ConcurrencyLimiter {
    #[must_use]
    pub fn new(budget: usize) -> Self {
        let budget = budget.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(budget)),
            budget,
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, CaptureError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| CaptureError::LimiterClosed)
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

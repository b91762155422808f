use std::sync::Arc;

use tokio::sync::Semaphore;

use lowcode_core::ServiceError;

/// Bounded pool for blocking storage calls.
///
/// The KV backends are synchronous. Every call goes through
/// `spawn_blocking`, and a semaphore caps how many run at once so a
/// large fan-out cannot exhaust the runtime's blocking threads.
#[derive(Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Run `f` on the blocking pool once a slot frees up.
    pub async fn run<F, R>(&self, f: F) -> Result<R, ServiceError>
    where
        F: FnOnce() -> Result<R, ServiceError> + Send + 'static,
        R: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ServiceError::Internal("blocking pool closed".into()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("blocking task failed: {e}")))?
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

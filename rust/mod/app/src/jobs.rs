use std::future::Future;

use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::service::AppError;

/// Runs detached jobs: work that commits once started, whether or not
/// anyone is still waiting for the result.
///
/// Every job is tracked so the host can drain in-flight work on shutdown.
#[derive(Clone, Default)]
pub struct JobRunner {
    tracker: TaskTracker,
}

/// Receiving end of a job. Dropping it does not cancel the job.
#[must_use = "dropping the handle discards the result, the job still runs"]
pub struct JobHandle<T> {
    name: &'static str,
    rx: oneshot::Receiver<Result<T, AppError>>,
}

impl<T> JobHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the job's result.
    pub async fn wait(self) -> Result<T, AppError> {
        let name = self.name;
        self.rx
            .await
            .map_err(|_| AppError::Internal(format!("job {name} ended without a result")))?
    }
}

impl JobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `fut` as a detached job on the current runtime.
    pub fn spawn<T, F>(&self, name: &'static str, fut: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.tracker.spawn(async move {
            debug!("job {name} started");
            let result = fut.await;
            match &result {
                Ok(_) => info!("job {name} finished"),
                Err(e) => error!("job {name} failed: {e}"),
            }
            if tx.send(result).is_err() {
                debug!("job {name}: result dropped, nobody waiting");
            }
        });
        JobHandle { name, rx }
    }

    /// Number of jobs still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every job spawned so far has completed.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_result() {
        let jobs = JobRunner::new();
        let handle = jobs.spawn("answer", async { Ok(42) });
        assert_eq!(handle.name(), "answer");
        assert_eq!(handle.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let jobs = JobRunner::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let handle = jobs.spawn("slow", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        drop(handle);
        assert_eq!(jobs.in_flight(), 1);

        jobs.drain().await;
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(jobs.in_flight(), 0);

        // Still usable after draining.
        let again = jobs.spawn("again", async { Ok("ok") });
        assert_eq!(again.wait().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn errors_are_delivered() {
        let jobs = JobRunner::new();
        let handle = jobs.spawn("boom", async {
            Err::<(), _>(AppError::Validation("bad".into()))
        });
        assert!(matches!(handle.wait().await, Err(AppError::Validation(_))));
    }
}

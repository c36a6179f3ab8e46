//! Work that runs after a resolution has been committed and must not hold it
//! up: tournament callbacks and appeal explanations.

use std::{future::Future, sync::Arc};

use tokio::{
    sync::{Mutex, broadcast},
    task::JoinSet,
};
use tracing::warn;

/// A background task that returned an error or panicked.
#[derive(Clone, Debug)]
pub struct TaskFailure {
    pub task: &'static str,
    pub debate_id: String,
    pub error: String,
}

#[derive(Clone)]
pub struct Background {
    tasks: Arc<Mutex<JoinSet<()>>>,
    failures: broadcast::Sender<TaskFailure>,
}

impl Default for Background {
    fn default() -> Self {
        Self::new()
    }
}

impl Background {
    pub fn new() -> Self {
        let (failures, _) = broadcast::channel(256);
        Self {
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            failures,
        }
    }

    /// Failures of tasks spawned after this call.
    pub fn failures(&self) -> broadcast::Receiver<TaskFailure> {
        self.failures.subscribe()
    }

    /// Runs `fut` in the background. Errors are logged and published on the
    /// failure channel; the caller never sees them.
    pub async fn spawn<F, E>(&self, task: &'static str, debate_id: &str, fut: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let failures = self.failures.clone();
        let debate_id = debate_id.to_string();

        let mut tasks = self.tasks.lock().await;
        // reap anything that has already finished
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            if let Err(e) = fut.await {
                warn!(
                    task,
                    debate_id = %debate_id,
                    error = %e,
                    "background task failed"
                );
                let _ = failures.send(TaskFailure {
                    task,
                    debate_id,
                    error: e.to_string(),
                });
            }
        });
    }

    /// Waits for every task spawned so far to finish.
    pub async fn settle(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "background task panicked");
                let _ = self.failures.send(TaskFailure {
                    task: "unknown",
                    debate_id: String::new(),
                    error: e.to_string(),
                });
            }
        }
    }
}

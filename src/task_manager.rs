//! Lifecycle of the background workers.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawns named workers under one cancellation tree and joins them on
/// shutdown.
///
/// A failing worker is logged and left stopped; it never takes the others
/// down. Only [`TaskManager::shutdown_all`] cancels workers.
pub struct TaskManager {
    tasks: Vec<TaskInfo>,
    global_token: CancellationToken,
}

struct TaskInfo {
    name: String,
    handle: JoinHandle<Result<()>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns a worker that receives a child of the global token.
    pub fn spawn_task<F, Fut>(&mut self, name: impl Into<String>, task_fn: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let token = self.global_token.child_token();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let outcome = task_fn(token).await;
            match &outcome {
                Ok(()) => info!("Task '{task_name}' finished"),
                Err(e) => error!("Task '{task_name}' failed: {e:#}"),
            }
            outcome
        });

        info!("Task '{name}' spawned");
        self.tasks.push(TaskInfo { name, handle });
    }

    /// Token cancelled when the manager shuts down.
    pub fn token(&self) -> CancellationToken {
        self.global_token.clone()
    }

    /// Cancels every worker and waits for each to wind down.
    ///
    /// Returns the first failure, after every task has been joined.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());
        self.global_token.cancel();

        let mut first_error = None;
        for TaskInfo { name, handle } in self.tasks.drain(..) {
            let failure = match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(e))) => Some(e.context(format!("task '{name}' failed"))),
                Ok(Err(e)) => Some(anyhow::anyhow!("task '{name}' panicked: {e}")),
                Err(_) => Some(anyhow::anyhow!("task '{name}' did not stop in time")),
            };
            if let Some(e) = failure {
                warn!("{e:#}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.handle.is_finished()).count()
    }

    /// Names of spawned workers in spawn order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Builds a component that needs async initialisation.
///
/// # Example
///
/// ```no_run
/// use medimated::providers::traits::AsyncProvider;
///
/// struct Greeting;
///
/// #[async_trait::async_trait]
/// impl AsyncProvider<String> for Greeting {
///     async fn provide(&self) -> anyhow::Result<String> {
///         Ok("MediMate System".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// A long-running service started through the [`TaskManager`].
///
/// Services start in descending priority. A critical service that fails to
/// start aborts startup; any other is skipped with a warning.
///
/// # Example
///
/// ```no_run
/// use medimated::providers::traits::ServiceProvider;
/// use medimated::task_manager::TaskManager;
/// use anyhow::Result;
///
/// struct Heartbeat;
///
/// #[async_trait::async_trait]
/// impl ServiceProvider for Heartbeat {
///     async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
///         task_manager.spawn_task(self.name(), |token| async move {
///             token.cancelled().await;
///             Ok(())
///         });
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str { "Heartbeat" }
/// }
/// ```
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Spawns the service's workers.
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    fn name(&self) -> &'static str;

    /// Higher numbers start first.
    fn priority(&self) -> i32 {
        0
    }

    fn is_critical(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    struct CountingProvider {
        calls: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl AsyncProvider<usize> for CountingProvider {
        async fn provide(&self) -> Result<usize> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            Ok(*calls)
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl AsyncProvider<String> for FailingProvider {
        async fn provide(&self) -> Result<String> {
            Err(anyhow!("database unreachable"))
        }
    }

    struct RecordingService {
        name: &'static str,
        priority: i32,
        fail: bool,
    }

    #[async_trait]
    impl ServiceProvider for RecordingService {
        async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
            if self.fail {
                anyhow::bail!("{} cannot start", self.name);
            }
            task_manager.spawn_task(self.name, |token| async move {
                token.cancelled().await;
                Ok(())
            });
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    #[tokio::test]
    async fn provider_is_called_each_time() {
        let provider = CountingProvider {
            calls: Arc::new(Mutex::new(0)),
        };

        assert_eq!(provider.provide().await.unwrap(), 1);
        assert_eq!(provider.provide().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let err = FailingProvider.provide().await.unwrap_err();
        assert_eq!(err.to_string(), "database unreachable");
    }

    #[tokio::test]
    async fn services_spawn_into_the_task_manager() {
        let mut tm = TaskManager::new();
        let mut services: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(RecordingService {
                name: "low",
                priority: 1,
                fail: false,
            }),
            Box::new(RecordingService {
                name: "high",
                priority: 9,
                fail: false,
            }),
            Box::new(RecordingService {
                name: "broken",
                priority: 5,
                fail: true,
            }),
        ];
        services.sort_by_key(|s| std::cmp::Reverse(s.priority()));

        let mut failures = Vec::new();
        for service in &services {
            if let Err(e) = service.start(&mut tm).await {
                failures.push(e.to_string());
            }
        }

        assert_eq!(tm.task_names(), vec!["high", "low"]);
        assert_eq!(failures, vec!["broken cannot start".to_string()]);
        assert!(!services[0].is_critical());
        tm.shutdown_all().await.unwrap();
    }
}

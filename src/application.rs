//! Application entry point and builder pattern implementation.

use std::sync::Arc;

use crate::{
    config::ConfigManager,
    coordinator::{StopReason, SystemCoordinator},
    hardware::HardwareSet,
    providers::AppStateProvider,
    remote::RemoteStore,
};
use anyhow::{Result, anyhow};
use log::error;

/// Main application structure that orchestrates all daemon components.
///
/// Manages the complete lifecycle from initialization to shutdown,
/// coordinating all services through the SystemCoordinator.
///
/// # Example
///
/// ```no_run
/// use medimated::application::Application;
/// use medimated::config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = config::ConfigManager::load(None).await?;
/// let mut app = Application::builder()
///     .with_config_manager(config_manager)
///     .build()
///     .await?;
///
/// app.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    pub coordinator: SystemCoordinator,
    state_provider: Option<AppStateProvider>,
}

impl Application {
    /// Creates a new ApplicationBuilder for constructing Application instances.
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Runs the complete daemon lifecycle: initialize, start services, run
    /// the main loop, and shut down. Shutdown runs on failure too.
    pub async fn run(&mut self) -> Result<()> {
        let outcome = self.start_and_wait().await;

        let reason = match &outcome {
            Ok(reason) => reason.clone(),
            Err(e) => {
                error!("Daemon failed: {e:#}");
                StopReason::from_error(e)
            }
        };
        self.coordinator.shutdown(&reason).await;

        outcome.map(|_| ())
    }

    async fn start_and_wait(&mut self) -> Result<StopReason> {
        let provider = self
            .state_provider
            .take()
            .ok_or_else(|| anyhow!("Application has already been run"))?;

        self.coordinator.initialize(provider).await?;
        self.coordinator.start_all_services().await?;
        self.coordinator.run_main_loop().await
    }
}

/// Builder pattern for creating Application instances.
///
/// Provides a fluent interface for configuring the application before startup.
#[derive(Default)]
pub struct ApplicationBuilder {
    config_manager: Option<ConfigManager>,
    remote: Option<Arc<dyn RemoteStore>>,
    hardware: Option<HardwareSet>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration manager for the application.
    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    /// Uses `remote` instead of the configured database.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Uses already opened hardware instead of the configured backend.
    pub fn with_hardware(mut self, hardware: HardwareSet) -> Self {
        self.hardware = Some(hardware);
        self
    }

    /// Builds the Application instance with the provided configuration.
    pub async fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow!("Configuration manager is required"))?;

        let mut provider = AppStateProvider::new(config_manager);
        if let Some(remote) = self.remote {
            provider = provider.with_remote(remote);
        }
        if let Some(hardware) = self.hardware {
            provider = provider.with_hardware(hardware);
        }

        Ok(Application {
            coordinator: SystemCoordinator::new(),
            state_provider: Some(provider),
        })
    }
}

//! Application state provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::{
    app_context::AppState, config::ConfigManager, hardware::HardwareSet,
    providers::traits::AsyncProvider, remote::RemoteStore,
};

/// Builds the shared [`AppState`].
///
/// By default hardware comes from the configured backend and the remote
/// store is the REST client; either can be replaced before startup.
pub struct AppStateProvider {
    config_manager: ConfigManager,
    remote: Option<Arc<dyn RemoteStore>>,
    hardware: Mutex<Option<HardwareSet>>,
}

impl AppStateProvider {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self {
            config_manager,
            remote: None,
            hardware: Mutex::new(None),
        }
    }

    /// Uses `remote` instead of the configured database client.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Uses already opened hardware. Consumed by the first `provide`.
    pub fn with_hardware(self, hardware: HardwareSet) -> Self {
        if let Ok(mut slot) = self.hardware.lock() {
            *slot = Some(hardware);
        }
        self
    }

    fn take_hardware(&self) -> Option<HardwareSet> {
        self.hardware.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl AsyncProvider<Arc<AppState>> for AppStateProvider {
    async fn provide(&self) -> Result<Arc<AppState>> {
        let state = match (self.remote.clone(), self.take_hardware()) {
            (None, None) => AppState::new(self.config_manager.clone())
                .await
                .context("Failed to open hardware or database client")?,
            (remote, hardware) => {
                let config = self.config_manager.clone_config().await;
                let remote = match remote {
                    Some(remote) => remote,
                    None => Arc::new(crate::remote::FirebaseClient::new(&config.remote)?),
                };
                let hardware = match hardware {
                    Some(hardware) => hardware,
                    None => tokio::task::spawn_blocking(move || HardwareSet::from_config(&config))
                        .await
                        .context("hardware setup panicked")??,
                };
                AppState::from_parts(self.config_manager.clone(), remote, hardware)
            }
        };
        Ok(Arc::new(state))
    }
}

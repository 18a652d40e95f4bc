//! Shared state handed to every service.

use std::sync::Arc;

use futures::future::join_all;
use log::warn;
use tokio::sync::Mutex;

use crate::{
    config::{Config, ConfigManager},
    display::{DisplayHandle, DisplayService},
    hardware::{Actuator, ButtonLine, HardwareSet},
    indicators::IndicatorPanel,
    remote::{FirebaseClient, RemoteStore},
    slots::{DispenseSignal, DoorStates},
};

/// Runtime state shared by the reconcilers, the override controller and the
/// status display.
pub struct AppState {
    pub config_manager: Arc<ConfigManager>,
    pub remote: Arc<dyn RemoteStore>,
    pub actuators: Vec<Arc<dyn Actuator>>,
    pub indicators: Arc<IndicatorPanel>,
    pub close_all: Arc<dyn ButtonLine>,
    pub open_all: Arc<dyn ButtonLine>,
    pub door_states: Arc<DoorStates>,
    pub dispense: Arc<DispenseSignal>,
    pub display: DisplayHandle,
    display_service: Mutex<Option<DisplayService>>,
}

impl AppState {
    /// Opens the configured hardware and database client.
    ///
    /// Must run inside a Tokio runtime: the display task is spawned here.
    pub async fn new(config_manager: ConfigManager) -> anyhow::Result<Self> {
        let config = config_manager.clone_config().await;
        let hardware = open_hardware(&config).await?;
        let remote = FirebaseClient::new(&config.remote)?;

        Ok(Self::from_parts(config_manager, Arc::new(remote), hardware))
    }

    /// Assembles state from already opened parts.
    pub fn from_parts(
        config_manager: ConfigManager,
        remote: Arc<dyn RemoteStore>,
        hardware: HardwareSet,
    ) -> Self {
        let HardwareSet {
            actuators,
            indicators,
            close_all,
            open_all,
            display,
        } = hardware;

        let display_service = DisplayService::spawn(display);

        Self {
            config_manager: Arc::new(config_manager),
            remote,
            actuators,
            indicators: Arc::new(IndicatorPanel::new(indicators)),
            close_all,
            open_all,
            door_states: Arc::new(DoorStates::new()),
            dispense: Arc::new(DispenseSignal::new()),
            display: display_service.handle(),
            display_service: Mutex::new(Some(display_service)),
        }
    }

    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config_manager.get().await
    }

    /// Stops driving every actuator, logging individual failures.
    pub async fn release_actuators(&self) {
        let results = join_all(self.actuators.iter().map(|a| a.release())).await;
        for (actuator, result) in self.actuators.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to release servo {}: {e}", actuator.label());
            }
        }
    }

    /// Clears the screen and stops the display task. Later calls are no-ops.
    pub async fn close_display(&self) {
        if let Some(service) = self.display_service.lock().await.take() {
            service.shutdown().await;
        }
    }
}

/// Sysfs lines are opened off the async workers; exporting them sleeps.
async fn open_hardware(config: &Config) -> anyhow::Result<HardwareSet> {
    let config = config.clone();
    let hardware = tokio::task::spawn_blocking(move || HardwareSet::from_config(&config))
        .await
        .map_err(|e| anyhow::anyhow!("hardware setup panicked: {e}"))??;
    Ok(hardware)
}

//! Startup, supervision and shutdown of the dispenser services.

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result, bail};
use log::{error, info, warn};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::broadcast::{self, error::RecvError},
    time::sleep,
};

use crate::{
    app_context::AppState,
    config::Config,
    error::DispenserError,
    event::{Event, EventBus},
    providers::{
        AppStateProvider, AsyncProvider, ManualOverrideServiceProvider, ServiceProvider,
        StateReconcilerServiceProvider, StatusDisplayServiceProvider,
    },
    slots::Roster,
    task_manager::TaskManager,
};

/// Why the daemon is stopping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT.
    Interrupted,
    /// SIGTERM.
    Terminated,
    /// A `SystemShutdown` event.
    Requested,
    /// Startup or supervision failed; carries a short message.
    Failed(String),
}

impl StopReason {
    /// Short text for the display from an error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let message = match err.root_cause().downcast_ref::<DispenserError>() {
            Some(e) => e.display_text(),
            None => err.root_cause().to_string(),
        };
        Self::Failed(message)
    }
}

/// Owns the services for the lifetime of the daemon.
///
/// Startup runs strictly in order: display, safe actuator position,
/// actuator self-test, medication roster, services. Shutdown stops the
/// services before touching the hardware they drive.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    event_rx: broadcast::Receiver<Event>,
    shared_state: Option<Arc<AppState>>,
    roster: Option<Arc<Roster>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        let event_bus = EventBus::new();
        let event_rx = event_bus.subscribe();

        Self {
            task_manager: TaskManager::new(),
            event_bus,
            event_rx,
            shared_state: None,
            roster: None,
            service_providers: Vec::new(),
        }
    }

    /// Opens the hardware, runs the startup sequence and registers services.
    pub async fn initialize(&mut self, provider: AppStateProvider) -> Result<()> {
        info!("Initializing MediMate system...");

        let state = provider
            .provide()
            .await
            .context("Failed to initialize application state")?;
        self.shared_state = Some(state.clone());

        state.display.show("MediMate System", "Initializing...").await;
        let config = state.config().await.clone();

        park_actuators(&state, &config).await;
        run_self_test(&state, &config).await;

        let roster = Arc::new(load_roster(&state, &config).await?);
        self.roster = Some(roster.clone());

        self.register_service_providers(state, roster);
        info!("Initialization completed");
        Ok(())
    }

    fn register_service_providers(&mut self, state: Arc<AppState>, roster: Arc<Roster>) {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(StateReconcilerServiceProvider::new(
                state.clone(),
                roster.clone(),
                self.event_bus.clone(),
            )),
            Box::new(ManualOverrideServiceProvider::new(
                state.clone(),
                roster.clone(),
                self.event_bus.clone(),
            )),
            Box::new(StatusDisplayServiceProvider::new(state, roster)),
        ];

        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        self.service_providers = providers;
        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
    }

    /// Starts services in priority order and announces readiness.
    pub async fn start_all_services(&mut self) -> Result<()> {
        for provider in &self.service_providers {
            match provider.start(&mut self.task_manager).await {
                Ok(()) => info!(
                    "Service '{}' started (priority: {}, critical: {})",
                    provider.name(),
                    provider.priority(),
                    provider.is_critical()
                ),
                Err(e) if provider.is_critical() => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => warn!(
                    "Non-critical service '{}' failed to start: {e}",
                    provider.name()
                ),
            }
        }

        if let Some(state) = &self.shared_state {
            state.display.show("System Ready", "Monitoring...").await;
        }
        info!("System fully initialized and ready");
        Ok(())
    }

    /// Waits for SIGINT, SIGTERM or a `SystemShutdown` event.
    pub async fn run_main_loop(&mut self) -> Result<StopReason> {
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        info!("Starting main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl+C")?;
                    info!("Received Ctrl+C, stopping");
                    return Ok(StopReason::Interrupted);
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, stopping");
                    return Ok(StopReason::Terminated);
                }
                event = self.event_rx.recv() => {
                    if let Some(reason) = handle_event(event)? {
                        return Ok(reason);
                    }
                }
            }
        }
    }

    /// Stops every worker, parks the hardware and says goodbye.
    pub async fn shutdown(&mut self, reason: &StopReason) {
        info!("Shutting down: {reason:?}");

        if let Err(e) = self.task_manager.shutdown_all().await {
            error!("Error during task shutdown: {e:#}");
        }

        let Some(state) = &self.shared_state else {
            info!("Shutdown complete");
            return;
        };

        match reason {
            StopReason::Failed(message) => state.display.show("System Error", message).await,
            _ => state.display.show("System Stopped", "By User").await,
        }

        state.release_actuators().await;
        state.indicators.all_off();

        let farewell = state.config().await.timing.farewell();
        state.display.show("System Off", "Goodbye!").await;
        state.display.flush().await;
        sleep(farewell).await;
        state.close_display().await;
        info!("Shutdown complete");
    }

    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn roster(&self) -> Option<&Arc<Roster>> {
        self.roster.as_ref()
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.task_manager.task_names()
    }
}

fn handle_event(event: Result<Event, RecvError>) -> Result<Option<StopReason>> {
    match event {
        Ok(Event::SystemShutdown) => {
            info!("Processing SystemShutdown event");
            return Ok(Some(StopReason::Requested));
        }
        Ok(Event::DoorChanged { medication, state }) => {
            info!("Door of {medication} is now {state}");
        }
        Ok(Event::Dispensed(medication)) => info!("Dispensed {medication}"),
        Ok(Event::OverrideApplied { action, affected }) => {
            info!("Override {action} applied to {affected} doors");
        }
        Err(RecvError::Lagged(n)) => warn!("Event bus lagged by {n} messages"),
        Err(RecvError::Closed) => bail!("Event bus channel closed unexpectedly"),
    }
    Ok(None)
}

/// Drives every actuator to the closed angle, then drops the drive signal.
async fn park_actuators(state: &AppState, config: &Config) {
    for actuator in &state.actuators {
        if let Err(e) = actuator.move_to(config.servo.close_angle).await {
            warn!("Failed to park servo {}: {e}", actuator.label());
        }
    }
    state.release_actuators().await;
}

/// Sweeps each actuator closed, open, then releases it.
async fn run_self_test(state: &AppState, config: &Config) {
    let pause = config.timing.self_test_pause();
    state.display.show("Testing Servos", "Please wait...").await;

    for actuator in &state.actuators {
        info!("Testing servo {}", actuator.label());
        state.display.show("Testing Servo", actuator.label()).await;

        let sweep = async {
            actuator.move_to(config.servo.close_angle).await?;
            sleep(pause).await;
            actuator.move_to(config.servo.open_angle).await?;
            sleep(pause).await;
            actuator.release().await
        };
        if let Err(e) = sweep.await {
            warn!("Servo {} failed its self-test: {e}", actuator.label());
            state.display.show_error(&e).await;
        }
    }
}

/// Fetches medication names and times and binds them to actuators.
async fn load_roster(state: &AppState, config: &Config) -> Result<Roster> {
    state.display.show("Loading", "Medications...").await;

    let medications = state
        .remote
        .list_medications()
        .await
        .context("Failed to fetch medication list")?;
    info!("Medications loaded: {medications:?}");

    let mut times = HashMap::new();
    for name in &medications {
        let time = state.remote.fetch_scheduled_time(name).await;
        times.insert(name.clone(), time);
    }

    let dwell = config.timing.page_dwell();
    state
        .display
        .show("Medications:", format!("Found {}", medications.len()))
        .await;
    sleep(dwell).await;
    if medications.is_empty() {
        state.display.show("No medications", "found in DB").await;
        sleep(dwell).await;
    }

    let roster = Roster::bind(
        medications,
        times,
        &state.actuators,
        state.indicators.len(),
    );
    for name in roster.medications.iter().skip(roster.slots.len()) {
        warn!("No actuator left for {name}; it is displayed but not watched");
    }
    Ok(roster)
}

//! Close-all and open-all override buttons.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    error::DispenserError,
    event::{Event, EventBus, OverrideAction},
    hardware::{ButtonEdge, ButtonLine, Debouncer},
    providers::traits::ServiceProvider,
    remote::WriteOutcome,
    slots::{DoorState, MedicationSlot, Roster},
    task_manager::TaskManager,
};

/// Closes every slot recorded open. Returns how many were closed.
pub async fn close_all(state: &AppState, roster: &Roster, event_bus: &EventBus) -> usize {
    info!("Close-all pressed, closing every open door");
    state.display.show("CLOSING ALL", "Opened Doors").await;
    let close_angle = state.config().await.servo.close_angle;

    let open_doors = state.door_states.open_doors();
    let mut closed = 0;
    for slot in roster.slots.iter().filter(|s| open_doors.contains(&s.name)) {
        if let Err(e) = slot.actuator.move_to(close_angle).await {
            error!("Failed to close {}: {e}", slot.name);
            state.display.show_error(&e).await;
            continue;
        }

        match state.remote.set_door_state(&slot.name, false).await {
            Ok(WriteOutcome::Written) => {}
            Ok(WriteOutcome::SkippedMissing) => {
                warn!("Not writing closed state: {}", missing(slot));
            }
            Err(e) => error!("Error setting door state for {}: {e}", slot.name),
        }

        if let Err(e) = state.indicators.set(slot.indicator, false) {
            warn!("Indicator for {} not updated: {e}", slot.name);
        }
        state.door_states.set(&slot.name, DoorState::Closed);
        closed += 1;
        info!("Closed {}", slot.name);
    }

    state.display.show("CLOSED", format!("{closed} doors")).await;
    event_bus.notify(Event::OverrideApplied {
        action: OverrideAction::CloseAll,
        affected: closed,
    });
    closed
}

fn missing(slot: &MedicationSlot) -> DispenserError {
    DispenserError::MissingRecord {
        medication: slot.name.clone(),
    }
}

/// Opens every slot whose record still exists, marking each as dispensed.
/// Returns how many opened.
pub async fn open_all(state: &AppState, roster: &Roster, event_bus: &EventBus) -> usize {
    let (open_angle, step) = {
        let config = state.config().await;
        (config.servo.open_angle, config.timing.open_all_step())
    };
    info!("Open-all pressed, opening every door to {open_angle} degrees");
    state
        .display
        .show("OPENING ALL", format!("Doors to {open_angle}deg"))
        .await;

    let total = roster.slots.len();
    let mut opened = 0;
    for (i, slot) in roster.slots.iter().enumerate() {
        // The remote flag goes first: a reconciler poll in between would
        // otherwise see the old closed flag and shut the door again.
        match state.remote.set_door_state(&slot.name, true).await {
            Ok(WriteOutcome::Written) => {}
            Ok(WriteOutcome::SkippedMissing) => {
                warn!("Not opening: {}", missing(slot));
                continue;
            }
            Err(e) => error!("Error setting door state for {}: {e}", slot.name),
        }

        if let Err(e) = slot.actuator.move_to(open_angle).await {
            error!("Failed to open {}: {e}", slot.name);
            state.display.show_error(&e).await;
            continue;
        }
        state.door_states.set(&slot.name, DoorState::Open);

        if let Err(e) = state.indicators.set(slot.indicator, true) {
            warn!("Indicator for {} not updated: {e}", slot.name);
        }
        state.dispense.publish(slot.name.clone());
        event_bus.notify(Event::Dispensed(slot.name.clone()));

        state
            .display
            .show(format!("Opening {}/{total}", i + 1), &slot.name)
            .await;
        opened += 1;
        sleep(step).await;
    }

    state.display.show("ALL OPENED", format!("{opened} doors")).await;
    event_bus.notify(Event::OverrideApplied {
        action: OverrideAction::OpenAll,
        affected: opened,
    });
    opened
}

/// Feeds one button sample to its debouncer; read failures count as
/// released.
fn sample(name: &str, line: &dyn ButtonLine, debouncer: &mut Debouncer) -> Option<ButtonEdge> {
    match line.is_asserted() {
        Ok(asserted) => debouncer.update(asserted),
        Err(e) => {
            warn!("Failed to read {name} button: {e}");
            debouncer.update(false)
        }
    }
}

/// Polls both override buttons.
pub struct ManualOverrideServiceProvider {
    state: Arc<AppState>,
    roster: Arc<Roster>,
    event_bus: EventBus,
}

impl ManualOverrideServiceProvider {
    pub fn new(state: Arc<AppState>, roster: Arc<Roster>, event_bus: EventBus) -> Self {
        Self {
            state,
            roster,
            event_bus,
        }
    }
}

#[async_trait]
impl ServiceProvider for ManualOverrideServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let roster = self.roster.clone();
        let event_bus = self.event_bus.clone();

        task_manager.spawn_task(self.name(), |cancel_token| async move {
            run_button_loop(state, roster, event_bus, cancel_token).await
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ManualOverride"
    }

    fn priority(&self) -> i32 {
        5
    }
}

async fn run_button_loop(
    state: Arc<AppState>,
    roster: Arc<Roster>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut ticker = interval(state.config().await.timing.button_poll());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut close_button = Debouncer::new();
    let mut open_button = Debouncer::new();

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Button control cancelled");
                break;
            }
            _instant = ticker.tick() => {
                if sample("close-all", state.close_all.as_ref(), &mut close_button)
                    == Some(ButtonEdge::Pressed)
                {
                    close_all(&state, &roster, &event_bus).await;
                }
                if sample("open-all", state.open_all.as_ref(), &mut open_button)
                    == Some(ButtonEdge::Pressed)
                {
                    open_all(&state, &roster, &event_bus).await;
                }
            }
        }
    }
    Ok(())
}

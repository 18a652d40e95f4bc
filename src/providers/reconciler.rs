//! Per-slot door reconciliation.
//!
//! Each bound medication gets its own worker that polls the remote door
//! flag and, when it differs from the last recorded local state, drives the
//! actuator, the slot LED and the display to match.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    config::ServoCfg,
    error::DispenserError,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    slots::{DoorState, MedicationSlot, Roster},
    task_manager::TaskManager,
};

/// Result of one poll of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    Transitioned(DoorState),
}

/// Poll delay that doubles on each consecutive transport failure.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    pub fn delay(&self) -> Duration {
        self.current
    }

    /// Records a failure and returns the next delay.
    pub fn fail(&mut self) -> Duration {
        self.current = self.current.saturating_mul(2).min(self.max);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Polls the remote flag for `slot` once and applies any change.
///
/// A failed move leaves the recorded state alone, so the next poll retries
/// the transition.
pub async fn poll_slot(
    state: &AppState,
    slot: &MedicationSlot,
    servo: &ServoCfg,
    event_bus: &EventBus,
) -> crate::error::Result<PollOutcome> {
    let open = state.remote.get_door_state(&slot.name).await?;
    let target = DoorState::from_open(open);
    if state.door_states.get(&slot.name) == target {
        return Ok(PollOutcome::Unchanged);
    }

    let angle = if open {
        servo.open_angle
    } else {
        servo.close_angle
    };
    slot.actuator.move_to(angle).await?;
    state.door_states.set(&slot.name, target);
    info!("Set {} servo to {angle} degrees ({target})", slot.name);

    if let Err(e) = state.indicators.set(slot.indicator, open) {
        warn!("Indicator for {} not updated: {e}", slot.name);
    }

    if open {
        state.dispense.publish(slot.name.clone());
        state.display.show("DISPENSING:", &slot.name).await;
        event_bus.notify(Event::Dispensed(slot.name.clone()));
    } else {
        state.display.show("CLOSED:", &slot.name).await;
    }
    event_bus.notify(Event::DoorChanged {
        medication: slot.name.clone(),
        state: target,
    });

    Ok(PollOutcome::Transitioned(target))
}

/// Starts one reconciler worker per bound slot.
pub struct StateReconcilerServiceProvider {
    state: Arc<AppState>,
    roster: Arc<Roster>,
    event_bus: EventBus,
}

impl StateReconcilerServiceProvider {
    pub fn new(state: Arc<AppState>, roster: Arc<Roster>, event_bus: EventBus) -> Self {
        Self {
            state,
            roster,
            event_bus,
        }
    }
}

#[async_trait]
impl ServiceProvider for StateReconcilerServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        for slot in &self.roster.slots {
            let state = self.state.clone();
            let event_bus = self.event_bus.clone();
            let slot = slot.clone();

            self.state.display.show("Starting Monitor", &slot.name).await;
            task_manager.spawn_task(format!("reconciler:{}", slot.name), |cancel_token| {
                async move { run_reconciler(state, slot, event_bus, cancel_token).await }
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "StateReconciler"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_reconciler(
    state: Arc<AppState>,
    slot: MedicationSlot,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let (servo, mut backoff) = {
        let config = state.config().await;
        (
            config.servo.clone(),
            Backoff::new(config.timing.poll_interval(), config.timing.max_backoff()),
        )
    };
    info!("Started monitoring {}", slot.name);

    loop {
        let outcome = tokio::select! {
            () = cancel_token.cancelled() => break,
            outcome = poll_slot(&state, &slot, &servo, &event_bus) => outcome,
        };

        match outcome {
            Ok(_) => backoff.reset(),
            Err(e @ DispenserError::Transport { .. }) => {
                let delay = backoff.fail();
                error!(
                    "Error in watcher for {}: {e}; next poll in {delay:?}",
                    slot.name
                );
                state.display.show_error(&e).await;
            }
            Err(e) => {
                error!("Error in watcher for {}: {e}", slot.name);
                state.display.show_error(&e).await;
            }
        }

        tokio::select! {
            () = cancel_token.cancelled() => break,
            () = tokio::time::sleep(backoff.delay()) => {}
        }
    }

    info!("Watcher for {} stopped", slot.name);
    Ok(())
}

//! Idle medication summary and dispensing announcements.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    display::truncate,
    providers::traits::ServiceProvider,
    remote::{NO_TIME, TIME_ERROR},
    schedule::format_schedule_time,
    slots::Roster,
    task_manager::TaskManager,
};

pub const DISPENSED_BANNER: &str = "*** DISPENSED ***";

const NAME_WIDTH: usize = 10;
const TIME_WIDTH: usize = 8;

/// Time column for a stored value. Lookup placeholders are shown as is.
fn time_column(raw: &str) -> String {
    if raw == NO_TIME || raw == TIME_ERROR {
        raw.to_string()
    } else {
        format_schedule_time(raw)
    }
}

fn summary_line(roster: &Roster, name: &str) -> String {
    format!(
        "{} {}",
        truncate(name, NAME_WIDTH),
        truncate(&time_column(roster.time_of(name)), TIME_WIDTH)
    )
}

/// Screens for one pass over every medication, two per screen. An odd
/// last screen carries the total instead of a second medication.
pub fn summary_pages(roster: &Roster) -> Vec<(String, String)> {
    roster
        .medications
        .chunks(2)
        .map(|pair| {
            let line1 = summary_line(roster, &pair[0]);
            let line2 = match pair.get(1) {
                Some(name) => summary_line(roster, name),
                None => format!("Total: {} meds", roster.medications.len()),
            };
            (line1, line2)
        })
        .collect()
}

/// Banner announcing that `name` was dispensed.
pub fn dispensed_banner(roster: &Roster, name: &str) -> (String, String) {
    (
        DISPENSED_BANNER.to_string(),
        format!("{} {}", truncate(name, NAME_WIDTH), roster.time_of(name)),
    )
}

/// Sleeps for `duration`; false when cancelled first.
async fn dwell(cancel_token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = cancel_token.cancelled() => false,
        () = sleep(duration) => true,
    }
}

#[derive(Debug, Clone)]
struct Timing {
    tick: Duration,
    idle_ticks: u32,
    dispensed_dwell: Duration,
    page_dwell: Duration,
}

/// Cycles the medication summary while idle.
pub struct StatusDisplayServiceProvider {
    state: Arc<AppState>,
    roster: Arc<Roster>,
}

impl StatusDisplayServiceProvider {
    pub fn new(state: Arc<AppState>, roster: Arc<Roster>) -> Self {
        Self { state, roster }
    }
}

#[async_trait]
impl ServiceProvider for StatusDisplayServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let roster = self.roster.clone();

        task_manager.spawn_task(self.name(), |cancel_token| async move {
            run_status_display(state, roster, cancel_token).await
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "StatusDisplay"
    }

    fn priority(&self) -> i32 {
        3
    }
}

async fn run_status_display(
    state: Arc<AppState>,
    roster: Arc<Roster>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let timing = {
        let config = state.config().await;
        Timing {
            tick: config.timing.display_tick(),
            idle_ticks: config.timing.idle_ticks,
            dispensed_dwell: config.timing.dispensed_dwell(),
            page_dwell: config.timing.page_dwell(),
        }
    };
    let mut ticker = interval(timing.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut idle_counter: u32 = 0;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            _instant = ticker.tick() => {}
        }

        if let Some(name) = state.dispense.take() {
            info!("Announcing dispensed medication {name}");
            let (line1, line2) = dispensed_banner(&roster, &name);
            state.display.show(line1, line2).await;
            idle_counter = 0;
            if !dwell(&cancel_token, timing.dispensed_dwell).await {
                break;
            }
            continue;
        }

        idle_counter += 1;
        if idle_counter > timing.idle_ticks {
            idle_counter = 0;
            if !show_summary(&state, &roster, &timing, &cancel_token).await {
                break;
            }
        }
    }

    debug!("Status display stopped");
    Ok(())
}

/// One pass over the summary pages. Stops early when a dispense is pending;
/// returns false when cancelled.
async fn show_summary(
    state: &AppState,
    roster: &Roster,
    timing: &Timing,
    cancel_token: &CancellationToken,
) -> bool {
    if roster.is_empty() {
        state.display.show("No Medications", "Available").await;
        return true;
    }

    for (i, (line1, line2)) in summary_pages(roster).into_iter().enumerate() {
        if i > 0 && state.dispense.is_pending() {
            debug!("Summary interrupted by a dispense");
            break;
        }
        state.display.show(line1, line2).await;
        if !dwell(cancel_token, timing.page_dwell).await {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager},
        hardware::{HardwareSet, simulated::SimulatedProbes},
        remote::testing::MemoryStore,
    };
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, path::PathBuf};

    fn roster(entries: &[(&str, &str)]) -> Roster {
        Roster {
            medications: entries.iter().map(|(n, _)| n.to_string()).collect(),
            times: entries
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect::<HashMap<_, _>>(),
            slots: Vec::new(),
        }
    }

    fn setup(idle_ticks: u32) -> (Arc<AppState>, SimulatedProbes) {
        let mut config = Config::default();
        config.timing.display_tick_ms = 5;
        config.timing.idle_ticks = idle_ticks;
        config.timing.dispensed_dwell_ms = 30;
        config.timing.page_dwell_ms = 10;
        let (hardware, probes) = HardwareSet::simulated(&config);
        let state = AppState::from_parts(
            ConfigManager::new(config, PathBuf::from("t.yml")),
            Arc::new(MemoryStore::default()),
            hardware,
        );
        (Arc::new(state), probes)
    }

    #[test]
    fn odd_count_ends_with_total() {
        let r = roster(&[
            ("Aspirin", "09:30 AM"),
            ("Vitamin", "8:00 PM"),
            ("Ibuprofen", ""),
        ]);

        assert_eq!(
            summary_pages(&r),
            vec![
                ("Aspirin 09:30 AM".to_string(), "Vitamin 08:00 PM".to_string()),
                ("Ibuprofen N/A".to_string(), "Total: 3 meds".to_string()),
            ]
        );
    }

    #[test]
    fn names_and_times_are_cut_to_their_columns() {
        let r = roster(&[("Acetaminophen Extra", "not-a-time"), ("B", "No Time")]);

        assert_eq!(
            summary_pages(&r),
            vec![(
                "Acetaminop Invalid".to_string(),
                "B No Time".to_string()
            )]
        );
    }

    #[test]
    fn banner_uses_the_raw_time() {
        let r = roster(&[("Vitamin", "8:00 PM")]);

        assert_eq!(
            dispensed_banner(&r, "Vitamin"),
            ("*** DISPENSED ***".to_string(), "Vitamin 8:00 PM".to_string())
        );
    }

    #[tokio::test]
    async fn empty_roster_shows_no_medications() {
        let (state, probes) = setup(0);
        let timing = Timing {
            tick: Duration::from_millis(5),
            idle_ticks: 0,
            dispensed_dwell: Duration::ZERO,
            page_dwell: Duration::ZERO,
        };

        let finished =
            show_summary(&state, &Roster::default(), &timing, &CancellationToken::new()).await;
        state.display.flush().await;

        assert!(finished);
        assert_eq!(
            probes.display.frames(),
            vec![("No Medications".to_string(), "Available".to_string())]
        );
    }

    #[tokio::test]
    async fn pending_dispense_cuts_the_summary_short() {
        let (state, probes) = setup(0);
        let r = roster(&[("A", ""), ("B", ""), ("C", ""), ("D", "")]);
        let timing = Timing {
            tick: Duration::from_millis(5),
            idle_ticks: 0,
            dispensed_dwell: Duration::ZERO,
            page_dwell: Duration::ZERO,
        };
        state.dispense.publish("A");

        show_summary(&state, &r, &timing, &CancellationToken::new()).await;
        state.display.flush().await;

        assert_eq!(probes.display.frames().len(), 1);
        assert!(state.dispense.is_pending());
    }

    #[tokio::test]
    async fn dispense_is_announced_exactly_once() {
        let (state, probes) = setup(1);
        let r = Arc::new(roster(&[("Aspirin", "09:30 AM"), ("Vitamin", "8:00 PM")]));
        let mut tm = TaskManager::new();
        state.dispense.publish("Aspirin");

        StatusDisplayServiceProvider::new(state.clone(), r)
            .start(&mut tm)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        tm.shutdown_all().await.unwrap();
        state.display.flush().await;

        let frames = probes.display.frames();
        let banner = ("*** DISPENSED **".to_string(), "Aspirin 09:30 AM".to_string());
        let summary = ("Aspirin 09:30 AM".to_string(), "Vitamin 08:00 PM".to_string());
        assert_eq!(frames.iter().filter(|f| **f == banner).count(), 1);
        assert_eq!(frames.first(), Some(&banner));
        assert_eq!(frames.get(1), Some(&summary));
        assert!(frames.iter().filter(|f| **f == summary).count() >= 2);
    }

    #[tokio::test]
    async fn loop_announces_dispense_then_cycles_when_idle() {
        let (state, probes) = setup(2);
        let r = Arc::new(roster(&[("Aspirin", "09:30 AM"), ("Vitamin", "")]));
        let mut tm = TaskManager::new();
        state.dispense.publish("Vitamin");

        StatusDisplayServiceProvider::new(state.clone(), r)
            .start(&mut tm)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        tm.shutdown_all().await.unwrap();
        state.display.flush().await;

        let frames = probes.display.frames();
        assert_eq!(
            frames.first(),
            Some(&("*** DISPENSED **".to_string(), "Vitamin ".to_string()))
        );
        assert!(frames.contains(&(
            "Aspirin 09:30 AM".to_string(),
            "Vitamin N/A".to_string()
        )));
        assert!(!state.dispense.is_pending());
    }
}

//! Medication slots and the state shared between workers.

use std::{collections::HashMap, fmt, sync::Arc, sync::Mutex};

use dashmap::DashMap;

use crate::hardware::Actuator;

/// Local view of a door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoorState {
    /// Not observed since startup.
    #[default]
    Unknown,
    Closed,
    Open,
}

impl DoorState {
    pub fn from_open(open: bool) -> Self {
        if open { Self::Open } else { Self::Closed }
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Closed => "closed",
            Self::Open => "open",
        };
        f.write_str(s)
    }
}

/// A medication bound to a door actuator for the whole run.
#[derive(Debug, Clone)]
pub struct MedicationSlot {
    pub name: String,
    pub scheduled_time: Option<String>,
    pub actuator: Arc<dyn Actuator>,
    /// Absent when there are more slots than indicator LEDs.
    pub indicator: Option<usize>,
}

/// Startup snapshot of the medication list.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    /// Every medication in the database, in listing order.
    pub medications: Vec<String>,
    pub times: HashMap<String, String>,
    /// Medications that got an actuator; the rest are display-only.
    pub slots: Vec<MedicationSlot>,
}

impl Roster {
    /// Binds medications to actuators in order. Medications beyond the
    /// actuator count stay unbound, slots beyond `indicator_count` get no LED.
    pub fn bind(
        medications: Vec<String>,
        times: HashMap<String, String>,
        actuators: &[Arc<dyn Actuator>],
        indicator_count: usize,
    ) -> Self {
        let slots = medications
            .iter()
            .zip(actuators)
            .enumerate()
            .map(|(i, (name, actuator))| MedicationSlot {
                name: name.clone(),
                scheduled_time: times.get(name).cloned(),
                actuator: actuator.clone(),
                indicator: (i < indicator_count).then_some(i),
            })
            .collect();

        Self {
            medications,
            times,
            slots,
        }
    }

    /// Stored time for `name`, empty when unknown.
    pub fn time_of(&self, name: &str) -> &str {
        self.times.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.medications.is_empty()
    }
}

/// Last recorded door state per medication.
///
/// Single reads and writes are atomic; read-then-write sequences from the
/// reconciler and the override controller are not.
#[derive(Debug, Default)]
pub struct DoorStates {
    states: DashMap<String, DoorState>,
}

impl DoorStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> DoorState {
        self.states.get(name).map(|s| *s).unwrap_or_default()
    }

    pub fn set(&self, name: &str, state: DoorState) {
        self.states.insert(name.to_string(), state);
    }

    /// Names currently recorded as open.
    pub fn open_doors(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|entry| entry.value().is_open())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

/// The most recently dispensed medication, consumed once.
///
/// A newer value replaces an unconsumed one.
#[derive(Debug, Default)]
pub struct DispenseSignal {
    latest: Mutex<Option<String>>,
}

impl DispenseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, name: impl Into<String>) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(name.into());
        }
    }

    /// Takes the pending value, leaving nothing behind.
    pub fn take(&self) -> Option<String> {
        self.latest.lock().ok().and_then(|mut latest| latest.take())
    }

    pub fn is_pending(&self) -> bool {
        self.latest.lock().map(|l| l.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, hardware::HardwareSet};
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bind_is_bounded_by_actuators() {
        let (hw, _probes) = HardwareSet::simulated(&Config::default());
        let times = HashMap::from([("A".to_string(), "08:00 AM".to_string())]);

        let roster = Roster::bind(names(&["A", "B", "C"]), times, &hw.actuators, 1);

        assert_eq!(roster.medications.len(), 3);
        assert_eq!(roster.slots.len(), 2);
        assert_eq!(roster.slots[0].name, "A");
        assert_eq!(roster.slots[0].indicator, Some(0));
        assert_eq!(roster.slots[0].scheduled_time.as_deref(), Some("08:00 AM"));
        assert_eq!(roster.slots[1].indicator, None);
        assert_eq!(roster.slots[1].scheduled_time, None);
        assert_eq!(roster.time_of("C"), "");
    }

    #[test]
    fn bind_with_no_medications_is_empty() {
        let (hw, _probes) = HardwareSet::simulated(&Config::default());
        let roster = Roster::bind(Vec::new(), HashMap::new(), &hw.actuators, 2);

        assert!(roster.is_empty());
        assert!(roster.slots.is_empty());
    }

    #[test]
    fn door_states_default_to_unknown() {
        let states = DoorStates::new();
        assert_eq!(states.get("Aspirin"), DoorState::Unknown);

        states.set("Aspirin", DoorState::Open);
        states.set("Vitamin", DoorState::Closed);

        assert_eq!(states.get("Aspirin"), DoorState::Open);
        assert_eq!(states.open_doors(), vec!["Aspirin".to_string()]);
    }

    #[test]
    fn dispense_signal_is_last_write_wins_and_read_once() {
        let signal = DispenseSignal::new();
        signal.publish("Aspirin");
        signal.publish("Vitamin");

        assert!(signal.is_pending());
        assert_eq!(signal.take().as_deref(), Some("Vitamin"));
        assert_eq!(signal.take(), None);
        assert!(!signal.is_pending());
    }
}

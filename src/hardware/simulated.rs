//! In-memory hardware backend.
//!
//! Lines only log what they would do; cloned handles share state, so tests
//! and the simulated daemon can watch servo pulses, LED levels and display
//! frames, and press buttons.

use std::{
    convert::Infallible,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use embedded_hal::{digital, pwm};
use log::debug;

use super::CharacterDisplay;
use crate::error::Result;

/// Full-scale duty of a simulated PWM channel.
const SIM_MAX_DUTY: u16 = 10_000;

/// PWM channel that records every duty value written to it.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPwm {
    history: Arc<Mutex<Vec<u16>>>,
}

impl SimulatedPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duty value written so far, oldest first.
    pub fn history(&self) -> Vec<u16> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Number of non-zero pulses, i.e. completed moves.
    pub fn pulse_count(&self) -> usize {
        self.history().iter().filter(|d| **d != 0).count()
    }
}

impl pwm::ErrorType for SimulatedPwm {
    type Error = Infallible;
}

impl pwm::SetDutyCycle for SimulatedPwm {
    fn max_duty_cycle(&self) -> u16 {
        SIM_MAX_DUTY
    }

    fn set_duty_cycle(&mut self, duty: u16) -> std::result::Result<(), Self::Error> {
        if let Ok(mut history) = self.history.lock() {
            history.push(duty);
        }
        Ok(())
    }
}

/// Digital line usable as input or output.
#[derive(Debug, Clone)]
pub struct SimulatedPin {
    name: String,
    level: Arc<AtomicBool>,
}

impl SimulatedPin {
    pub fn new(name: impl Into<String>, high: bool) -> Self {
        Self {
            name: name.into(),
            level: Arc::new(AtomicBool::new(high)),
        }
    }

    pub fn is_set_high(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    pub fn drive(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }
}

impl digital::ErrorType for SimulatedPin {
    type Error = Infallible;
}

impl digital::OutputPin for SimulatedPin {
    fn set_low(&mut self) -> std::result::Result<(), Self::Error> {
        debug!("{} low", self.name);
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> std::result::Result<(), Self::Error> {
        debug!("{} high", self.name);
        self.drive(true);
        Ok(())
    }
}

impl digital::InputPin for SimulatedPin {
    fn is_high(&mut self) -> std::result::Result<bool, Self::Error> {
        Ok(self.is_set_high())
    }

    fn is_low(&mut self) -> std::result::Result<bool, Self::Error> {
        Ok(!self.is_set_high())
    }
}

/// Test-side view of a simulated button, aware of its active level.
#[derive(Debug, Clone)]
pub struct SimulatedButton {
    pin: SimulatedPin,
    active_low: bool,
}

impl SimulatedButton {
    pub fn new(pin: SimulatedPin, active_low: bool) -> Self {
        Self { pin, active_low }
    }

    pub fn press(&self) {
        self.pin.drive(!self.active_low);
    }

    pub fn release(&self) {
        self.pin.drive(self.active_low);
    }
}

/// One rendered screen.
pub type Frame = (String, String);

/// Display that keeps every frame it was asked to show.
#[derive(Debug, Clone)]
pub struct SimulatedDisplay {
    columns: usize,
    frames: Arc<Mutex<Vec<Frame>>>,
    cleared: Arc<AtomicBool>,
}

impl SimulatedDisplay {
    pub fn new(columns: usize) -> Self {
        Self {
            columns,
            frames: Arc::new(Mutex::new(Vec::new())),
            cleared: Arc::new(AtomicBool::new(false)),
        }
    }

    /// All frames shown so far, oldest first.
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Whether the latest operation blanked the screen.
    pub fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }

    /// Whether any frame's first line equals `line1`.
    pub fn has_shown(&self, line1: &str) -> bool {
        self.frames().iter().any(|(l1, _)| l1 == line1)
    }
}

impl CharacterDisplay for SimulatedDisplay {
    fn columns(&self) -> usize {
        self.columns
    }

    fn clear(&mut self) -> Result<()> {
        self.cleared.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn show(&mut self, line1: &str, line2: &str) -> Result<()> {
        debug!("LCD [{line1}] [{line2}]");
        self.cleared.store(false, Ordering::SeqCst);
        if let Ok(mut frames) = self.frames.lock() {
            frames.push((line1.to_string(), line2.to_string()));
        }
        Ok(())
    }
}

/// Handles onto every simulated line of a `HardwareSet`.
#[derive(Debug, Clone)]
pub struct SimulatedProbes {
    pub pwms: Vec<SimulatedPwm>,
    pub leds: Vec<SimulatedPin>,
    pub close_all: SimulatedButton,
    pub open_all: SimulatedButton,
    pub display: SimulatedDisplay,
}

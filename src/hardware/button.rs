//! Override buttons and their debounce state machine.
//!
//! The override loop samples each button once per tick and feeds the level
//! to a [`Debouncer`]. An action fires on the press edge only; the button
//! must be seen released before it can fire again, so holding it down never
//! repeats the action and never blocks the loop.

use std::sync::Mutex;

use embedded_hal::digital::InputPin;

use super::{ButtonLine, hw_err};
use crate::error::{DispenserError, Result};

/// Momentary switch on an input line.
#[derive(Debug)]
pub struct Button<P> {
    pin: Mutex<P>,
    active_low: bool,
}

impl<P: InputPin> Button<P> {
    pub fn new(pin: P, active_low: bool) -> Self {
        Self {
            pin: Mutex::new(pin),
            active_low,
        }
    }
}

impl<P> ButtonLine for Button<P>
where
    P: InputPin + Send + std::fmt::Debug,
{
    fn is_asserted(&self) -> Result<bool> {
        let mut pin = self
            .pin
            .lock()
            .map_err(|_| DispenserError::hardware("button lock poisoned"))?;
        if self.active_low {
            pin.is_low().map_err(|e| hw_err("button read", e))
        } else {
            pin.is_high().map_err(|e| hw_err("button read", e))
        }
    }
}

/// Transition reported by [`Debouncer::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DebounceState {
    #[default]
    Released,
    Pressed,
    Held,
}

#[derive(Debug, Default)]
pub struct Debouncer {
    state: DebounceState,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample; returns the edge it completes, if any.
    pub fn update(&mut self, asserted: bool) -> Option<ButtonEdge> {
        match (self.state, asserted) {
            (DebounceState::Released, true) => {
                self.state = DebounceState::Pressed;
                Some(ButtonEdge::Pressed)
            }
            (DebounceState::Pressed, true) => {
                self.state = DebounceState::Held;
                None
            }
            (DebounceState::Pressed | DebounceState::Held, false) => {
                self.state = DebounceState::Released;
                Some(ButtonEdge::Released)
            }
            (DebounceState::Held, true) | (DebounceState::Released, false) => None,
        }
    }

    /// Whether the button is between its press and release edges.
    pub fn is_down(&self) -> bool {
        self.state != DebounceState::Released
    }
}

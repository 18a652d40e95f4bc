use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use embedded_hal::digital::OutputPin;

use super::{IndicatorLine, hw_err};
use crate::error::{DispenserError, Result};

/// Status LED on an active-high output line.
#[derive(Debug)]
pub struct Led<P> {
    pin: Mutex<P>,
    on: AtomicBool,
}

impl<P: OutputPin> Led<P> {
    /// Wraps `pin`; the LED starts switched off.
    pub fn new(mut pin: P) -> Self {
        let _ = pin.set_low();
        Self {
            pin: Mutex::new(pin),
            on: AtomicBool::new(false),
        }
    }
}

impl<P> IndicatorLine for Led<P>
where
    P: OutputPin + Send + std::fmt::Debug,
{
    fn set(&self, on: bool) -> Result<()> {
        let mut pin = self
            .pin
            .lock()
            .map_err(|_| DispenserError::hardware("led lock poisoned"))?;
        if on {
            pin.set_high().map_err(|e| hw_err("led on", e))?;
        } else {
            pin.set_low().map_err(|e| hw_err("led off", e))?;
        }
        self.on.store(on, Ordering::SeqCst);
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

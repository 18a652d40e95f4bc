//! Hardware seams for servos, indicator LEDs, override buttons and the
//! character display.
//!
//! Every physical line sits behind an `embedded-hal` trait so the same
//! drivers run on Linux sysfs/i2c-dev lines or on the simulated backend.

pub mod button;
pub mod i2c;
pub mod lcd;
pub mod led;
pub mod servo;
pub mod simulated;
pub mod sysfs;

use std::{fmt::Debug, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::info;

use crate::{
    config::{Backend, Config},
    error::{DispenserError, Result},
};

pub use button::{Button, ButtonEdge, Debouncer};
pub use lcd::Hd44780;
pub use led::Led;
pub use servo::Servo;

/// A door actuator that can be driven to an angle.
#[async_trait]
pub trait Actuator: Send + Sync + Debug {
    /// Name used in logs and the self-test screen.
    fn label(&self) -> &str;

    /// Drives the actuator to `angle` degrees and waits for it to settle.
    async fn move_to(&self, angle: u16) -> Result<()>;

    /// Stops driving the actuator.
    async fn release(&self) -> Result<()>;

    /// Last angle the actuator was driven to.
    fn position(&self) -> Option<u16>;
}

/// A binary on/off indicator line.
pub trait IndicatorLine: Send + Sync + Debug {
    fn set(&self, on: bool) -> Result<()>;

    fn is_on(&self) -> bool;
}

/// A momentary input line.
pub trait ButtonLine: Send + Sync + Debug {
    /// Whether the button is currently held down.
    fn is_asserted(&self) -> Result<bool>;
}

/// A two-line character display.
pub trait CharacterDisplay: Send + Debug {
    /// Characters per line.
    fn columns(&self) -> usize;

    /// Blanks the display.
    fn clear(&mut self) -> Result<()>;

    /// Replaces the content with two lines that already fit the width.
    fn show(&mut self, line1: &str, line2: &str) -> Result<()>;
}

/// Everything the daemon drives, built once at startup.
pub struct HardwareSet {
    pub actuators: Vec<Arc<dyn Actuator>>,
    pub indicators: Vec<Box<dyn IndicatorLine>>,
    pub close_all: Arc<dyn ButtonLine>,
    pub open_all: Arc<dyn ButtonLine>,
    pub display: Box<dyn CharacterDisplay>,
}

impl Debug for HardwareSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareSet")
            .field("actuators", &self.actuators.len())
            .field("indicators", &self.indicators.len())
            .finish_non_exhaustive()
    }
}

impl HardwareSet {
    /// Opens the backend selected in the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.hardware.backend {
            Backend::Sysfs => Self::sysfs(config),
            Backend::Simulated => Ok(Self::simulated(config).0),
        }
    }

    /// Opens sysfs PWM/GPIO lines and the I2C display.
    pub fn sysfs(config: &Config) -> Result<Self> {
        let hw = &config.hardware;
        let settle = Duration::from_millis(config.servo.settle_ms);

        let actuators = hw
            .actuators
            .iter()
            .map(|a| {
                info!(
                    "Opening servo '{}' on pwmchip{}/pwm{}",
                    a.label, a.pwm_chip, a.channel
                );
                sysfs::SysfsPwm::open(a.pwm_chip, a.channel, servo::PERIOD_NS)
                    .map(|pwm| Arc::new(Servo::new(&a.label, pwm, settle)) as Arc<dyn Actuator>)
            })
            .collect::<Result<Vec<_>>>()?;

        let indicators = hw
            .indicators
            .iter()
            .map(|gpio| {
                sysfs::SysfsGpio::output(hw.gpio_base + gpio)
                    .map(|pin| Box::new(Led::new(pin)) as Box<dyn IndicatorLine>)
            })
            .collect::<Result<Vec<_>>>()?;

        let button = |cfg: &crate::config::ButtonCfg| -> Result<Arc<dyn ButtonLine>> {
            let pin = sysfs::SysfsGpio::input(hw.gpio_base + cfg.gpio)?;
            Ok(Arc::new(Button::new(pin, cfg.active_low)))
        };
        let close_all = button(&hw.buttons.close_all)?;
        let open_all = button(&hw.buttons.open_all)?;

        let bus_path = PathBuf::from(format!("/dev/i2c-{}", hw.display.i2c_bus));
        let bus = i2c::LinuxI2c::open(&bus_path)?;
        let address = u8::try_from(hw.display.address).map_err(|_| {
            DispenserError::config(format!(
                "display address {:#x} is not a 7-bit address",
                hw.display.address
            ))
        })?;
        let display = Hd44780::new(bus, address, hw.display.columns)?;

        Ok(Self {
            actuators,
            indicators,
            close_all,
            open_all,
            display: Box::new(display),
        })
    }

    /// Builds in-memory lines shaped after the configuration.
    ///
    /// The returned probes observe and drive the same lines.
    pub fn simulated(config: &Config) -> (Self, simulated::SimulatedProbes) {
        let hw = &config.hardware;
        let settle = Duration::from_millis(config.servo.settle_ms);

        let pwms: Vec<_> = hw
            .actuators
            .iter()
            .map(|_| simulated::SimulatedPwm::new())
            .collect();
        let actuators = hw
            .actuators
            .iter()
            .zip(&pwms)
            .map(|(a, pwm)| Arc::new(Servo::new(&a.label, pwm.clone(), settle)) as Arc<dyn Actuator>)
            .collect();

        let leds: Vec<_> = hw
            .indicators
            .iter()
            .map(|gpio| simulated::SimulatedPin::new(format!("led{gpio}"), false))
            .collect();
        let indicators = leds
            .iter()
            .map(|pin| Box::new(Led::new(pin.clone())) as Box<dyn IndicatorLine>)
            .collect();

        // Idle level of a button is the opposite of its active level.
        let close_cfg = &hw.buttons.close_all;
        let open_cfg = &hw.buttons.open_all;
        let close_pin = simulated::SimulatedPin::new("close_all", close_cfg.active_low);
        let open_pin = simulated::SimulatedPin::new("open_all", open_cfg.active_low);

        let display = simulated::SimulatedDisplay::new(hw.display.columns);

        let set = Self {
            actuators,
            indicators,
            close_all: Arc::new(Button::new(close_pin.clone(), close_cfg.active_low)),
            open_all: Arc::new(Button::new(open_pin.clone(), open_cfg.active_low)),
            display: Box::new(display.clone()),
        };

        let probes = simulated::SimulatedProbes {
            pwms,
            leds,
            close_all: simulated::SimulatedButton::new(close_pin, close_cfg.active_low),
            open_all: simulated::SimulatedButton::new(open_pin, open_cfg.active_low),
            display,
        };

        (set, probes)
    }
}

/// Maps any `embedded-hal` error into a hardware error.
pub(crate) fn hw_err<E: Debug>(context: &str, err: E) -> DispenserError {
    DispenserError::hardware(format!("{context}: {err:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simulated_set_matches_config_shape() {
        let mut config = Config::default();
        config.hardware.indicators = vec![7];
        let (set, probes) = HardwareSet::simulated(&config);

        assert_eq!(set.actuators.len(), 2);
        assert_eq!(set.indicators.len(), 1);
        assert_eq!(probes.pwms.len(), 2);
        assert_eq!(set.actuators[0].label(), "GPIO18");
        assert_eq!(set.display.columns(), 16);
    }

    #[test]
    fn simulated_buttons_start_released() {
        let (set, _probes) = HardwareSet::simulated(&Config::default());

        assert!(!set.close_all.is_asserted().unwrap());
        assert!(!set.open_all.is_asserted().unwrap());
    }

    #[test]
    fn simulated_probe_presses_active_low_button() {
        let (set, probes) = HardwareSet::simulated(&Config::default());

        probes.close_all.press();
        assert!(set.close_all.is_asserted().unwrap());
        probes.close_all.release();
        assert!(!set.close_all.is_asserted().unwrap());
    }
}

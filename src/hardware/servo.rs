//! Hobby servo driven by a 50 Hz PWM channel.
//!
//! Pulse width maps linearly from 0.5 ms (0°) to 2.5 ms (180°), i.e. a duty
//! of `angle / 18 + 2.5` percent. The drive signal is dropped once the horn
//! has settled so the servo does not jitter while holding a door.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use embedded_hal::pwm::SetDutyCycle;
use log::debug;

use super::{Actuator, hw_err};
use crate::error::{DispenserError, Result};

/// 50 Hz period in nanoseconds.
pub const PERIOD_NS: u32 = 20_000_000;

/// Highest angle a servo accepts.
pub const MAX_ANGLE: u16 = 180;

/// Gap between dropping the signal and issuing a new pulse.
const PRE_MOVE_GAP: Duration = Duration::from_millis(100);

/// Duty value for `angle` on a channel whose full scale is `max_duty`.
pub fn duty_for_angle(angle: u16, max_duty: u16) -> u16 {
    let percent = f32::from(angle.min(MAX_ANGLE)) / 18.0 + 2.5;
    (f32::from(max_duty) * percent / 100.0).round() as u16
}

#[derive(Debug)]
pub struct Servo<P> {
    label: String,
    pwm: Arc<Mutex<P>>,
    settle: Duration,
    position: Mutex<Option<u16>>,
}

impl<P> Servo<P>
where
    P: SetDutyCycle + Send + 'static,
{
    pub fn new(label: &str, pwm: P, settle: Duration) -> Self {
        Self {
            label: label.to_string(),
            pwm: Arc::new(Mutex::new(pwm)),
            settle,
            position: Mutex::new(None),
        }
    }

    async fn write_angle(&self, angle: Option<u16>) -> Result<()> {
        let pwm = self.pwm.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = pwm
                .lock()
                .map_err(|_| DispenserError::hardware("servo lock poisoned"))?;
            let duty = angle.map_or(0, |a| duty_for_angle(a, guard.max_duty_cycle()));
            guard
                .set_duty_cycle(duty)
                .map_err(|e| hw_err("set duty cycle", e))
        })
        .await
        .map_err(|e| DispenserError::hardware(format!("servo task failed: {e}")))?
    }
}

#[async_trait]
impl<P> Actuator for Servo<P>
where
    P: SetDutyCycle + Send + std::fmt::Debug + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn move_to(&self, angle: u16) -> Result<()> {
        let angle = angle.min(MAX_ANGLE);
        debug!("Servo {} -> {angle}°", self.label);

        self.write_angle(None).await?;
        tokio::time::sleep(PRE_MOVE_GAP).await;
        self.write_angle(Some(angle)).await?;
        tokio::time::sleep(self.settle).await;
        self.write_angle(None).await?;

        if let Ok(mut position) = self.position.lock() {
            *position = Some(angle);
        }
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.write_angle(None).await
    }

    fn position(&self) -> Option<u16> {
        self.position.lock().ok().and_then(|p| *p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulated::SimulatedPwm;
    use embedded_hal::pwm::SetDutyCycle;
    use pretty_assertions::assert_eq;

    #[test]
    fn duty_matches_pulse_width_formula() {
        assert_eq!(duty_for_angle(0, 10_000), 250);
        assert_eq!(duty_for_angle(90, 10_000), 750);
        assert_eq!(duty_for_angle(180, 10_000), 1250);
        assert_eq!(duty_for_angle(80, 10_000), 694);
    }

    #[test]
    fn duty_clamps_angles_past_full_travel() {
        assert_eq!(duty_for_angle(270, 10_000), duty_for_angle(180, 10_000));
    }

    #[tokio::test]
    async fn move_pulses_then_releases() {
        let pwm = SimulatedPwm::new();
        let servo = Servo::new("test", pwm.clone(), Duration::ZERO);

        servo.move_to(80).await.unwrap();

        let max = pwm.max_duty_cycle();
        assert_eq!(pwm.history(), vec![0, duty_for_angle(80, max), 0]);
        assert_eq!(servo.position(), Some(80));
    }

    #[tokio::test]
    async fn release_only_drops_the_signal() {
        let pwm = SimulatedPwm::new();
        let servo = Servo::new("test", pwm.clone(), Duration::ZERO);

        servo.release().await.unwrap();

        assert_eq!(pwm.history(), vec![0]);
        assert_eq!(servo.position(), None);
    }
}

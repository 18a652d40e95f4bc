//! Per-slot status LEDs.

use log::warn;

use crate::{error::Result, hardware::IndicatorLine};

/// Indicator lines indexed by slot. Slots beyond the last LED have none.
#[derive(Debug)]
pub struct IndicatorPanel {
    lines: Vec<Box<dyn IndicatorLine>>,
}

impl IndicatorPanel {
    pub fn new(lines: Vec<Box<dyn IndicatorLine>>) -> Self {
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Switches the indicator at `index`; a missing index is a no-op.
    pub fn set(&self, index: Option<usize>, on: bool) -> Result<()> {
        match index.and_then(|i| self.lines.get(i)) {
            Some(line) => line.set(on),
            None => Ok(()),
        }
    }

    /// Turns every lit indicator off, logging individual failures.
    pub fn all_off(&self) {
        for (i, line) in self.lines.iter().enumerate().filter(|(_, l)| l.is_on()) {
            if let Err(e) = line.set(false) {
                warn!("Failed to switch off indicator {i}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{Led, simulated::SimulatedPin};

    fn panel(n: usize) -> (IndicatorPanel, Vec<SimulatedPin>) {
        let pins: Vec<_> = (0..n)
            .map(|i| SimulatedPin::new(format!("led{i}"), false))
            .collect();
        let lines = pins
            .iter()
            .map(|p| Box::new(Led::new(p.clone())) as Box<dyn IndicatorLine>)
            .collect();
        (IndicatorPanel::new(lines), pins)
    }

    #[test]
    fn set_drives_the_indexed_line() {
        let (panel, pins) = panel(2);

        panel.set(Some(1), true).unwrap();

        assert!(!pins[0].is_set_high());
        assert!(pins[1].is_set_high());
    }

    #[test]
    fn unassigned_or_out_of_range_is_ignored() {
        let (panel, pins) = panel(1);

        assert!(panel.set(None, true).is_ok());
        assert!(panel.set(Some(5), true).is_ok());
        assert!(!pins[0].is_set_high());
    }

    #[test]
    fn all_off_clears_everything() {
        let (panel, pins) = panel(2);
        panel.set(Some(0), true).unwrap();
        panel.set(Some(1), true).unwrap();

        panel.all_off();

        assert!(pins.iter().all(|p| !p.is_set_high()));
    }
}

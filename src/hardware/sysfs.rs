//! Linux sysfs PWM and GPIO lines.
//!
//! Lines are exported on open and unexported on drop. GPIO pull resistors
//! cannot be set through sysfs; the button pull-up/pull-down must come from
//! the board wiring or a device-tree overlay.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use embedded_hal::{digital, i2c, pwm};
use log::{debug, warn};

use crate::error::Result;

const PWM_ROOT: &str = "/sys/class/pwm";
const GPIO_ROOT: &str = "/sys/class/gpio";

/// udev needs a moment to fix permissions on freshly exported nodes.
const EXPORT_SETTLE: Duration = Duration::from_millis(100);

/// I/O failure on a sysfs or device node.
#[derive(Debug)]
pub struct SysfsError(pub io::Error);

impl fmt::Display for SysfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SysfsError {}

impl From<io::Error> for SysfsError {
    fn from(err: io::Error) -> Self {
        Self(err)
    }
}

impl digital::Error for SysfsError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl pwm::Error for SysfsError {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

impl i2c::Error for SysfsError {
    fn kind(&self) -> i2c::ErrorKind {
        i2c::ErrorKind::Other
    }
}

fn write_attr(dir: &Path, attr: &str, value: impl fmt::Display) -> io::Result<()> {
    fs::write(dir.join(attr), value.to_string())
}

fn export(root: &Path, node: &Path, index: u32) -> io::Result<()> {
    if !node.exists() {
        fs::write(root.join("export"), index.to_string())?;
        thread::sleep(EXPORT_SETTLE);
    }
    Ok(())
}

/// One channel of a sysfs PWM chip.
#[derive(Debug)]
pub struct SysfsPwm {
    chip_dir: PathBuf,
    dir: PathBuf,
    channel: u32,
    period_ns: u32,
}

impl SysfsPwm {
    /// Exports `pwmchip{chip}/pwm{channel}`, sets its period and enables it
    /// with a zero duty cycle.
    pub fn open(chip: u32, channel: u32, period_ns: u32) -> Result<Self> {
        Self::open_at(Path::new(PWM_ROOT), chip, channel, period_ns)
    }

    fn open_at(root: &Path, chip: u32, channel: u32, period_ns: u32) -> Result<Self> {
        let chip_dir = root.join(format!("pwmchip{chip}"));
        let dir = chip_dir.join(format!("pwm{channel}"));
        export(&chip_dir, &dir, channel)?;

        write_attr(&dir, "duty_cycle", 0)?;
        write_attr(&dir, "period", period_ns)?;
        write_attr(&dir, "enable", 1)?;
        debug!("Opened {}", dir.display());

        Ok(Self {
            chip_dir,
            dir,
            channel,
            period_ns,
        })
    }
}

impl Drop for SysfsPwm {
    fn drop(&mut self) {
        let _ = write_attr(&self.dir, "duty_cycle", 0);
        let _ = write_attr(&self.dir, "enable", 0);
        if let Err(e) = write_attr(&self.chip_dir, "unexport", self.channel) {
            warn!("Failed to unexport {}: {e}", self.dir.display());
        }
    }
}

impl pwm::ErrorType for SysfsPwm {
    type Error = SysfsError;
}

impl pwm::SetDutyCycle for SysfsPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> std::result::Result<(), Self::Error> {
        let ns = u64::from(self.period_ns) * u64::from(duty) / u64::from(u16::MAX);
        write_attr(&self.dir, "duty_cycle", ns).map_err(SysfsError)
    }
}

/// A sysfs GPIO line.
#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    dir: PathBuf,
    number: u32,
}

impl SysfsGpio {
    pub fn output(number: u32) -> Result<Self> {
        Self::open_at(Path::new(GPIO_ROOT), number, "low")
    }

    pub fn input(number: u32) -> Result<Self> {
        Self::open_at(Path::new(GPIO_ROOT), number, "in")
    }

    fn open_at(root: &Path, number: u32, direction: &str) -> Result<Self> {
        let dir = root.join(format!("gpio{number}"));
        export(root, &dir, number)?;
        // "low" configures an output that starts driven low.
        write_attr(&dir, "direction", direction)?;

        Ok(Self {
            root: root.to_path_buf(),
            dir,
            number,
        })
    }

    fn read_level(&self) -> io::Result<bool> {
        let raw = fs::read_to_string(self.dir.join("value"))?;
        Ok(raw.trim() == "1")
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        if let Err(e) = write_attr(&self.root, "unexport", self.number) {
            warn!("Failed to unexport gpio{}: {e}", self.number);
        }
    }
}

impl digital::ErrorType for SysfsGpio {
    type Error = SysfsError;
}

impl digital::OutputPin for SysfsGpio {
    fn set_low(&mut self) -> std::result::Result<(), Self::Error> {
        write_attr(&self.dir, "value", 0).map_err(SysfsError)
    }

    fn set_high(&mut self) -> std::result::Result<(), Self::Error> {
        write_attr(&self.dir, "value", 1).map_err(SysfsError)
    }
}

impl digital::InputPin for SysfsGpio {
    fn is_high(&mut self) -> std::result::Result<bool, Self::Error> {
        self.read_level().map_err(SysfsError)
    }

    fn is_low(&mut self) -> std::result::Result<bool, Self::Error> {
        self.read_level().map(|high| !high).map_err(SysfsError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::digital::{InputPin, OutputPin};
    use embedded_hal::pwm::SetDutyCycle;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn read(path: PathBuf) -> String {
        fs::read_to_string(path).unwrap()
    }

    fn fake_pwm_chip(root: &Path) {
        // Pre-create the channel so open skips the export write.
        fs::create_dir_all(root.join("pwmchip0/pwm1")).unwrap();
    }

    #[test]
    fn pwm_open_configures_period_and_enable() {
        let tmp = TempDir::new().unwrap();
        fake_pwm_chip(tmp.path());

        let pwm = SysfsPwm::open_at(tmp.path(), 0, 1, 20_000_000).unwrap();

        assert_eq!(read(pwm.dir.join("period")), "20000000");
        assert_eq!(read(pwm.dir.join("enable")), "1");
        assert_eq!(read(pwm.dir.join("duty_cycle")), "0");
    }

    #[test]
    fn pwm_duty_scales_to_nanoseconds() {
        let tmp = TempDir::new().unwrap();
        fake_pwm_chip(tmp.path());
        let mut pwm = SysfsPwm::open_at(tmp.path(), 0, 1, 20_000_000).unwrap();

        pwm.set_duty_cycle(u16::MAX).unwrap();
        assert_eq!(read(pwm.dir.join("duty_cycle")), "20000000");

        pwm.set_duty_cycle(0).unwrap();
        assert_eq!(read(pwm.dir.join("duty_cycle")), "0");
    }

    #[test]
    fn pwm_drop_disables_and_unexports() {
        let tmp = TempDir::new().unwrap();
        fake_pwm_chip(tmp.path());
        let dir = {
            let pwm = SysfsPwm::open_at(tmp.path(), 0, 1, 20_000_000).unwrap();
            pwm.dir.clone()
        };

        assert_eq!(read(dir.join("enable")), "0");
        assert_eq!(read(tmp.path().join("pwmchip0/unexport")), "1");
    }

    #[test]
    fn gpio_output_writes_value() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("gpio7")).unwrap();
        let mut gpio = SysfsGpio::open_at(tmp.path(), 7, "low").unwrap();

        gpio.set_high().unwrap();
        assert_eq!(read(tmp.path().join("gpio7/value")), "1");
        assert_eq!(read(tmp.path().join("gpio7/direction")), "low");
    }

    #[test]
    fn gpio_input_reads_value() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("gpio17")).unwrap();
        fs::write(tmp.path().join("gpio17/value"), "0\n").unwrap();
        let mut gpio = SysfsGpio::open_at(tmp.path(), 17, "in").unwrap();

        assert!(gpio.is_low().unwrap());
        fs::write(tmp.path().join("gpio17/value"), "1\n").unwrap();
        assert!(gpio.is_high().unwrap());
    }

    #[test]
    fn gpio_missing_node_is_a_hardware_error() {
        let tmp = TempDir::new().unwrap();
        // No export file and no gpio dir: the export write fails.
        let err = SysfsGpio::open_at(&tmp.path().join("absent"), 3, "in").unwrap_err();
        assert!(matches!(err, crate::error::DispenserError::Hardware { .. }));
    }
}

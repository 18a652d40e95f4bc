//! Configuration management for the medimated daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that describes the remote store, servo angles, timing and hardware wiring.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MEDIMATED_CONFIG";

/// Environment variable overriding `remote.api_key`.
pub const API_KEY_ENV: &str = "MEDIMATED_API_KEY";

/// Main configuration structure for the medimated daemon.
///
/// # Example
///
/// ```yaml
/// version: 1
/// remote:
///   database_url: "https://medimate-default-rtdb.firebaseio.com"
///   user_id: "firebase-user-id"
///   api_key: "API-KEY"
/// servo:
///   open_angle: 80
///   close_angle: 0
/// hardware:
///   backend: sysfs
///   actuators:
///     - { label: "GPIO18", pwm_chip: 0, channel: 0 }
///     - { label: "GPIO23", pwm_chip: 0, channel: 1 }
///   indicators: [7, 8]
///   buttons:
///     close_all: { gpio: 17, active_low: true }
///     open_all: { gpio: 24, active_low: false }
///   display:
///     i2c_bus: 1
///     address: 0x27
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Remote key-value store settings.
    pub remote: RemoteCfg,

    /// Servo angles for the two door positions.
    #[serde(default)]
    pub servo: ServoCfg,

    /// Loop periods and dwell times.
    #[serde(default)]
    pub timing: TimingCfg,

    /// Physical wiring.
    #[serde(default)]
    pub hardware: HardwareCfg,
}

/// Remote store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCfg {
    /// Base URL of the realtime database.
    pub database_url: String,

    /// Per-user namespace under `users/`.
    pub user_id: String,

    /// Static credential appended as the `auth` query parameter.
    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Servo angles in degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoCfg {
    /// Angle for an open door.
    #[serde(default = "defaults::open_angle")]
    pub open_angle: u16,

    /// Angle for a closed door.
    #[serde(default = "defaults::close_angle")]
    pub close_angle: u16,

    /// Time the drive signal is held before it is released.
    #[serde(default = "defaults::settle_ms")]
    pub settle_ms: u64,
}

/// Loop periods and dwell times, all in milliseconds except `idle_ticks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingCfg {
    /// Remote poll period per slot.
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound of the poll backoff after transport failures.
    #[serde(default = "defaults::max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Button sampling period.
    #[serde(default = "defaults::button_poll_ms")]
    pub button_poll_ms: u64,

    /// Pause between slots while opening all doors.
    #[serde(default = "defaults::open_all_step_ms")]
    pub open_all_step_ms: u64,

    /// Status display tick.
    #[serde(default = "defaults::display_tick_ms")]
    pub display_tick_ms: u64,

    /// Idle ticks before a medication summary pass.
    #[serde(default = "defaults::idle_ticks")]
    pub idle_ticks: u32,

    /// How long the dispensed banner stays up.
    #[serde(default = "defaults::dispensed_dwell_ms")]
    pub dispensed_dwell_ms: u64,

    /// How long each summary page stays up.
    #[serde(default = "defaults::page_dwell_ms")]
    pub page_dwell_ms: u64,

    /// Pause between self-test positions and startup messages.
    #[serde(default = "defaults::self_test_pause_ms")]
    pub self_test_pause_ms: u64,

    /// How long the farewell message stays up before the display is cleared.
    #[serde(default = "defaults::farewell_ms")]
    pub farewell_ms: u64,
}

/// Hardware backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Linux sysfs PWM/GPIO and `/dev/i2c-N`.
    Sysfs,
    /// In-memory lines that only log what they would do.
    Simulated,
}

/// Physical wiring of actuators, LEDs, buttons and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareCfg {
    /// Backend used to reach the lines below.
    #[serde(default = "defaults::backend")]
    pub backend: Backend,

    /// Offset added to every GPIO number (newer kernels number the
    /// Raspberry Pi header from 512).
    #[serde(default)]
    pub gpio_base: u32,

    /// One PWM channel per medication slot, in binding order.
    #[serde(default = "defaults::actuators")]
    pub actuators: Vec<ActuatorCfg>,

    /// LED GPIO lines, bound to slots in order.
    #[serde(default = "defaults::indicators")]
    pub indicators: Vec<u32>,

    /// Override buttons.
    #[serde(default)]
    pub buttons: ButtonsCfg,

    /// Character display.
    #[serde(default)]
    pub display: DisplayCfg,
}

/// A servo channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorCfg {
    /// Name shown during the self-test.
    pub label: String,

    /// sysfs `pwmchipN` index.
    #[serde(default)]
    pub pwm_chip: u32,

    /// Channel on the chip.
    pub channel: u32,
}

/// Both override buttons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonsCfg {
    /// Closes every open door. Wired with a pull-up.
    pub close_all: ButtonCfg,

    /// Opens every door. Wired with a pull-down.
    pub open_all: ButtonCfg,
}

/// A momentary push button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonCfg {
    /// GPIO line number.
    pub gpio: u32,

    /// Whether a low level means pressed.
    #[serde(default)]
    pub active_low: bool,
}

/// HD44780 display behind a PCF8574 backpack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayCfg {
    /// `/dev/i2c-N` bus number.
    #[serde(default = "defaults::i2c_bus")]
    pub i2c_bus: u8,

    /// 7-bit device address.
    #[serde(default = "defaults::i2c_address")]
    pub address: u16,

    /// Characters per line.
    #[serde(default = "defaults::columns")]
    pub columns: usize,

    /// Number of lines.
    #[serde(default = "defaults::rows")]
    pub rows: usize,
}

impl Default for ServoCfg {
    fn default() -> Self {
        Self {
            open_angle: defaults::open_angle(),
            close_angle: defaults::close_angle(),
            settle_ms: defaults::settle_ms(),
        }
    }
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::poll_interval_ms(),
            max_backoff_ms: defaults::max_backoff_ms(),
            button_poll_ms: defaults::button_poll_ms(),
            open_all_step_ms: defaults::open_all_step_ms(),
            display_tick_ms: defaults::display_tick_ms(),
            idle_ticks: defaults::idle_ticks(),
            dispensed_dwell_ms: defaults::dispensed_dwell_ms(),
            page_dwell_ms: defaults::page_dwell_ms(),
            self_test_pause_ms: defaults::self_test_pause_ms(),
            farewell_ms: defaults::farewell_ms(),
        }
    }
}

impl Default for HardwareCfg {
    fn default() -> Self {
        Self {
            backend: defaults::backend(),
            gpio_base: 0,
            actuators: defaults::actuators(),
            indicators: defaults::indicators(),
            buttons: ButtonsCfg::default(),
            display: DisplayCfg::default(),
        }
    }
}

impl Default for ButtonsCfg {
    fn default() -> Self {
        Self {
            close_all: ButtonCfg {
                gpio: 17,
                active_low: true,
            },
            open_all: ButtonCfg {
                gpio: 24,
                active_low: false,
            },
        }
    }
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            i2c_bus: defaults::i2c_bus(),
            address: defaults::i2c_address(),
            columns: defaults::columns(),
            rows: defaults::rows(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            remote: RemoteCfg {
                database_url: "http://127.0.0.1:9000".to_string(),
                user_id: "local".to_string(),
                api_key: String::new(),
                request_timeout_secs: defaults::request_timeout_secs(),
            },
            servo: ServoCfg::default(),
            timing: TimingCfg::default(),
            hardware: HardwareCfg::default(),
        }
    }
}

impl TimingCfg {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn button_poll(&self) -> Duration {
        Duration::from_millis(self.button_poll_ms)
    }

    pub fn open_all_step(&self) -> Duration {
        Duration::from_millis(self.open_all_step_ms)
    }

    pub fn display_tick(&self) -> Duration {
        Duration::from_millis(self.display_tick_ms)
    }

    pub fn dispensed_dwell(&self) -> Duration {
        Duration::from_millis(self.dispensed_dwell_ms)
    }

    pub fn page_dwell(&self) -> Duration {
        Duration::from_millis(self.page_dwell_ms)
    }

    pub fn self_test_pause(&self) -> Duration {
        Duration::from_millis(self.self_test_pause_ms)
    }

    pub fn farewell(&self) -> Duration {
        Duration::from_millis(self.farewell_ms)
    }
}

impl Config {
    /// Validates the configuration for consistency.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use medimated::config::Config;
    ///
    /// let config = Config::default();
    /// config.validate()?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn validate(&self) -> anyhow::Result<()> {
        reqwest::Url::parse(&self.remote.database_url).with_context(|| {
            format!("Invalid remote.database_url '{}'", self.remote.database_url)
        })?;

        if self.remote.user_id.trim().is_empty() {
            anyhow::bail!("remote.user_id cannot be empty");
        }

        if self.servo.open_angle > 180 {
            anyhow::bail!(
                "servo.open_angle {} exceeds 180 degrees",
                self.servo.open_angle
            );
        }

        if self.servo.close_angle >= self.servo.open_angle {
            anyhow::bail!(
                "servo.close_angle ({}) must be below servo.open_angle ({})",
                self.servo.close_angle,
                self.servo.open_angle
            );
        }

        if self.hardware.actuators.is_empty() {
            anyhow::bail!("hardware.actuators must list at least one servo");
        }

        let display = &self.hardware.display;
        if display.rows < 2 || display.columns == 0 {
            anyhow::bail!(
                "hardware.display must have at least 2 rows and 1 column (got {}x{})",
                display.columns,
                display.rows
            );
        }

        let timing = &self.timing;
        for (name, value) in [
            ("poll_interval_ms", timing.poll_interval_ms),
            ("button_poll_ms", timing.button_poll_ms),
            ("display_tick_ms", timing.display_tick_ms),
        ] {
            if value == 0 {
                anyhow::bail!("timing.{name} must be greater than zero");
            }
        }

        if timing.max_backoff_ms < timing.poll_interval_ms {
            anyhow::bail!(
                "timing.max_backoff_ms ({}) must not be below timing.poll_interval_ms ({})",
                timing.max_backoff_ms,
                timing.poll_interval_ms
            );
        }

        Ok(())
    }
}

mod defaults {
    use super::{ActuatorCfg, Backend};

    pub fn request_timeout_secs() -> u64 {
        10
    }

    pub fn open_angle() -> u16 {
        80
    }

    pub fn close_angle() -> u16 {
        0
    }

    pub fn settle_ms() -> u64 {
        1000
    }

    pub fn poll_interval_ms() -> u64 {
        1000
    }

    pub fn max_backoff_ms() -> u64 {
        8000
    }

    pub fn button_poll_ms() -> u64 {
        100
    }

    pub fn open_all_step_ms() -> u64 {
        200
    }

    pub fn display_tick_ms() -> u64 {
        500
    }

    pub fn idle_ticks() -> u32 {
        10
    }

    pub fn dispensed_dwell_ms() -> u64 {
        3000
    }

    pub fn page_dwell_ms() -> u64 {
        2000
    }

    pub fn self_test_pause_ms() -> u64 {
        1000
    }

    pub fn farewell_ms() -> u64 {
        2000
    }

    pub fn backend() -> Backend {
        Backend::Sysfs
    }

    pub fn actuators() -> Vec<ActuatorCfg> {
        vec![
            ActuatorCfg {
                label: "GPIO18".to_string(),
                pwm_chip: 0,
                channel: 0,
            },
            ActuatorCfg {
                label: "GPIO23".to_string(),
                pwm_chip: 0,
                channel: 1,
            },
        ]
    }

    pub fn indicators() -> Vec<u32> {
        vec![7, 8]
    }

    pub fn i2c_bus() -> u8 {
        1
    }

    pub fn i2c_address() -> u16 {
        0x27
    }

    pub fn columns() -> usize {
        16
    }

    pub fn rows() -> usize {
        2
    }
}

fn locate_config() -> Result<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(env_path));
    }

    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("medimated/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    let etc = Path::new("/etc/medimated/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Configuration manager that owns the loaded config and its file path.
///
/// # Example
///
/// ```no_run
/// use medimated::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
/// let poll = config_manager.get().await.timing.poll_interval();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and path.
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches in the following order:
    /// 1. Provided path parameter
    /// 2. `MEDIMATED_CONFIG` environment variable
    /// 3. `$XDG_CONFIG_HOME/medimated/config.yml` or `~/.config/medimated/config.yml`
    /// 4. `/etc/medimated/config.yml`
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self::new(config, config_path))
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Returns the path the configuration was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clones the current configuration.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Forces the simulated hardware backend regardless of the file.
    pub async fn force_simulated(&self) {
        self.config.write().await.hardware.backend = Backend::Simulated;
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        if let Ok(key) = env::var(API_KEY_ENV) {
            config.remote.api_key = key;
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::machine::{MachineConfig, MachineId, MqttActuation, RelayActuation, RetryPolicy};
use crate::models::user::WhiteListEntry;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub machine: MachineSection,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub whitelist: Vec<WhiteListEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineSection {
    pub id: u32,
    pub name: String,
    #[serde(default = "default_autologoff_minutes")]
    pub autologoff_minutes: u64,
    #[serde(default = "default_grace_period_seconds")]
    pub grace_period_seconds: u64,
    #[serde(default = "default_warning_lead_seconds")]
    pub warning_lead_seconds: u64,
    pub relay: Option<RelaySection>,
    pub mqtt: Option<MqttSection>,
    #[serde(default)]
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    pub pin: u32,
    #[serde(default)]
    pub active_low: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttSection {
    pub topic: String,
    #[serde(default = "default_on_message")]
    pub on_message: String,
    #[serde(default = "default_off_message")]
    pub off_message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    #[serde(default = "default_alive_seconds")]
    pub alive_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tap_probability")]
    pub tap_probability: f64,
}

// Default value functions
fn default_autologoff_minutes() -> u64 {
    12 * 60
}

fn default_grace_period_seconds() -> u64 {
    90
}

fn default_warning_lead_seconds() -> u64 {
    30
}

fn default_on_message() -> String {
    "on".to_string()
}

fn default_off_message() -> String {
    "off".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_backend_enabled() -> bool {
    true
}

fn default_backend_timeout() -> u64 {
    5
}

fn default_cache_capacity() -> usize {
    10
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("fabgate-cache.db")
}

fn default_tick_ms() -> u64 {
    100
}

fn default_refresh_seconds() -> u64 {
    60
}

fn default_alive_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_console() -> bool {
    false
}

fn default_tap_probability() -> f64 {
    0.05
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            timeout_seconds: default_backend_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            path: default_cache_path(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            refresh_seconds: default_refresh_seconds(),
            alive_seconds: default_alive_seconds(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate machine config
        if self.machine.name.trim().is_empty() {
            bail!("machine name must not be empty");
        }

        if self.machine.relay.is_none() && self.machine.mqtt.is_none() {
            bail!("At least one of machine.relay or machine.mqtt must be configured");
        }

        if let Some(mqtt) = &self.machine.mqtt {
            if mqtt.topic.is_empty() {
                bail!("machine.mqtt.topic must not be empty");
            }
        }

        if self.machine.autologoff_minutes.checked_mul(60).is_none() {
            bail!(
                "machine.autologoff_minutes ({}) is out of range",
                self.machine.autologoff_minutes
            );
        }

        if self.machine.warning_lead_seconds > 0
            && self.machine.warning_lead_seconds >= self.machine.grace_period_seconds
        {
            bail!(
                "warning_lead_seconds ({}) must be smaller than grace_period_seconds ({})",
                self.machine.warning_lead_seconds,
                self.machine.grace_period_seconds
            );
        }

        if self.machine.retry.attempts == 0 {
            bail!("machine.retry.attempts must be greater than 0");
        }

        // Validate backend config
        if self.backend.enabled && self.backend.endpoint.is_empty() {
            bail!("backend.endpoint must not be empty when the backend is enabled");
        }

        if self.backend.timeout_seconds == 0 {
            bail!("backend.timeout_seconds must be greater than 0");
        }

        // Validate cache config
        if self.cache.capacity == 0 {
            bail!("cache.capacity must be greater than 0");
        }

        // Validate scheduler config
        if self.scheduler.tick_ms == 0 {
            bail!("scheduler.tick_ms must be greater than 0");
        }

        // Validate simulation config
        if !(0.0..=1.0).contains(&self.simulation.tap_probability) {
            bail!("simulation.tap_probability must be between 0 and 1");
        }

        // Validate whitelist
        for entry in &self.whitelist {
            if !entry.uid.is_valid() {
                bail!("whitelist entry '{}' has the invalid UID 0", entry.name);
            }
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }

    /// Machine settings in the form the power controller uses
    pub fn machine_config(&self) -> MachineConfig {
        let machine = &self.machine;
        MachineConfig {
            machine_id: MachineId(machine.id),
            machine_name: machine.name.clone(),
            autologoff: Duration::from_secs(machine.autologoff_minutes.saturating_mul(60)),
            grace_period: Duration::from_secs(machine.grace_period_seconds),
            warning_lead: Duration::from_secs(machine.warning_lead_seconds),
            relay: machine.relay.as_ref().map(|relay| RelayActuation {
                pin: relay.pin,
                active_low: relay.active_low,
            }),
            mqtt: machine.mqtt.as_ref().map(|mqtt| MqttActuation {
                topic: mqtt.topic.clone(),
                on_message: mqtt.on_message.clone(),
                off_message: mqtt.off_message.clone(),
            }),
            retry: RetryPolicy {
                attempts: machine.retry.attempts,
                backoff: Duration::from_millis(machine.retry.backoff_ms),
            },
        }
    }
}

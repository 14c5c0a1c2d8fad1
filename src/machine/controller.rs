use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::api::backend::BackendClient;
use crate::machine::relay::{OutputPin, SysfsPin};
use crate::models::machine::{MachineConfig, MachineId, MqttActuation, PowerState};
use crate::models::user::FabUser;
use crate::utils::time::{elapsed_since, is_expired, Clock, MonotonicClock};

/// Result of driving one actuation channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOutcome {
    Applied,
    /// Every attempt failed, the physical state is unknown
    Failed { attempts: u32 },
}

/// Per-channel outcome of a `power()` call, `None` for channels not configured
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActuationReport {
    pub relay: Option<ChannelOutcome>,
    pub mqtt: Option<ChannelOutcome>,
}

impl ActuationReport {
    /// True when every configured channel applied the command
    pub fn is_complete(&self) -> bool {
        [self.relay, self.mqtt]
            .iter()
            .flatten()
            .all(|outcome| *outcome == ChannelOutcome::Applied)
    }
}

/// Session and power state machine for one machine
///
/// Time-based transitions are only reported (`can_power_off`,
/// `is_autologoff_expired`); the caller performs them.
pub struct MachinePowerController<C: Clock = MonotonicClock> {
    config: MachineConfig,
    clock: C,
    relay_pin: Option<Box<dyn OutputPin>>,
    power_state: PowerState,
    active: bool,
    current_user: Option<FabUser>,
    usage_start: Option<Instant>,
    logout_timestamp: Option<Instant>,
    allowed: bool,
    maintenance_needed: bool,
    power_confirmed: bool,
}

impl<C: Clock> MachinePowerController<C> {
    /// Controller driving the relay through sysfs GPIO when one is configured
    pub fn new(config: MachineConfig, clock: C) -> Self {
        let relay_pin = config
            .relay
            .as_ref()
            .map(|relay| Box::new(SysfsPin::new(relay.pin)) as Box<dyn OutputPin>);
        Self::with_output(config, clock, relay_pin)
    }

    pub fn with_output(config: MachineConfig, clock: C, relay_pin: Option<Box<dyn OutputPin>>) -> Self {
        if config.relay.is_some() && relay_pin.is_none() {
            warn!(machine = %config.machine_name, "Relay configured without an output pin");
        }

        info!(
            machine_id = %config.machine_id,
            machine = %config.machine_name,
            relay_pin = ?config.relay.as_ref().map(|r| r.pin),
            active_low = ?config.relay.as_ref().map(|r| r.active_low),
            mqtt_topic = ?config.mqtt.as_ref().map(|m| m.topic.as_str()),
            "Machine configured"
        );

        Self {
            config,
            clock,
            relay_pin,
            power_state: PowerState::Unknown,
            active: false,
            current_user: None,
            usage_start: None,
            logout_timestamp: None,
            allowed: true,
            maintenance_needed: false,
            power_confirmed: true,
        }
    }

    /// Start a session; refused when the machine is busy or blocked
    pub fn login(&mut self, user: FabUser, backend: &mut dyn BackendClient) -> bool {
        if !self.is_free() || !self.allowed {
            debug!(
                uid = %user.uid,
                free = self.is_free(),
                allowed = self.allowed,
                "Login refused"
            );
            return false;
        }

        info!(user = %user, machine = %self.config.machine_name, "Session started");
        self.active = true;
        self.current_user = Some(user);
        self.power(true, backend);
        self.usage_start = Some(self.clock.now());
        true
    }

    /// End the session, cutting power now or after the grace period
    pub fn logout(&mut self, backend: &mut dyn BackendClient) {
        if !self.active {
            return;
        }

        info!(
            user = ?self.current_user.as_ref().map(|u| u.holder_name.as_str()),
            usage_secs = self.usage_duration().as_secs(),
            "Session ended"
        );

        self.active = false;
        self.current_user = None;
        self.usage_start = None;

        if self.config.grace_period > Duration::ZERO {
            self.power_state = PowerState::WaitingForPowerOff;
            self.logout_timestamp = Some(self.clock.now());
            debug!(grace_secs = self.config.grace_period.as_secs(), "Waiting before power off");
        } else {
            self.logout_timestamp = None;
            self.power(false, backend);
        }
    }

    fn grace_elapsed(&self) -> Option<Duration> {
        if self.power_state != PowerState::WaitingForPowerOff {
            return None;
        }
        self.logout_timestamp
            .map(|logout| elapsed_since(logout, self.clock.now()))
    }

    /// Grace period is over and power may be cut
    pub fn can_power_off(&self) -> bool {
        self.grace_elapsed()
            .is_some_and(|elapsed| elapsed >= self.config.grace_period)
    }

    /// Power cut is less than the warning lead away
    pub fn is_shutdown_imminent(&self) -> bool {
        if self.config.warning_lead.is_zero() {
            return false;
        }
        let threshold = self.config.grace_period.saturating_sub(self.config.warning_lead);
        self.grace_elapsed().is_some_and(|elapsed| elapsed >= threshold)
    }

    /// Drive every configured channel and record the new power state
    ///
    /// The state follows the command even when a channel fails; the report
    /// and `power_confirmed()` expose the mismatch.
    pub fn power(&mut self, on: bool, backend: &mut dyn BackendClient) -> ActuationReport {
        info!(machine = %self.config.machine_name, on = on, "Power command");

        let mut report = ActuationReport::default();

        if let Some(relay) = &self.config.relay {
            if let Some(pin) = self.relay_pin.as_mut() {
                pin.set_level(relay.level_for(on));
                report.relay = Some(ChannelOutcome::Applied);
            } else {
                report.relay = Some(ChannelOutcome::Failed { attempts: 0 });
            }
        }

        if let Some(mqtt) = &self.config.mqtt {
            report.mqtt = Some(publish_with_retry(mqtt, on, &self.config, &self.clock, backend));
        }

        if on {
            self.logout_timestamp = None;
            self.power_state = PowerState::PoweredOn;
        } else {
            self.power_state = PowerState::PoweredOff;
        }

        self.power_confirmed = report.is_complete();
        if !self.power_confirmed {
            error!(
                machine = %self.config.machine_name,
                on = on,
                report = ?report,
                "Power command not applied on every channel"
            );
        }

        report
    }

    pub fn is_autologoff_expired(&self) -> bool {
        if self.config.autologoff.is_zero() || !self.active {
            return false;
        }
        self.usage_start
            .is_some_and(|start| is_expired(start, self.config.autologoff, self.clock.now()))
    }

    pub fn usage_duration(&self) -> Duration {
        match (self.active, self.usage_start) {
            (true, Some(start)) => elapsed_since(start, self.clock.now()),
            _ => Duration::ZERO,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.active
    }

    pub fn active_user(&self) -> Option<&FabUser> {
        self.current_user.as_ref()
    }

    pub fn power_state(&self) -> PowerState {
        self.power_state
    }

    /// False after a power command some channel failed to apply
    pub fn power_confirmed(&self) -> bool {
        self.power_confirmed
    }

    pub fn set_allowed(&mut self, allowed: bool) {
        self.allowed = allowed;
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn set_maintenance_needed(&mut self, needed: bool) {
        self.maintenance_needed = needed;
    }

    pub fn maintenance_needed(&self) -> bool {
        self.maintenance_needed
    }

    pub fn set_autologoff(&mut self, delay: Duration) {
        self.config.autologoff = delay;
    }

    pub fn machine_id(&self) -> MachineId {
        self.config.machine_id
    }

    pub fn machine_name(&self) -> &str {
        &self.config.machine_name
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }
}

fn publish_with_retry<C: Clock>(
    mqtt: &MqttActuation,
    on: bool,
    config: &MachineConfig,
    clock: &C,
    backend: &mut dyn BackendClient,
) -> ChannelOutcome {
    let attempts = config.retry.attempts.max(1);
    let payload = mqtt.message_for(on);

    for attempt in 1..=attempts {
        if backend.publish(&mqtt.topic, payload) {
            debug!(topic = %mqtt.topic, payload = payload, attempt = attempt, "Switch command published");
            return ChannelOutcome::Applied;
        }

        warn!(topic = %mqtt.topic, attempt = attempt, max_attempts = attempts, "Switch command publish failed");

        if attempt < attempts {
            backend.connect();
            clock.sleep(config.retry.backoff);
        }
    }

    error!(topic = %mqtt.topic, attempts = attempts, "Giving up on switch command");
    ChannelOutcome::Failed { attempts }
}

impl<C: Clock> PartialEq for MachinePowerController<C> {
    fn eq(&self, other: &Self) -> bool {
        self.config.machine_id == other.config.machine_id
    }
}

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Backend identifier of a machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct MachineId(pub u32);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Relay output driving the machine power contactor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayActuation {
    pub pin: u32,
    /// Relay energizes on a low output level
    pub active_low: bool,
}

impl RelayActuation {
    /// Output level to write for the requested power state
    pub fn level_for(&self, on: bool) -> bool {
        on != self.active_low
    }
}

/// Remote switch controlled by publishing on/off messages
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttActuation {
    pub topic: String,
    pub on_message: String,
    pub off_message: String,
}

impl MqttActuation {
    pub fn message_for(&self, on: bool) -> &str {
        if on {
            &self.on_message
        } else {
            &self.off_message
        }
    }
}

/// Bounded retry policy for remote actuation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Everything the power controller needs to know about its machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineConfig {
    pub machine_id: MachineId,
    pub machine_name: String,
    /// Zero disables automatic logoff
    pub autologoff: Duration,
    /// Delay between logout and power cut
    pub grace_period: Duration,
    /// How long before the power cut the shutdown warning starts, zero disables it
    pub warning_lead: Duration,
    pub relay: Option<RelayActuation>,
    pub mqtt: Option<MqttActuation>,
    pub retry: RetryPolicy,
}

impl MachineConfig {
    pub fn has_actuation(&self) -> bool {
        self.relay.is_some() || self.mqtt.is_some()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PowerState {
    #[default]
    Unknown,
    PoweredOff,
    PoweredOn,
    WaitingForPowerOff,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PowerState::Unknown => "unknown",
            PowerState::PoweredOff => "powered_off",
            PowerState::PoweredOn => "powered_on",
            PowerState::WaitingForPowerOff => "waiting_for_power_off",
        };
        f.write_str(name)
    }
}

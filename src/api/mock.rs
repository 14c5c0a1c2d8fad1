use std::collections::HashMap;
use std::time::Duration;

use crate::api::backend::BackendClient;
use crate::api::messages::{MachineResponse, SimpleResponse, UserResponse};
use crate::models::card::Uid;
use crate::models::machine::MachineId;

/// Usage event recorded by [`MockBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageEvent {
    Start { uid: Uid, machine_id: MachineId },
    Finish { uid: Uid, machine_id: MachineId, duration: Duration },
    Maintenance { uid: Uid, machine_id: MachineId },
}

/// Scriptable in-memory backend for tests and simulation runs
#[derive(Debug, Default)]
pub struct MockBackend {
    pub online: bool,
    /// Outcome of `connect()`
    pub reachable: bool,
    /// Replies per card, unknown cards get `default_reply`
    pub cards: HashMap<Uid, UserResponse>,
    pub default_reply: UserResponse,
    pub machine_reply: MachineResponse,
    /// Number of upcoming `publish` calls that fail
    pub failing_publishes: u32,
    pub published: Vec<(String, String)>,
    pub usage: Vec<UsageEvent>,
    pub connect_attempts: u32,
    pub card_checks: u32,
    pub alive_pings: u32,
}

impl MockBackend {
    pub fn online() -> Self {
        Self {
            online: true,
            reachable: true,
            ..Self::default()
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_card(mut self, uid: Uid, reply: UserResponse) -> Self {
        self.cards.insert(uid, reply);
        self
    }

    pub fn set_card(&mut self, uid: Uid, reply: UserResponse) {
        self.cards.insert(uid, reply);
    }

    /// Drop the connection and refuse reconnects
    pub fn go_offline(&mut self) {
        self.online = false;
        self.reachable = false;
    }

    fn ack(&self) -> SimpleResponse {
        SimpleResponse { request_ok: self.online }
    }
}

impl BackendClient for MockBackend {
    fn is_online(&self) -> bool {
        self.online
    }

    fn connect(&mut self) -> bool {
        self.connect_attempts += 1;
        self.online = self.reachable;
        self.online
    }

    fn check_card(&mut self, uid: Uid) -> UserResponse {
        self.card_checks += 1;
        if !self.online {
            return UserResponse::inconclusive();
        }
        self.cards.get(&uid).cloned().unwrap_or_else(|| self.default_reply.clone())
    }

    fn publish(&mut self, topic: &str, payload: &str) -> bool {
        if !self.online {
            return false;
        }
        if self.failing_publishes > 0 {
            self.failing_publishes -= 1;
            return false;
        }
        self.published.push((topic.to_string(), payload.to_string()));
        true
    }

    fn check_machine(&mut self, _machine_id: MachineId) -> MachineResponse {
        if !self.online {
            return MachineResponse::default();
        }
        self.machine_reply.clone()
    }

    fn start_use(&mut self, uid: Uid, machine_id: MachineId) -> SimpleResponse {
        if self.online {
            self.usage.push(UsageEvent::Start { uid, machine_id });
        }
        self.ack()
    }

    fn finish_use(&mut self, uid: Uid, machine_id: MachineId, duration: Duration) -> SimpleResponse {
        if self.online {
            self.usage.push(UsageEvent::Finish { uid, machine_id, duration });
        }
        self.ack()
    }

    fn register_maintenance(&mut self, uid: Uid, machine_id: MachineId) -> SimpleResponse {
        if self.online {
            self.usage.push(UsageEvent::Maintenance { uid, machine_id });
        }
        self.ack()
    }

    fn alive(&mut self, _machine_id: MachineId) -> SimpleResponse {
        if self.online {
            self.alive_pings += 1;
        }
        self.ack()
    }
}

use serde::{Deserialize, Serialize};

use crate::models::card::{Uid, UserLevel};

/// Request sent to the backend, tagged by `action`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Query {
    CheckUser {
        uid: Uid,
    },
    CheckMachine {
        machine_id: u32,
    },
    StartUse {
        uid: Uid,
        machine_id: u32,
    },
    StopUse {
        uid: Uid,
        machine_id: u32,
        duration_s: u64,
    },
    RegisterMaintenance {
        uid: Uid,
        machine_id: u32,
    },
    Alive {
        machine_id: u32,
    },
}

/// Body of a remote switch command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishRequest<'a> {
    pub topic: &'a str,
    pub payload: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserResult {
    #[default]
    Invalid,
    Authorized,
    Denied,
    Unregistered,
    Inactive,
}

/// Reply to `Query::CheckUser`
///
/// `Default` is the inconclusive reply (`request_ok == false`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserResponse {
    #[serde(default)]
    pub request_ok: bool,
    #[serde(default)]
    pub result: UserResult,
    #[serde(default)]
    pub holder_name: String,
    #[serde(default)]
    pub user_level: UserLevel,
}

impl UserResponse {
    pub fn authorized(holder_name: impl Into<String>, user_level: UserLevel) -> Self {
        Self {
            request_ok: true,
            result: UserResult::Authorized,
            holder_name: holder_name.into(),
            user_level,
        }
    }

    pub fn denied() -> Self {
        Self {
            request_ok: true,
            result: UserResult::Denied,
            ..Self::default()
        }
    }

    pub fn inconclusive() -> Self {
        Self::default()
    }

    pub fn is_authorized(&self) -> bool {
        self.result == UserResult::Authorized
    }
}

/// Reply to `Query::CheckMachine`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MachineResponse {
    #[serde(default)]
    pub request_ok: bool,
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub maintenance: bool,
    #[serde(default)]
    pub allowed: bool,
    /// Autologoff delay configured on the backend, absent keeps the local one
    #[serde(default)]
    pub logoff_minutes: Option<u64>,
    #[serde(default)]
    pub name: String,
}

/// Reply carrying only the acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimpleResponse {
    #[serde(default)]
    pub request_ok: bool,
}

impl SimpleResponse {
    pub fn ok() -> Self {
        Self { request_ok: true }
    }
}

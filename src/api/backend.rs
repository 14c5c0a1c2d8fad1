use std::time::Duration;

use crate::api::messages::{MachineResponse, SimpleResponse, UserResponse};
use crate::models::card::Uid;
use crate::models::machine::MachineId;

/// Remote authority and message bus used by the controller
///
/// Calls are synchronous. Transport failures never surface as errors: they
/// come back as replies with `request_ok == false`, and `publish` reports
/// `false`. Callers decide whether to retry.
pub trait BackendClient {
    fn is_online(&self) -> bool;

    /// Best-effort connection attempt
    fn connect(&mut self) -> bool;

    fn check_card(&mut self, uid: Uid) -> UserResponse;

    fn publish(&mut self, topic: &str, payload: &str) -> bool;

    fn check_machine(&mut self, machine_id: MachineId) -> MachineResponse;

    fn start_use(&mut self, uid: Uid, machine_id: MachineId) -> SimpleResponse;

    fn finish_use(&mut self, uid: Uid, machine_id: MachineId, duration: Duration) -> SimpleResponse;

    fn register_maintenance(&mut self, uid: Uid, machine_id: MachineId) -> SimpleResponse;

    fn alive(&mut self, machine_id: MachineId) -> SimpleResponse;
}

/// Backend for machines running without a network authority
///
/// Never online, so every decision comes from the cache and whitelist.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

impl BackendClient for OfflineBackend {
    fn is_online(&self) -> bool {
        false
    }

    fn connect(&mut self) -> bool {
        false
    }

    fn check_card(&mut self, _uid: Uid) -> UserResponse {
        UserResponse::inconclusive()
    }

    fn publish(&mut self, _topic: &str, _payload: &str) -> bool {
        false
    }

    fn check_machine(&mut self, _machine_id: MachineId) -> MachineResponse {
        MachineResponse::default()
    }

    fn start_use(&mut self, _uid: Uid, _machine_id: MachineId) -> SimpleResponse {
        SimpleResponse::default()
    }

    fn finish_use(&mut self, _uid: Uid, _machine_id: MachineId, _duration: Duration) -> SimpleResponse {
        SimpleResponse::default()
    }

    fn register_maintenance(&mut self, _uid: Uid, _machine_id: MachineId) -> SimpleResponse {
        SimpleResponse::default()
    }

    fn alive(&mut self, _machine_id: MachineId) -> SimpleResponse {
        SimpleResponse::default()
    }
}

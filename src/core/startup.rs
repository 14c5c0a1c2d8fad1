use std::time::Duration;
use tracing::info;

use crate::api::backend::BackendClient;
use crate::api::messages::{MachineResponse, UserResponse};
use crate::api::mock::MockBackend;
use crate::auth::resolver::AuthResolver;
use crate::core::board::{Board, BoardTiming};
use crate::core::config::Config;
use crate::machine::controller::MachinePowerController;
use crate::machine::relay::{LoggingPin, OutputPin};
use crate::persist::snapshot::FileCacheStore;
use crate::rfid::line_reader::LineReader;
use crate::rfid::reader::{RfidReader, SimulatedReader};
use crate::utils::time::MonotonicClock;

// this runs once at boot time
pub fn build_board<B: BackendClient>(config: &Config, backend: B) -> Board<B, MonotonicClock> {
    let machine_config = config.machine_config();
    let clock = MonotonicClock;

    let machine = if config.simulation.enabled {
        let pin = machine_config
            .relay
            .as_ref()
            .map(|relay| Box::new(LoggingPin { pin: relay.pin }) as Box<dyn OutputPin>);
        MachinePowerController::with_output(machine_config, clock, pin)
    } else {
        MachinePowerController::new(machine_config, clock)
    };

    let auth = AuthResolver::new(config.whitelist.clone(), config.cache.capacity);
    let store = FileCacheStore::new(config.cache.path.clone(), config.cache.capacity);

    info!(
        whitelist = config.whitelist.len(),
        cache_capacity = config.cache.capacity,
        cache_path = %config.cache.path.display(),
        "Authorization sources configured"
    );

    Board::new(
        auth,
        machine,
        backend,
        build_reader(config),
        Box::new(store),
        clock,
        timing(config),
    )
}

pub fn timing(config: &Config) -> BoardTiming {
    BoardTiming {
        tick: Duration::from_millis(config.scheduler.tick_ms),
        refresh: Duration::from_secs(config.scheduler.refresh_seconds),
        alive: Duration::from_secs(config.scheduler.alive_seconds),
    }
}

pub fn build_reader(config: &Config) -> Box<dyn RfidReader> {
    if config.simulation.enabled {
        let cards = config.whitelist.iter().map(|entry| entry.uid).collect();
        Box::new(SimulatedReader::new(cards, config.simulation.tap_probability, rand::rng()))
    } else {
        Box::new(LineReader::stdin())
    }
}

/// Backend standing in for the server during simulation runs
///
/// Every whitelisted card is granted online with its whitelist level.
pub fn simulation_backend(config: &Config) -> MockBackend {
    let mut backend = MockBackend::online();
    for entry in &config.whitelist {
        backend.set_card(entry.uid, UserResponse::authorized(entry.name.clone(), entry.level));
    }
    backend.machine_reply = MachineResponse {
        request_ok: true,
        is_valid: true,
        allowed: true,
        maintenance: false,
        logoff_minutes: None,
        name: config.machine.name.clone(),
    };
    backend
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::card::Uid;

    #[test]
    fn test_simulation_backend_grants_whitelist() {
        let config = Config::parse(include_str!("../../config.example.toml")).unwrap();
        let mut backend = simulation_backend(&config);

        let reply = backend.check_card(Uid::new(0xAABBCCDD));
        assert!(reply.request_ok);
        assert!(reply.is_authorized());
        assert_eq!(reply.holder_name, "Workshop admin");

        assert!(backend.check_machine(config.machine_config().machine_id).allowed);
    }

    #[test]
    fn test_timing_from_config() {
        let config = Config::parse(include_str!("../../config.example.toml")).unwrap();
        let board_timing = timing(&config);
        assert_eq!(board_timing.tick, Duration::from_millis(100));
        assert_eq!(board_timing.refresh, Duration::from_secs(60));
        assert_eq!(board_timing.alive, Duration::from_secs(30));
    }
}

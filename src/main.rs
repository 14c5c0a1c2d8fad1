use anyhow::{Context, Result};
use fabgate::api::backend::{BackendClient, OfflineBackend};
use fabgate::api::client::HttpBackend;
use fabgate::core::config::Config;
use fabgate::core::startup::{build_board, simulation_backend};
use fabgate::core::tracing_init::init_tracing;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // Load and validate configuration
    let config = Config::from_file(&config_path)
        .context(format!(
            "Failed to load configuration from '{}'. \
            If this is your first run, copy config.example.toml to config.toml and adjust the values.",
            config_path.display()
        ))?;

    // Initialize tracing/logging
    init_tracing(&config.logging)?;

    info!(
        config_path = %config_path.display(),
        machine_id = config.machine.id,
        machine = %config.machine.name,
        backend_enabled = config.backend.enabled,
        simulation = config.simulation.enabled,
        log_level = %config.logging.level,
        "Access controller starting"
    );

    if config.simulation.enabled {
        run(&config, simulation_backend(&config));
    } else if config.backend.enabled {
        let backend = HttpBackend::new(
            config.backend.endpoint.clone(),
            config.machine_config().machine_id,
            Duration::from_secs(config.backend.timeout_seconds),
        )
        .context("Failed to create backend client")?;
        run(&config, backend);
    } else {
        info!("No backend configured, running on cache and whitelist only");
        run(&config, OfflineBackend);
    }

    Ok(())
}

fn run<B: BackendClient>(config: &Config, backend: B) {
    let mut board = build_board(config, backend);
    info!(tick_ms = config.scheduler.tick_ms, "Board loop started");
    board.run(None);
}

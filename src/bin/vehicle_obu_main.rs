// vehicle_obu_main.rs
use clap::Parser;
use intersection_preemption::communication::messages::SignalStateTable;
use intersection_preemption::communication::transport::{
    listen_signal_states, publish_vehicle_reports, run_service, Shutdown,
};
use intersection_preemption::config::{SimulationConfig, MIN_TICK_PERIOD_SECS};
use intersection_preemption::error::{Result, SimError};
use intersection_preemption::models::signal::Direction;
use intersection_preemption::models::vehicle::VehicleKind;
use intersection_preemption::simulation_engine::onboard_unit::OnboardUnit;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Duration;

#[derive(Parser)]
#[command(name = "vehicle_obu_main")]
#[command(about = "On-board unit: drives one vehicle and reports it to the roadside unit")]
struct Cli {
    /// Vehicle id used in every report
    #[arg(long)]
    id: u64,

    /// Drive an emergency vehicle with its siren on
    #[arg(long)]
    emergency: bool,

    /// Travel direction (NORTH, EAST, SOUTH, WEST or N/E/S/W)
    #[arg(long, default_value = "SOUTH")]
    direction: Direction,

    /// Speed in metres per second
    #[arg(long, default_value = "12.0")]
    speed: f64,

    /// Seconds between position reports
    #[arg(long, default_value = "0.1")]
    interval: f64,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run_service(|shutdown| run(cli, shutdown)) {
        log::error!("On-board unit stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, shutdown: Shutdown) -> Result<()> {
    let config = SimulationConfig::load(cli.config.as_deref())?;
    if !(cli.interval.is_finite() && cli.interval >= MIN_TICK_PERIOD_SECS) {
        return Err(SimError::InvalidConfig(format!(
            "report interval must be at least {} s, got {}",
            MIN_TICK_PERIOD_SECS, cli.interval
        )));
    }
    let kind = if cli.emergency {
        VehicleKind::Emergency
    } else {
        VehicleKind::Ordinary
    };
    let unit = OnboardUnit::new(&config, cli.id, kind, cli.direction, cli.speed).ok_or_else(
        || SimError::InvalidConfig(format!("no lane configured for {}", cli.direction)),
    )?;
    log::info!(
        "{} vehicle {} starting {} at {:.1} m/s",
        kind,
        cli.id,
        cli.direction,
        cli.speed
    );

    let table = Arc::new(Mutex::new(SignalStateTable::new()));
    let (tx, rx) = mpsc::channel(16);
    let publisher = tokio::spawn(publish_vehicle_reports(config.amqp_url.clone(), rx));
    let signals = tokio::spawn(listen_signal_states(
        config.amqp_url.clone(),
        Arc::clone(&table),
        shutdown,
    ));
    let driving = unit.run(table, Duration::from_secs_f64(cli.interval), tx);

    tokio::select! {
        _ = driving => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            log::info!("Shutting down");
        }
        result = publisher => result??,
        result = signals => result??,
    }
    Ok(())
}

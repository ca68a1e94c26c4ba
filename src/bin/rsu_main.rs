// rsu_main.rs
use clap::Parser;
use intersection_preemption::communication::transport::{
    listen_emergency_reports, listen_position_reports, listen_preemption_requests,
    publish_snapshots, run_service, Shutdown,
};
use intersection_preemption::config::SimulationConfig;
use intersection_preemption::error::Result;
use intersection_preemption::shared_data::current_timestamp;
use intersection_preemption::simulation_engine::simulation::{build_coordinator, run_tick_loop};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Snapshots buffered for the publisher before new ones are dropped.
const SNAPSHOT_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "rsu_main")]
#[command(about = "Roadside unit: owns the intersection and talks to vehicles over RabbitMQ")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run_service(|shutdown| run(cli, shutdown)) {
        log::error!("Roadside unit stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, shutdown: Shutdown) -> Result<()> {
    let config = SimulationConfig::load(cli.config.as_deref())?;
    let coordinator = Arc::new(build_coordinator(&config, current_timestamp()));
    let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);

    let publisher = tokio::spawn(publish_snapshots(config.amqp_url.clone(), rx));
    let positions = tokio::spawn(listen_position_reports(
        config.amqp_url.clone(),
        Arc::clone(&coordinator),
        shutdown.clone(),
    ));
    let emergencies = tokio::spawn(listen_emergency_reports(
        config.amqp_url.clone(),
        Arc::clone(&coordinator),
        shutdown.clone(),
    ));
    let preemptions = tokio::spawn(listen_preemption_requests(
        config.amqp_url.clone(),
        Arc::clone(&coordinator),
        shutdown.clone(),
    ));
    let ticks = run_tick_loop(
        Arc::clone(&coordinator),
        Duration::from_secs_f64(config.tick_period_secs),
        Some(tx),
    );

    log::info!("Roadside unit running, Ctrl-C to stop");
    tokio::select! {
        _ = ticks => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            log::info!("Shutting down");
        }
        result = publisher => result??,
        result = positions => result??,
        result = emergencies => result??,
        result = preemptions => result??,
    }
    Ok(())
}

// main.rs
use clap::Parser;
use intersection_preemption::config::SimulationConfig;
use intersection_preemption::shared_data::current_timestamp;
use intersection_preemption::simulation_engine::simulation::{
    build_coordinator, log_summary, run_for_ticks, run_realtime,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::time::Duration;

#[derive(Parser)]
#[command(name = "intersection_preemption")]
#[command(about = "Headless intersection simulation with emergency preemption")]
struct Cli {
    /// JSON configuration file; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to run
    #[arg(long, default_value = "600")]
    ticks: u64,

    /// Wait for each tick in real time instead of using a simulated clock
    #[arg(long)]
    realtime: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match SimulationConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let start = current_timestamp();
    let coordinator = build_coordinator(&config, start);
    let snapshot = if cli.realtime {
        run_realtime(
            &coordinator,
            Duration::from_secs_f64(config.tick_period_secs),
            cli.ticks,
        )
        .await
    } else {
        match run_for_ticks(&coordinator, start, config.tick_period_secs, cli.ticks) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    log::info!("Final state after {} ticks:", cli.ticks);
    log_summary(&snapshot);
    ExitCode::SUCCESS
}

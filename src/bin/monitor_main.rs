// monitor_main.rs
use clap::Parser;
use intersection_preemption::communication::transport::{run_service, Shutdown};
use intersection_preemption::config::SimulationConfig;
use intersection_preemption::error::Result;
use intersection_preemption::monitoring::snapshot_log::listen_snapshots;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "monitor_main")]
#[command(about = "Appends every published intersection snapshot to a CSV history")]
struct Cli {
    /// CSV file the snapshots are appended to
    #[arg(long, default_value = "snapshot_history.csv")]
    output: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run_service(|shutdown| run(cli, shutdown)) {
        log::error!("Monitor stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, shutdown: Shutdown) -> Result<()> {
    let config = SimulationConfig::load(cli.config.as_deref())?;
    log::info!("Logging snapshots to {}", cli.output.display());
    tokio::select! {
        result = listen_snapshots(config.amqp_url, cli.output, shutdown) => result,
        result = tokio::signal::ctrl_c() => {
            result?;
            log::info!("Shutting down");
            Ok(())
        }
    }
}

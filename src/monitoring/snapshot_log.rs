use crate::communication::transport::{consume, Shutdown, Source};
use crate::error::Result;
use crate::global_variables::EXCHANGE_INTERSECTION_SNAPSHOTS;
use crate::models::signal::{Direction, SignalState};
use crate::shared_data::Snapshot;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// One CSV row per published snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub timestamp: f64,
    pub phase: String,
    pub north: Option<SignalState>,
    pub north_countdown: Option<f64>,
    pub east: Option<SignalState>,
    pub east_countdown: Option<f64>,
    pub south: Option<SignalState>,
    pub south_countdown: Option<f64>,
    pub west: Option<SignalState>,
    pub west_countdown: Option<f64>,
    pub emergency_mode: bool,
    pub preempted_direction: Option<Direction>,
    pub vehicles: usize,
    pub waiting: usize,
}

impl From<&Snapshot> for SnapshotRecord {
    fn from(snapshot: &Snapshot) -> Self {
        let state = |d| snapshot.signal(d).map(|s| s.state);
        let countdown = |d| snapshot.signal(d).map(|s| (s.countdown * 10.0).round() / 10.0);
        Self {
            timestamp: snapshot.timestamp,
            phase: snapshot.phase.to_string(),
            north: state(Direction::North),
            north_countdown: countdown(Direction::North),
            east: state(Direction::East),
            east_countdown: countdown(Direction::East),
            south: state(Direction::South),
            south_countdown: countdown(Direction::South),
            west: state(Direction::West),
            west_countdown: countdown(Direction::West),
            emergency_mode: snapshot.emergency_mode,
            preempted_direction: snapshot.preemption.map(|p| p.target_direction),
            vehicles: snapshot.vehicles.len(),
            waiting: snapshot.vehicles.iter().filter(|v| v.waiting).count(),
        }
    }
}

/// Appends `record` to the CSV file at `path`, writing the header row only
/// when the file is new.
pub fn log_to_csv<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file_exists = path.exists();
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    wtr.serialize(record)?;
    wtr.flush()?;
    Ok(())
}

pub fn log_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    log_to_csv(path, &SnapshotRecord::from(snapshot))
}

/// Reads back every row of a snapshot history file.
pub fn read_history(path: &Path) -> Result<Vec<SnapshotRecord>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in rdr.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Consumes published snapshots and appends each one to `path` until
/// `shutdown` fires.
pub async fn listen_snapshots(amqp_url: String, path: PathBuf, shutdown: Shutdown) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let source = Source::Fanout(EXCHANGE_INTERSECTION_SNAPSHOTS);
        consume(&amqp_url, source, shutdown, |body| {
            let snapshot: Snapshot = match serde_json::from_slice(body) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    log::warn!("Dropping snapshot: {}", e);
                    return;
                }
            };
            if snapshot.emergency_mode {
                log::info!("[{:.1}] emergency vehicle at the intersection", snapshot.timestamp);
            }
            if let Err(e) = log_snapshot(&path, &snapshot) {
                log::error!("Error logging snapshot: {}", e);
            }
        })
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::simulation_engine::coordinator::IntersectionCoordinator;

    fn temp_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}_{}.csv", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn record_flattens_signals() {
        let coordinator = IntersectionCoordinator::new(&SimulationConfig::default(), 0.0);
        let record = SnapshotRecord::from(&coordinator.snapshot());
        assert_eq!(record.phase, "NORMAL_PHASE_A");
        assert_eq!(record.north, Some(SignalState::Red));
        assert_eq!(record.east, Some(SignalState::Green));
        assert_eq!(record.east_countdown, Some(30.0));
        assert_eq!(record.preempted_direction, None);
    }

    #[test]
    fn header_is_written_once() {
        let path = temp_file("snapshot_history");
        let coordinator = IntersectionCoordinator::new(&SimulationConfig::default(), 0.0);
        coordinator.apply_tick(1.0);
        log_snapshot(&path, &coordinator.snapshot()).unwrap();
        coordinator.apply_tick(2.0);
        log_snapshot(&path, &coordinator.snapshot()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("timestamp").count(), 1);
        let history = read_history(&path).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].timestamp, 2.0);
        std::fs::remove_file(&path).unwrap();
    }
}

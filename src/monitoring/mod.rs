pub mod snapshot_log;

pub mod emergency_detector;
pub mod signal_phase_engine;

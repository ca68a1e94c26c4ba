// simulation_engine/mod.rs
pub mod coordinator;
pub mod lanes;
pub mod movement;
pub mod onboard_unit;
pub mod simulation;
pub mod vehicles;

pub mod intersection;
pub mod signal;
pub mod vehicle;

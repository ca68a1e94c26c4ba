use crate::models::signal::Direction;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An inbound record could not be turned into a typed report.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    /// An emergency event named a direction this intersection has no signal for.
    #[error("no signal for direction {0}")]
    UnknownDirection(Direction),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("amqp error: {0}")]
    Amqp(#[from] amiquip::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

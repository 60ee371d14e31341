use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler is not running")]
    Closed,
    #[error("Invalid broadcast: {0}")]
    InvalidBroadcast(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

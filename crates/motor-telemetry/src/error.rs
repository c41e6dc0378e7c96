use motor_bus::MotorError;
use thiserror::Error;

pub type Result<T, E = SessionError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),
    #[error("invalid session target: {0}")]
    InvalidTarget(String),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Motor(#[from] MotorError),
}

use motor_bus::MotorError;
use thiserror::Error;

pub type Result<T, E = ManagerError> = core::result::Result<T, E>;

/// Caller-facing classification of a [`ManagerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Operational,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("hardware error: {0}")]
    Operational(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Operational(_) | Self::Storage(_) => ErrorKind::Operational,
        }
    }
}

impl From<MotorError> for ManagerError {
    fn from(e: MotorError) -> Self {
        match e {
            MotorError::UnknownBusType(_) | MotorError::InvalidId { .. } => Self::Validation(e.to_string()),
            MotorError::AmbiguousModel { .. } => Self::Conflict(e.to_string()),
            MotorError::ModelNotFound { .. } => Self::NotFound(e.to_string()),
            _ => Self::Operational(e.to_string()),
        }
    }
}

impl From<std::io::Error> for ManagerError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ManagerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_yaml::Error> for ManagerError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

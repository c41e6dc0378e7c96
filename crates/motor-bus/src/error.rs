use crate::{Brand, MotorId};
use can_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = MotorError> = core::result::Result<T, E>;

/// Errors surfaced by drivers, buses and the model catalog.
///
/// Drivers only return `NotConnected`, `InvalidId` and `AmbiguousModel` from their
/// public verbs; `Transport` and `Protocol` are absorbed into `false` / `None` there.
#[derive(Debug, Error)]
pub enum MotorError {
    #[error("driver for {0} is not connected")]
    NotConnected(String),
    #[error("motor id {id} is not addressable on a {brand} bus")]
    InvalidId { brand: Brand, id: MotorId },
    #[error("unknown motor bus type: {0}")]
    UnknownBusType(String),
    #[error("model id {model_id} is ambiguous for {brand}: {candidates:?}")]
    AmbiguousModel {
        brand: Brand,
        model_id: u32,
        candidates: Vec<String>,
    },
    #[error("model id {model_id} not found for {brand}")]
    ModelNotFound { brand: Brand, model_id: u32 },
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("model catalog error: {0}")]
    Catalog(String),
}

impl MotorError {
    /// Link-level noise that drivers swallow instead of propagating.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_))
    }
}

impl From<std::io::Error> for MotorError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.into())
    }
}

impl From<serialport::Error> for MotorError {
    fn from(e: serialport::Error) -> Self {
        Self::Transport(TransportError::Io(e.to_string()))
    }
}

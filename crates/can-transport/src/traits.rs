use crate::{BusInfo, CanFilter, CanFrame, Result, TransportError};

/// A minimal blocking CAN bus interface.
///
/// Object safe: motor drivers hold a `Box<dyn CanBus + Send>` so that tests can
/// swap in the mock backend.
pub trait CanBus {
    /// Open a CAN interface by name (e.g., "can0", "/dev/ttyACM0").
    fn open(name: &str) -> Result<Self>
    where
        Self: Sized;

    /// Attempt to list available interfaces for this backend.
    fn list() -> Result<Vec<BusInfo>>
    where
        Self: Sized;

    /// Name the interface was opened with.
    fn name(&self) -> &str;

    /// Set acceptance filters if supported.
    fn set_filters(&mut self, _filters: &[CanFilter]) -> Result<()> {
        Err(TransportError::Unsupported("filters not supported"))
    }

    /// Receive one frame (blocking with optional timeout in milliseconds).
    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<CanFrame>;

    /// Send one frame.
    fn send(&mut self, frame: &CanFrame) -> Result<()>;

    /// Discard frames already queued on the interface. Returns how many were dropped.
    fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while dropped < 256 {
            match self.recv(Some(0)) {
                Ok(_) => dropped += 1,
                Err(_) => break,
            }
        }
        dropped
    }
}

//! Byte-stream transport used by the serial protocols (Dynamixel, Feetech).

use crate::Result;
use std::io::{Read, Write};
use std::time::Duration;

/// Half-duplex serial link to a servo bus.
pub trait SerialLink: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Fill `buf` completely or fail with a timeout.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Drop any bytes left over from a previous transaction.
    fn clear_input(&mut self) -> Result<()>;

    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;
}

/// Open a hardware serial port as a [`SerialLink`].
pub fn open_serial(path: &str, baudrate: u32, timeout: Duration) -> Result<Box<dyn SerialLink>> {
    let port = serialport::new(path, baudrate).timeout(timeout).open()?;
    Ok(Box::new(PortLink { port }))
}

struct PortLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink for PortLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        Read::read_exact(&mut self.port, buf)?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }
}

/// Connection state shared by the serial drivers: either opens the named port on
/// `connect` or hands out a link supplied up front.
pub(crate) struct LinkSlot {
    pub(crate) interface: String,
    pub(crate) baudrate: u32,
    timeout: Duration,
    preset: Option<Box<dyn SerialLink>>,
    active: Option<Box<dyn SerialLink>>,
}

impl LinkSlot {
    pub(crate) fn new(interface: &str, baudrate: u32, timeout: Duration) -> Self {
        Self {
            interface: interface.to_string(),
            baudrate,
            timeout,
            preset: None,
            active: None,
        }
    }

    pub(crate) fn with_link(interface: &str, baudrate: u32, timeout: Duration, link: Box<dyn SerialLink>) -> Self {
        Self {
            preset: Some(link),
            ..Self::new(interface, baudrate, timeout)
        }
    }

    pub(crate) fn open(&mut self) -> bool {
        if self.active.is_some() {
            return true;
        }
        let opened = match self.preset.take() {
            Some(link) => Ok(link),
            None => open_serial(&self.interface, self.baudrate, self.timeout),
        };
        match opened {
            Ok(link) => {
                self.active = Some(link);
                true
            }
            Err(e) => {
                tracing::debug!(interface = %self.interface, baudrate = self.baudrate, error = %e, "serial open failed");
                false
            }
        }
    }

    pub(crate) fn close(&mut self) {
        self.active = None;
    }

    pub(crate) fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn get(&mut self) -> Result<&mut dyn SerialLink> {
        match self.active.as_deref_mut() {
            Some(link) => Ok(link),
            None => Err(crate::MotorError::NotConnected(self.interface.clone())),
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(any(test, feature = "mock"))]
pub use sim::SimLink;

#[cfg(any(test, feature = "mock"))]
mod sim {
    use super::SerialLink;
    use crate::{MotorError, Result};
    use can_transport::TransportError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    type Device = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

    /// In-memory serial link: every written packet is handed to a simulated device
    /// whose answer becomes readable. The write log is shared so tests can inspect
    /// traffic after the link was moved into a driver.
    pub struct SimLink {
        device: Device,
        rx: VecDeque<u8>,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl SimLink {
        pub fn new<F>(device: F) -> Self
        where
            F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
        {
            Self {
                device: Box::new(device),
                rx: VecDeque::new(),
                written: Arc::default(),
            }
        }

        pub fn written(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
            self.written.clone()
        }
    }

    impl SerialLink for SimLink {
        fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
            self.written
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(bytes.to_vec());
            let reply = (self.device)(bytes);
            self.rx.extend(reply);
            Ok(())
        }

        fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
            if self.rx.len() < buf.len() {
                self.rx.clear();
                return Err(MotorError::Transport(TransportError::Timeout));
            }
            for b in buf.iter_mut() {
                *b = self.rx.pop_front().unwrap_or_default();
            }
            Ok(())
        }

        fn clear_input(&mut self) -> Result<()> {
            self.rx.clear();
            Ok(())
        }

        fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }
    }
}

use crate::{BusInfo, CanBus, CanFrame, Result, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Produces the frames a simulated device answers with for one transmitted frame.
pub type Responder = Box<dyn FnMut(&CanFrame) -> Vec<CanFrame> + Send>;

/// Shared record of every frame a [`MockBus`] transmitted.
#[derive(Clone, Default, Debug)]
pub struct SentFrames(Arc<Mutex<Vec<CanFrame>>>);

impl SentFrames {
    pub fn snapshot(&self) -> Vec<CanFrame> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, frame: CanFrame) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
    }
}

/// An in-process mock bus. Each instance is independent; replies come from an
/// optional responder closure and are queued until read back with `recv`.
pub struct MockBus {
    name: String,
    responder: Option<Responder>,
    rx: VecDeque<CanFrame>,
    sent: SentFrames,
}

impl MockBus {
    /// A bus whose simulated devices answer through `responder`.
    pub fn with_responder<F>(name: &str, responder: F) -> Self
    where
        F: FnMut(&CanFrame) -> Vec<CanFrame> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            responder: Some(Box::new(responder)),
            rx: VecDeque::new(),
            sent: SentFrames::default(),
        }
    }

    /// Handle onto the transmit log; stays valid after the bus is moved into a driver.
    pub fn sent_frames(&self) -> SentFrames {
        self.sent.clone()
    }

    /// Queue an unsolicited frame, e.g. a stale reply left on the wire.
    pub fn inject(&mut self, frame: CanFrame) {
        self.rx.push_back(frame);
    }
}

impl CanBus for MockBus {
    fn open(name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            responder: None,
            rx: VecDeque::new(),
            sent: SentFrames::default(),
        })
    }

    fn list() -> Result<Vec<BusInfo>> {
        Ok(vec![BusInfo {
            name: "mock0".to_string(),
            driver: "mock".to_string(),
            manufacturer: Some("mock".to_string()),
            serial_number: None,
        }])
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<CanFrame> {
        self.rx
            .pop_front()
            .map(CanFrame::stamped)
            .ok_or(TransportError::Timeout)
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        self.sent.push(frame.clone());
        if let Some(responder) = self.responder.as_mut() {
            self.rx.extend(responder(frame));
        }
        Ok(())
    }
}

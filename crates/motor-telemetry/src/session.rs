//! One telemetry session per device.
//!
//! The poll loop runs as a tokio task and does its driver I/O on the blocking
//! pool. Every driver access, from the loop or from a control command, goes
//! through one mutex, so wire traffic never interleaves. Events fan out over a
//! bounded broadcast channel: a subscriber that falls behind loses the oldest
//! events and the loop never waits for it.

use crate::error::{Result, SessionError};
use crate::events::{CommandAck, MotorReading, SessionEvent};
use crate::metrics::SessionMetrics;
use crate::target::SessionTarget;
use motor_bus::{MotorDriver, MotorId, MotorService, ProtectionStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub poll_interval_ms: u64,
    /// Events buffered per subscriber before the oldest are dropped.
    pub queue_capacity: usize,
    pub start_polling: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            queue_capacity: 256,
            start_polling: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Stopped,
}

type DriverSlot = Mutex<Option<Box<dyn MotorDriver>>>;

/// State shared between the session handle and its poll loop.
struct Shared {
    target: SessionTarget,
    service: Arc<dyn MotorService>,
    driver: DriverSlot,
    /// Motors whose current CRITICAL streak already tripped protection.
    latched: Mutex<BTreeSet<MotorId>>,
    metrics: Option<SessionMetrics>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Trip {
    motor: String,
    id: MotorId,
    violations: Vec<String>,
    torque_disabled: bool,
}

struct Tick {
    readings: Vec<MotorReading>,
    trips: Vec<Trip>,
    failed: u64,
}

impl Shared {
    fn count(&self, pick: impl Fn(&SessionMetrics) -> &prometheus::IntCounterVec, n: u64) {
        if let Some(m) = &self.metrics {
            pick(m).with_label_values(&[self.target.robot_id.as_str()]).inc_by(n);
        }
    }

    /// Read every target motor, then trip protection on motors that just
    /// entered CRITICAL. Runs on the blocking pool.
    fn tick(&self) -> Result<Tick> {
        let mut slot = lock(&self.driver);
        let driver = slot
            .as_mut()
            .ok_or_else(|| SessionError::DriverUnavailable(self.target.interface.clone()))?;

        let mut readings = Vec::with_capacity(self.target.motors.len());
        let mut failed = 0;
        for motor in &self.target.motors {
            match self.service.read_telemetry_with_protection(
                driver.as_mut(),
                &motor.id,
                &motor.model,
                motor.variant.as_deref(),
                &motor.overrides,
            ) {
                Ok(Some(reading)) => readings.push(MotorReading {
                    motor: motor.name.clone(),
                    id: motor.id,
                    reading,
                }),
                Ok(None) => failed += 1,
                Err(e) => {
                    tracing::warn!(robot = %self.target.robot_id, id = %motor.id, error = %e, "telemetry read failed");
                    failed += 1;
                }
            }
        }

        // Only an OK reading re-arms a motor. Failed reads and warnings leave the latch as it was.
        let mut latched = lock(&self.latched);
        let mut trips = Vec::new();
        for r in &readings {
            match r.reading.status {
                ProtectionStatus::Ok => {
                    latched.remove(&r.id);
                    continue;
                }
                ProtectionStatus::Warning => continue,
                ProtectionStatus::Critical => {}
            }
            if !latched.insert(r.id) {
                continue;
            }
            let torque_disabled = match driver.set_torque(&r.id, false) {
                Ok(acked) => acked,
                Err(e) => {
                    tracing::error!(robot = %self.target.robot_id, id = %r.id, error = %e, "protective torque disable failed");
                    false
                }
            };
            tracing::warn!(
                robot = %self.target.robot_id,
                id = %r.id,
                violations = ?r.reading.violations,
                torque_disabled,
                "protection tripped"
            );
            trips.push(Trip {
                motor: r.motor.clone(),
                id: r.id,
                violations: r.reading.violations.clone(),
                torque_disabled,
            });
        }
        Ok(Tick { readings, trips, failed })
    }
}

pub struct TelemetrySession {
    shared: Arc<Shared>,
    events: broadcast::Sender<SessionEvent>,
    polling: Arc<AtomicBool>,
    interval_ms: Arc<AtomicU64>,
    /// Wakes a sleeping poll loop after the interval changes.
    reconfigured: Arc<Notify>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    state: SessionState,
}

impl TelemetrySession {
    /// A session that opens its own driver through `service` on start.
    pub fn new(target: SessionTarget, service: Arc<dyn MotorService>, config: SessionConfig) -> Self {
        Self::build(target, service, None, config)
    }

    /// A session over an already created driver.
    pub fn with_driver(
        target: SessionTarget,
        service: Arc<dyn MotorService>,
        driver: Box<dyn MotorDriver>,
        config: SessionConfig,
    ) -> Self {
        Self::build(target, service, Some(driver), config)
    }

    fn build(
        target: SessionTarget,
        service: Arc<dyn MotorService>,
        driver: Option<Box<dyn MotorDriver>>,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.queue_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                target,
                service,
                driver: Mutex::new(driver),
                latched: Mutex::new(BTreeSet::new()),
                metrics: None,
            }),
            events,
            polling: Arc::new(AtomicBool::new(config.start_polling)),
            interval_ms: Arc::new(AtomicU64::new(config.poll_interval_ms.max(1))),
            reconfigured: Arc::new(Notify::new()),
            shutdown: None,
            task: None,
            state: SessionState::Created,
        }
    }

    /// Count ticks, failed reads, trips and stops into `metrics`. Must be set
    /// before [`TelemetrySession::start`].
    pub fn with_metrics(mut self, metrics: SessionMetrics) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.metrics = Some(metrics);
        }
        self
    }

    pub fn target(&self) -> &SessionTarget {
        &self.shared.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// A new independent event queue.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn enable_polling(&self) {
        self.polling.store(true, Ordering::Relaxed);
    }

    pub fn disable_polling(&self) {
        self.polling.store(false, Ordering::Relaxed);
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Relaxed)
    }

    /// Takes effect immediately: a loop sleeping on the old interval restarts
    /// its wait with the new one.
    pub fn set_poll_interval_ms(&self, ms: u64) {
        self.interval_ms.store(ms.max(1), Ordering::Relaxed);
        self.reconfigured.notify_one();
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    /// Create (when needed) and connect the driver.
    pub async fn open_driver(&self) -> Result<()> {
        let shared = self.shared.clone();
        tokio::task::spawn_blocking(move || {
            let mut slot = lock(&shared.driver);
            let t = &shared.target;
            let driver = slot.get_or_insert_with(|| shared.service.create_driver(&t.interface, t.brand, t.baudrate));
            if driver.is_connected() || driver.connect() {
                tracing::info!(robot = %t.robot_id, interface = %t.interface, "driver open");
                Ok(())
            } else {
                Err(SessionError::DriverUnavailable(t.interface.clone()))
            }
        })
        .await?
    }

    /// Disconnect and drop the driver. Later calls do nothing.
    pub async fn close_driver(&self) -> Result<()> {
        let shared = self.shared.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(mut driver) = lock(&shared.driver).take() {
                driver.disconnect();
                tracing::info!(robot = %shared.target.robot_id, "driver closed");
            }
        })
        .await?;
        Ok(())
    }

    /// Open the driver if needed and launch the poll loop. A second call while
    /// the loop runs does nothing.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.open_driver().await?;

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(poll_loop(
            self.shared.clone(),
            self.events.clone(),
            self.polling.clone(),
            self.interval_ms.clone(),
            self.reconfigured.clone(),
            rx,
        ));
        self.shutdown = Some(tx);
        self.task = Some(task);
        self.state = SessionState::Running;
        tracing::info!(robot = %self.shared.target.robot_id, "telemetry session started");
        Ok(())
    }

    /// Stop the loop, wait for it to finish and close the driver. No driver
    /// access happens after this returns. Safe to call repeatedly.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(robot = %self.shared.target.robot_id, error = %e, "poll loop ended abnormally");
            }
        }
        self.close_driver().await?;
        if self.state != SessionState::Stopped {
            tracing::info!(robot = %self.shared.target.robot_id, "telemetry session stopped");
        }
        self.state = SessionState::Stopped;
        Ok(())
    }

    /// Move one motor, clamped to its calibrated range.
    pub async fn set_position(&self, id: MotorId, target: f64, speed: Option<f64>) -> Result<CommandAck> {
        self.set_positions(vec![(id, target)], speed).await
    }

    /// Move several motors. Nothing is sent unless every motor is calibrated.
    pub async fn set_positions(&self, targets: Vec<(MotorId, f64)>, speed: Option<f64>) -> Result<CommandAck> {
        let mut clamped = Vec::with_capacity(targets.len());
        for (id, value) in targets {
            let Some(cal) = self.shared.target.motor(&id).and_then(|m| m.calibration) else {
                return Ok(CommandAck::failed(format!("motor {id} is not calibrated")));
            };
            clamped.push((id, cal.clamp(value)));
        }
        self.run_on_driver(move |driver| {
            let mut rejected = Vec::new();
            for (id, value) in &clamped {
                match driver.set_position(id, *value, speed) {
                    Ok(true) => {}
                    Ok(false) => rejected.push(id.to_string()),
                    Err(e) => rejected.push(format!("{id} ({e})")),
                }
            }
            if rejected.is_empty() {
                CommandAck::ok()
            } else {
                CommandAck::failed(format!("no acknowledgement from {}", rejected.join(", ")))
            }
        })
        .await
    }

    /// Torque on or off for one motor; needs no calibration.
    pub async fn set_torque(&self, id: MotorId, enabled: bool) -> Result<CommandAck> {
        if self.shared.target.motor(&id).is_none() {
            return Ok(CommandAck::failed(format!("motor {id} is not part of this session")));
        }
        self.run_on_driver(move |driver| match driver.set_torque(&id, enabled) {
            Ok(true) => CommandAck::ok(),
            Ok(false) => CommandAck::failed(format!("no acknowledgement from {id}")),
            Err(e) => CommandAck::failed(e.to_string()),
        })
        .await
    }

    /// Cut torque on every target motor, calibrated or not, and announce it.
    pub async fn emergency_stop(&self) -> Result<CommandAck> {
        let ids = self.shared.target.ids();
        let for_driver = ids.clone();
        let ack = self
            .run_on_driver(move |driver| {
                if matches!(driver.bulk_set_torque(&for_driver, false), Ok(true)) {
                    return CommandAck::ok();
                }
                // Bulk write unacknowledged: retry motor by motor.
                let failed: Vec<String> = for_driver
                    .iter()
                    .filter(|id| !matches!(driver.set_torque(id, false), Ok(true)))
                    .map(ToString::to_string)
                    .collect();
                if failed.is_empty() {
                    CommandAck::ok()
                } else {
                    CommandAck::failed(format!("torque still on for {}", failed.join(", ")))
                }
            })
            .await?;
        self.shared.count(|m| &m.emergency_stops, 1);
        tracing::warn!(robot = %self.shared.target.robot_id, success = ack.success, "emergency stop");
        let _ = self.events.send(SessionEvent::EmergencyStop {
            robot_id: self.shared.target.robot_id.clone(),
            timestamp: OffsetDateTime::now_utc(),
            motors: ids,
            success: ack.success,
        });
        Ok(ack)
    }

    async fn run_on_driver<F>(&self, f: F) -> Result<CommandAck>
    where
        F: FnOnce(&mut dyn MotorDriver) -> CommandAck + Send + 'static,
    {
        let shared = self.shared.clone();
        let ack = tokio::task::spawn_blocking(move || match lock(&shared.driver).as_mut() {
            Some(driver) => f(driver.as_mut()),
            None => CommandAck::failed("driver is not open"),
        })
        .await?;
        Ok(ack)
    }
}

impl Drop for TelemetrySession {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
    }
}

async fn poll_loop(
    shared: Arc<Shared>,
    events: broadcast::Sender<SessionEvent>,
    polling: Arc<AtomicBool>,
    interval_ms: Arc<AtomicU64>,
    reconfigured: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let robot_id = shared.target.robot_id.clone();
    loop {
        let interval = Duration::from_millis(interval_ms.load(Ordering::Relaxed));
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = reconfigured.notified() => continue,
            _ = tokio::time::sleep(interval) => {}
        }
        if *shutdown.borrow() {
            break;
        }
        if !polling.load(Ordering::Relaxed) {
            continue;
        }

        let worker = shared.clone();
        let tick = match tokio::task::spawn_blocking(move || worker.tick()).await {
            Ok(Ok(tick)) => tick,
            Ok(Err(e)) => {
                tracing::warn!(robot = %robot_id, error = %e, "poll tick skipped");
                continue;
            }
            Err(e) => {
                tracing::error!(robot = %robot_id, error = %e, "poll tick panicked");
                continue;
            }
        };

        shared.count(|m| &m.poll_ticks, 1);
        if tick.failed > 0 {
            shared.count(|m| &m.failed_reads, tick.failed);
        }
        if !tick.trips.is_empty() {
            shared.count(|m| &m.protection_trips, tick.trips.len() as u64);
        }

        let timestamp = OffsetDateTime::now_utc();
        // Send fails only when nobody is subscribed.
        let _ = events.send(SessionEvent::Telemetry {
            robot_id: robot_id.clone(),
            timestamp,
            motors: tick.readings,
        });
        for trip in tick.trips {
            let _ = events.send(SessionEvent::EmergencyProtection {
                robot_id: robot_id.clone(),
                timestamp,
                motor: trip.motor,
                id: trip.id,
                violations: trip.violations,
                torque_disabled: trip.torque_disabled,
            });
        }
    }
    tracing::debug!(robot = %robot_id, "poll loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetMotor;
    use motor_bus::mock::{MockCall, MockDriver, MockHandle};
    use motor_bus::{Brand, DefaultMotorService, ModelCatalog, Telemetry};
    use robot_manager::MotorCalibration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn target(calibrated: bool) -> SessionTarget {
        let motors = (1..=2)
            .map(|n| TargetMotor {
                name: format!("joint_{n}"),
                id: MotorId::Simple(n),
                model: "STS3215".to_string(),
                variant: None,
                overrides: Vec::new(),
                calibration: calibrated.then_some(MotorCalibration {
                    id: MotorId::Simple(n),
                    drive_mode: 0,
                    homing_offset: 0,
                    range_min: 1000.0,
                    range_max: 3000.0,
                }),
            })
            .collect();
        SessionTarget {
            robot_id: "arm".to_string(),
            bus: "main".to_string(),
            interface: "mock0".to_string(),
            brand: Brand::Feetech,
            baudrate: Some(1_000_000),
            motors,
        }
    }

    fn nominal() -> Telemetry {
        Telemetry {
            voltage: Some(7.4),
            current: Some(40.0),
            temperature: 35.0,
            ..Default::default()
        }
    }

    fn overheated() -> Telemetry {
        Telemetry {
            temperature: 90.0,
            ..nominal()
        }
    }

    fn hardware() -> MockHandle {
        let hw = MockHandle::default();
        let sts = ModelCatalog::builtin().lookup(Brand::Feetech, 3215).unwrap().clone();
        for n in 1..=2 {
            hw.add_motor(MotorId::Simple(n), sts.clone());
            hw.set_reading(MotorId::Simple(n), nominal());
        }
        hw
    }

    fn session(hw: &MockHandle, calibrated: bool, config: SessionConfig) -> TelemetrySession {
        let driver = MockDriver::new(Brand::Feetech, "mock0", 1_000_000, hw.clone());
        TelemetrySession::with_driver(
            target(calibrated),
            Arc::new(DefaultMotorService::default()),
            Box::new(driver),
            config,
        )
    }

    fn fast() -> SessionConfig {
        SessionConfig {
            poll_interval_ms: 2,
            ..Default::default()
        }
    }

    /// Collect events until `ticks` telemetry snapshots have arrived.
    async fn collect(rx: &mut broadcast::Receiver<SessionEvent>, ticks: usize) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        let mut seen = 0;
        while seen < ticks {
            let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            if matches!(event, SessionEvent::Telemetry { .. }) {
                seen += 1;
            }
            out.push(event);
        }
        out
    }

    fn trips(events: &[SessionEvent]) -> Vec<(MotorId, bool)> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::EmergencyProtection { id, torque_disabled, .. } => Some((*id, *torque_disabled)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn protection_is_edge_triggered() {
        let hw = hardware();
        let id = MotorId::Simple(1);
        for reading in [overheated(), overheated(), overheated(), nominal(), overheated(), overheated()] {
            hw.push_reading(id, Some(reading));
        }
        let mut s = session(&hw, false, fast());
        let mut rx = s.subscribe();
        s.start().await.unwrap();
        let events = collect(&mut rx, 8).await;
        s.stop().await.unwrap();

        assert_eq!(trips(&events), vec![(id, true), (id, true)]);
        assert_eq!(hw.torque_calls(&id), vec![false, false]);
        assert!(hw.torque_calls(&MotorId::Simple(2)).is_empty());
    }

    #[tokio::test]
    async fn failed_reads_do_not_reset_the_trigger() {
        let hw = hardware();
        let id = MotorId::Simple(1);
        hw.push_reading(id, Some(overheated()));
        hw.push_reading(id, None);
        hw.push_reading(id, Some(overheated()));
        let mut s = session(&hw, false, fast());
        let mut rx = s.subscribe();
        s.start().await.unwrap();
        let events = collect(&mut rx, 5).await;
        s.stop().await.unwrap();

        assert_eq!(trips(&events).len(), 1);
        assert_eq!(hw.torque_calls(&id), vec![false]);
    }

    #[tokio::test]
    async fn warnings_do_not_rearm_the_trigger() {
        let hw = hardware();
        let id = MotorId::Simple(1);
        let warm = Telemetry {
            temperature: 66.0,
            ..nominal()
        };
        for reading in [overheated(), warm, overheated()] {
            hw.push_reading(id, Some(reading));
        }
        let mut s = session(&hw, false, fast());
        let mut rx = s.subscribe();
        s.start().await.unwrap();
        let events = collect(&mut rx, 5).await;
        s.stop().await.unwrap();

        assert_eq!(trips(&events).len(), 1);
        assert_eq!(hw.torque_calls(&id), vec![false]);
    }

    #[tokio::test]
    async fn shorter_interval_wakes_a_sleeping_loop() {
        let hw = hardware();
        let mut s = session(
            &hw,
            false,
            SessionConfig {
                poll_interval_ms: 600_000,
                ..Default::default()
            },
        );
        let mut rx = s.subscribe();
        s.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        s.set_poll_interval_ms(2);
        let events = collect(&mut rx, 2).await;
        s.stop().await.unwrap();

        assert_eq!(s.poll_interval_ms(), 2);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Telemetry { .. })));
    }

    #[tokio::test]
    async fn idle_subscriber_lags_without_stalling_the_loop() {
        let hw = hardware();
        let mut s = session(
            &hw,
            false,
            SessionConfig {
                poll_interval_ms: 5,
                queue_capacity: 2,
                ..Default::default()
            },
        );
        let mut idle = s.subscribe();
        let mut active = s.subscribe();
        s.start().await.unwrap();

        let mut seen = 0;
        while seen < 6 {
            let event = timeout(WAIT, active.recv()).await.unwrap();
            assert!(!matches!(event, Err(broadcast::error::RecvError::Closed)));
            if matches!(event, Ok(SessionEvent::Telemetry { .. })) {
                seen += 1;
            }
        }
        assert!(s.is_running());
        s.stop().await.unwrap();

        assert!(matches!(idle.recv().await, Err(broadcast::error::RecvError::Lagged(_))));
        assert!(matches!(idle.recv().await, Ok(SessionEvent::Telemetry { .. })));
    }

    #[tokio::test]
    async fn failing_disable_still_reports_and_keeps_polling() {
        let hw = hardware();
        hw.torque_fault(true);
        hw.push_reading(MotorId::Simple(2), Some(overheated()));
        let mut s = session(&hw, false, fast());
        let mut rx = s.subscribe();
        s.start().await.unwrap();
        let events = collect(&mut rx, 4).await;
        s.stop().await.unwrap();

        assert_eq!(trips(&events), vec![(MotorId::Simple(2), false)]);
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let hw = hardware();
        let mut s = session(&hw, false, fast());
        let mut a = s.subscribe();
        let mut b = s.subscribe();
        s.start().await.unwrap();
        let first_a = timeout(WAIT, a.recv()).await.unwrap().unwrap();
        let first_b = timeout(WAIT, b.recv()).await.unwrap().unwrap();
        s.stop().await.unwrap();
        assert_eq!(first_a, first_b);
        let motors = match first_a {
            SessionEvent::Telemetry { motors, .. } => motors,
            _ => Vec::new(),
        };
        assert_eq!(motors.len(), 2);
        assert!(motors.iter().all(|m| m.reading.status == ProtectionStatus::Ok));
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let hw = hardware();
        let mut s = session(&hw, false, fast());
        s.start().await.unwrap();
        s.start().await.unwrap();
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(hw.count(&MockCall::Connect), 1);

        s.stop().await.unwrap();
        s.stop().await.unwrap();
        s.close_driver().await.unwrap();
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(!s.is_running());
        assert_eq!(hw.count(&MockCall::Disconnect), 1);

        let reads = hw.count(&MockCall::ReadTelemetry(MotorId::Simple(1)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hw.count(&MockCall::ReadTelemetry(MotorId::Simple(1))), reads);
    }

    #[tokio::test]
    async fn polling_toggles_without_restart() {
        let hw = hardware();
        let config = SessionConfig {
            start_polling: false,
            ..fast()
        };
        let mut s = session(&hw, false, config);
        let mut rx = s.subscribe();
        s.start().await.unwrap();
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());

        s.set_poll_interval_ms(1);
        s.enable_polling();
        assert!(matches!(
            timeout(WAIT, rx.recv()).await.unwrap().unwrap(),
            SessionEvent::Telemetry { .. }
        ));
        s.stop().await.unwrap();
    }

    #[tokio::test]
    async fn positions_need_calibration() {
        let hw = hardware();
        let s = session(&hw, false, fast());
        s.open_driver().await.unwrap();
        let ack = s.set_position(MotorId::Simple(1), 2000.0, None).await.unwrap();
        assert!(!ack.success);
        assert!(ack.message.unwrap().contains("not calibrated"));
        assert_eq!(hw.count(&MockCall::SetPosition(MotorId::Simple(1), 2000.0)), 0);

        assert!(s.set_torque(MotorId::Simple(1), true).await.unwrap().success);
        assert!(!s.set_torque(MotorId::Simple(9), true).await.unwrap().success);
    }

    #[tokio::test]
    async fn positions_are_clamped_to_calibration() {
        let hw = hardware();
        let s = session(&hw, true, fast());
        s.open_driver().await.unwrap();
        let ack = s
            .set_positions(vec![(MotorId::Simple(1), 3500.0), (MotorId::Simple(2), 1500.0)], None)
            .await
            .unwrap();
        assert!(ack.success);
        assert_eq!(hw.count(&MockCall::SetPosition(MotorId::Simple(1), 3000.0)), 1);
        assert_eq!(hw.count(&MockCall::SetPosition(MotorId::Simple(2), 1500.0)), 1);
    }

    #[tokio::test]
    async fn emergency_stop_ignores_calibration() {
        let hw = hardware();
        let s = session(&hw, false, fast());
        let mut rx = s.subscribe();
        s.open_driver().await.unwrap();
        let ack = s.emergency_stop().await.unwrap();
        assert!(ack.success);
        assert_eq!(hw.torque_calls(&MotorId::Simple(1)), vec![false]);
        assert_eq!(hw.torque_calls(&MotorId::Simple(2)), vec![false]);
        let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SessionEvent::EmergencyStop { success: true, .. }));
    }

    #[tokio::test]
    async fn commands_without_a_driver_fail_softly() {
        let hw = hardware();
        let s = session(&hw, true, fast());
        s.close_driver().await.unwrap();
        let ack = s.set_position(MotorId::Simple(1), 2000.0, None).await.unwrap();
        assert_eq!(ack, CommandAck::failed("driver is not open"));
    }
}

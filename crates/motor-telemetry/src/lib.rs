//! motor-telemetry: live telemetry sessions over one motor bus
//!
//! A [`TelemetrySession`] owns one open driver, polls its motors on a tokio task,
//! classifies every reading through a [`motor_bus::MotorService`] and cuts torque
//! the first time a motor turns CRITICAL. Subscribers receive [`SessionEvent`]s
//! over independent bounded queues.

mod error;
pub use error::{Result, SessionError};

mod events;
pub use events::{CommandAck, MotorReading, SessionEvent};

mod target;
pub use target::{SessionTarget, TargetMotor};

mod metrics;
pub use metrics::{MetricsHub, SessionMetrics};

mod session;
pub use session::{SessionConfig, SessionState, TelemetrySession};

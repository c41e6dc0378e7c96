use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Session counters, labelled by robot id.
#[derive(Clone)]
pub struct SessionMetrics {
    pub poll_ticks: IntCounterVec,
    pub failed_reads: IntCounterVec,
    pub protection_trips: IntCounterVec,
    pub emergency_stops: IntCounterVec,
}

impl SessionMetrics {
    pub fn new() -> Result<Self, String> {
        let counter = |name: &str, help: &str| {
            IntCounterVec::new(Opts::new(name, help), &["robot"]).map_err(|e| format!("metrics init error: {e}"))
        };
        Ok(Self {
            poll_ticks: counter("sr_telemetry_poll_ticks", "Telemetry poll iterations")?,
            failed_reads: counter("sr_telemetry_failed_reads", "Motor reads that returned nothing")?,
            protection_trips: counter("sr_protection_trips", "Torque disables triggered by protection")?,
            emergency_stops: counter("sr_emergency_stops", "Emergency stops issued")?,
        })
    }
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub session: SessionMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let session = SessionMetrics::new()?;
        let _ = registry.register(Box::new(session.poll_ticks.clone()));
        let _ = registry.register(Box::new(session.failed_reads.clone()));
        let _ = registry.register(Box::new(session.protection_trips.clone()));
        let _ = registry.register(Box::new(session.emergency_stops.clone()));
        Ok(Self { registry, session })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_with_robot_label() {
        let hub = MetricsHub::new().unwrap();
        hub.session.protection_trips.with_label_values(&["arm-1"]).inc();
        let text = hub.encode_text();
        assert!(text.contains("sr_protection_trips{robot=\"arm-1\"} 1"));
    }
}

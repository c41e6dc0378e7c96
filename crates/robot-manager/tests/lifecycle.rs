use motor_bus::mock::{MockBusFactory, MockHandle, MockTransports};
use motor_bus::{Brand, BusKind, DiscoveryService, LimitKind, ModelCatalog, MotorId, MotorLimit, MotorModelInfo};
use robot_manager::{
    DefinitionCatalog, ErrorKind, ManagerConfig, ProtectionKey, Robot, RobotManager, RobotStatus, RobotStore,
    RobotUpdate,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const PORT: &str = "/dev/ttyACM0";

fn model(brand: Brand, model_id: u32) -> MotorModelInfo {
    ModelCatalog::builtin().lookup(brand, model_id).unwrap().clone()
}

fn manager(path: &Path, transports: MockTransports, factory: &MockBusFactory) -> RobotManager {
    RobotManager::open(
        ManagerConfig::default(),
        RobotStore::new(path),
        DiscoveryService::new(Arc::new(transports), Arc::new(factory.clone())),
        DefinitionCatalog::builtin(),
    )
    .unwrap()
}

fn feetech_arm(factory: &MockBusFactory) -> MockHandle {
    let hw = MockHandle::default();
    for n in 1..=6 {
        hw.add_motor(MotorId::Simple(n), model(Brand::Feetech, 3215));
    }
    factory.attach(PORT, BusKind::Feetech, 1_000_000, hw.clone());
    hw
}

/// Discover the only pending device and register it under a new name.
fn adopt_pending(m: &mut RobotManager) -> Robot {
    let pending = m.get_pending_devices().unwrap();
    assert_eq!(pending.len(), 1);
    m.add_robot(Robot::new(pending[0].id.clone(), "bench arm")).unwrap()
}

#[test]
fn anchored_robot_survives_going_offline() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("robots.json");
    let factory = MockBusFactory::default();
    feetech_arm(&factory);
    let transports = MockTransports::default().with_serial(PORT, Some("SN-A"), Some("QinHeng"));
    let mut m = manager(&path, transports.clone(), &factory);

    let robot = adopt_pending(&mut m);
    assert_eq!(robot.status, RobotStatus::Available);
    assert!(!robot.is_transient);
    assert_eq!(robot.motor_bus_connections["main"].serial_number.as_deref(), Some("SN-A"));

    // The claimed bus is no longer offered.
    assert!(m.get_pending_devices()?.is_empty());

    let refreshed = m.refresh_status(Some(&robot.id))?;
    assert_eq!(refreshed[0].status, RobotStatus::Available);

    factory.detach(PORT);
    let refreshed = m.refresh_status(None)?;
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].status, RobotStatus::Offline);

    // Persisted across restarts.
    let reopened = manager(&path, transports, &factory);
    assert_eq!(reopened.get_robot(&robot.id)?.status, RobotStatus::Offline);
    Ok(())
}

#[test]
fn transient_robot_is_dropped_when_its_bus_disappears() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let factory = MockBusFactory::default();
    feetech_arm(&factory);
    let mut m = manager(
        &dir.path().join("robots.json"),
        MockTransports::default().with_serial(PORT, None, None),
        &factory,
    );

    let robot = adopt_pending(&mut m);
    assert!(robot.is_transient);

    factory.detach(PORT);
    assert!(m.refresh_status(Some(&robot.id))?.is_empty());
    let err = m.get_robot(&robot.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[test]
fn swapped_motor_marks_robot_invalid() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let factory = MockBusFactory::default();
    let hw = feetech_arm(&factory);
    let mut m = manager(
        &dir.path().join("robots.json"),
        MockTransports::default().with_serial(PORT, Some("SN-B"), None),
        &factory,
    );
    let robot = adopt_pending(&mut m);

    hw.add_motor(MotorId::Simple(6), model(Brand::Feetech, 3250));
    let refreshed = m.refresh_status(Some(&robot.id))?;
    assert_eq!(refreshed[0].status, RobotStatus::Invalid);

    let err = m.verify_registered(&robot.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(m.get_robot(&robot.id)?.status, RobotStatus::Invalid);
    Ok(())
}

#[test]
fn can_arm_is_keyed_by_send_recv_pairs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let factory = MockBusFactory::default();
    let hw = MockHandle::default();
    hw.add_motor(MotorId::SendRecv(0x01, 0x11), model(Brand::Damiao, 54));
    hw.add_motor(MotorId::SendRecv(0x02, 0x12), model(Brand::Damiao, 54));
    factory.attach("can0", BusKind::Damiao, 1_000_000, hw);
    let mut m = manager(
        &dir.path().join("robots.json"),
        MockTransports::default().with_can("can0", Some("CANable")),
        &factory,
    );

    let pending = m.get_pending_devices()?;
    assert_eq!(pending.len(), 1);
    let bus = &pending[0].definition.as_ref().unwrap().motor_buses["main"];
    let ids: Vec<MotorId> = bus.motors.values().map(|d| d.id).collect();
    assert_eq!(ids, vec![MotorId::SendRecv(0x01, 0x11), MotorId::SendRecv(0x02, 0x12)]);
    assert_eq!(bus.motors["000"].recv_id(), 0x11);
    assert!(factory.attempts().iter().all(|(kind, _, _)| *kind == BusKind::Damiao));
    Ok(())
}

#[test]
fn protection_overrides_round_trip_through_the_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("robots.json");
    let factory = MockBusFactory::default();
    let mut m = manager(&path, MockTransports::default(), &factory);
    m.add_robot(Robot::new("virtual", "sim"))?;

    let key = ProtectionKey::new(Brand::Dynamixel, "XL330", Some("M077"));
    let settings = BTreeMap::from([(key.clone(), vec![MotorLimit::new(LimitKind::TemperatureMax, 50.0)])]);
    m.update_robot(
        "virtual",
        RobotUpdate {
            custom_protection_settings: Some(settings.clone()),
            ..Default::default()
        },
    )?;

    let reopened = manager(&path, MockTransports::default(), &factory);
    let robot = reopened.get_robot("virtual")?;
    assert_eq!(robot.custom_protection_settings, settings);
    assert_eq!(robot.protection_overrides(Brand::Dynamixel, "XL330", Some("M077")).len(), 1);
    Ok(())
}

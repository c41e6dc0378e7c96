use crate::types::MotorBusDefinition;
use motor_bus::{MotorBus, MotorId, MotorModelInfo};
use std::collections::BTreeSet;

/// True when the bus registry holds exactly the motors `def` declares.
///
/// Both sides must carry the same set of ids; a definition repeating an id
/// never covers a second motor on the bus.
///
/// Ids must match by shape as well as value: `Simple(1)` never matches
/// `SendRecv(1, 0x11)`. Brand and model compare case-insensitively; an unset
/// variant in the definition accepts any reported variant.
pub fn verify_motor_bus(bus: &MotorBus, def: &MotorBusDefinition) -> bool {
    let registry = bus.motors();
    if registry.len() != def.motors.len() {
        tracing::debug!(found = registry.len(), expected = def.motors.len(), "motor count mismatch");
        return false;
    }
    let expected_ids: BTreeSet<&MotorId> = def.motors.values().map(|m| &m.id).collect();
    if !expected_ids.iter().copied().eq(registry.keys()) {
        tracing::debug!(expected = ?expected_ids, found = ?registry.keys().collect::<Vec<_>>(), "motor id set mismatch");
        return false;
    }
    def.motors.values().all(|expected| {
        let Some(found) = registry.get(&expected.id) else {
            tracing::debug!(id = %expected.id, slot = %expected.name, "motor missing");
            return false;
        };
        let ok = found.handle.brand == expected.brand
            && model_matches(&found.model, &expected.model, expected.variant.as_deref());
        if !ok {
            tracing::debug!(
                id = %expected.id,
                expected = %expected.model,
                found = %found.model.full_name(),
                "motor model mismatch"
            );
        }
        ok
    })
}

fn model_matches(found: &MotorModelInfo, model: &str, variant: Option<&str>) -> bool {
    found.model.eq_ignore_ascii_case(model)
        && match variant {
            None => true,
            Some(v) => found.variant.as_deref().is_some_and(|f| f.eq_ignore_ascii_case(v)),
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RobotMotorDefinition;
    use motor_bus::mock::{MockDriver, MockHandle};
    use motor_bus::{Brand, BusKind, ModelCatalog, MotorHandle, MotorId};
    use std::collections::BTreeMap;

    fn info(brand: Brand, model_id: u32) -> MotorModelInfo {
        ModelCatalog::builtin().lookup(brand, model_id).unwrap().clone()
    }

    fn bus_with(brand: Brand, motors: &[(MotorId, MotorModelInfo)]) -> MotorBus {
        let kind = BusKind::from(brand);
        let mut bus = MotorBus::new(kind, Box::new(MockDriver::new(brand, "mock0", 1_000_000, MockHandle::default())));
        for (id, model) in motors {
            bus.register_motor(*id, MotorHandle { brand, address: *id }, model.clone());
        }
        bus
    }

    fn def(motors: &[(MotorId, Brand, &str, Option<&str>)]) -> MotorBusDefinition {
        MotorBusDefinition {
            bus_type: "test".to_string(),
            motors: motors
                .iter()
                .enumerate()
                .map(|(i, (id, brand, model, variant))| {
                    (
                        i.to_string(),
                        RobotMotorDefinition {
                            name: format!("m{i}"),
                            id: *id,
                            brand: *brand,
                            model: model.to_string(),
                            variant: variant.map(str::to_string),
                            drive_mode: 0,
                            need_calibration: true,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
            baud_rate: None,
        }
    }

    #[test]
    fn exact_match_with_variant_wildcard() {
        let bus = bus_with(
            Brand::Dynamixel,
            &[(MotorId::Simple(1), info(Brand::Dynamixel, 1190)), (MotorId::Simple(2), info(Brand::Dynamixel, 1200))],
        );
        assert!(verify_motor_bus(
            &bus,
            &def(&[
                (MotorId::Simple(1), Brand::Dynamixel, "xl330", Some("m077")),
                (MotorId::Simple(2), Brand::Dynamixel, "XL330", None),
            ])
        ));
        assert!(!verify_motor_bus(
            &bus,
            &def(&[
                (MotorId::Simple(1), Brand::Dynamixel, "XL330", Some("M288")),
                (MotorId::Simple(2), Brand::Dynamixel, "XL330", None),
            ])
        ));
    }

    #[test]
    fn count_and_brand_mismatches_fail() {
        let bus = bus_with(Brand::Feetech, &[(MotorId::Simple(1), info(Brand::Feetech, 3215))]);
        assert!(!verify_motor_bus(&bus, &def(&[])));
        assert!(!verify_motor_bus(
            &bus,
            &def(&[
                (MotorId::Simple(1), Brand::Feetech, "STS3215", None),
                (MotorId::Simple(2), Brand::Feetech, "STS3215", None),
            ])
        ));
        assert!(!verify_motor_bus(&bus, &def(&[(MotorId::Simple(1), Brand::Dynamixel, "STS3215", None)])));
        assert!(verify_motor_bus(&bus, &def(&[(MotorId::Simple(1), Brand::Feetech, "STS3215", None)])));
    }

    #[test]
    fn repeated_definition_id_does_not_cover_another_motor() {
        let sts = info(Brand::Feetech, 3215);
        let bus = bus_with(Brand::Feetech, &[(MotorId::Simple(1), sts.clone()), (MotorId::Simple(2), sts)]);
        assert!(!verify_motor_bus(
            &bus,
            &def(&[
                (MotorId::Simple(1), Brand::Feetech, "STS3215", None),
                (MotorId::Simple(1), Brand::Feetech, "STS3215", None),
            ])
        ));
    }

    #[test]
    fn id_shapes_never_coerce() {
        let dm = info(Brand::Damiao, 10);
        let paired = bus_with(Brand::Damiao, &[(MotorId::SendRecv(1, 0x11), dm.clone())]);
        assert!(!verify_motor_bus(&paired, &def(&[(MotorId::Simple(1), Brand::Damiao, "DM4310", None)])));
        assert!(verify_motor_bus(&paired, &def(&[(MotorId::SendRecv(1, 0x11), Brand::Damiao, "DM4310", None)])));

        let plain = bus_with(Brand::Damiao, &[(MotorId::Simple(1), dm)]);
        assert!(!verify_motor_bus(&plain, &def(&[(MotorId::SendRecv(1, 0x11), Brand::Damiao, "DM4310", None)])));
    }
}

//! Built-in motor model tables.
//!
//! Units follow each driver's telemetry: volts, degrees Celsius, and current as
//! the raw present-current register value (no LSB scaling). Damiao motors expose no
//! model-number register, so their table is keyed by the integer part of the
//! TMAX register (peak torque in N·m), which differs per model.

use crate::{Brand, LimitKind, MotorLimit, MotorModelInfo};
use std::collections::{BTreeMap, BTreeSet};

const DYNAMIXEL_BAUDRATES: [u32; 7] = [
    57_600, 1_000_000, 115_200, 2_000_000, 3_000_000, 4_000_000, 9_600,
];
const FEETECH_BAUDRATES: [u32; 8] = [
    1_000_000, 500_000, 250_000, 128_000, 115_200, 57_600, 38_400, 19_200,
];
const DAMIAO_BITRATES: [u32; 1] = [1_000_000];

struct Entry {
    model: &'static str,
    variant: Option<&'static str>,
    ids: &'static [u32],
    gear_ratio: f64,
    limits: &'static [(LimitKind, f64)],
}

pub(crate) fn builtin_table(brand: Brand) -> Vec<MotorModelInfo> {
    match brand {
        Brand::Dynamixel => dynamixel(),
        Brand::Feetech => feetech(),
        Brand::Damiao => damiao(),
    }
}

fn build(
    brand: Brand,
    entries: &[Entry],
    encoder_resolution: u32,
    position_scale: f64,
    baudrates: &[u32],
    modes: &[&str],
) -> Vec<MotorModelInfo> {
    entries
        .iter()
        .map(|e| MotorModelInfo {
            model: e.model.to_string(),
            model_ids: e.ids.iter().copied().collect(),
            variant: e.variant.map(str::to_string),
            limits: e
                .limits
                .iter()
                .map(|&(kind, value)| (kind, MotorLimit::new(kind, value)))
                .collect::<BTreeMap<_, _>>(),
            brand,
            encoder_resolution,
            position_scale,
            gear_ratio: e.gear_ratio,
            direction_inverted: false,
            baudrates: baudrates.to_vec(),
            operating_modes: modes.iter().map(|m| m.to_string()).collect::<BTreeSet<_>>(),
        })
        .collect()
}

fn dynamixel() -> Vec<MotorModelInfo> {
    use LimitKind::*;
    const XL330: &[(LimitKind, f64)] = &[
        (VoltageMin, 3.7),
        (VoltageMax, 6.0),
        (CurrentMax, 400.0),
        (TemperatureMax, 70.0),
        (PositionMin, 0.0),
        (PositionMax, 4095.0),
    ];
    const XC330: &[(LimitKind, f64)] = &[
        (VoltageMin, 3.7),
        (VoltageMax, 13.0),
        (CurrentMax, 900.0),
        (TemperatureMax, 70.0),
        (PositionMin, 0.0),
        (PositionMax, 4095.0),
    ];
    const XL430: &[(LimitKind, f64)] = &[
        (VoltageMin, 6.5),
        (VoltageMax, 12.0),
        (TemperatureMax, 72.0),
        (PositionMin, 0.0),
        (PositionMax, 4095.0),
    ];
    const XM430: &[(LimitKind, f64)] = &[
        (VoltageMin, 10.0),
        (VoltageMax, 14.8),
        (CurrentMax, 1193.0),
        (TemperatureMax, 80.0),
        (PositionMin, 0.0),
        (PositionMax, 4095.0),
    ];
    let entries = [
        Entry { model: "XL330", variant: Some("M077"), ids: &[1190], gear_ratio: 77.0, limits: XL330 },
        Entry { model: "XL330", variant: Some("M288"), ids: &[1200], gear_ratio: 288.0, limits: XL330 },
        Entry { model: "XC330", variant: Some("T181"), ids: &[1210], gear_ratio: 181.0, limits: XC330 },
        Entry { model: "XC330", variant: Some("T288"), ids: &[1220], gear_ratio: 288.0, limits: XC330 },
        Entry { model: "XL430", variant: Some("W250"), ids: &[1060], gear_ratio: 258.5, limits: XL430 },
        Entry { model: "XM430", variant: Some("W210"), ids: &[1030], gear_ratio: 212.6, limits: XM430 },
        Entry { model: "XM430", variant: Some("W350"), ids: &[1020], gear_ratio: 353.5, limits: XM430 },
        Entry { model: "XH430", variant: Some("W350"), ids: &[1010], gear_ratio: 353.5, limits: XM430 },
    ];
    build(
        Brand::Dynamixel,
        &entries,
        4096,
        360.0 / 4096.0,
        &DYNAMIXEL_BAUDRATES,
        &["current", "velocity", "position", "extended_position", "current_based_position", "pwm"],
    )
}

fn feetech() -> Vec<MotorModelInfo> {
    use LimitKind::*;
    const STS3215: &[(LimitKind, f64)] = &[
        (VoltageMin, 6.0),
        (VoltageMax, 8.4),
        (CurrentMax, 150.0),
        (TemperatureMax, 70.0),
        (PositionMin, 0.0),
        (PositionMax, 4095.0),
    ];
    const STS3250: &[(LimitKind, f64)] = &[
        (VoltageMin, 9.0),
        (VoltageMax, 12.6),
        (CurrentMax, 300.0),
        (TemperatureMax, 70.0),
        (PositionMin, 0.0),
        (PositionMax, 4095.0),
    ];
    // Every STS3215 gearing reports firmware model 777.
    let entries = [
        Entry { model: "STS3215", variant: None, ids: &[3215], gear_ratio: 345.0, limits: STS3215 },
        Entry { model: "STS3215", variant: Some("C001"), ids: &[777], gear_ratio: 345.0, limits: STS3215 },
        Entry { model: "STS3215", variant: Some("C044"), ids: &[777], gear_ratio: 191.0, limits: STS3215 },
        Entry { model: "STS3215", variant: Some("C046"), ids: &[777], gear_ratio: 147.0, limits: STS3215 },
        Entry { model: "STS3250", variant: None, ids: &[3250], gear_ratio: 345.0, limits: STS3250 },
    ];
    build(
        Brand::Feetech,
        &entries,
        4096,
        360.0 / 4096.0,
        &FEETECH_BAUDRATES,
        &["position", "velocity", "pwm", "step"],
    )
}

fn damiao() -> Vec<MotorModelInfo> {
    use LimitKind::*;
    let entries = [
        Entry {
            model: "DM4310",
            variant: None,
            ids: &[10],
            gear_ratio: 10.0,
            limits: &[(PositionMax, 12.5), (VelocityMax, 30.0), (TorqueMax, 10.0), (TemperatureMax, 80.0)],
        },
        Entry {
            model: "DM4340",
            variant: None,
            ids: &[28],
            gear_ratio: 40.0,
            limits: &[(PositionMax, 12.5), (VelocityMax, 8.0), (TorqueMax, 28.0), (TemperatureMax, 80.0)],
        },
        Entry {
            model: "DM6006",
            variant: None,
            ids: &[12],
            gear_ratio: 6.0,
            limits: &[(PositionMax, 12.5), (VelocityMax, 45.0), (TorqueMax, 12.0), (TemperatureMax, 80.0)],
        },
        Entry {
            model: "DM8009",
            variant: None,
            ids: &[54],
            gear_ratio: 9.0,
            limits: &[(PositionMax, 12.5), (VelocityMax, 45.0), (TorqueMax, 54.0), (TemperatureMax, 80.0)],
        },
        Entry {
            model: "DM3507",
            variant: None,
            ids: &[5],
            gear_ratio: 1.0,
            limits: &[(PositionMax, 12.5), (VelocityMax, 50.0), (TorqueMax, 5.0), (TemperatureMax, 80.0)],
        },
    ];
    build(
        Brand::Damiao,
        &entries,
        65536,
        1.0,
        &DAMIAO_BITRATES,
        &["mit", "pos_vel", "vel"],
    )
}

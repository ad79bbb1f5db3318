//! LSM303AGR against the simulated platform.
//!
//! The accelerometer half holds left-justified x = 0x4000, y = -0x4000,
//! z = 0x1000 and a temperature pair of 0x1A00; the magnetometer half holds
//! x = 100, y = -200, z = 300.

use std::time::Duration;
use upm_core::{
    Accelerometer, Category, CapabilityTable, DriverFactory, Magnetometer, Sensor,
    TemperatureSensor, UpmError,
};
use upm_driver_mock::{chips, MockPlatform, MockRegisterDevice, Transaction};
use upm_driver_st::lsm303agr::{FullScale, MagOdr, PowerMode};
use upm_driver_st::{Lsm303agr, Lsm303agrFactory, Lsm303agrOptions};

const BUS: u32 = 1;

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

fn platform_with(accel: bool, mag: bool) -> MockPlatform {
    let platform = MockPlatform::new();
    if accel {
        platform.add_i2c_device(BUS, 0x19, chips::lsm303agr_accel());
    }
    if mag {
        platform.add_i2c_device(BUS, 0x1e, chips::lsm303agr_mag());
    }
    platform
}

fn compass() -> (MockPlatform, Lsm303agr) {
    let platform = platform_with(true, true);
    let subsystem = platform.subsystem().unwrap();
    let compass = Lsm303agr::init(
        &subsystem,
        BUS,
        Some(0x19),
        Some(0x1e),
        Lsm303agrOptions::default(),
    )
    .unwrap();
    (platform, compass)
}

#[test]
fn update_reads_both_halves() {
    let (_platform, compass) = compass();
    compass.update().unwrap();

    let [x, y, z] = compass.acceleration().unwrap();
    assert!(close(x, 1.00352));
    assert!(close(y, -1.00352));
    assert!(close(z, 0.25088));

    let [mx, my, mz] = compass.magnetic_field().unwrap();
    assert!(close(mx, 15.0));
    assert!(close(my, -30.0));
    assert!(close(mz, 45.0));

    assert!(close(compass.temperature().unwrap(), 51.0));
}

#[test]
fn devinit_register_values() {
    let (platform, _compass) = compass();
    platform
        .with_i2c_device(BUS, 0x19, |d| {
            // ODR 100 Hz, XYZ enabled
            assert_eq!(d.peek(0x20), 0x57);
            // BDU, high resolution, ±2 g
            assert_eq!(d.peek(0x23), 0x88);
            // temperature sensor enabled
            assert_eq!(d.peek(0x1f), 0xc0);
        })
        .unwrap();
    platform
        .with_i2c_device(BUS, 0x1e, |d| {
            // continuous mode, temperature compensation, 10 Hz
            assert_eq!(d.peek(0x60), 0x80);
        })
        .unwrap();
    assert_eq!(
        platform.delays(),
        vec![
            Duration::from_millis(10),
            Duration::from_millis(50),
            Duration::from_millis(10),
            Duration::from_millis(10),
        ]
    );
}

#[test]
fn block_reads_request_auto_increment() {
    let (platform, compass) = compass();
    platform.clear_transactions();
    compass.update().unwrap();

    let reads: Vec<(u8, u8, usize)> = platform
        .transactions()
        .into_iter()
        .filter_map(|t| match t {
            Transaction::I2cRead {
                address,
                register,
                len,
                ..
            } => Some((address, register, len)),
            _ => None,
        })
        .collect();
    assert_eq!(reads, vec![(0x19, 0x8c, 2), (0x19, 0xa8, 6), (0x1e, 0xe8, 6)]);
}

#[test]
fn power_mode_rescales_samples() {
    let (platform, compass) = compass();
    compass.update().unwrap();

    compass.set_power_mode(PowerMode::LowPower).unwrap();
    assert_eq!(compass.power_mode(), PowerMode::LowPower);
    assert!(close(compass.acceleration().unwrap()[0], 1.00032));
    platform
        .with_i2c_device(BUS, 0x19, |d| {
            assert_eq!(d.peek(0x20), 0x5f);
            assert_eq!(d.peek(0x23), 0x80);
        })
        .unwrap();
    assert_eq!(
        platform.with_i2c_device(BUS, 0x1e, |d| d.peek(0x60)),
        Some(0x90)
    );

    compass.set_power_mode(PowerMode::Normal).unwrap();
    compass.set_full_scale(FullScale::G4).unwrap();
    // 0x4000 >> 6 = 256 counts at 7.82 mg
    assert!(close(compass.acceleration().unwrap()[0], 2.00192));
    assert_eq!(
        platform.with_i2c_device(BUS, 0x19, |d| d.peek(0x23)),
        Some(0x90)
    );
}

#[test]
fn odr_and_interrupt_registers() {
    let (platform, compass) = compass();
    compass.set_mag_odr(MagOdr::Hz100).unwrap();
    compass.set_accel_int1_config(0x95).unwrap();
    compass.set_accel_int2_config(0x2a).unwrap();
    compass.set_mag_int_config(0xe5).unwrap();

    assert_eq!(compass.accel_int1_config().unwrap(), 0x95);
    assert_eq!(compass.accel_int2_config().unwrap(), 0x2a);
    assert_eq!(compass.mag_int_config().unwrap(), 0xe5);
    assert_eq!(
        platform.with_i2c_device(BUS, 0x1e, |d| d.peek(0x60)),
        Some(0x8c)
    );

    platform.with_i2c_device(BUS, 0x19, |d| d.poke(0x31, 0x41));
    platform.with_i2c_device(BUS, 0x1e, |d| d.poke(0x64, 0x01));
    assert_eq!(compass.accel_int1_source().unwrap(), 0x41);
    assert_eq!(compass.accel_int2_source().unwrap(), 0x00);
    assert_eq!(compass.mag_int_source().unwrap(), 0x01);
}

#[test]
fn accelerometer_only() {
    let platform = platform_with(true, false);
    let subsystem = platform.subsystem().unwrap();
    let compass =
        Lsm303agr::init(&subsystem, BUS, Some(0x19), None, Lsm303agrOptions::default()).unwrap();
    assert_eq!(platform.open_handles(), 1);

    compass.update().unwrap();
    assert!(close(compass.acceleration().unwrap()[0], 1.00352));
    assert!(matches!(
        compass.magnetic_field(),
        Err(UpmError::NoResources(_))
    ));
    assert!(matches!(
        compass.mag_int_source(),
        Err(UpmError::NoResources(_))
    ));

    compass.close();
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn magnetometer_only() {
    let platform = platform_with(false, true);
    let subsystem = platform.subsystem().unwrap();
    let compass =
        Lsm303agr::init(&subsystem, BUS, None, Some(0x1e), Lsm303agrOptions::default()).unwrap();

    compass.update().unwrap();
    assert!(close(compass.magnetic_field().unwrap()[2], 45.0));
    assert!(matches!(
        compass.acceleration(),
        Err(UpmError::NoResources(_))
    ));
    assert!(matches!(
        compass.temperature(),
        Err(UpmError::NoResources(_))
    ));
    assert!(matches!(
        compass.set_full_scale(FullScale::G8),
        Err(UpmError::NoResources(_))
    ));
}

#[test]
fn both_halves_disabled() {
    let platform = platform_with(true, true);
    let subsystem = platform.subsystem().unwrap();
    let err = Lsm303agr::init(&subsystem, BUS, None, None, Lsm303agrOptions::default())
        .unwrap_err();
    assert!(matches!(err, UpmError::InvalidParameter(_)));
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn magnetometer_id_mismatch_releases_accelerometer() {
    let platform = platform_with(true, false);
    platform.add_i2c_device(BUS, 0x1e, MockRegisterDevice::new().with_register(0x4f, 0x3c));
    let subsystem = platform.subsystem().unwrap();

    let err = Lsm303agr::init(
        &subsystem,
        BUS,
        Some(0x19),
        Some(0x1e),
        Lsm303agrOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        UpmError::ChipIdMismatch {
            driver: "lsm303agr_mag",
            found: 0x3c,
            ..
        }
    ));
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn factory_publishes_all_tables() {
    let platform = platform_with(true, true);
    let subsystem = platform.subsystem().unwrap();
    let config: toml::Value = toml::from_str(
        r#"
        bus = 1
        full_scale = "g8"
        power_mode = "high_resolution"
        "#,
    )
    .unwrap();

    Lsm303agrFactory.validate(&config).unwrap();
    let components = Lsm303agrFactory.build(&subsystem, config).unwrap();
    assert_eq!(
        components.capabilities(),
        vec![
            Category::Sensor,
            Category::Temperature,
            Category::Accelerometer,
            Category::Magnetometer
        ]
    );

    components.sensor.update().unwrap();
    match components.table(Category::Magnetometer) {
        Some(CapabilityTable::Magnetometer(m)) => {
            assert!(close(m.magnetic_field().unwrap()[1], -30.0))
        }
        other => panic!("unexpected table: {other:?}"),
    }
    match components.table(Category::Accelerometer) {
        // 1024 counts at 3.9 mg
        Some(CapabilityTable::Accelerometer(a)) => {
            assert!(close(a.acceleration().unwrap()[0], 3.9936))
        }
        other => panic!("unexpected table: {other:?}"),
    }
}

#[test]
fn factory_rejects_both_halves_disabled() {
    let config: toml::Value =
        toml::from_str("accelerometer = false\nmagnetometer = false").unwrap();
    assert!(Lsm303agrFactory.validate(&config).is_err());
}

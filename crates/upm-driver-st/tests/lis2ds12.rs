//! LIS2DS12 against the simulated platform.
//!
//! The mock chip holds x = 1000, y = -1000, z = 16384 counts and OUT_T = 25.

use std::time::Duration;
use upm_core::{
    Accelerometer, BusSelector, Category, CapabilityTable, DriverFactory, Sensor,
    TemperatureSensor, UpmError,
};
use upm_driver_mock::{chips, MockPlatform, MockRegisterDevice, Transaction};
use upm_driver_st::lis2ds12::{FullScale, Odr};
use upm_driver_st::{Lis2ds12, Lis2ds12Factory, Lis2ds12Options};

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}

fn i2c_accel() -> (MockPlatform, Lis2ds12) {
    let platform = MockPlatform::new();
    platform.add_i2c_device(0, 0x1e, chips::lis2ds12());
    let subsystem = platform.subsystem().unwrap();
    let accel = Lis2ds12::init(
        &subsystem,
        BusSelector::i2c(0, 0x1e),
        Lis2ds12Options::default(),
    )
    .unwrap();
    (platform, accel)
}

#[test]
fn update_converts_counts_to_g() {
    let (_platform, accel) = i2c_accel();
    assert_eq!(accel.acceleration().unwrap(), [0.0; 3]);

    accel.update().unwrap();
    let [x, y, z] = accel.acceleration().unwrap();
    assert!(close(x, 0.061));
    assert!(close(y, -0.061));
    assert!(close(z, 0.999424));
    assert!(close(accel.temperature().unwrap(), 25.097656));
}

#[test]
fn init_resets_then_configures() {
    let (platform, _accel) = i2c_accel();
    assert_eq!(
        platform.delays(),
        vec![Duration::from_millis(100), Duration::from_millis(50)]
    );
    platform
        .with_i2c_device(0, 0x1e, |d| {
            // ODR 100 Hz, BDU, ±2 g
            assert_eq!(d.peek(0x20), 0x41);
            // auto-increment on, soft reset self-cleared, HP filter off
            assert_eq!(d.peek(0x21), 0x04);
        })
        .unwrap();
}

#[test]
fn full_scale_changes_sensitivity() {
    let (platform, accel) = i2c_accel();
    accel.set_full_scale(FullScale::G16).unwrap();
    assert_eq!(accel.full_scale(), FullScale::G16);
    assert_eq!(
        platform.with_i2c_device(0, 0x1e, |d| d.peek(0x20) & 0x0c),
        Some(0x04)
    );

    accel.update().unwrap();
    assert!(close(accel.acceleration().unwrap()[0], 0.488));
}

#[test]
fn high_frequency_odr_sets_hf_bit() {
    let (platform, accel) = i2c_accel();
    accel.set_odr(Odr::Hz3200).unwrap();
    assert_eq!(
        platform.with_i2c_device(0, 0x1e, |d| d.peek(0x20)),
        Some(0x63)
    );
}

#[test]
fn interrupt_pin_configuration() {
    let (platform, accel) = i2c_accel();
    accel.set_interrupt_active_high(false).unwrap();
    accel.set_interrupt_push_pull(false).unwrap();
    accel.enable_interrupt_latching(true).unwrap();
    accel.set_int1_config(0x01).unwrap();
    accel.set_int2_config(0x80).unwrap();
    platform
        .with_i2c_device(0, 0x1e, |d| {
            assert_eq!(d.peek(0x22), 0x07);
            assert_eq!(d.peek(0x23), 0x01);
            assert_eq!(d.peek(0x24), 0x80);
        })
        .unwrap();

    accel.set_interrupt_active_high(true).unwrap();
    assert_eq!(
        platform.with_i2c_device(0, 0x1e, |d| d.peek(0x22)),
        Some(0x05)
    );
}

#[test]
fn spi_block_read_is_one_transfer() {
    let platform = MockPlatform::new();
    platform.add_spi_device(1, Some(8), chips::lis2ds12());
    let subsystem = platform.subsystem().unwrap();
    let accel = Lis2ds12::init(
        &subsystem,
        BusSelector::spi(1, Some(8)),
        Lis2ds12Options::default(),
    )
    .unwrap();

    platform.clear_transactions();
    accel.update().unwrap();
    let frames: Vec<Vec<u8>> = platform
        .transactions()
        .into_iter()
        .filter_map(|t| match t {
            Transaction::SpiTransfer { tx, .. } => Some(tx),
            _ => None,
        })
        .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].len(), 7);
    assert_eq!(frames[0][0], 0xa8);
    assert_eq!(frames[1][0], 0xa6);

    assert!(close(accel.acceleration().unwrap()[2], 0.999424));
    assert_eq!(platform.open_handles(), 2);
    accel.close();
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn chip_id_mismatch_is_rejected() {
    let platform = MockPlatform::new();
    platform.add_i2c_device(0, 0x1e, MockRegisterDevice::new().with_register(0x0f, 0x42));
    let subsystem = platform.subsystem().unwrap();

    let err = Lis2ds12::init(
        &subsystem,
        BusSelector::i2c(0, 0x1e),
        Lis2ds12Options::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        UpmError::ChipIdMismatch {
            driver: "lis2ds12",
            found: 0x42,
            ..
        }
    ));
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn offsets_apply_per_axis() {
    let (_platform, accel) = i2c_accel();
    accel.update().unwrap();
    accel.set_acceleration_offset([1.0, 0.0, -1.0]).unwrap();
    accel.set_acceleration_scale([2.0, 1.0, 1.0]).unwrap();
    let [x, y, z] = accel.acceleration().unwrap();
    assert!(close(x, 1.122));
    assert!(close(y, -0.061));
    assert!(close(z, -0.000576));
}

#[test]
fn factory_builds_accelerometer_and_temperature_tables() {
    let platform = MockPlatform::new();
    platform.add_i2c_device(2, 0x1d, chips::lis2ds12());
    let subsystem = platform.subsystem().unwrap();
    let config: toml::Value = toml::from_str(
        r#"
        bus = 2
        address = 0x1d
        full_scale = "g4"
        "#,
    )
    .unwrap();

    Lis2ds12Factory.validate(&config).unwrap();
    let components = Lis2ds12Factory.build(&subsystem, config).unwrap();
    assert_eq!(
        components.capabilities(),
        vec![Category::Sensor, Category::Temperature, Category::Accelerometer]
    );
    components.sensor.update().unwrap();
    match components.table(Category::Accelerometer) {
        Some(CapabilityTable::Accelerometer(a)) => {
            assert!(close(a.acceleration().unwrap()[0], 0.122))
        }
        other => panic!("unexpected table: {other:?}"),
    }
}

#[test]
fn factory_rejects_unknown_rate() {
    let config: toml::Value = toml::from_str(r#"odr = "hz123""#).unwrap();
    assert!(Lis2ds12Factory.validate(&config).is_err());
}

//! Registry and config loader against the simulated platform.

use serial_test::serial;
use std::io::Write;
use std::sync::Arc;
use upm_core::{CapabilityTable, Category};
use upm_driver_mock::{chips, MockPlatform};
use upm_hardware::{
    load_hardware_config, populate_registry, ConfigLoadError, DeviceRegistry,
};

fn registry_on(platform: &MockPlatform) -> DeviceRegistry {
    let registry = DeviceRegistry::new(Arc::new(platform.subsystem().unwrap()));
    upm_driver_bosch::register_all(&registry);
    upm_driver_st::register_all(&registry);
    upm_driver_basic::register_all(&registry);
    registry
}

fn table(src: &str) -> toml::Value {
    toml::from_str(src).unwrap()
}

#[test]
fn factories_are_listed_by_type() {
    let platform = MockPlatform::new();
    let registry = registry_on(&platform);

    assert_eq!(
        registry.factory_types(),
        vec!["bmp280", "dimmer", "led", "lis2ds12", "lsm303agr", "relay", "water"]
    );
    let info = registry.factory_info("lsm303agr").unwrap();
    assert!(info.capabilities.contains(&Category::Magnetometer));
    assert!(registry.factory_info("servo").is_none());
}

#[test]
fn create_by_name_and_read() {
    let platform = MockPlatform::new();
    platform.add_i2c_device(1, 0x77, chips::bmp280());
    let registry = registry_on(&platform);

    let info = registry
        .create("weather", "bmp280", table("bus = 1"))
        .unwrap();
    assert_eq!(info.driver_type, "bmp280");
    assert_eq!(
        info.capabilities,
        vec![
            Category::Sensor,
            Category::Temperature,
            Category::Pressure,
            Category::Humidity
        ]
    );

    registry.update_all().unwrap();
    let t = registry.get_temperature("weather").unwrap().temperature().unwrap();
    assert!((t - 25.08).abs() < 1e-4);
    assert_eq!(registry.get_humidity("weather").unwrap().humidity().unwrap(), 0.0);
    assert!(registry.get_switch("weather").is_none());
}

#[test]
fn duplicate_id_is_rejected() {
    let platform = MockPlatform::new();
    let registry = registry_on(&platform);

    registry.create("status", "led", table("pin = 13")).unwrap();
    let err = registry
        .create("status", "led", table("pin = 14"))
        .unwrap_err();
    assert!(err.to_string().contains("already registered"));
    assert_eq!(registry.len(), 1);
    assert_eq!(platform.open_handles(), 1);
}

#[test]
fn unknown_driver_lists_available_types() {
    let platform = MockPlatform::new();
    let registry = registry_on(&platform);

    let err = registry
        .create("arm", "servo", table("pin = 3"))
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("servo"));
    assert!(message.contains("bmp280"));
    assert!(registry.is_empty());
}

#[test]
fn validation_runs_before_bus_access() {
    let platform = MockPlatform::new();
    platform.add_i2c_device(1, 0x77, chips::bmp280());
    let registry = registry_on(&platform);

    let err = registry
        .create("weather", "bmp280", table("bus = 1\nusage_mode = \"underwater\""))
        .unwrap_err();
    assert!(format!("{err:#}").contains("validation"));
    assert_eq!(platform.open_handles(), 0);
    assert!(platform.transactions().is_empty());

    assert!(registry
        .create("dim", "dimmer", table("pin = 2\nperiod_us = 0"))
        .is_err());
    assert!(platform.pwm_state(2).is_none());
}

#[test]
fn failed_build_leaves_nothing_open() {
    let platform = MockPlatform::new();
    platform.add_i2c_device(1, 0x77, chips::lis2ds12());
    let registry = registry_on(&platform);

    assert!(registry
        .create("weather", "bmp280", table("bus = 1"))
        .is_err());
    assert!(!registry.contains("weather"));
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn unregister_releases_handles() {
    let platform = MockPlatform::new();
    let registry = registry_on(&platform);

    registry.create("pump", "relay", table("pin = 5")).unwrap();
    assert_eq!(platform.open_handles(), 1);

    assert!(registry.unregister("pump"));
    assert!(!registry.unregister("pump"));
    assert_eq!(platform.open_handles(), 0);

    // The pin can be claimed again.
    registry.create("pump", "relay", table("pin = 5")).unwrap();
}

#[test]
fn capability_queries() {
    let platform = MockPlatform::new();
    platform.set_gpio_input(7, false);
    let registry = registry_on(&platform);

    registry.create("status", "led", table("pin = 13")).unwrap();
    registry.create("leak", "water", table("pin = 7")).unwrap();
    registry.create("lamp", "dimmer", table("pin = 3")).unwrap();

    assert_eq!(
        registry.devices_with_capability(Category::Switch),
        vec!["lamp", "status"]
    );
    assert_eq!(registry.devices_with_capability(Category::Binary), vec!["leak"]);
    assert!(registry
        .devices_with_capability(Category::Temperature)
        .is_empty());

    assert!(registry.get_binary("leak").unwrap().is_active().unwrap());

    match registry.table("lamp", Category::Dimmer) {
        Some(CapabilityTable::Dimmer(d)) => assert_eq!(d.set_brightness(150).unwrap(), 100),
        other => panic!("unexpected table: {other:?}"),
    }
    assert_eq!(registry.get_dimmer("lamp").unwrap().brightness().unwrap(), 100);
    assert!(registry.table("status", Category::Dimmer).is_none());

    let ids: Vec<String> = registry.list_devices().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["lamp", "leak", "status"]);
}

#[test]
fn update_all_reports_every_failure() {
    let platform = MockPlatform::new();
    let stuck = chips::bosch_sensor(chips::bosch::BMP280_ID, 1000);
    platform.add_i2c_device(1, 0x77, stuck.clone());
    platform.add_i2c_device(2, 0x77, stuck);
    platform.add_i2c_device(3, 0x77, chips::bmp280());
    let registry = registry_on(&platform);

    let forced = "usage_mode = \"weather_monitor\"\nmax_status_polls = 2";
    registry
        .create("a", "bmp280", table(&format!("bus = 1\n{forced}")))
        .unwrap();
    registry
        .create("b", "bmp280", table(&format!("bus = 2\n{forced}")))
        .unwrap();
    registry.create("c", "bmp280", table("bus = 3")).unwrap();
    registry.create("status", "led", table("pin = 13")).unwrap();

    let err = registry.update_all().unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("2 device(s) failed to update"));
    assert!(message.contains("a: "));
    assert!(message.contains("b: "));

    // The healthy device was still updated.
    let t = registry.get_temperature("c").unwrap().temperature().unwrap();
    assert!((t - 25.08).abs() < 1e-4);
}

const HARDWARE_FILE: &str = r#"
[platform]
i2c = [
    { bus = 1, address = 0x76, chip = "bme280" },
    { bus = 1, address = 0x19, chip = "lsm303agr_accel" },
    { bus = 1, address = 0x1e, chip = "lsm303agr_mag" },
]

[[devices]]
id = "weather"
name = "Rooftop BME280"
type = "bmp280"
[devices.config]
bus = 1
address = 0x76
usage_mode = "weather_monitor"

[[devices]]
id = "compass"
type = "lsm303agr"
[devices.config]
bus = 1

[[devices]]
id = "missing"
type = "lis2ds12"
[devices.config]
bus = 3
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn populate_from_file_records_build_failures() {
    let file = write_config(HARDWARE_FILE);
    let config = load_hardware_config(file.path()).unwrap();
    let platform = config.mock_platform();
    let registry = registry_on(&platform);

    let created = populate_registry(&registry, &config).unwrap();
    assert_eq!(created, 2);

    let weather = registry.get_device_info("weather").unwrap();
    assert_eq!(weather.name, "Rooftop BME280");
    assert_eq!(weather.descriptor.name, "bme280");

    let compass = registry.get_device_info("compass").unwrap();
    assert_eq!(compass.name, "ST LSM303AGR accelerometer and magnetometer");
    assert_eq!(
        compass.capabilities,
        vec![
            Category::Sensor,
            Category::Temperature,
            Category::Accelerometer,
            Category::Magnetometer
        ]
    );

    let failures = registry.list_registration_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].device_id, "missing");
    assert_eq!(failures[0].driver_type, "lis2ds12");
}

#[test]
#[serial]
fn invalid_entry_fails_before_any_device_is_built() {
    let file = write_config(
        r#"
        [platform]
        gpio_inputs = [{ pin = 7, high = true }]

        [[devices]]
        id = "status"
        type = "led"
        config = { pin = 13 }

        [[devices]]
        id = "lamp"
        type = "dimmer"
        config = { period_us = 1000 }
        "#,
    );
    let config = load_hardware_config(file.path()).unwrap();
    let platform = config.mock_platform();
    let registry = registry_on(&platform);

    assert!(populate_registry(&registry, &config).is_err());
    assert!(registry.is_empty());
    assert_eq!(platform.open_handles(), 0);
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    let file = write_config(
        r#"
        [platform]
        seed = 1
        "#,
    );

    std::env::set_var("UPM_PLATFORM__SEED", "42");
    let result = load_hardware_config(file.path());
    std::env::remove_var("UPM_PLATFORM__SEED");

    let config = result.unwrap();
    assert_eq!(config.platform.unwrap().seed, Some(42));
}

#[test]
#[serial]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_hardware_config(&dir.path().join("hardware.toml")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigLoadError>(),
        Some(ConfigLoadError::NotFound(_))
    ));
}

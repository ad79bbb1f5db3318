//! Register transactions over the simulated platform.
//!
//! These drive `upm_core::RegisterBus` against `MockPlatform`, checking the
//! wire-level behaviour a real bus would see.

use std::sync::Arc;
use std::time::Duration;
use upm_core::{BusSelector, BusSubsystem, RegisterBus, RegisterIo, SpiSettings, UpmError};
use upm_driver_mock::{ops, FaultConfig, FaultScenario, MockPlatform, MockRegisterDevice, Transaction};

fn spi_frames(platform: &MockPlatform) -> Vec<Vec<u8>> {
    platform
        .transactions()
        .into_iter()
        .filter_map(|t| match t {
            Transaction::SpiTransfer { tx, .. } => Some(tx),
            _ => None,
        })
        .collect()
}

#[test]
fn i2c_block_read_matches_single_reads() {
    let platform = MockPlatform::new();
    platform.add_i2c_device(1, 0x40, MockRegisterDevice::patterned(11));
    let subsystem = platform.subsystem().unwrap();
    let mut bus = RegisterBus::open(&subsystem, BusSelector::i2c(1, 0x40), SpiSettings::default())
        .unwrap();

    let singles: Vec<u8> = (0x20..0x28).map(|r| bus.read_reg(r).unwrap()).collect();
    let mut block = [0u8; 8];
    bus.read_regs(0x20, &mut block).unwrap();
    assert_eq!(singles, block);
}

#[test]
fn spi_block_read_is_one_transfer() {
    let platform = MockPlatform::new();
    platform.add_spi_device(0, Some(9), MockRegisterDevice::patterned(5));
    let subsystem = platform.subsystem().unwrap();
    let mut bus =
        RegisterBus::open(&subsystem, BusSelector::spi(0, Some(9)), SpiSettings::default())
            .unwrap();

    let singles: Vec<u8> = (0x28..0x2e).map(|r| bus.read_reg(r).unwrap()).collect();
    platform.clear_transactions();

    let mut block = [0u8; 6];
    bus.read_regs(0x28, &mut block).unwrap();
    assert_eq!(singles, block);

    let frames = spi_frames(&platform);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len(), 7);
    assert_eq!(frames[0][0], 0xa8);
}

#[test]
fn spi_write_clears_read_bit() {
    let platform = MockPlatform::new();
    platform.add_spi_device(0, Some(9), MockRegisterDevice::new());
    let subsystem = platform.subsystem().unwrap();
    let mut bus =
        RegisterBus::open(&subsystem, BusSelector::spi(0, Some(9)), SpiSettings::default())
            .unwrap();

    bus.write_reg(0x20, 0x47).unwrap();
    assert_eq!(spi_frames(&platform), vec![vec![0x20, 0x47]]);
    assert_eq!(platform.with_spi_device(0, Some(9), |d| d.peek(0x20)), Some(0x47));
    // chip select idles high between transactions
    assert_eq!(platform.gpio_level(9), Some(true));
}

#[test]
fn chip_select_released_when_transfer_fails() {
    let platform = MockPlatform::with_faults(FaultConfig::scenario(FaultScenario::FailAfterN {
        operation: ops::SPI_TRANSFER,
        count: 1,
    }));
    platform.add_spi_device(0, Some(9), MockRegisterDevice::patterned(1));
    let subsystem = platform.subsystem().unwrap();
    let mut bus =
        RegisterBus::open(&subsystem, BusSelector::spi(0, Some(9)), SpiSettings::default())
            .unwrap();

    bus.read_reg(0x0f).unwrap();
    let err = bus.read_reg(0x0f).unwrap_err();
    assert!(matches!(err, UpmError::Bus(_)));
    assert_eq!(platform.gpio_level(9), Some(true));
}

#[test]
fn short_i2c_read_is_an_error() {
    let platform = MockPlatform::with_faults(FaultConfig::scenario(FaultScenario::ShortRead {
        max_len: 2,
    }));
    platform.add_i2c_device(0, 0x1e, MockRegisterDevice::patterned(0));
    let subsystem = platform.subsystem().unwrap();
    let mut bus = RegisterBus::open(&subsystem, BusSelector::i2c(0, 0x1e), SpiSettings::default())
        .unwrap();

    let mut buf = [0u8; 6];
    let err = bus.read_regs(0x28, &mut buf).unwrap_err();
    assert!(matches!(
        err,
        UpmError::ShortRead {
            register: 0x28,
            expected: 6,
            actual: 2
        }
    ));
}

#[test]
fn empty_block_read_is_rejected() {
    let platform = MockPlatform::new();
    platform.add_i2c_device(0, 0x1e, MockRegisterDevice::new());
    let subsystem = platform.subsystem().unwrap();
    let mut bus = RegisterBus::open(&subsystem, BusSelector::i2c(0, 0x1e), SpiSettings::default())
        .unwrap();
    assert!(matches!(
        bus.read_regs(0x28, &mut []),
        Err(UpmError::InvalidSize(_))
    ));
    assert!(platform.transactions().is_empty());
}

#[test]
fn handles_released_on_drop() {
    let platform = MockPlatform::new();
    platform.add_spi_device(0, Some(9), MockRegisterDevice::new());
    let subsystem = platform.subsystem().unwrap();
    let bus = RegisterBus::open(&subsystem, BusSelector::spi(0, Some(9)), SpiSettings::default())
        .unwrap();
    // SPI handle plus chip-select pin
    assert_eq!(platform.open_handles(), 2);
    drop(bus);
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn failed_open_releases_partial_handles() {
    let platform = MockPlatform::with_faults(FaultConfig::scenario(FaultScenario::OpenFailure {
        kind: upm_core::BusKind::Gpio,
        index: 9,
    }));
    let subsystem = platform.subsystem().unwrap();
    let result = RegisterBus::open(&subsystem, BusSelector::spi(0, Some(9)), SpiSettings::default());
    assert!(result.is_err());
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn open_requires_initialized_subsystem() {
    let platform = MockPlatform::new();
    let subsystem = BusSubsystem::new(Arc::new(platform.clone()));
    let result = RegisterBus::open(&subsystem, BusSelector::i2c(0, 0x77), SpiSettings::default());
    assert!(matches!(result, Err(UpmError::NotInitialized)));
    assert_eq!(platform.init_count(), 0);
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn chip_select_pulse_is_recorded() {
    let platform = MockPlatform::new();
    platform.add_spi_device(0, Some(4), MockRegisterDevice::new());
    let subsystem = platform.subsystem().unwrap();
    let mut bus =
        RegisterBus::open(&subsystem, BusSelector::spi(0, Some(4)), SpiSettings::default())
            .unwrap();
    platform.clear_transactions();

    bus.pulse_chip_select(Duration::from_millis(10)).unwrap();
    assert_eq!(
        platform.transactions(),
        vec![
            Transaction::GpioWrite { pin: 4, high: false },
            Transaction::GpioWrite { pin: 4, high: true },
        ]
    );
    assert_eq!(platform.delays(), vec![Duration::from_millis(10)]);
}

//! Register images of the chips the drivers support.
//!
//! Each constructor returns a [`MockRegisterDevice`] that answers the chip-ID
//! probe, holds plausible trim constants and one sample of measurement data.
//! Bosch trim and raw values come from the BMP280 datasheet worked example
//! (section 3.12), so driver output can be checked against published numbers.

use crate::device::{MockRegisterDevice, SpiAddressing};

/// BMP280 datasheet trim set and sample.
pub mod bosch {
    /// dig_T1..dig_T3
    pub const T: (u16, i16, i16) = (27504, 26435, -1000);
    /// dig_P1
    pub const P1: u16 = 36477;
    /// dig_P2..dig_P9
    pub const P: [i16; 8] = [-10685, 3024, 2855, 140, -7, 15500, -14600, 6000];
    /// Raw temperature sample
    pub const ADC_T: i32 = 519888;
    /// Raw pressure sample
    pub const ADC_P: i32 = 415148;

    /// dig_H1..dig_H6
    pub const H: (u8, i16, u8, i16, i16, i8) = (75, 362, 0, 313, 50, 30);
    /// Raw humidity sample
    pub const ADC_H: i32 = 30000;

    /// BMP280 chip id
    pub const BMP280_ID: u8 = 0x58;
    /// BME280 chip id
    pub const BME280_ID: u8 = 0x60;
}

/// Encode a 20-bit Bosch ADC value as msb/lsb/xlsb.
pub fn bosch_adc20(adc: i32) -> [u8; 3] {
    [
        ((adc >> 12) & 0xff) as u8,
        ((adc >> 4) & 0xff) as u8,
        ((adc & 0x0f) << 4) as u8,
    ]
}

fn bosch_calibration() -> Vec<u8> {
    let mut block = Vec::with_capacity(24);
    block.extend_from_slice(&bosch::T.0.to_le_bytes());
    block.extend_from_slice(&bosch::T.1.to_le_bytes());
    block.extend_from_slice(&bosch::T.2.to_le_bytes());
    block.extend_from_slice(&bosch::P1.to_le_bytes());
    for p in bosch::P {
        block.extend_from_slice(&p.to_le_bytes());
    }
    block
}

/// BMP280/BME280 register image with the given chip id.
///
/// Forced-mode measurements hold STATUS.measuring for `busy_polls` reads.
pub fn bosch_sensor(chip_id: u8, busy_polls: u32) -> MockRegisterDevice {
    let mut data = Vec::with_capacity(8);
    data.extend_from_slice(&bosch_adc20(bosch::ADC_P));
    data.extend_from_slice(&bosch_adc20(bosch::ADC_T));
    data.extend_from_slice(&(bosch::ADC_H as u16).to_be_bytes());

    let (h1, h2, h3, h4, h5, h6) = bosch::H;
    let h2 = h2.to_le_bytes();
    let e4 = ((h4 >> 4) & 0xff) as u8;
    let e5 = ((h4 & 0x0f) as u8) | (((h5 & 0x0f) as u8) << 4);
    let e6 = ((h5 >> 4) & 0xff) as u8;

    MockRegisterDevice::new()
        .with_register(0xd0, chip_id)
        .with_block(0x88, &bosch_calibration())
        .with_register(0xa1, h1)
        .with_block(0xe1, &[h2[0], h2[1], h3, e4, e5, e6, h6 as u8])
        .with_block(0xf7, &data)
        .with_reset(0xe0, 0xb6)
        .with_busy_flag(0xf3, 0x08, 0xf4, 0x03, 0x01, busy_polls)
        .with_spi_addressing(SpiAddressing::HighPage)
}

/// BMP280 (chip id 0x58).
pub fn bmp280() -> MockRegisterDevice {
    bosch_sensor(bosch::BMP280_ID, 2)
}

/// BME280 (chip id 0x60).
pub fn bme280() -> MockRegisterDevice {
    bosch_sensor(bosch::BME280_ID, 2)
}

/// LIS2DS12 sample: x = 1000, y = -1000, z = 16384 counts, OUT_T = 0x19.
pub fn lis2ds12() -> MockRegisterDevice {
    let mut axes = Vec::with_capacity(6);
    for v in [1000i16, -1000, 16384] {
        axes.extend_from_slice(&v.to_le_bytes());
    }
    MockRegisterDevice::new()
        .with_register(0x0f, 0x43)
        .with_register(0x26, 0x19)
        .with_block(0x28, &axes)
        .with_self_clearing(0x21, 0x40)
}

/// LSM303AGR accelerometer half, I2C address 0x19.
///
/// Left-justified samples: x = 0x4000, y = 0xC000, z = 0x1000; temperature
/// register pair holds 0x1A00.
pub fn lsm303agr_accel() -> MockRegisterDevice {
    let mut axes = Vec::with_capacity(6);
    for v in [0x4000i16, -0x4000, 0x1000] {
        axes.extend_from_slice(&v.to_le_bytes());
    }
    MockRegisterDevice::new()
        .with_register(0x0f, 0x33)
        .with_block(0x0c, &0x1a00i16.to_le_bytes())
        .with_block(0x28, &axes)
        .with_block_flag_mask(0x80)
}

/// LSM303AGR magnetometer half, I2C address 0x1E.
///
/// Samples: x = 100, y = -200, z = 300 counts.
pub fn lsm303agr_mag() -> MockRegisterDevice {
    let mut axes = Vec::with_capacity(6);
    for v in [100i16, -200, 300] {
        axes.extend_from_slice(&v.to_le_bytes());
    }
    MockRegisterDevice::new()
        .with_register(0x4f, 0x40)
        .with_block(0x68, &axes)
        .with_block_flag_mask(0x80)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adc20_encoding() {
        assert_eq!(bosch_adc20(bosch::ADC_P), [0x65, 0x5a, 0xc0]);
        assert_eq!(bosch_adc20(bosch::ADC_T), [0x7e, 0xed, 0x00]);
    }

    #[test]
    fn bosch_calibration_layout() {
        let dev = bmp280();
        assert_eq!(dev.peek(0xd0), 0x58);
        // dig_T1 = 27504 = 0x6B70, little endian
        assert_eq!(dev.peek(0x88), 0x70);
        assert_eq!(dev.peek(0x89), 0x6b);
        // dig_P9 = 6000 = 0x1770 at 0x9E
        assert_eq!(dev.peek(0x9e), 0x70);
        assert_eq!(dev.peek(0x9f), 0x17);
        // pressure msb first at 0xF7
        assert_eq!(dev.peek(0xf7), 0x65);
    }

    #[test]
    fn bme280_humidity_trim_packing() {
        let dev = bme280();
        assert_eq!(dev.peek(0xd0), 0x60);
        assert_eq!(dev.peek(0xa1), 75);
        // dig_H4 = 313 = 0x139: E4 = 0x13, E5 low nibble = 0x9
        assert_eq!(dev.peek(0xe4), 0x13);
        assert_eq!(dev.peek(0xe5) & 0x0f, 0x09);
        // dig_H5 = 50 = 0x032: E5 high nibble = 0x2, E6 = 0x03
        assert_eq!(dev.peek(0xe5) >> 4, 0x02);
        assert_eq!(dev.peek(0xe6), 0x03);
    }
}

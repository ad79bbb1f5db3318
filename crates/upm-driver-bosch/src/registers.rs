//! BMP280 / BME280 register map and field encodings.
//!
//! Reference: Bosch BST-BMP280-DS001 and BST-BME280-DS002, section 5.

use serde::{Deserialize, Serialize};

/// Default I2C address (SDO pulled high).
pub const DEFAULT_I2C_ADDRESS: u8 = 0x77;

/// BMP280 chip id.
pub const BMP280_CHIP_ID: u8 = 0x58;
/// BME280 chip id.
pub const BME280_CHIP_ID: u8 = 0x60;
/// Accepted chip ids.
pub const ACCEPTED_CHIP_IDS: &[u8] = &[BMP280_CHIP_ID, BME280_CHIP_ID];

/// Magic value written to [`REG_RESET`].
pub const RESET_COMMAND: u8 = 0xb6;

/// Default sea-level pressure in hPa.
pub const SEA_LEVEL_HPA: f32 = 1013.25;

/// First temperature/pressure trim register.
pub const REG_CALIB00: u8 = 0x88;
/// dig_H1 (BME280).
pub const REG_DIG_H1: u8 = 0xa1;
/// Chip id.
pub const REG_CHIP_ID: u8 = 0xd0;
/// Soft reset.
pub const REG_RESET: u8 = 0xe0;
/// First humidity trim block register (BME280).
pub const REG_DIG_H2: u8 = 0xe1;
/// Humidity oversampling (BME280).
pub const REG_CTRL_HUM: u8 = 0xf2;
/// Status.
pub const REG_STATUS: u8 = 0xf3;
/// Temperature/pressure oversampling and power mode.
pub const REG_CTRL_MEAS: u8 = 0xf4;
/// Standby, filter and 3-wire SPI.
pub const REG_CONFIG: u8 = 0xf5;
/// First sample register.
pub const REG_PRESSURE_MSB: u8 = 0xf7;

/// Bytes of temperature/pressure trim at 0x88.
pub const CALIBRATION_LEN: usize = 24;
/// Bytes of humidity trim at 0xE1.
pub const HUMIDITY_CALIBRATION_LEN: usize = 7;
/// Pressure + temperature sample bytes.
pub const BMP280_DATA_LEN: usize = 6;
/// Pressure + temperature + humidity sample bytes.
pub const BME280_DATA_LEN: usize = 8;

/// STATUS: conversion running.
pub const STATUS_MEASURING: u8 = 0x08;
/// STATUS: NVM copy running.
pub const STATUS_IM_UPDATE: u8 = 0x01;

/// CTRL_MEAS mode field.
pub const CTRL_MEAS_MODE_MASK: u8 = 0x03;
/// CTRL_MEAS osrs_p position.
pub const CTRL_MEAS_OSRS_P_SHIFT: u8 = 2;
/// CTRL_MEAS osrs_t position.
pub const CTRL_MEAS_OSRS_T_SHIFT: u8 = 5;
/// CONFIG filter position.
pub const CONFIG_FILTER_SHIFT: u8 = 2;
/// CONFIG t_sb position.
pub const CONFIG_T_SB_SHIFT: u8 = 5;
/// osrs_h occupies bits 2:0 of CTRL_HUM.
pub const CTRL_HUM_OSRS_H_MASK: u8 = 0x07;
/// Three-bit field mask before shifting.
pub const FIELD3_MASK: u8 = 0x07;

/// Power mode (CTRL_MEAS bits 1:0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureMode {
    /// No conversions
    #[default]
    Sleep,
    /// One conversion, then back to sleep
    Forced,
    /// Continuous conversions separated by the standby time
    Normal,
}

impl MeasureMode {
    /// Field value.
    pub fn bits(self) -> u8 {
        match self {
            MeasureMode::Sleep => 0,
            MeasureMode::Forced => 1,
            MeasureMode::Normal => 3,
        }
    }
}

/// Oversampling setting for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Oversampling {
    /// Channel not measured
    Skipped,
    /// x1
    #[default]
    X1,
    /// x2
    X2,
    /// x4
    X4,
    /// x8
    X8,
    /// x16
    X16,
}

impl Oversampling {
    /// Field value.
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// IIR filter coefficient (CONFIG bits 4:2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Filter off
    #[default]
    Off,
    /// Coefficient 2
    X2,
    /// Coefficient 4
    X4,
    /// Coefficient 8
    X8,
    /// Coefficient 16
    X16,
}

impl Filter {
    /// Field value.
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Normal-mode standby time (CONFIG bits 7:5).
///
/// The last two codes mean 10 ms and 20 ms on the BME280.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standby {
    /// 0.5 ms
    #[default]
    Ms0_5,
    /// 62.5 ms
    Ms62_5,
    /// 125 ms
    Ms125,
    /// 250 ms
    Ms250,
    /// 500 ms
    Ms500,
    /// 1000 ms
    Ms1000,
    /// 2000 ms (BME280: 10 ms)
    Ms2000,
    /// 4000 ms (BME280: 20 ms)
    Ms4000,
}

impl Standby {
    /// Field value.
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Preset combinations recommended in datasheet section 3.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMode {
    /// Handheld device, low power
    HandheldLowPower,
    /// Handheld device, dynamic
    HandheldDynamic,
    /// Weather monitoring, lowest power (forced mode)
    WeatherMonitor,
    /// Elevator / floor change detection
    FloorChangeDetect,
    /// Drop detection
    DropDetect,
    /// Indoor navigation, highest resolution
    #[default]
    IndoorNavigation,
}

/// Register settings one usage mode applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSettings {
    /// Pressure oversampling
    pub pressure: Oversampling,
    /// Temperature oversampling
    pub temperature: Oversampling,
    /// Humidity oversampling (BME280)
    pub humidity: Oversampling,
    /// IIR filter
    pub filter: Filter,
    /// Power mode
    pub mode: MeasureMode,
}

impl UsageMode {
    /// Settings applied for this mode.
    pub fn settings(self) -> UsageSettings {
        use Oversampling::*;
        let (pressure, temperature, filter, mode) = match self {
            UsageMode::HandheldLowPower => (X16, X2, Filter::X4, MeasureMode::Normal),
            UsageMode::HandheldDynamic => (X4, X1, Filter::X16, MeasureMode::Normal),
            UsageMode::WeatherMonitor => (X1, X1, Filter::Off, MeasureMode::Forced),
            UsageMode::FloorChangeDetect => (X4, X1, Filter::X4, MeasureMode::Normal),
            UsageMode::DropDetect => (X2, X1, Filter::Off, MeasureMode::Normal),
            UsageMode::IndoorNavigation => (X16, X2, Filter::X16, MeasureMode::Normal),
        };
        UsageSettings {
            pressure,
            temperature,
            humidity: X1,
            filter,
            mode,
        }
    }
}

//! Bosch integer compensation.
//!
//! The arithmetic follows datasheet section 3.11.3 (BMP280) and 4.2.3
//! (BME280) step for step: temperature in 32-bit, pressure in 64-bit,
//! humidity in 32-bit fixed point. Intermediates are widened to `i64`;
//! pressure and humidity use wrapping arithmetic throughout, so a garbage
//! trim set yields a garbage value instead of a panic. For trim sets real parts ship with, results are
//! identical to the 32-bit reference code.
//!
//! Pressure and humidity depend on the "fine temperature" produced by the
//! temperature step. [`FineTemperature`] can only be obtained from
//! [`TrimParameters::compensate_temperature`], so the other two cannot be
//! called with a value from an older sample or a zero placeholder.

use crate::registers::{CALIBRATION_LEN, HUMIDITY_CALIBRATION_LEN};

/// Fine-resolution temperature carried from temperature compensation into
/// pressure and humidity compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineTemperature(i32);

impl FineTemperature {
    /// Raw t_fine value.
    pub fn raw(self) -> i32 {
        self.0
    }
}

/// Humidity trim (BME280 only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HumidityTrim {
    /// dig_H1
    pub h1: u8,
    /// dig_H2
    pub h2: i16,
    /// dig_H3
    pub h3: u8,
    /// dig_H4 (12-bit, signed)
    pub h4: i16,
    /// dig_H5 (12-bit, signed)
    pub h5: i16,
    /// dig_H6
    pub h6: i8,
}

impl HumidityTrim {
    /// Decode dig_H1 and the 7-byte block at 0xE1.
    ///
    /// dig_H4 and dig_H5 share register 0xE5: H4 takes its low nibble, H5
    /// its high nibble. Both are sign-extended from their MSB register.
    pub fn from_registers(h1: u8, block: &[u8; HUMIDITY_CALIBRATION_LEN]) -> Self {
        let e4 = block[3] as i8 as i16;
        let e6 = block[5] as i8 as i16;
        Self {
            h1,
            h2: i16::from_le_bytes([block[0], block[1]]),
            h3: block[2],
            h4: (e4 << 4) | i16::from(block[4] & 0x0f),
            h5: (e6 << 4) | i16::from(block[4] >> 4),
            h6: block[6] as i8,
        }
    }
}

/// Factory trim constants read once at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrimParameters {
    /// dig_T1
    pub t1: u16,
    /// dig_T2
    pub t2: i16,
    /// dig_T3
    pub t3: i16,
    /// dig_P1
    pub p1: u16,
    /// dig_P2..dig_P9
    pub p: [i16; 8],
    /// Humidity trim, present on the BME280
    pub humidity: Option<HumidityTrim>,
}

impl TrimParameters {
    /// Decode the 24-byte little-endian block at 0x88.
    pub fn from_registers(block: &[u8; CALIBRATION_LEN]) -> Self {
        let u = |i: usize| u16::from_le_bytes([block[i], block[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([block[i], block[i + 1]]);
        let mut p = [0i16; 8];
        for (n, slot) in p.iter_mut().enumerate() {
            *slot = s(8 + 2 * n);
        }
        Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p,
            humidity: None,
        }
    }

    /// Attach the BME280 humidity trim.
    pub fn with_humidity(mut self, humidity: HumidityTrim) -> Self {
        self.humidity = Some(humidity);
        self
    }

    /// Temperature in hundredths of a degree Celsius (5123 = 51.23 °C).
    pub fn compensate_temperature(&self, adc_t: i32) -> (FineTemperature, i32) {
        let adc_t = i64::from(adc_t);
        let t1 = i64::from(self.t1);
        let t2 = i64::from(self.t2);
        let t3 = i64::from(self.t3);

        let var1 = (((adc_t >> 3) - (t1 << 1)) * t2) >> 11;
        let var2 = ((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * t3 >> 14;
        let t_fine = clamp_i32(var1 + var2);
        let t = (i64::from(t_fine) * 5 + 128) >> 8;
        (FineTemperature(t_fine), clamp_i32(t))
    }

    /// Pressure in Pa as unsigned Q24.8 (24674867 = 96386.2 Pa).
    ///
    /// Returns 0 when dig_P1 is zero.
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: FineTemperature) -> u32 {
        let [p2, p3, p4, p5, p6, p7, p8, p9] = self.p.map(i64::from);
        let p1 = i64::from(self.p1);

        let mut var1 = i64::from(t_fine.0) - 128000;
        let mut var2 = var1.wrapping_mul(var1).wrapping_mul(p6);
        var2 = var2.wrapping_add(var1.wrapping_mul(p5) << 17);
        var2 = var2.wrapping_add(p4 << 35);
        var1 = (var1.wrapping_mul(var1).wrapping_mul(p3) >> 8)
            .wrapping_add(var1.wrapping_mul(p2) << 12);
        var1 = (1i64 << 47).wrapping_add(var1).wrapping_mul(p1) >> 33;
        if var1 == 0 {
            return 0;
        }
        let mut p = 1_048_576 - i64::from(adc_p);
        p = (p << 31)
            .wrapping_sub(var2)
            .wrapping_mul(3125)
            .wrapping_div(var1);
        var1 = p9.wrapping_mul(p >> 13).wrapping_mul(p >> 13) >> 25;
        var2 = p8.wrapping_mul(p) >> 19;
        p = (p.wrapping_add(var1).wrapping_add(var2) >> 8).wrapping_add(p7 << 4);
        p.clamp(0, i64::from(u32::MAX)) as u32
    }

    /// Relative humidity in %RH as unsigned Q22.10 (47445 = 46.333 %RH).
    ///
    /// Returns 0 without humidity trim.
    pub fn compensate_humidity(&self, adc_h: i32, t_fine: FineTemperature) -> u32 {
        let Some(h) = self.humidity else {
            return 0;
        };
        let (h1, h2, h3) = (i64::from(h.h1), i64::from(h.h2), i64::from(h.h3));
        let (h4, h5, h6) = (i64::from(h.h4), i64::from(h.h5), i64::from(h.h6));
        let adc_h = i64::from(adc_h);

        let mut v = i64::from(t_fine.0) - 76800;
        let x = (adc_h << 14)
            .wrapping_sub(h4 << 20)
            .wrapping_sub(h5.wrapping_mul(v))
            .wrapping_add(16384)
            >> 15;
        let y = (v.wrapping_mul(h6) >> 10).wrapping_mul((v.wrapping_mul(h3) >> 11) + 32768) >> 10;
        let y = y.wrapping_add(2_097_152).wrapping_mul(h2).wrapping_add(8192) >> 14;
        v = x.wrapping_mul(y);
        v = v.wrapping_sub(((v >> 15).wrapping_mul(v >> 15) >> 7).wrapping_mul(h1) >> 4);
        v = v.clamp(0, 419_430_400);
        (v >> 12) as u32
    }
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Decode a 20-bit sample from msb/lsb/xlsb registers.
pub fn raw20(bytes: [u8; 3]) -> i32 {
    (i32::from(bytes[0]) << 12) | (i32::from(bytes[1]) << 4) | (i32::from(bytes[2]) >> 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datasheet_trim() -> TrimParameters {
        TrimParameters {
            t1: 27504,
            t2: 26435,
            t3: -1000,
            p1: 36477,
            p: [-10685, 3024, 2855, 140, -7, 15500, -14600, 6000],
            humidity: None,
        }
    }

    #[test]
    fn datasheet_temperature() {
        let (t_fine, t) = datasheet_trim().compensate_temperature(519888);
        assert_eq!(t_fine.raw(), 128422);
        assert_eq!(t, 2508);
    }

    #[test]
    fn datasheet_pressure() {
        let trim = datasheet_trim();
        let (t_fine, _) = trim.compensate_temperature(519888);
        let p = trim.compensate_pressure(415148, t_fine);
        assert_eq!(p, 25767233);
        assert!((f64::from(p) / 256.0 - 100653.25).abs() < 0.01);
    }

    #[test]
    fn stale_fine_temperature_gives_wrong_pressure() {
        let trim = datasheet_trim();
        let (t_fine, _) = trim.compensate_temperature(519888);
        let good = trim.compensate_pressure(415148, t_fine);
        let stale = trim.compensate_pressure(415148, FineTemperature(0));
        assert_eq!(stale, 24786192);
        assert_ne!(stale, good);
    }

    #[test]
    fn humidity_compensation() {
        let trim = datasheet_trim().with_humidity(HumidityTrim {
            h1: 75,
            h2: 362,
            h3: 0,
            h4: 313,
            h5: 50,
            h6: 30,
        });
        let (t_fine, _) = trim.compensate_temperature(519888);
        let h = trim.compensate_humidity(30000, t_fine);
        assert_eq!(h, 56317);
        assert!((f64::from(h) / 1024.0 - 54.997).abs() < 0.001);
    }

    #[test]
    fn humidity_without_trim_is_zero() {
        let trim = datasheet_trim();
        let (t_fine, _) = trim.compensate_temperature(519888);
        assert_eq!(trim.compensate_humidity(30000, t_fine), 0);
    }

    #[test]
    fn zero_p1_does_not_divide_by_zero() {
        let trim = TrimParameters {
            p1: 0,
            ..datasheet_trim()
        };
        let (t_fine, _) = trim.compensate_temperature(519888);
        assert_eq!(trim.compensate_pressure(415148, t_fine), 0);
    }

    #[test]
    fn arbitrary_trim_does_not_panic() {
        let trim = TrimParameters::from_registers(&[0xff; CALIBRATION_LEN]).with_humidity(
            HumidityTrim::from_registers(0xff, &[0xff; HUMIDITY_CALIBRATION_LEN]),
        );
        let (t_fine, _) = trim.compensate_temperature(0xfffff);
        let _ = trim.compensate_pressure(0xfffff, t_fine);
        let _ = trim.compensate_humidity(0xffff, t_fine);
    }

    #[test]
    fn sparse_trim_wraps_instead_of_overflowing() {
        let mut p = [0i16; 8];
        p[7] = 1;
        let trim = TrimParameters {
            t1: 0,
            t2: 0,
            t3: 0,
            p1: 1,
            p,
            humidity: None,
        }
        .with_humidity(HumidityTrim {
            h1: 255,
            h2: i16::MAX,
            h3: 255,
            h4: i16::MIN,
            h5: i16::MIN,
            h6: 127,
        });
        let (t_fine, _) = trim.compensate_temperature(0);
        let _ = trim.compensate_pressure(0, t_fine);
        let _ = trim.compensate_humidity(0xffff, t_fine);

        let (t_fine, _) = TrimParameters {
            t1: 0,
            t2: i16::MAX,
            t3: i16::MAX,
            ..trim
        }
        .compensate_temperature(i32::MAX);
        let _ = trim.compensate_pressure(0, t_fine);
        let _ = trim.compensate_humidity(0xffff, t_fine);
    }

    #[test]
    fn trim_block_decoding() {
        let mut block = [0u8; CALIBRATION_LEN];
        block[0..2].copy_from_slice(&27504u16.to_le_bytes());
        block[2..4].copy_from_slice(&26435i16.to_le_bytes());
        block[22..24].copy_from_slice(&6000i16.to_le_bytes());
        let trim = TrimParameters::from_registers(&block);
        assert_eq!(trim.t1, 27504);
        assert_eq!(trim.t2, 26435);
        assert_eq!(trim.p[7], 6000);
    }

    #[test]
    fn humidity_nibble_packing() {
        // dig_H4 = 313 (0x139), dig_H5 = 50 (0x032)
        let h = HumidityTrim::from_registers(75, &[0x6a, 0x01, 0x00, 0x13, 0x29, 0x03, 30]);
        assert_eq!(h.h2, 362);
        assert_eq!(h.h4, 313);
        assert_eq!(h.h5, 50);
        assert_eq!(h.h6, 30);

        // negative dig_H4 sign-extends from 0xE4
        let h = HumidityTrim::from_registers(0, &[0, 0, 0, 0xff, 0x0e, 0, 0]);
        assert_eq!(h.h4, -2);
    }

    #[test]
    fn raw20_decoding() {
        assert_eq!(raw20([0x65, 0x5a, 0xc0]), 415148);
        assert_eq!(raw20([0x7e, 0xed, 0x00]), 519888);
    }
}

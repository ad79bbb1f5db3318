//! Simulated register-file chip.
//!
//! A [`MockRegisterDevice`] is 256 bytes of registers plus a handful of
//! behaviours real sensors have: auto-incrementing block reads, bits that
//! clear themselves after a write, a busy flag raised by a measurement
//! trigger, and a reset command restoring the power-on image.

use crate::common::MockRng;
use std::collections::VecDeque;

/// How the device decodes the command byte of an SPI frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiAddressing {
    /// Bit 7 is read/write, bits 6..0 are the register (ST parts).
    #[default]
    SevenBit,
    /// Bit 7 is read/write and is implied set in the register address
    /// (Bosch parts: register 0xF4 is written as 0x74, read as 0xF4).
    HighPage,
}

#[derive(Debug, Clone)]
struct BusyFlag {
    status_register: u8,
    status_mask: u8,
    trigger_register: u8,
    trigger_mask: u8,
    trigger_value: u8,
    polls: u32,
}

/// Register image and behaviour of one simulated chip.
#[derive(Debug, Clone)]
pub struct MockRegisterDevice {
    regs: [u8; 256],
    power_on: [u8; 256],
    spi_addressing: SpiAddressing,
    block_flag_mask: u8,
    self_clearing: Vec<(u8, u8)>,
    reset: Option<(u8, u8)>,
    busy: Option<BusyFlag>,
    busy_remaining: u32,
    scripted: Vec<(u8, VecDeque<u8>)>,
    reads: u64,
    writes: Vec<(u8, u8)>,
}

impl MockRegisterDevice {
    /// All registers zero.
    pub fn new() -> Self {
        Self::from_image([0; 256])
    }

    /// Start from a full register image.
    pub fn from_image(regs: [u8; 256]) -> Self {
        Self {
            regs,
            power_on: regs,
            spi_addressing: SpiAddressing::default(),
            block_flag_mask: 0,
            self_clearing: Vec::new(),
            reset: None,
            busy: None,
            busy_remaining: 0,
            scripted: Vec::new(),
            reads: 0,
            writes: Vec::new(),
        }
    }

    /// Deterministic per-address pattern: every register holds a distinct
    /// function of its own address and `seed`.
    pub fn patterned(seed: u8) -> Self {
        let mut regs = [0u8; 256];
        for (i, r) in regs.iter_mut().enumerate() {
            *r = (i as u8).wrapping_mul(37).wrapping_add(seed) ^ 0x5a;
        }
        Self::from_image(regs)
    }

    /// Random register image from a seeded RNG.
    pub fn random(rng: &MockRng) -> Self {
        let mut regs = [0u8; 256];
        rng.fill_bytes(&mut regs);
        Self::from_image(regs)
    }

    /// Set a register in both the live and the power-on image.
    pub fn with_register(mut self, register: u8, value: u8) -> Self {
        self.regs[register as usize] = value;
        self.power_on[register as usize] = value;
        self
    }

    /// Set consecutive registers starting at `register`.
    pub fn with_block(mut self, register: u8, bytes: &[u8]) -> Self {
        for (i, b) in bytes.iter().enumerate() {
            let r = register.wrapping_add(i as u8) as usize;
            self.regs[r] = *b;
            self.power_on[r] = *b;
        }
        self
    }

    /// Choose the SPI command decoding.
    pub fn with_spi_addressing(mut self, addressing: SpiAddressing) -> Self {
        self.spi_addressing = addressing;
        self
    }

    /// Strip `mask` from the register address of I2C block reads
    /// (the chip's auto-increment request bit).
    pub fn with_block_flag_mask(mut self, mask: u8) -> Self {
        self.block_flag_mask = mask;
        self
    }

    /// Bits in `mask` read back as zero right after being written.
    pub fn with_self_clearing(mut self, register: u8, mask: u8) -> Self {
        self.self_clearing.push((register, mask));
        self
    }

    /// Writing `command` to `register` restores the power-on image.
    pub fn with_reset(mut self, register: u8, command: u8) -> Self {
        self.reset = Some((register, command));
        self
    }

    /// A write to `trigger_register` whose `trigger_mask` bits equal
    /// `trigger_value` raises `status_mask` in `status_register` for the
    /// next `polls` reads of that register.
    pub fn with_busy_flag(
        mut self,
        status_register: u8,
        status_mask: u8,
        trigger_register: u8,
        trigger_mask: u8,
        trigger_value: u8,
        polls: u32,
    ) -> Self {
        self.busy = Some(BusyFlag {
            status_register,
            status_mask,
            trigger_register,
            trigger_mask,
            trigger_value,
            polls,
        });
        self
    }

    /// Queue values returned by the next reads of `register`, ahead of the
    /// register's stored value.
    pub fn script_reads(&mut self, register: u8, values: &[u8]) {
        match self.scripted.iter_mut().find(|(r, _)| *r == register) {
            Some((_, queue)) => queue.extend(values.iter().copied()),
            None => self
                .scripted
                .push((register, values.iter().copied().collect())),
        }
    }

    /// Current register value, without side effects.
    pub fn peek(&self, register: u8) -> u8 {
        self.regs[register as usize]
    }

    /// Overwrite a register without side effects.
    pub fn poke(&mut self, register: u8, value: u8) {
        self.regs[register as usize] = value;
    }

    /// Overwrite consecutive registers without side effects.
    pub fn poke_block(&mut self, register: u8, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.regs[register.wrapping_add(i as u8) as usize] = *b;
        }
    }

    /// Every register write seen so far, in order.
    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    /// Number of register bytes read so far.
    pub fn read_count(&self) -> u64 {
        self.reads
    }

    /// Register addressed by an SPI command byte.
    pub fn spi_register(&self, command: u8) -> u8 {
        match self.spi_addressing {
            SpiAddressing::SevenBit => command & 0x7f,
            SpiAddressing::HighPage => command | 0x80,
        }
    }

    /// Read one register, applying scripted values and busy flags.
    pub fn read(&mut self, register: u8) -> u8 {
        self.reads += 1;
        if let Some((_, queue)) = self.scripted.iter_mut().find(|(r, _)| *r == register) {
            if let Some(v) = queue.pop_front() {
                return v;
            }
        }
        let mut value = self.regs[register as usize];
        if let Some(busy) = &self.busy {
            if busy.status_register == register && self.busy_remaining > 0 {
                self.busy_remaining -= 1;
                value |= busy.status_mask;
            }
        }
        value
    }

    /// Auto-incrementing block read.
    pub fn read_block(&mut self, register: u8, buf: &mut [u8]) {
        let start = register & !self.block_flag_mask;
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read(start.wrapping_add(i as u8));
        }
    }

    /// Write one register, applying reset, trigger and self-clearing rules.
    pub fn write(&mut self, register: u8, value: u8) {
        self.writes.push((register, value));
        if self.reset == Some((register, value)) {
            self.regs = self.power_on;
            self.busy_remaining = 0;
            return;
        }
        self.regs[register as usize] = value;
        if let Some(busy) = &self.busy {
            if busy.trigger_register == register && value & busy.trigger_mask == busy.trigger_value
            {
                self.busy_remaining = busy.polls;
            }
        }
        for (r, mask) in &self.self_clearing {
            if *r == register {
                self.regs[register as usize] &= !mask;
            }
        }
    }
}

impl Default for MockRegisterDevice {
    fn default() -> Self {
        Self::new()
    }
}

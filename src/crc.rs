//! CRC-8, polynomial 0x1D (SAE J1850 polynomial)
//!
//! MSB-first, no reflection, no final XOR. The start value is supplied by
//! the caller so a running checksum can be carried across calls:
//! `next = crc8(current, bytes)`.
//!
//! Author: Moroya Sakamoto

/// Generator polynomial x^8 + x^4 + x^3 + x^2 + 1
pub const POLY: u8 = 0x1D;

/// Fold `data` into `start`
pub fn crc8(start: u8, data: &[u8]) -> u8 {
    let mut crc = start;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Running checksum that carries its value between updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc8 {
    value: u8,
}

impl Crc8 {
    pub const fn new(start: u8) -> Self {
        Self { value: start }
    }

    /// Fold more bytes in, returning the new value
    pub fn update(&mut self, data: &[u8]) -> u8 {
        self.value = crc8(self.value, data);
        self.value
    }

    pub fn value(&self) -> u8 {
        self.value
    }
}

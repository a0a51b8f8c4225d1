//! Packet Error Check accumulator: CRC-8 over the generator polynomial
//! x^8 + x^2 + x + 1, MSB first, no pre- or post-inversion.
//!
//! A receiver that folds in every wire byte of a transaction, including the
//! trailing PEC byte, ends with an accumulator of exactly zero.

const POLY: u8 = 0x07;

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u8; 256] = build_table();

/// Running CRC-8 accumulator.
///
/// Valid only between a transaction's address byte and its terminating
/// stop; reset at the start of every new transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pec(u8);

impl Pec {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    /// Folds one byte in via the lookup table.
    pub fn fold(&mut self, byte: u8) {
        self.0 = CRC_TABLE[(self.0 ^ byte) as usize];
    }

    /// Folds one byte in bit by bit. Produces the same accumulator as
    /// [`Pec::fold`] for every input sequence.
    pub fn fold_bitwise(&mut self, byte: u8) {
        let mut crc = self.0 ^ byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
        self.0 = crc;
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

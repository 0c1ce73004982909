//! Output lines and the assignment of HUB75 signals to them.
//!
//! The scan loop never touches individual pins. It writes whole bitmasks
//! through [`OutputLines`], where bit `n` of a mask is line `n`. A driver for
//! memory-mapped GPIO banks implements this with one set and one clear
//! register write per call; [`PinBank`] adapts any set of
//! [`embedded_hal::digital::OutputPin`]s.

use core::convert::Infallible;

use embedded_hal::digital::{OutputPin, PinState};

use crate::error::Error;

/// Number of addressable lines in a mask.
pub const MAX_LINES: u8 = 64;

/// Bitmask selecting a single line.
#[inline]
#[must_use]
pub const fn line_mask(line: u8) -> u64 {
    1u64 << line
}

/// An ordered set of digital output lines written by bitmask.
///
/// `set` and `clear` are each a single hardware transaction and cannot fail:
/// once a line is open, bit-banged output either happens or the hardware is
/// gone.
pub trait OutputLines {
    /// Error reported when a line cannot be acquired.
    type Error: core::fmt::Debug;

    /// Acquire `line`, configure it as an output and drive it to `state`.
    ///
    /// # Errors
    /// Returns the driver's error when the line cannot be acquired.
    fn open(&mut self, line: u8, state: PinState) -> Result<(), Self::Error>;

    /// Drive every line in `mask` high.
    fn set(&mut self, mask: u64);

    /// Drive every line in `mask` low.
    fn clear(&mut self, mask: u64);
}

/// Line numbers of every HUB75 signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinMapping {
    /// Red, upper half
    pub red1: u8,
    /// Green, upper half
    pub grn1: u8,
    /// Blue, upper half
    pub blu1: u8,
    /// Red, lower half
    pub red2: u8,
    /// Green, lower half
    pub grn2: u8,
    /// Blue, lower half
    pub blu2: u8,
    /// Row address bit 0
    pub addr0: u8,
    /// Row address bit 1
    pub addr1: u8,
    /// Row address bit 2
    pub addr2: u8,
    /// Row address bit 3, used by panels with more than 16 rows
    pub addr3: u8,
    /// Row address bit 4, used by panels with more than 32 rows
    pub addr4: u8,
    /// Output enable, active low
    pub blank: u8,
    /// Shift clock
    pub clock: u8,
    /// Latch / strobe
    pub latch: u8,
}

impl PinMapping {
    /// Adafruit RGB Matrix Bonnet / HAT on a Raspberry Pi (BCM numbering),
    /// with the E jumper on GPIO 24.
    pub const ADAFRUIT_BONNET: Self = Self {
        red1: 5,
        grn1: 13,
        blu1: 6,
        red2: 12,
        grn2: 16,
        blu2: 23,
        addr0: 22,
        addr1: 26,
        addr2: 27,
        addr3: 20,
        addr4: 24,
        blank: 4,
        clock: 17,
        latch: 21,
    };

    /// Address lines in bit order.
    #[must_use]
    pub const fn address_lines(&self) -> [u8; 5] {
        [self.addr0, self.addr1, self.addr2, self.addr3, self.addr4]
    }

    /// Colour lines: R1 G1 B1 R2 G2 B2.
    #[must_use]
    pub const fn color_lines(&self) -> [u8; 6] {
        [
            self.red1, self.grn1, self.blu1, self.red2, self.grn2, self.blu2,
        ]
    }

    /// Every line in use for a panel with `nrows` half-rows, paired with the
    /// state it is driven to when opened: the panel starts blanked with the
    /// address, clock, latch and colour lines low.
    pub fn initial_states(&self, nrows: usize) -> impl Iterator<Item = (u8, PinState)> {
        let address = self.address_lines();
        let used = address_line_count(nrows);
        address
            .into_iter()
            .take(used)
            .map(|line| (line, PinState::Low))
            .chain([
                (self.blank, PinState::High),
                (self.clock, PinState::Low),
                (self.latch, PinState::Low),
            ])
            .chain(self.color_lines().into_iter().map(|line| (line, PinState::Low)))
    }

    /// Check that every line used for `nrows` half-rows fits in a mask and
    /// that no line is shared.
    ///
    /// # Errors
    /// [`Error::UnsupportedRows`], [`Error::LineOutOfRange`] or
    /// [`Error::DuplicateLine`].
    pub fn validate<E>(&self, nrows: usize) -> Result<(), Error<E>> {
        if nrows == 0 || nrows > crate::MAX_NROWS {
            return Err(Error::UnsupportedRows(nrows * 2));
        }
        let mut seen = 0u64;
        for (line, _) in self.initial_states(nrows) {
            if line >= MAX_LINES {
                return Err(Error::LineOutOfRange(line));
            }
            if seen & line_mask(line) != 0 {
                return Err(Error::DuplicateLine(line));
            }
            seen |= line_mask(line);
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PinMapping {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "PinMapping(rgb1: {}/{}/{}, rgb2: {}/{}/{}, addr: {}/{}/{}/{}/{}, oe: {}, clk: {}, lat: {})",
            self.red1,
            self.grn1,
            self.blu1,
            self.red2,
            self.grn2,
            self.blu2,
            self.addr0,
            self.addr1,
            self.addr2,
            self.addr3,
            self.addr4,
            self.blank,
            self.clock,
            self.latch
        );
    }
}

/// Number of address lines needed to select `nrows` half-rows. A, B and C are
/// always driven; D is added above 8 half-rows and E above 16.
#[must_use]
pub const fn address_line_count(nrows: usize) -> usize {
    if nrows > 16 {
        5
    } else if nrows > 8 {
        4
    } else {
        3
    }
}

/// Errors from [`PinBank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinBankError {
    /// The bank has no pin at this index.
    NoSuchLine(u8),
}

/// [`OutputLines`] over `N` individual [`OutputPin`]s; line `n` is `pins[n]`.
///
/// Only opened lines are written; mask bits of unopened lines are ignored.
#[derive(Debug)]
pub struct PinBank<P, const N: usize> {
    pins: [P; N],
    opened: u64,
}

impl<P: OutputPin<Error = Infallible>, const N: usize> PinBank<P, N> {
    /// Wrap an array of pins.
    pub const fn new(pins: [P; N]) -> Self {
        const {
            assert!(N <= MAX_LINES as usize, "a bank holds at most 64 lines");
        }
        Self { pins, opened: 0 }
    }

    /// Give the pins back.
    pub fn release(self) -> [P; N] {
        self.pins
    }

    fn write(&mut self, mask: u64, state: PinState) {
        let mut pending = mask & self.opened;
        while pending != 0 {
            let line = pending.trailing_zeros() as usize;
            self.pins[line].set_state(state).unwrap_or_else(|e| match e {});
            pending &= pending - 1;
        }
    }
}

impl<P: OutputPin<Error = Infallible>, const N: usize> OutputLines for PinBank<P, N> {
    type Error = PinBankError;

    fn open(&mut self, line: u8, state: PinState) -> Result<(), Self::Error> {
        let pin = self
            .pins
            .get_mut(line as usize)
            .ok_or(PinBankError::NoSuchLine(line))?;
        pin.set_state(state).unwrap_or_else(|e| match e {});
        self.opened |= line_mask(line);
        Ok(())
    }

    #[inline]
    fn set(&mut self, mask: u64) {
        self.write(mask, PinState::High);
    }

    #[inline]
    fn clear(&mut self, mask: u64) {
        self.write(mask, PinState::Low);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use embedded_hal::digital::ErrorType;

    #[derive(Debug, Default)]
    struct FakePin {
        high: bool,
        writes: usize,
    }

    impl ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_address_line_count() {
        assert_eq!(address_line_count(4), 3);
        assert_eq!(address_line_count(8), 3);
        assert_eq!(address_line_count(16), 4);
        assert_eq!(address_line_count(32), 5);
    }

    #[test]
    fn test_initial_states_for_32_rows() {
        let mapping = PinMapping::ADAFRUIT_BONNET;
        let states: Vec<_> = mapping.initial_states(16).collect();
        // A-D, OE, CLK, LAT and six colour lines
        assert_eq!(states.len(), 4 + 3 + 6);
        assert!(states.contains(&(mapping.blank, PinState::High)));
        assert!(states.contains(&(mapping.addr3, PinState::Low)));
        assert!(!states.iter().any(|(line, _)| *line == mapping.addr4));
        assert_eq!(
            states
                .iter()
                .filter(|(_, state)| *state == PinState::High)
                .count(),
            1
        );
    }

    #[test]
    fn test_initial_states_for_64_rows_uses_e() {
        let mapping = PinMapping::ADAFRUIT_BONNET;
        let states: Vec<_> = mapping.initial_states(32).collect();
        assert_eq!(states.len(), 5 + 3 + 6);
        assert!(states.contains(&(mapping.addr4, PinState::Low)));
    }

    #[test]
    fn test_validate_bonnet() {
        assert_eq!(PinMapping::ADAFRUIT_BONNET.validate::<()>(16), Ok(()));
        assert_eq!(PinMapping::ADAFRUIT_BONNET.validate::<()>(32), Ok(()));
    }

    #[test]
    fn test_validate_rejects_too_many_rows() {
        assert_eq!(
            PinMapping::ADAFRUIT_BONNET.validate::<()>(64),
            Err(Error::UnsupportedRows(128))
        );
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mapping = PinMapping {
            clock: 5,
            ..PinMapping::ADAFRUIT_BONNET
        };
        assert_eq!(mapping.validate::<()>(16), Err(Error::DuplicateLine(5)));
    }

    #[test]
    fn test_validate_ignores_unused_address_line() {
        // E is not driven on a 32 row panel, so it may alias another signal
        let mapping = PinMapping {
            addr4: PinMapping::ADAFRUIT_BONNET.red1,
            ..PinMapping::ADAFRUIT_BONNET
        };
        assert_eq!(mapping.validate::<()>(16), Ok(()));
        assert_eq!(
            mapping.validate::<()>(32),
            Err(Error::DuplicateLine(PinMapping::ADAFRUIT_BONNET.red1))
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mapping = PinMapping {
            latch: 64,
            ..PinMapping::ADAFRUIT_BONNET
        };
        assert_eq!(mapping.validate::<()>(16), Err(Error::LineOutOfRange(64)));
    }

    #[test]
    fn test_pin_bank_open_and_write() {
        let mut bank: PinBank<FakePin, 4> = PinBank::new(Default::default());
        bank.open(0, PinState::High).unwrap();
        bank.open(2, PinState::Low).unwrap();

        bank.set(0b1111);
        let pins = bank.release();
        assert!(pins[0].high);
        assert!(!pins[1].high);
        assert!(pins[2].high);
        assert_eq!(pins[1].writes, 0);
        assert_eq!(pins[3].writes, 0);
    }

    #[test]
    fn test_pin_bank_clear() {
        let mut bank: PinBank<FakePin, 3> = PinBank::new(Default::default());
        for line in 0..3 {
            bank.open(line, PinState::High).unwrap();
        }
        bank.clear(0b101);
        let pins = bank.release();
        assert!(!pins[0].high);
        assert!(pins[1].high);
        assert!(!pins[2].high);
    }

    #[test]
    fn test_pin_bank_rejects_missing_line() {
        let mut bank: PinBank<FakePin, 2> = PinBank::new(Default::default());
        assert_eq!(
            bank.open(2, PinState::Low),
            Err(PinBankError::NoSuchLine(2))
        );
    }
}

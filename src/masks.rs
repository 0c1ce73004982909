//! Precomputed line masks used by the scan loop.
//!
//! Everything the scan loop writes is looked up here: the address pattern of
//! each half-row, and the colour lines to raise for each 3-bit RGB pattern of
//! the upper and lower row groups. The tables are built once from a
//! [`PinMapping`] and never change.

use crate::bitplane::Entry;
use crate::pins::{address_line_count, line_mask, PinMapping};

/// Row-address and colour masks for a panel with `NROWS` half-rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskTables<const NROWS: usize> {
    rows: [u64; NROWS],
    colors: [u64; 16],
    address: u64,
    color_lines: u64,
    blank: u64,
    clock: u64,
    latch: u64,
}

impl<const NROWS: usize> MaskTables<NROWS> {
    /// Build the tables for `mapping`.
    ///
    /// Half-row `h` is written to the address lines as a binary number, A
    /// being bit 0. Colour index `0..8` selects R1/G1/B1 by bits 0/1/2 and
    /// index `8..16` selects R2/G2/B2 the same way. Index 0 and 8 ("no
    /// channel lit") stay zero.
    #[must_use]
    pub fn new(mapping: &PinMapping) -> Self {
        let used = address_line_count(NROWS);
        let address_lines = mapping.address_lines();

        let mut address = 0u64;
        for &line in &address_lines[..used] {
            address |= line_mask(line);
        }

        let mut rows = [0u64; NROWS];
        for (h, mask) in rows.iter_mut().enumerate().skip(1) {
            for (bit, &line) in address_lines[..used].iter().enumerate() {
                if h & (1 << bit) != 0 {
                    *mask |= line_mask(line);
                }
            }
        }

        let mut colors = [0u64; 16];
        for i in 1..8 {
            if i & 1 != 0 {
                colors[i] |= line_mask(mapping.red1);
                colors[i + 8] |= line_mask(mapping.red2);
            }
            if i & 2 != 0 {
                colors[i] |= line_mask(mapping.grn1);
                colors[i + 8] |= line_mask(mapping.grn2);
            }
            if i & 4 != 0 {
                colors[i] |= line_mask(mapping.blu1);
                colors[i + 8] |= line_mask(mapping.blu2);
            }
        }

        let color_lines = mapping
            .color_lines()
            .iter()
            .fold(0u64, |acc, &line| acc | line_mask(line));

        Self {
            rows,
            colors,
            address,
            color_lines,
            blank: line_mask(mapping.blank),
            clock: line_mask(mapping.clock),
            latch: line_mask(mapping.latch),
        }
    }

    /// Address pattern for half-row `h`.
    #[inline]
    #[must_use]
    pub fn row(&self, h: usize) -> u64 {
        self.rows[h]
    }

    /// Colour lines to raise for an encoded entry.
    #[inline]
    #[must_use]
    pub fn color(&self, entry: Entry) -> u64 {
        self.colors[entry.upper() as usize] | self.colors[8 + entry.lower() as usize]
    }

    /// Entry `index` of the 16-entry colour table.
    #[must_use]
    pub fn color_entry(&self, index: usize) -> u64 {
        self.colors[index]
    }

    /// All address lines in use.
    #[inline]
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// All six colour lines.
    #[inline]
    #[must_use]
    pub fn color_lines(&self) -> u64 {
        self.color_lines
    }

    /// Output-enable line (high blanks the panel).
    #[inline]
    #[must_use]
    pub fn blank(&self) -> u64 {
        self.blank
    }

    /// Shift clock line.
    #[inline]
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Latch line.
    #[inline]
    #[must_use]
    pub fn latch(&self) -> u64 {
        self.latch
    }
}

//! Software-PWM scan engine for HUB75 LED matrix displays driven from plain
//! GPIO lines.
//!
//! ## How HUB75 LED Displays Work
//!
//! HUB75 RGB LED matrix panels are scanned, time-multiplexed displays that behave like a long
//! daisy-chained shift register rather than a random-access framebuffer.
//!
//! ### Signal names
//! - **R1 G1 B1 / R2 G2 B2** – Serial colour data for the upper and lower halves of the active scan line
//! - **CLK** – Shift-register clock; every rising edge pushes the six colour bits one pixel along the chain
//! - **LAT / STB** – Latch; copies the shift-register contents to the LED drivers
//! - **OE** – Output-Enable (active LOW): LEDs are lit while OE is LOW and blanked when it is HIGH
//! - **A B C D (E)** – Row-address select lines (choose which pair of rows is lit)
//!
//! ### Brightness without PWM hardware (Binary Code Modulation)
//! The LED drivers on a HUB75 panel are plain on/off switches. Colour depth is
//! produced in software: every 8-bit channel value is split into 8 bit-planes,
//! and bit-plane `i` is shown for a time proportional to `2^i`. Averaged over a
//! frame, the on-time of a channel is proportional to its value, so 8 bits of
//! depth cost 8 shift/latch cycles per half-row instead of 255.
//!
//! ### The scan cycle
//! For every half-row (a pair of rows `h` and `h + ROWS/2` lit together):
//! 1. Blank the panel (OE HIGH) and drive the row address for `h`.
//! 2. For each bit-plane `i` in `0..8`: clock `COLS` columns of colour bits in,
//!    pulse LAT with OE HIGH, release OE, then busy-wait `base * 2^i`.
//! 3. Advance to the next half-row; at the wrap to 0 (a frame boundary) a
//!    pending buffer swap is performed.
//!
//! ## Crate layout
//! - [`gamma`] – the fixed perceptual gamma table
//! - [`bitplane`] – [`bitplane::BitPlaneBuffer`], the per-plane encoding of an RGB frame
//! - [`pins`] – [`pins::PinMapping`] and the [`pins::OutputLines`] driver interface
//! - [`masks`] – precomputed row-address and colour line masks
//! - [`clock`] – the monotonic [`clock::Clock`] and its busy-wait primitive
//! - `swap` / [`scheduler`] / [`matrix`] – the double buffer, the scan loop and
//!   the [`matrix::RgbMatrix`] lifecycle wrapped around its thread (`std` only)
//! - [`sim`] – a host-side panel model for testing without hardware (`std` only)
//! - [`tiling`] – remapping a grid of chained panels onto one canvas
//!
//! ## Example
//! ```rust
//! use hub75_bitbang::compute_rows;
//! use hub75_bitbang::matrix::RgbMatrix;
//! use hub75_bitbang::pins::PinMapping;
//! use hub75_bitbang::sim::{SimPanel, VirtualClock};
//!
//! const ROWS: usize = 32;
//! const COLS: usize = 32;
//! const NROWS: usize = compute_rows(ROWS);
//!
//! let clock = VirtualClock::new(1_000_000_000);
//! let mapping = PinMapping::ADAFRUIT_BONNET;
//! let lines = SimPanel::new(mapping, COLS, ROWS, clock.clone());
//!
//! let mut matrix = RgbMatrix::<_, _, ROWS, COLS, NROWS>::new(lines, clock, mapping).unwrap();
//! matrix.start_rendering().unwrap();
//! matrix.set_pixel(0, 0, 255, 0, 0);
//! matrix.swap_buffers();
//! matrix.dispose();
//! ```
//!
//! ## Available Feature Flags
//!
//! ### `std` Feature (enabled by default)
//! Enables the scan thread, the matrix lifecycle, the host clock and the
//! simulator. Without it only the encoding, the tables and the tiling helpers
//! are built, so a `no_std` output stage can still reuse the encoding.
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the public value types so they can be emitted
//! with the `defmt` logging framework. No functional changes.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use core::convert::Infallible;

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::Point;

pub mod bitplane;
pub mod clock;
pub mod error;
pub mod gamma;
pub mod masks;
#[cfg(feature = "std")]
pub mod matrix;
pub mod pins;
#[cfg(feature = "std")]
pub mod scheduler;
#[cfg(feature = "std")]
pub mod sim;
#[cfg(feature = "std")]
mod swap;
pub mod tiling;

pub use error::Error;

/// Color type used in the framebuffer
pub type Color = Rgb888;

/// Number of bit-planes per channel (8-bit colour depth).
pub const PLANES: usize = 8;

/// Highest number of half-rows reachable with the five address lines A-E.
pub const MAX_NROWS: usize = 32;

/// Computes the NROWS value (number of half-rows) from ROWS
///
/// # Arguments
///
/// * `rows` - Total number of rows in the display
///
/// # Returns
///
/// Number of half-rows scanned; each one lights two physical rows
#[must_use]
pub const fn compute_rows(rows: usize) -> usize {
    rows / 2
}

/// Trait for all operations a producer may want to call on a framebuffer.
///
/// Every entry point treats out-of-range coordinates as a silent no-op.
pub trait FrameBufferOperations: DrawTarget<Color = Color, Error = Infallible> {
    /// Reset every pixel to black.
    fn erase(&mut self);

    /// Set every pixel to the same color.
    fn fill(&mut self, color: Color);

    /// Set a pixel in the framebuffer.
    fn set_pixel(&mut self, p: Point, color: Color);
}

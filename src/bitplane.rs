//! Bit-plane framebuffer for software-PWM (BCM) scanning.
//!
//! Each pixel value is gamma corrected and split into 8 bit-planes. For every
//! half-row `h` and column `c`, 8 consecutive bytes hold one [`Entry`] per
//! plane; each entry carries the colour bits of the upper row (`h`) and of the
//! lower row (`h + NROWS`) that are shifted out together.
//!
//! # Memory Layout
//! The buffer is a flat byte array of `8 * COLS * NROWS` bytes. The entry for
//! column `c`, half-row `h` and bit-plane `i` lives at byte offset
//! `8*c + 8*h*COLS + i`:
//! - Bit 0: Red channel for the upper row
//! - Bit 1: Green channel for the upper row
//! - Bit 2: Blue channel for the upper row
//! - Bit 3: Red channel for the lower row
//! - Bit 4: Green channel for the lower row
//! - Bit 5: Blue channel for the lower row
//!
//! The scan loop reads bits `[0..2]` and `[3..5]` of an entry as indices into
//! the colour mask table, so no per-pixel arithmetic happens while scanning.
//!
//! # Example
//! ```rust
//! use embedded_graphics::prelude::*;
//! use embedded_graphics::primitives::{Circle, PrimitiveStyle};
//! use hub75_bitbang::bitplane::BitPlaneBuffer;
//! use hub75_bitbang::{compute_rows, Color};
//!
//! const ROWS: usize = 32;
//! const COLS: usize = 64;
//! const NROWS: usize = compute_rows(ROWS);
//!
//! let mut framebuffer = BitPlaneBuffer::<ROWS, COLS, NROWS>::new();
//! framebuffer.set_pixel(Point::new(3, 4), Color::RED);
//!
//! Circle::new(Point::new(40, 10), 10)
//!     .into_styled(PrimitiveStyle::with_fill(Color::BLUE))
//!     .draw(&mut framebuffer)
//!     .unwrap();
//!
//! assert_eq!(framebuffer.get_pixel(Point::new(3, 4)), Some(Color::RED));
//! ```

use core::convert::Infallible;

use bitfield::bitfield;
use embedded_dma::ReadBuffer;
use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::{OriginDimensions, Point, Size};

use crate::gamma;
use crate::Color;
use crate::FrameBufferOperations;
use crate::PLANES;

bitfield! {
    /// 8-bit word holding one bit-plane of one column for both row groups.
    ///
    /// The bit layout is as follows:
    /// - Bits 7-6: Unused
    /// - Bit 5: Blue channel for the lower row
    /// - Bit 4: Green channel for the lower row
    /// - Bit 3: Red channel for the lower row
    /// - Bit 2: Blue channel for the upper row
    /// - Bit 1: Green channel for the upper row
    /// - Bit 0: Red channel for the upper row
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct Entry(u8);
    impl Debug;
    pub blu2, set_blu2: 5;
    pub grn2, set_grn2: 4;
    pub red2, set_red2: 3;
    pub blu1, set_blu1: 2;
    pub grn1, set_grn1: 1;
    pub red1, set_red1: 0;
    /// Colour-mask index of the upper row (bits 2-0)
    pub upper, _: 2, 0;
    /// Colour-mask index of the lower row (bits 5-3)
    pub lower, _: 5, 3;
}

#[cfg(feature = "defmt")]
impl defmt::Format for Entry {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Entry({=u8:#x})", self.0)
    }
}

impl Entry {
    /// An entry with every colour bit cleared.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Raw byte as stored in the buffer.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    fn set_color0(&mut self, r: bool, g: bool, b: bool) {
        self.set_red1(r);
        self.set_grn1(g);
        self.set_blu1(b);
    }

    fn set_color1(&mut self, r: bool, g: bool, b: bool) {
        self.set_red2(r);
        self.set_grn2(g);
        self.set_blu2(b);
    }
}

/// The 8 bit-plane entries of one column in one half-row.
pub type Slot = [Entry; PLANES];

/// Encode an already gamma-corrected color into a slot, touching only the
/// bits of the selected row group.
#[inline]
fn encode(slot: &mut Slot, lower: bool, color: Color) {
    for (plane, entry) in slot.iter_mut().enumerate() {
        let bit = 1u8 << plane;
        let r = color.r() & bit != 0;
        let g = color.g() & bit != 0;
        let b = color.b() & bit != 0;
        if lower {
            entry.set_color1(r, g, b);
        } else {
            entry.set_color0(r, g, b);
        }
    }
}

/// Re-assemble the 8 planes of one row group into a color.
fn decode(slot: &Slot, lower: bool) -> Color {
    let (mut r, mut g, mut b) = (0u8, 0u8, 0u8);
    for (plane, entry) in slot.iter().enumerate() {
        let (red, grn, blu) = if lower {
            (entry.red2(), entry.grn2(), entry.blu2())
        } else {
            (entry.red1(), entry.grn1(), entry.blu1())
        };
        r |= u8::from(red) << plane;
        g |= u8::from(grn) << plane;
        b |= u8::from(blu) << plane;
    }
    Color::new(r, g, b)
}

/// One half-row: a slot per column.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(C)]
struct Row<const COLS: usize> {
    data: [Slot; COLS],
}

impl<const COLS: usize> Row<COLS> {
    const fn new() -> Self {
        Self {
            data: [[Entry::new(); PLANES]; COLS],
        }
    }
}

/// Bit-plane framebuffer for a HUB75 panel scanned in software.
///
/// # Type Parameters
/// - `ROWS`: Total number of rows in the panel
/// - `COLS`: Number of columns in the panel (or the whole chain)
/// - `NROWS`: Number of half-rows, must equal [`compute_rows(ROWS)`](crate::compute_rows)
///
/// A new buffer is all black. Values written through [`set_pixel`](Self::set_pixel)
/// and [`fill`](Self::fill) are gamma corrected before they are stored, so
/// [`get_pixel`](Self::get_pixel) returns the corrected value.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
#[repr(align(4))]
pub struct BitPlaneBuffer<const ROWS: usize, const COLS: usize, const NROWS: usize> {
    rows: [Row<COLS>; NROWS],
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> Default
    for BitPlaneBuffer<ROWS, COLS, NROWS>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> BitPlaneBuffer<ROWS, COLS, NROWS> {
    /// Create a new, all-black framebuffer.
    ///
    /// Fails to compile when the geometry is inconsistent: `ROWS` must be
    /// non-zero and even, `NROWS` must be `ROWS / 2` and `COLS` non-zero.
    #[must_use]
    pub const fn new() -> Self {
        const {
            assert!(ROWS > 0 && ROWS % 2 == 0, "ROWS must be even and non-zero");
            assert!(NROWS == crate::compute_rows(ROWS), "NROWS must be ROWS / 2");
            assert!(COLS > 0, "COLS must be non-zero");
        }
        Self {
            rows: [Row::new(); NROWS],
        }
    }

    /// Width of the buffer in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        COLS
    }

    /// Height of the buffer in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        ROWS
    }

    /// Set a pixel in the framebuffer. Out-of-range points are ignored.
    pub fn set_pixel(&mut self, p: Point, color: Color) {
        if p.x < 0 || p.y < 0 {
            return;
        }
        self.set_pixel_internal(p.x as usize, p.y as usize, color);
    }

    fn set_pixel_internal(&mut self, x: usize, y: usize, color: Color) {
        if x >= COLS || y >= ROWS {
            return;
        }
        let lower = y >= NROWS;
        let slot = &mut self.rows[y % NROWS].data[x];
        encode(slot, lower, gamma::correct_color(color));
    }

    /// Decode the gamma-corrected color stored at `p`, or `None` when `p` is
    /// outside the panel.
    #[must_use]
    pub fn get_pixel(&self, p: Point) -> Option<Color> {
        if p.x < 0 || p.y < 0 {
            return None;
        }
        let (x, y) = (p.x as usize, p.y as usize);
        if x >= COLS || y >= ROWS {
            return None;
        }
        Some(decode(&self.rows[y % NROWS].data[x], y >= NROWS))
    }

    /// Set every pixel to `color`.
    ///
    /// Since every slot ends up with the same byte pattern, the pattern is
    /// encoded once and replicated.
    pub fn fill(&mut self, color: Color) {
        let color = gamma::correct_color(color);
        let mut slot: Slot = [Entry::new(); PLANES];
        encode(&mut slot, false, color);
        encode(&mut slot, true, color);
        for row in &mut self.rows {
            row.data.fill(slot);
        }
    }

    /// Reset every pixel to black.
    pub fn erase(&mut self) {
        for row in &mut self.rows {
            row.data.fill([Entry::new(); PLANES]);
        }
    }

    /// The slots of half-row `h`, one per column, as the scan loop reads them.
    ///
    /// # Panics
    /// Panics if `h >= NROWS`.
    #[inline]
    #[must_use]
    pub fn half_row(&self, h: usize) -> &[Slot; COLS] {
        &self.rows[h].data
    }

    /// The raw encoded bytes, `8 * COLS * NROWS` of them.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let len = core::mem::size_of_val(&self.rows);
        // SAFETY: `rows` is a `repr(C)` nest of arrays of `repr(transparent)`
        // `u8` entries, so it is `len` initialized bytes without padding.
        unsafe { core::slice::from_raw_parts(core::ptr::from_ref(&self.rows).cast::<u8>(), len) }
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> OriginDimensions
    for BitPlaneBuffer<ROWS, COLS, NROWS>
{
    fn size(&self) -> Size {
        Size::new(COLS as u32, ROWS as u32)
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize>
    embedded_graphics::draw_target::DrawTarget for BitPlaneBuffer<ROWS, COLS, NROWS>
{
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for pixel in pixels {
            self.set_pixel(pixel.0, pixel.1);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> FrameBufferOperations
    for BitPlaneBuffer<ROWS, COLS, NROWS>
{
    #[inline]
    fn erase(&mut self) {
        BitPlaneBuffer::erase(self);
    }

    #[inline]
    fn fill(&mut self, color: Color) {
        BitPlaneBuffer::fill(self, color);
    }

    #[inline]
    fn set_pixel(&mut self, p: Point, color: Color) {
        BitPlaneBuffer::set_pixel(self, p, color);
    }
}

unsafe impl<const ROWS: usize, const COLS: usize, const NROWS: usize> ReadBuffer
    for BitPlaneBuffer<ROWS, COLS, NROWS>
{
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        let bytes = self.as_bytes();
        (bytes.as_ptr(), bytes.len())
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> core::fmt::Debug
    for BitPlaneBuffer<ROWS, COLS, NROWS>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BitPlaneBuffer")
            .field("size", &core::mem::size_of_val(&self.rows))
            .field("half_rows", &NROWS)
            .field("cols", &COLS)
            .field("planes", &PLANES)
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const ROWS: usize, const COLS: usize, const NROWS: usize> defmt::Format
    for BitPlaneBuffer<ROWS, COLS, NROWS>
{
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "BitPlaneBuffer<{}, {}, {}>", ROWS, COLS, NROWS);
        defmt::write!(f, " size: {}", core::mem::size_of_val(&self.rows));
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;
    use std::vec;

    use super::*;
    use crate::gamma::GAMMA;
    use embedded_graphics::prelude::*;
    use embedded_graphics::primitives::{Circle, PrimitiveStyle, Rectangle};

    const TEST_ROWS: usize = 32;
    const TEST_COLS: usize = 32;
    const TEST_NROWS: usize = TEST_ROWS / 2;

    type TestFrameBuffer = BitPlaneBuffer<TEST_ROWS, TEST_COLS, TEST_NROWS>;

    fn gamma_color(r: u8, g: u8, b: u8) -> Color {
        Color::new(GAMMA[r as usize], GAMMA[g as usize], GAMMA[b as usize])
    }

    #[test]
    fn test_entry_construction() {
        let entry = Entry::new();
        assert_eq!(entry.bits(), 0);
        assert_eq!(entry.upper(), 0);
        assert_eq!(entry.lower(), 0);
    }

    #[test]
    fn test_entry_set_color0() {
        let mut entry = Entry::new();

        entry.set_color0(true, false, true);
        assert!(entry.red1());
        assert!(!entry.grn1());
        assert!(entry.blu1());
        assert_eq!(entry.bits(), 0b0000_0101);
        assert_eq!(entry.upper(), 0b101);
        assert_eq!(entry.lower(), 0);
    }

    #[test]
    fn test_entry_set_color1() {
        let mut entry = Entry::new();

        entry.set_color1(false, true, true);
        assert!(!entry.red2());
        assert!(entry.grn2());
        assert!(entry.blu2());
        assert_eq!(entry.bits(), 0b0011_0000);
        assert_eq!(entry.lower(), 0b110);
        assert_eq!(entry.upper(), 0);
    }

    #[test]
    fn test_entry_groups_are_independent() {
        let mut entry = Entry::new();
        entry.set_color0(true, true, true);
        entry.set_color1(true, false, false);
        entry.set_color0(false, false, false);
        assert_eq!(entry.bits(), 0b0000_1000);
    }

    #[test]
    fn test_new_is_black() {
        let fb = TestFrameBuffer::new();
        assert!(fb.as_bytes().iter().all(|&b| b == 0));
        assert_eq!(fb.as_bytes().len(), 8 * TEST_COLS * TEST_NROWS);
        assert_eq!(fb, TestFrameBuffer::default());
    }

    #[test]
    fn test_single_red_pixel_scenario() {
        let mut fb = TestFrameBuffer::new();
        fb.set_pixel(Point::new(0, 0), Color::new(255, 0, 0));

        assert_eq!(
            fb.get_pixel(Point::new(0, 0)),
            Some(Color::new(255, GAMMA[0], GAMMA[0]))
        );
        for y in 0..TEST_ROWS as i32 {
            for x in 0..TEST_COLS as i32 {
                if (x, y) != (0, 0) {
                    assert_eq!(fb.get_pixel(Point::new(x, y)), Some(Color::BLACK));
                }
            }
        }
    }

    #[test]
    fn test_clipping_leaves_buffer_unchanged() {
        let mut fb = TestFrameBuffer::new();
        fb.set_pixel(Point::new(-1, 0), Color::WHITE);
        fb.set_pixel(Point::new(0, 32), Color::WHITE);
        fb.set_pixel(Point::new(0, -1), Color::WHITE);
        fb.set_pixel(Point::new(32, 0), Color::WHITE);
        assert_eq!(fb, TestFrameBuffer::new());
    }

    #[test]
    fn test_clipping_keeps_existing_content() {
        let mut fb = TestFrameBuffer::new();
        fb.set_pixel(Point::new(5, 20), Color::new(10, 200, 90));
        let before = fb;
        fb.set_pixel(Point::new(TEST_COLS as i32, 20), Color::WHITE);
        fb.set_pixel(Point::new(5, TEST_ROWS as i32), Color::WHITE);
        assert_eq!(fb.as_bytes(), before.as_bytes());
    }

    #[test]
    fn test_get_pixel_out_of_range() {
        let fb = TestFrameBuffer::new();
        assert_eq!(fb.get_pixel(Point::new(-1, 0)), None);
        assert_eq!(fb.get_pixel(Point::new(0, TEST_ROWS as i32)), None);
        assert_eq!(fb.get_pixel(Point::new(TEST_COLS as i32, 0)), None);
    }

    #[test]
    fn test_round_trip_all_channel_values() {
        let mut fb = TestFrameBuffer::new();
        for v in 0..=255u8 {
            let x = i32::from(v) % TEST_COLS as i32;
            let y = i32::from(v) / TEST_COLS as i32 * 3;
            let color = Color::new(v, 255 - v, v.wrapping_mul(7));
            fb.set_pixel(Point::new(x, y), color);
            assert_eq!(
                fb.get_pixel(Point::new(x, y)),
                Some(gamma_color(v, 255 - v, v.wrapping_mul(7)))
            );
        }
    }

    #[test]
    fn test_upper_and_lower_rows_share_slot() {
        let mut fb = TestFrameBuffer::new();
        fb.set_pixel(Point::new(7, 3), Color::new(255, 0, 0));
        fb.set_pixel(Point::new(7, 3 + TEST_NROWS as i32), Color::new(0, 0, 255));

        assert_eq!(fb.get_pixel(Point::new(7, 3)), Some(Color::new(255, 0, 0)));
        assert_eq!(
            fb.get_pixel(Point::new(7, 3 + TEST_NROWS as i32)),
            Some(Color::new(0, 0, 255))
        );
        for entry in &fb.half_row(3)[7] {
            assert_eq!(entry.upper(), 0b001);
            assert_eq!(entry.lower(), 0b100);
        }
    }

    #[test]
    fn test_overwrite_clears_bits() {
        let mut fb = TestFrameBuffer::new();
        fb.set_pixel(Point::new(1, 1), Color::WHITE);
        fb.set_pixel(Point::new(1, 1), Color::BLACK);
        assert_eq!(fb, TestFrameBuffer::new());
    }

    #[test]
    fn test_byte_layout_offsets() {
        let mut fb = TestFrameBuffer::new();
        let (c, h) = (5usize, 9usize);
        // gamma(255) = 255 sets every plane
        fb.set_pixel(Point::new(c as i32, h as i32), Color::new(0, 255, 0));
        let bytes = fb.as_bytes();
        for i in 0..PLANES {
            assert_eq!(bytes[8 * c + 8 * h * TEST_COLS + i], 0b010);
        }
        assert_eq!(bytes.iter().filter(|&&b| b != 0).count(), PLANES);
    }

    #[test]
    fn test_plane_bits_follow_value() {
        let mut fb = TestFrameBuffer::new();
        // 0xc0 is corrected to 125 = 0b0111_1101
        fb.set_pixel(Point::new(0, 0), Color::new(0xc0, 0, 0));
        let expected = GAMMA[0xc0];
        for (plane, entry) in fb.half_row(0)[0].iter().enumerate() {
            assert_eq!(entry.red1(), expected & (1 << plane) != 0);
        }
    }

    #[test]
    fn test_fill_uniformity() {
        let mut fb = TestFrameBuffer::new();
        fb.fill(Color::new(200, 100, 50));
        let expected = gamma_color(200, 100, 50);
        for y in 0..TEST_ROWS as i32 {
            for x in 0..TEST_COLS as i32 {
                assert_eq!(fb.get_pixel(Point::new(x, y)), Some(expected));
            }
        }
    }

    #[test]
    fn test_fill_matches_per_pixel_writes() {
        let mut filled = TestFrameBuffer::new();
        filled.fill(Color::new(33, 180, 255));

        let mut painted = TestFrameBuffer::new();
        for y in 0..TEST_ROWS as i32 {
            for x in 0..TEST_COLS as i32 {
                painted.set_pixel(Point::new(x, y), Color::new(33, 180, 255));
            }
        }
        assert_eq!(filled, painted);
    }

    #[test]
    fn test_erase() {
        let mut fb = TestFrameBuffer::new();
        fb.fill(Color::WHITE);
        fb.erase();
        assert_eq!(fb, TestFrameBuffer::new());
    }

    #[test]
    fn test_origin_dimensions() {
        let fb = TestFrameBuffer::new();
        let size = fb.size();
        assert_eq!(size.width, TEST_COLS as u32);
        assert_eq!(size.height, TEST_ROWS as u32);
        assert_eq!(fb.width(), TEST_COLS);
        assert_eq!(fb.height(), TEST_ROWS);
    }

    #[test]
    fn test_draw_iter_clips() {
        let mut fb = TestFrameBuffer::new();
        let pixels = vec![
            embedded_graphics::Pixel(Point::new(0, 0), Color::RED),
            embedded_graphics::Pixel(Point::new(-3, 2), Color::GREEN),
            embedded_graphics::Pixel(Point::new(2, 99), Color::BLUE),
        ];
        assert!(fb.draw_iter(pixels).is_ok());
        assert_eq!(fb.get_pixel(Point::new(0, 0)), Some(Color::RED));

        let mut expected = TestFrameBuffer::new();
        expected.set_pixel(Point::new(0, 0), Color::RED);
        assert_eq!(fb, expected);
    }

    #[test]
    fn test_draw_target_clear_fills() {
        let mut fb = TestFrameBuffer::new();
        fb.clear(Color::YELLOW).unwrap();
        assert_eq!(fb.get_pixel(Point::new(31, 31)), Some(Color::YELLOW));
    }

    #[test]
    fn test_embedded_graphics_integration() {
        let mut fb = TestFrameBuffer::new();

        Rectangle::new(Point::new(4, 4), Size::new(8, 20))
            .into_styled(PrimitiveStyle::with_fill(Color::RED))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.get_pixel(Point::new(4, 4)), Some(Color::RED));
        assert_eq!(fb.get_pixel(Point::new(11, 23)), Some(Color::RED));
        assert_eq!(fb.get_pixel(Point::new(12, 23)), Some(Color::BLACK));

        // partially off screen
        Circle::new(Point::new(24, 24), 16)
            .into_styled(PrimitiveStyle::with_fill(Color::BLUE))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.get_pixel(Point::new(31, 31)), Some(Color::BLUE));
    }

    #[test]
    fn test_read_buffer_implementation() {
        let fb = TestFrameBuffer::new();
        unsafe {
            let (ptr, len) = fb.read_buffer();
            assert!(!ptr.is_null());
            assert_eq!(len, 8 * TEST_COLS * TEST_NROWS);
            assert_eq!(ptr, fb.as_bytes().as_ptr());
        }
    }

    #[test]
    fn test_memory_alignment() {
        let fb = TestFrameBuffer::new();
        let ptr = &fb as *const _ as usize;
        assert_eq!(ptr % 4, 0);
    }

    #[test]
    fn test_debug_formatting() {
        let fb = TestFrameBuffer::new();
        let debug_string = format!("{:?}", fb);
        assert!(debug_string.contains("BitPlaneBuffer"));
        assert!(debug_string.contains("half_rows: 16"));
        assert!(debug_string.contains("planes: 8"));
    }

    #[test]
    fn test_framebuffer_operations_trait() {
        fn paint<F: FrameBufferOperations>(fb: &mut F) {
            fb.fill(Color::GREEN);
            fb.set_pixel(Point::new(1, 1), Color::RED);
        }
        let mut fb = TestFrameBuffer::new();
        paint(&mut fb);
        assert_eq!(fb.get_pixel(Point::new(1, 1)), Some(Color::RED));
        assert_eq!(fb.get_pixel(Point::new(2, 2)), Some(Color::GREEN));
    }
}

//! Driving a grid of panels as one canvas.
//!
//! The scan engine sees a chain of panels as one long panel: `PANEL_ROWS`
//! rows by `PANEL_COLS * TILE_ROWS * TILE_COLS` columns. A [`PixelRemapper`]
//! maps a point on the virtual canvas (the grid as it hangs on the wall) to
//! its place in that chain, and [`TiledFrameBuffer`] applies the mapping to
//! everything drawn through it.
//!
//! Supported layouts:
//! - [`ChainTopRightDown`]

use core::{convert::Infallible, marker::PhantomData};

use embedded_dma::ReadBuffer;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, PixelColor, Point, Size};

use crate::{Color, FrameBufferOperations};

/// Number of columns of the chain driving a grid of panels.
///
/// # Arguments
///
/// * `cols` - Number of columns per panel
/// * `num_panels_wide` - Number of panels tiled horizontally
/// * `num_panels_high` - Number of panels tiled vertically
#[must_use]
pub const fn compute_tiled_cols(
    cols: usize,
    num_panels_wide: usize,
    num_panels_high: usize,
) -> usize {
    cols * num_panels_wide * num_panels_high
}

/// Maps points of a virtual canvas onto the chain that drives it.
pub trait PixelRemapper {
    /// Number of rows in the virtual canvas
    const VIRT_ROWS: usize;
    /// Number of columns in the virtual canvas
    const VIRT_COLS: usize;
    /// Number of rows in the driven framebuffer
    const FB_ROWS: usize;
    /// Number of columns in the driven framebuffer
    const FB_COLS: usize;

    /// Remap a virtual pixel to a framebuffer pixel
    #[inline]
    fn remap<C: PixelColor>(mut pixel: embedded_graphics::Pixel<C>) -> embedded_graphics::Pixel<C> {
        pixel.0 = Self::remap_point(pixel.0);
        pixel
    }

    /// Remap a virtual point to a framebuffer point.
    ///
    /// Points left of or above the canvas are returned unchanged and points
    /// right of or below it become `(-1, -1)`, so the framebuffer clips both.
    #[inline]
    #[must_use]
    fn remap_point(point: Point) -> Point {
        if point.x < 0 || point.y < 0 {
            return point;
        }
        let (x, y) = (point.x as usize, point.y as usize);
        if x >= Self::VIRT_COLS || y >= Self::VIRT_ROWS {
            return Point::new(-1, -1);
        }
        let (fb_x, fb_y) = Self::remap_xy(x, y);
        Point::new(fb_x as i32, fb_y as i32)
    }

    /// Remap an on-canvas x,y coordinate
    fn remap_xy(x: usize, y: usize) -> (usize, usize);

    /// (rows, cols) of the virtual canvas
    #[inline]
    #[must_use]
    fn virtual_size() -> (usize, usize) {
        (Self::VIRT_ROWS, Self::VIRT_COLS)
    }

    /// (rows, cols) of the framebuffer this remaps to
    #[inline]
    #[must_use]
    fn fb_size() -> (usize, usize) {
        (Self::FB_ROWS, Self::FB_COLS)
    }
}

/// Panels chained from the top right, serpentine.
///
/// Seen from the front, the chain enters at the top right panel and runs
/// left to the end of the row, then drops to the next row and runs right.
/// Panels in every second row are therefore mounted upside down. The grid is
/// read from the bottom of the chain upwards: the last row of panels is
/// nearest the start of the chain.
///
/// # Type Parameters
///
/// * `PANEL_ROWS` - Number of rows in a single panel
/// * `PANEL_COLS` - Number of columns in a single panel
/// * `TILE_ROWS` - Number of panels stacked vertically
/// * `TILE_COLS` - Number of panels side by side
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainTopRightDown<
    const PANEL_ROWS: usize,
    const PANEL_COLS: usize,
    const TILE_ROWS: usize,
    const TILE_COLS: usize,
>;

impl<
        const PANEL_ROWS: usize,
        const PANEL_COLS: usize,
        const TILE_ROWS: usize,
        const TILE_COLS: usize,
    > PixelRemapper for ChainTopRightDown<PANEL_ROWS, PANEL_COLS, TILE_ROWS, TILE_COLS>
{
    const VIRT_ROWS: usize = PANEL_ROWS * TILE_ROWS;
    const VIRT_COLS: usize = PANEL_COLS * TILE_COLS;
    const FB_ROWS: usize = PANEL_ROWS;
    const FB_COLS: usize = compute_tiled_cols(PANEL_COLS, TILE_COLS, TILE_ROWS);

    fn remap_xy(x: usize, y: usize) -> (usize, usize) {
        let band = TILE_ROWS - y / PANEL_ROWS - 1;
        if band % 2 == 1 {
            // upside down
            (
                (band + 1) * Self::VIRT_COLS - x - 1,
                PANEL_ROWS - 1 - y % PANEL_ROWS,
            )
        } else {
            (band * Self::VIRT_COLS + x, y % PANEL_ROWS)
        }
    }
}

/// A drawing view of a chain framebuffer as the grid of panels it drives.
///
/// Wraps a borrowed framebuffer, usually the back buffer from
/// [`RgbMatrix::canvas`](crate::matrix::RgbMatrix::canvas), and remaps every
/// pixel drawn through it with `M`.
///
/// # Example
/// ```rust
/// use hub75_bitbang::bitplane::BitPlaneBuffer;
/// use hub75_bitbang::compute_rows;
/// use hub75_bitbang::tiling::{compute_tiled_cols, ChainTopRightDown, TiledFrameBuffer};
/// use embedded_graphics::prelude::*;
///
/// const PANEL_ROWS: usize = 64;
/// const PANEL_COLS: usize = 64;
/// const FB_COLS: usize = compute_tiled_cols(PANEL_COLS, 2, 2);
/// const NROWS: usize = compute_rows(PANEL_ROWS);
///
/// type Layout = ChainTopRightDown<PANEL_ROWS, PANEL_COLS, 2, 2>;
///
/// let mut chain = BitPlaneBuffer::<PANEL_ROWS, FB_COLS, NROWS>::new();
/// let canvas = TiledFrameBuffer::<_, Layout>::new(&mut chain);
///
/// // a 128x128 canvas made of four 64x64 panels
/// assert_eq!(canvas.size(), Size::new(128, 128));
/// ```
pub struct TiledFrameBuffer<'a, F, M: PixelRemapper> {
    inner: &'a mut F,
    _layout: PhantomData<M>,
}

impl<'a, F, M: PixelRemapper> TiledFrameBuffer<'a, F, M> {
    /// View `inner` through the layout `M`.
    pub fn new(inner: &'a mut F) -> Self {
        Self {
            inner,
            _layout: PhantomData,
        }
    }

    /// The wrapped framebuffer, in chain coordinates.
    pub fn inner(&mut self) -> &mut F {
        self.inner
    }
}

impl<F, M: PixelRemapper> core::fmt::Debug for TiledFrameBuffer<'_, F, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TiledFrameBuffer")
            .field("virtual_size", &M::virtual_size())
            .field("fb_size", &M::fb_size())
            .finish()
    }
}

impl<F, M> DrawTarget for TiledFrameBuffer<'_, F, M>
where
    F: DrawTarget<Error = Infallible, Color = Color>,
    M: PixelRemapper,
{
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        self.inner.draw_iter(pixels.into_iter().map(M::remap))
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.inner.clear(color)
    }
}

impl<F, M: PixelRemapper> OriginDimensions for TiledFrameBuffer<'_, F, M> {
    fn size(&self) -> Size {
        let (rows, cols) = M::virtual_size();
        Size::new(cols as u32, rows as u32)
    }
}

impl<F, M> FrameBufferOperations for TiledFrameBuffer<'_, F, M>
where
    F: FrameBufferOperations,
    M: PixelRemapper,
{
    #[inline]
    fn erase(&mut self) {
        self.inner.erase();
    }

    #[inline]
    fn fill(&mut self, color: Color) {
        self.inner.fill(color);
    }

    #[inline]
    fn set_pixel(&mut self, p: Point, color: Color) {
        self.inner.set_pixel(M::remap_point(p), color);
    }
}

// SAFETY: delegates to the wrapped buffer, which stays borrowed for as long
// as this view lives.
unsafe impl<T, F, M> ReadBuffer for TiledFrameBuffer<'_, F, M>
where
    F: ReadBuffer<Word = T>,
    M: PixelRemapper,
{
    type Word = T;

    unsafe fn read_buffer(&self) -> (*const T, usize) {
        self.inner.read_buffer()
    }
}

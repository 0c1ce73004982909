//! The matrix handle: double-buffered drawing plus the scan thread lifecycle.
//!
//! [`RgbMatrix`] owns the output lines from construction until
//! [`dispose`](RgbMatrix::dispose). While rendering they belong to the scan
//! thread; stopping hands them back once the thread has parked.
//!
//! ```text
//!            start_rendering           stop_rendering
//!  Stopped ------------------> Running ---------------> Stopping
//!     ^                                                     |
//!     +----------------- scan loop parks -------------------+
//! ```

use core::hint::spin_loop;
use core::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use embedded_graphics::prelude::Point;
use log::{debug, error, trace, warn};
use thread_priority::{set_current_thread_priority, ThreadPriority};

use crate::bitplane::BitPlaneBuffer;
use crate::clock::{nanos_to_ticks, ticks_to_nanos, Clock};
use crate::error::Error;
use crate::masks::MaskTables;
use crate::pins::{OutputLines, PinMapping};
use crate::scheduler::{RenderState, Scanner, Shared};
use crate::{Color, PLANES};

/// Default hold time of bit-plane 0.
pub const DEFAULT_PWM_DURATION_NS: u64 = 1800;

/// Default hold time of bit-plane 0 for panels taller than 32 rows, which
/// have twice as many half-rows to fit into a frame.
pub const TALL_PANEL_PWM_DURATION_NS: u64 = 400;

/// Longest bit-plane 0 hold, in ticks, whose top plane still fits a `u64`.
const MAX_BASE_TICKS: u64 = u64::MAX >> PLANES;

/// Name of the scan thread.
pub const SCAN_THREAD_NAME: &str = "hub75-scan";

/// Default bit-plane 0 hold time for a panel with `rows` rows.
#[must_use]
pub const fn default_pwm_duration_ns(rows: usize) -> u64 {
    if rows > 32 {
        TALL_PANEL_PWM_DURATION_NS
    } else {
        DEFAULT_PWM_DURATION_NS
    }
}

/// Give the calling thread the highest priority the platform allows. Scanning
/// goes on at normal priority if that is refused.
fn raise_priority() {
    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(()) => debug!("scan thread priority raised"),
        Err(err) => warn!("could not raise scan thread priority: {:?}", err),
    }
}

/// A `COLS` x `ROWS` HUB75 panel (or chain) scanned in software.
///
/// Drawing goes to the back buffer; [`swap_buffers`](Self::swap_buffers)
/// makes it visible at the next frame boundary. `L` drives the lines and `K`
/// times the bit-planes; both move to the scan thread while rendering.
///
/// # Type Parameters
/// * `ROWS` - Total number of rows, even
/// * `COLS` - Number of columns, the whole chain
/// * `NROWS` - Number of half-rows, `ROWS / 2` (use [`compute_rows`](crate::compute_rows))
pub struct RgbMatrix<L, K, const ROWS: usize, const COLS: usize, const NROWS: usize>
where
    L: OutputLines + Send + 'static,
    K: Clock + Send + 'static,
{
    shared: Arc<Shared<ROWS, COLS, NROWS>>,
    scanner: Option<Scanner<L, K, NROWS>>,
    worker: Option<JoinHandle<Scanner<L, K, NROWS>>>,
    ticks_per_second: u64,
}

impl<L, K, const ROWS: usize, const COLS: usize, const NROWS: usize> RgbMatrix<L, K, ROWS, COLS, NROWS>
where
    L: OutputLines + Send + 'static,
    K: Clock + Send + 'static,
{
    /// Open every line `mapping` uses for this panel height, blanked, and
    /// allocate two black buffers. Rendering is not started.
    ///
    /// # Errors
    /// [`Error::UnsupportedRows`], [`Error::LineOutOfRange`] and
    /// [`Error::DuplicateLine`] for a bad mapping, [`Error::OpenLine`] when
    /// the driver refuses a line. On error `lines` is dropped.
    pub fn new(mut lines: L, clock: K, mapping: PinMapping) -> Result<Self, Error<L::Error>> {
        mapping.validate(NROWS)?;
        for (line, state) in mapping.initial_states(NROWS) {
            lines
                .open(line, state)
                .map_err(|source| Error::OpenLine { line, source })?;
        }

        let ticks_per_second = clock.ticks_per_second();
        let base_ticks = nanos_to_ticks(default_pwm_duration_ns(ROWS), ticks_per_second).max(1);
        debug!(
            "matrix {}x{} ({} half-rows), base duration {} ticks at {} Hz",
            COLS, ROWS, NROWS, base_ticks, ticks_per_second
        );

        Ok(Self {
            shared: Arc::new(Shared::new(base_ticks)),
            scanner: Some(Scanner::new(lines, clock, MaskTables::new(&mapping))),
            worker: None,
            ticks_per_second,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        COLS
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        ROWS
    }

    /// The back buffer, for drawing with `embedded-graphics`.
    pub fn canvas(&mut self) -> &mut BitPlaneBuffer<ROWS, COLS, NROWS> {
        // SAFETY: `&mut self` makes this the only producer, and no swap is in
        // flight outside of `swap_buffers`.
        unsafe { self.shared.buffers.back_mut() }
    }

    /// Set a pixel in the back buffer. Out-of-range coordinates are ignored.
    pub fn set_pixel(&mut self, col: i32, row: i32, r: u8, g: u8, b: u8) {
        self.canvas()
            .set_pixel(Point::new(col, row), Color::new(r, g, b));
    }

    /// Set every pixel of the back buffer.
    pub fn fill(&mut self, r: u8, g: u8, b: u8) {
        self.canvas().fill(Color::new(r, g, b));
    }

    /// Decode a pixel of the buffer being shown.
    #[must_use]
    pub fn front_pixel(&self, col: i32, row: i32) -> Option<Color> {
        // SAFETY: the front buffer is only ever read.
        unsafe { self.shared.buffers.front() }.get_pixel(Point::new(col, row))
    }

    /// Decode a pixel of the buffer being drawn.
    #[must_use]
    pub fn back_pixel(&self, col: i32, row: i32) -> Option<Color> {
        // SAFETY: `&self` excludes the `&mut` from `canvas`.
        unsafe { self.shared.buffers.back() }.get_pixel(Point::new(col, row))
    }

    /// Make the back buffer visible, blocking until it is.
    ///
    /// While rendering the exchange happens on the scan thread at the next
    /// frame boundary, so this waits at most one frame. Otherwise the buffers
    /// are exchanged immediately. Either way the new back buffer holds the
    /// previously shown frame.
    pub fn swap_buffers(&mut self) {
        let shared = &*self.shared;
        loop {
            match shared.control.state() {
                RenderState::Running => break,
                RenderState::Stopping => spin_loop(),
                RenderState::Stopped => {
                    shared.buffers.exchange();
                    trace!("buffers swapped while stopped");
                    return;
                }
            }
        }

        shared.buffers.request();
        while shared.buffers.is_pending() {
            if shared.control.state() == RenderState::Stopped {
                // parked before reaching a frame boundary
                if shared.buffers.complete_pending() {
                    trace!("buffers swapped after the scan loop parked");
                }
                return;
            }
            spin_loop();
        }
    }

    /// Start the scan thread. Does nothing if it is already running or the
    /// matrix was disposed; waits for a previous thread that is still
    /// stopping.
    ///
    /// # Errors
    /// [`Error::Spawn`] if the thread cannot be created. The output lines are
    /// released in that case and the matrix stays stopped.
    pub fn start_rendering(&mut self) -> Result<(), Error<L::Error>> {
        if self.is_rendering() {
            return Ok(());
        }
        self.reclaim();
        let Some(scanner) = self.scanner.take() else {
            debug!("start ignored, matrix disposed");
            return Ok(());
        };
        if !self.shared.control.try_start() {
            self.scanner = Some(scanner);
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name(SCAN_THREAD_NAME.into())
            .spawn(move || {
                raise_priority();
                scanner.run(&shared)
            })
        {
            Ok(worker) => {
                self.worker = Some(worker);
                debug!("scan thread started");
                Ok(())
            }
            Err(err) => {
                self.shared.control.park();
                error!("failed to spawn the scan thread: {}", err);
                Err(Error::Spawn)
            }
        }
    }

    /// Ask the scan thread to stop after the current half-row. Does not wait.
    pub fn stop_rendering(&self) {
        if self.shared.control.request_stop() {
            debug!("scan stop requested");
        }
    }

    /// Whether the scan thread is running and has not been asked to stop.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.shared.control.state() == RenderState::Running
    }

    /// Stop rendering, wait for the scan thread to park, blank the panel and
    /// release the output lines. Later calls do nothing.
    pub fn dispose(&mut self) {
        self.stop_rendering();
        self.reclaim();
        if let Some(mut scanner) = self.scanner.take() {
            scanner.blank();
            drop(scanner.into_lines());
            debug!("output lines released");
        }
    }

    /// Wait for the scan loop to park and take the scanner back from its
    /// thread. Must not be called while running.
    fn reclaim(&mut self) {
        while self.shared.control.state() != RenderState::Stopped {
            spin_loop();
        }
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(scanner) => {
                    debug!("scan thread joined at half-row {}", scanner.cursor());
                    self.scanner = Some(scanner);
                }
                Err(_) => error!("scan thread panicked, output lines lost"),
            }
        }
    }

    /// Hold time of bit-plane 0 in nanoseconds, as the clock can represent it.
    #[must_use]
    pub fn pwm_duration_ns(&self) -> u64 {
        ticks_to_nanos(
            self.shared.base_ticks.load(Ordering::Relaxed),
            self.ticks_per_second,
        )
    }

    /// Change the hold time of bit-plane 0; plane `i` is held `2^i` times as
    /// long. Takes effect from the next bit-plane. Rounded down to whole clock
    /// ticks, never below one tick, and capped so the longest plane still
    /// fits the clock's range.
    pub fn set_pwm_duration_ns(&self, nanos: u64) {
        let ticks = nanos_to_ticks(nanos, self.ticks_per_second).clamp(1, MAX_BASE_TICKS);
        self.shared.base_ticks.store(ticks, Ordering::Relaxed);
        debug!("base duration set to {} ns ({} ticks)", nanos, ticks);
    }

    /// Measure the next full frame. The result is logged at `info` and
    /// available from [`last_frame_time_ns`](Self::last_frame_time_ns).
    pub fn show_frame_time(&self) {
        self.shared.frame_timer.request();
    }

    /// Duration of the last measured frame.
    #[must_use]
    pub fn last_frame_time_ns(&self) -> Option<u64> {
        self.shared.frame_timer.last_nanos()
    }
}

impl<L, K, const ROWS: usize, const COLS: usize, const NROWS: usize> Drop
    for RgbMatrix<L, K, ROWS, COLS, NROWS>
where
    L: OutputLines + Send + 'static,
    K: Clock + Send + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<L, K, const ROWS: usize, const COLS: usize, const NROWS: usize> core::fmt::Debug
    for RgbMatrix<L, K, ROWS, COLS, NROWS>
where
    L: OutputLines + Send + 'static,
    K: Clock + Send + 'static,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RgbMatrix")
            .field("size", &(COLS, ROWS))
            .field("state", &self.shared.control.state())
            .field("disposed", &(self.scanner.is_none() && self.worker.is_none()))
            .field("pwm_duration_ns", &self.pwm_duration_ns())
            .finish_non_exhaustive()
    }
}

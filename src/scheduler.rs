//! The scan loop.
//!
//! [`Scanner`] owns the output lines and the clock while it runs on the
//! dedicated scan thread. Each [`Scanner::step`] shows one half-row: blank and
//! re-address, then for each of the 8 bit-planes shift `COLS` columns in,
//! latch, and hold for `base << plane` ticks. After the last half-row of a
//! frame it services the frame timer and any pending buffer swap.

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use log::{debug, info, trace};

use crate::bitplane::BitPlaneBuffer;
use crate::clock::{ticks_to_nanos, Clock};
use crate::masks::MaskTables;
use crate::pins::OutputLines;
use crate::swap::DoubleBuffer;
use crate::PLANES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum RenderState {
    Stopped = 0,
    Running = 1,
    Stopping = 2,
}

impl RenderState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// `Stopped -> Running -> Stopping -> Stopped`, shared between the matrix
/// handle and the scan thread. `Stopped` doubles as the "parked, safe to
/// dispose" signal.
#[derive(Debug)]
pub(crate) struct RenderControl {
    state: AtomicU8,
}

impl RenderControl {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU8::new(RenderState::Stopped as u8),
        }
    }

    pub(crate) fn state(&self) -> RenderState {
        RenderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: RenderState, to: RenderState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Stopped -> Running`; false if not stopped.
    pub(crate) fn try_start(&self) -> bool {
        self.transition(RenderState::Stopped, RenderState::Running)
    }

    /// `Running -> Stopping`; false if not running.
    pub(crate) fn request_stop(&self) -> bool {
        self.transition(RenderState::Running, RenderState::Stopping)
    }

    pub(crate) fn park(&self) {
        self.state
            .store(RenderState::Stopped as u8, Ordering::Release);
    }
}

/// Parks the control when the scan loop exits, including by unwinding.
struct ParkGuard<'a>(&'a RenderControl);

impl Drop for ParkGuard<'_> {
    fn drop(&mut self) {
        self.0.park();
    }
}

/// One-shot frame time measurement.
#[derive(Debug)]
pub(crate) struct FrameTimer {
    requested: AtomicBool,
    last_nanos: AtomicU64,
}

impl FrameTimer {
    pub(crate) const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            last_nanos: AtomicU64::new(0),
        }
    }

    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    fn complete(&self, nanos: u64) {
        self.last_nanos.store(nanos, Ordering::Release);
        self.requested.store(false, Ordering::Release);
    }

    pub(crate) fn last_nanos(&self) -> Option<u64> {
        match self.last_nanos.load(Ordering::Acquire) {
            0 => None,
            nanos => Some(nanos),
        }
    }
}

/// State shared between the matrix handle and the scan thread.
pub(crate) struct Shared<const ROWS: usize, const COLS: usize, const NROWS: usize> {
    pub(crate) buffers: DoubleBuffer<ROWS, COLS, NROWS>,
    pub(crate) control: RenderControl,
    pub(crate) frame_timer: FrameTimer,
    /// Hold time of bit-plane 0, in clock ticks.
    pub(crate) base_ticks: AtomicU64,
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> Shared<ROWS, COLS, NROWS> {
    pub(crate) const fn new(base_ticks: u64) -> Self {
        Self {
            buffers: DoubleBuffer::new(),
            control: RenderControl::new(),
            frame_timer: FrameTimer::new(),
            base_ticks: AtomicU64::new(base_ticks),
        }
    }
}

/// Drives the output lines for a panel with `NROWS` half-rows.
///
/// [`RgbMatrix`](crate::matrix::RgbMatrix) runs one on its scan thread; it is
/// public so that an output stage can be driven and measured directly.
pub struct Scanner<L, K, const NROWS: usize> {
    lines: L,
    clock: K,
    masks: MaskTables<NROWS>,
    cursor: usize,
    frame_start: Option<u64>,
}

impl<L: OutputLines, K: Clock, const NROWS: usize> Scanner<L, K, NROWS> {
    /// Take ownership of already opened `lines`.
    pub fn new(lines: L, clock: K, masks: MaskTables<NROWS>) -> Self {
        Self {
            lines,
            clock,
            masks,
            cursor: 0,
            frame_start: None,
        }
    }

    /// Half-row the next scan will show.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[cfg(test)]
    pub(crate) fn lines(&self) -> &L {
        &self.lines
    }

    /// Give the output lines back.
    pub fn into_lines(self) -> L {
        self.lines
    }

    /// Disable the output.
    pub fn blank(&mut self) {
        self.lines.set(self.masks.blank());
    }

    /// Blank the panel, then drive the address of half-row `h`.
    fn select_row(&mut self, h: usize) {
        let row = self.masks.row(h);
        self.lines.set(self.masks.blank() | row);
        self.lines.clear(!row & self.masks.address());
    }

    /// Show the current half-row of `frame` once through all bit-planes.
    pub fn scan_half_row<const ROWS: usize, const COLS: usize>(
        &mut self,
        frame: &BitPlaneBuffer<ROWS, COLS, NROWS>,
        base_ticks: u64,
    ) {
        let h = self.cursor;
        self.select_row(h);

        let slots = frame.half_row(h);
        let color_lines = self.masks.color_lines();
        let clock = self.masks.clock();
        let blank = self.masks.blank();
        let latch = self.masks.latch();

        for plane in 0..PLANES {
            for slot in slots {
                let mask = self.masks.color(slot[plane]);
                self.lines.set(mask);
                self.lines.clear(!mask & color_lines);

                self.lines.set(clock);
                self.lines.clear(clock);
            }

            // latch with the output disabled, then show the new plane
            self.lines.set(blank | latch);
            self.lines.clear(latch);
            self.lines.clear(blank);

            let start = self.clock.now();
            self.clock.spin_until(start.saturating_add(base_ticks << plane));
        }
    }

    /// Move to the next half-row. Returns true on wrapping to half-row 0.
    pub fn advance(&mut self) -> bool {
        self.cursor = (self.cursor + 1) % NROWS;
        self.cursor == 0
    }

    /// Scan one half-row of the front buffer and advance. At a frame boundary
    /// service the frame timer and perform a pending swap; returns whether a
    /// swap happened.
    pub(crate) fn step<const ROWS: usize, const COLS: usize>(
        &mut self,
        shared: &Shared<ROWS, COLS, NROWS>,
    ) -> bool {
        // SAFETY: this is the scan thread; the front buffer is never borrowed
        // mutably and `frame` is dead before the exchange below.
        let frame = unsafe { shared.buffers.front() };
        self.scan_half_row(frame, shared.base_ticks.load(Ordering::Relaxed));

        if !self.advance() {
            return false;
        }
        self.measure_frame(shared);
        let swapped = shared.buffers.complete_pending();
        if swapped {
            trace!("buffers swapped at frame boundary");
        }
        swapped
    }

    fn measure_frame<const ROWS: usize, const COLS: usize>(
        &mut self,
        shared: &Shared<ROWS, COLS, NROWS>,
    ) {
        if !shared.frame_timer.is_requested() {
            return;
        }
        let now = self.clock.now();
        match self.frame_start.take() {
            None => self.frame_start = Some(now),
            Some(start) => {
                let ticks = now - start;
                let nanos = ticks_to_nanos(ticks, self.clock.ticks_per_second());
                info!(
                    "frame time: {} us ({} ticks, {} per half-row), base duration {} ns",
                    nanos / 1000,
                    ticks,
                    ticks / NROWS as u64,
                    ticks_to_nanos(
                        shared.base_ticks.load(Ordering::Relaxed),
                        self.clock.ticks_per_second()
                    )
                );
                shared.frame_timer.complete(nanos.max(1));
            }
        }
    }

    /// Scan until asked to stop, then blank the panel and park.
    pub(crate) fn run<const ROWS: usize, const COLS: usize>(
        mut self,
        shared: &Shared<ROWS, COLS, NROWS>,
    ) -> Self {
        let _park = ParkGuard(&shared.control);
        self.cursor = 0;
        self.frame_start = None;
        self.lines.clear(self.masks.address());
        debug!("scan loop running, {} half-rows", NROWS);

        while shared.control.state() == RenderState::Running {
            self.step(shared);
        }

        self.blank();
        debug!("scan loop parked at half-row {}", self.cursor);
        self
    }
}

//! Host-side stand-ins for the GPIO bank and the timer.
//!
//! [`SimPanel`] models a HUB75 panel behind an [`OutputLines`] bank: colour
//! bits are shifted in on CLK, copied to the drivers on LAT and lit while OE
//! is low at the row pair selected by A-E. Every lit interval is charged to
//! the pixels it lights, so tests can check time-averaged brightness without
//! hardware. [`VirtualClock`] ticks only when spun, which makes every bit-plane
//! hold exact and the scan loop run as fast as the host allows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::PinState;

use crate::clock::Clock;
use crate::pins::{address_line_count, line_mask, OutputLines, PinMapping, MAX_LINES};

/// A clock that only moves when spun or advanced.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    ticks: Arc<AtomicU64>,
    ticks_per_second: u64,
}

impl VirtualClock {
    /// Start at tick 0. Clones share the same counter.
    #[must_use]
    pub fn new(ticks_per_second: u64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
            ticks_per_second,
        }
    }

    /// Move time forward by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }
}

impl Clock for VirtualClock {
    fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    fn now(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn spin_until(&self, deadline: u64) {
        self.ticks.fetch_max(deadline, Ordering::AcqRel);
    }
}

/// Errors from [`SimPanel::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// The line does not fit in a mask.
    LineOutOfRange(u8),
    /// The line was opened twice.
    AlreadyOpen(u8),
    /// The line was configured to fail with [`SimPanel::fail_line`].
    Unavailable(u8),
}

#[derive(Debug)]
struct PanelModel {
    mapping: PinMapping,
    width: usize,
    rows: usize,
    clock: VirtualClock,

    level: u64,
    opened: u64,
    failing: u64,
    stray_writes: usize,
    clock_pulses: usize,
    releases: usize,

    shift: Vec<u8>,
    latched: Vec<u8>,
    latch_times: Vec<u64>,
    charged_until: u64,
    on_time: Vec<[u64; 3]>,
}

impl PanelModel {
    fn is_high(&self, line: u8) -> bool {
        self.level & line_mask(line) != 0
    }

    fn lit(&self) -> bool {
        !self.is_high(self.mapping.blank)
    }

    fn address(&self) -> usize {
        let used = address_line_count(self.rows / 2);
        self.mapping.address_lines()[..used]
            .iter()
            .enumerate()
            .filter(|&(_, &line)| self.is_high(line))
            .fold(0, |acc, (bit, _)| acc | (1 << bit))
    }

    fn color_bits(&self) -> u8 {
        self.mapping
            .color_lines()
            .iter()
            .enumerate()
            .filter(|&(_, &line)| self.is_high(line))
            .fold(0, |acc, (bit, _)| acc | (1 << bit))
    }

    /// Charge the time since the last change to every lit pixel.
    fn charge(&mut self) {
        let now = self.clock.now();
        let elapsed = now - self.charged_until.min(now);
        self.charged_until = now;
        if elapsed == 0 || !self.lit() {
            return;
        }
        let upper = self.address();
        let lower = upper + self.rows / 2;
        if lower >= self.rows {
            return;
        }
        for (col, &bits) in self.latched.iter().enumerate() {
            for (row, group) in [(upper, bits & 0x07), (lower, (bits >> 3) & 0x07)] {
                let pixel = &mut self.on_time[row * self.width + col];
                for (channel, total) in pixel.iter_mut().enumerate() {
                    if group & (1 << channel) != 0 {
                        *total = total.saturating_add(elapsed);
                    }
                }
            }
        }
    }

    fn write(&mut self, mask: u64, high: bool) {
        if mask & !self.opened != 0 {
            self.stray_writes += 1;
        }
        let mask = mask & self.opened;
        let rising = if high { mask & !self.level } else { 0 };
        let falling = if high { 0 } else { mask & self.level };
        if rising | falling == 0 {
            return;
        }

        self.charge();
        if high {
            self.level |= mask;
        } else {
            self.level &= !mask;
        }

        if rising & line_mask(self.mapping.clock) != 0 {
            self.clock_pulses += 1;
            let bits = self.color_bits();
            self.shift.copy_within(1.., 0);
            if let Some(last) = self.shift.last_mut() {
                *last = bits;
            }
        }
        if rising & line_mask(self.mapping.latch) != 0 {
            self.latched.copy_from_slice(&self.shift);
            self.latch_times.push(self.clock.now());
        }
    }
}

/// A simulated panel driven through [`OutputLines`].
///
/// Dropping the panel counts as releasing its lines; see
/// [`SimProbe::releases`].
#[derive(Debug)]
pub struct SimPanel {
    model: Arc<Mutex<PanelModel>>,
}

impl SimPanel {
    /// A `width` x `rows` panel wired as `mapping`, timed by `clock`.
    #[must_use]
    pub fn new(mapping: PinMapping, width: usize, rows: usize, clock: VirtualClock) -> Self {
        let model = PanelModel {
            mapping,
            width,
            rows,
            clock,
            level: 0,
            opened: 0,
            failing: 0,
            stray_writes: 0,
            clock_pulses: 0,
            releases: 0,
            shift: vec![0; width],
            latched: vec![0; width],
            latch_times: Vec::new(),
            charged_until: 0,
            on_time: vec![[0; 3]; width * rows],
        };
        Self {
            model: Arc::new(Mutex::new(model)),
        }
    }

    /// Make a later [`open`](OutputLines::open) of `line` fail.
    #[must_use]
    pub fn fail_line(self, line: u8) -> Self {
        if line < MAX_LINES {
            lock(&self.model).failing |= line_mask(line);
        }
        self
    }

    /// A handle for inspecting the panel while something else drives it.
    #[must_use]
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            model: Arc::clone(&self.model),
        }
    }
}

impl Drop for SimPanel {
    fn drop(&mut self) {
        let mut model = lock(&self.model);
        model.charge();
        model.releases += 1;
    }
}

impl OutputLines for SimPanel {
    type Error = SimError;

    fn open(&mut self, line: u8, state: PinState) -> Result<(), Self::Error> {
        if line >= MAX_LINES {
            return Err(SimError::LineOutOfRange(line));
        }
        let mut model = lock(&self.model);
        let mask = line_mask(line);
        if model.failing & mask != 0 {
            return Err(SimError::Unavailable(line));
        }
        if model.opened & mask != 0 {
            return Err(SimError::AlreadyOpen(line));
        }
        model.opened |= mask;
        model.write(mask, state == PinState::High);
        Ok(())
    }

    fn set(&mut self, mask: u64) {
        lock(&self.model).write(mask, true);
    }

    fn clear(&mut self, mask: u64) {
        lock(&self.model).write(mask, false);
    }
}

/// Read-only view of a [`SimPanel`].
#[derive(Debug, Clone)]
pub struct SimProbe {
    model: Arc<Mutex<PanelModel>>,
}

impl SimProbe {
    /// Charge the interval up to now to whatever is lit.
    pub fn settle(&self) {
        lock(&self.model).charge();
    }

    /// Accumulated lit ticks of the red, green and blue LEDs at (`col`, `row`).
    ///
    /// # Panics
    /// If the position is outside the panel.
    #[must_use]
    pub fn on_time(&self, col: usize, row: usize) -> [u64; 3] {
        let model = lock(&self.model);
        assert!(col < model.width && row < model.rows, "({col}, {row}) is off the panel");
        model.on_time[row * model.width + col]
    }

    /// Forget all accumulated on-time.
    pub fn clear_on_time(&self) {
        let mut model = lock(&self.model);
        model.charge();
        model.on_time.iter_mut().for_each(|pixel| *pixel = [0; 3]);
    }

    /// Tick of every LAT rising edge so far.
    #[must_use]
    pub fn latch_times(&self) -> Vec<u64> {
        lock(&self.model).latch_times.clone()
    }

    /// Number of CLK rising edges so far.
    #[must_use]
    pub fn clock_pulses(&self) -> usize {
        lock(&self.model).clock_pulses
    }

    /// Writes whose mask touched a line that was never opened.
    #[must_use]
    pub fn stray_writes(&self) -> usize {
        lock(&self.model).stray_writes
    }

    /// Mask of opened lines.
    #[must_use]
    pub fn opened(&self) -> u64 {
        lock(&self.model).opened
    }

    /// How many times the panel was released (dropped).
    #[must_use]
    pub fn releases(&self) -> usize {
        lock(&self.model).releases
    }

    /// Current level of `line`.
    #[must_use]
    pub fn level(&self, line: u8) -> PinState {
        if lock(&self.model).is_high(line) {
            PinState::High
        } else {
            PinState::Low
        }
    }

    /// Whether OE is high.
    #[must_use]
    pub fn is_blanked(&self) -> bool {
        !lock(&self.model).lit()
    }

    /// The half-row currently selected by the address lines.
    #[must_use]
    pub fn address(&self) -> usize {
        lock(&self.model).address()
    }
}

fn lock(model: &Mutex<PanelModel>) -> MutexGuard<'_, PanelModel> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

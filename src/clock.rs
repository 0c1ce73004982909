//! Monotonic clock and the busy-wait used to time bit-planes.
//!
//! Bit-plane holds are a few hundred nanoseconds to a few hundred
//! microseconds, far below what OS sleeps can hit, so the scan loop spins on
//! [`Clock::spin_until`]. Tests substitute a virtual clock whose spin jumps
//! straight to the deadline.

/// A monotonic tick counter.
pub trait Clock {
    /// Tick rate of [`now`](Self::now).
    fn ticks_per_second(&self) -> u64;

    /// Current tick count. Never decreases.
    fn now(&self) -> u64;

    /// Busy-wait until [`now`](Self::now) reaches `deadline`.
    #[inline]
    fn spin_until(&self, deadline: u64) {
        while self.now() < deadline {
            core::hint::spin_loop();
        }
    }
}

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Convert nanoseconds to ticks of a clock running at `ticks_per_second`,
/// saturating at `u64::MAX`.
#[must_use]
pub const fn nanos_to_ticks(nanos: u64, ticks_per_second: u64) -> u64 {
    saturate(nanos as u128 * ticks_per_second as u128 / NANOS_PER_SECOND)
}

/// Convert ticks of a clock running at `ticks_per_second` to nanoseconds,
/// saturating at `u64::MAX`.
#[must_use]
pub const fn ticks_to_nanos(ticks: u64, ticks_per_second: u64) -> u64 {
    if ticks_per_second == 0 {
        return 0;
    }
    saturate(ticks as u128 * NANOS_PER_SECOND / ticks_per_second as u128)
}

const fn saturate(value: u128) -> u64 {
    if value > u64::MAX as u128 {
        u64::MAX
    } else {
        value as u64
    }
}

/// Host clock backed by [`std::time::Instant`], ticking in nanoseconds.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Start a clock at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn ticks_per_second(&self) -> u64 {
        NANOS_PER_SECOND as u64
    }

    #[inline]
    fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

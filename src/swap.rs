//! Front/back buffer pair and the swap handshake.
//!
//! Producers draw into the back buffer while the scan thread reads the front
//! one; the two never alias. A swap exchanges the roles by flipping an index,
//! and only the scan thread flips it, at a frame boundary, while the requester
//! spins on the pending flag:
//!
//! - requester: draw, then `pending = true` (release)
//! - scan thread: at half-row 0, if `pending` (acquire) flip `front`, then
//!   `pending = false` (release)
//! - requester: spin until `pending == false` (acquire)
//!
//! The release/acquire pairs make every pixel written before the request
//! visible to the scan thread, and the new `front` visible to the requester.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::bitplane::BitPlaneBuffer;

pub(crate) struct DoubleBuffer<const ROWS: usize, const COLS: usize, const NROWS: usize> {
    buffers: [UnsafeCell<BitPlaneBuffer<ROWS, COLS, NROWS>>; 2],
    front: AtomicUsize,
    pending: AtomicBool,
}

// SAFETY: access to the two cells is partitioned by `front`: the scan thread
// only reads `buffers[front]`, the single producer handle only touches
// `buffers[front ^ 1]`, and `front` only changes while the producer is blocked
// in the swap handshake.
unsafe impl<const ROWS: usize, const COLS: usize, const NROWS: usize> Sync
    for DoubleBuffer<ROWS, COLS, NROWS>
{
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize> DoubleBuffer<ROWS, COLS, NROWS> {
    pub(crate) const fn new() -> Self {
        Self {
            buffers: [
                UnsafeCell::new(BitPlaneBuffer::new()),
                UnsafeCell::new(BitPlaneBuffer::new()),
            ],
            front: AtomicUsize::new(0),
            pending: AtomicBool::new(false),
        }
    }

    fn front_index(&self) -> usize {
        self.front.load(Ordering::Acquire)
    }

    /// The buffer being scanned.
    ///
    /// # Safety
    /// No `&mut` to the front buffer may exist. Holds for the scan thread and
    /// for read-back by the producer handle.
    pub(crate) unsafe fn front(&self) -> &BitPlaneBuffer<ROWS, COLS, NROWS> {
        &*self.buffers[self.front_index()].get()
    }

    /// The buffer producers draw into.
    ///
    /// # Safety
    /// No `&mut` to the back buffer may exist at the same time.
    pub(crate) unsafe fn back(&self) -> &BitPlaneBuffer<ROWS, COLS, NROWS> {
        &*self.buffers[self.front_index() ^ 1].get()
    }

    /// Mutable access to the back buffer.
    ///
    /// # Safety
    /// The caller must be the only producer, hold no other reference to the
    /// back buffer, and not be inside a pending swap.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn back_mut(&self) -> &mut BitPlaneBuffer<ROWS, COLS, NROWS> {
        &mut *self.buffers[self.front_index() ^ 1].get()
    }

    /// Publish the back buffer and ask for an exchange at the next frame
    /// boundary.
    pub(crate) fn request(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Perform a requested exchange. Returns whether one happened.
    ///
    /// Called by the scan thread at a frame boundary, or by the requester
    /// once the scan thread has parked.
    pub(crate) fn complete_pending(&self) -> bool {
        if !self.pending.load(Ordering::Acquire) {
            return false;
        }
        self.exchange();
        self.pending.store(false, Ordering::Release);
        true
    }

    /// Exchange the roles of the two buffers. Only valid while nothing is
    /// scanning or from the scan thread itself.
    pub(crate) fn exchange(&self) {
        self.front.fetch_xor(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use embedded_graphics::prelude::{Point, RgbColor};

    type TestBuffers = DoubleBuffer<32, 32, 16>;

    #[test]
    fn test_starts_black_and_idle() {
        let buffers = TestBuffers::new();
        assert!(!buffers.is_pending());
        unsafe {
            assert_eq!(*buffers.front(), BitPlaneBuffer::new());
            assert_eq!(*buffers.back(), BitPlaneBuffer::new());
        }
    }

    #[test]
    fn test_back_writes_do_not_touch_front() {
        let buffers = TestBuffers::new();
        unsafe {
            buffers.back_mut().set_pixel(Point::new(1, 2), Color::RED);
            assert_eq!(*buffers.front(), BitPlaneBuffer::new());
            assert_eq!(buffers.back().get_pixel(Point::new(1, 2)), Some(Color::RED));
        }
    }

    #[test]
    fn test_exchange_swaps_roles_without_copy() {
        let buffers = TestBuffers::new();
        unsafe {
            buffers.back_mut().fill(Color::BLUE);
            let back_ptr = core::ptr::from_ref(buffers.back());
            buffers.exchange();
            assert_eq!(core::ptr::from_ref(buffers.front()), back_ptr);
            assert_eq!(buffers.front().get_pixel(Point::new(0, 0)), Some(Color::BLUE));
            assert_eq!(buffers.back().get_pixel(Point::new(0, 0)), Some(Color::BLACK));
        }
    }

    #[test]
    fn test_complete_pending_only_when_requested() {
        let buffers = TestBuffers::new();
        assert!(!buffers.complete_pending());
        assert_eq!(buffers.front_index(), 0);

        buffers.request();
        assert!(buffers.is_pending());
        assert!(buffers.complete_pending());
        assert!(!buffers.is_pending());
        assert_eq!(buffers.front_index(), 1);

        // a second completion without a request does nothing
        assert!(!buffers.complete_pending());
        assert_eq!(buffers.front_index(), 1);
    }
}

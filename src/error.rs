//! Errors raised while bringing up a matrix.
//!
//! Only construction (and spawning the scan thread) can fail. Once the output
//! lines are open, every steady-state operation is infallible.

use core::fmt;

/// Error returned when a matrix cannot be built or started.
///
/// `E` is the error type of the [`OutputLines`](crate::pins::OutputLines)
/// driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error<E> {
    /// The driver refused to open or configure an output line.
    OpenLine {
        /// Line number that failed.
        line: u8,
        /// Driver error.
        source: E,
    },
    /// A signal is mapped to a line outside the 64-bit line mask.
    LineOutOfRange(u8),
    /// Two signals in use share one line.
    DuplicateLine(u8),
    /// The panel has more half-rows than five address lines can select.
    UnsupportedRows(usize),
    /// The operating system refused to start the scan thread.
    Spawn,
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenLine { line, source } => {
                write!(f, "failed to open output line {line}: {source:?}")
            }
            Self::LineOutOfRange(line) => write!(f, "output line {line} is out of range"),
            Self::DuplicateLine(line) => {
                write!(f, "output line {line} is mapped to more than one signal")
            }
            Self::UnsupportedRows(rows) => write!(
                f,
                "{rows} rows need more than {} half-rows",
                crate::MAX_NROWS
            ),
            Self::Spawn => f.write_str("failed to spawn the scan thread"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for Error<E> {}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for Error<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::OpenLine { line, .. } => defmt::write!(f, "OpenLine({})", line),
            Self::LineOutOfRange(line) => defmt::write!(f, "LineOutOfRange({})", line),
            Self::DuplicateLine(line) => defmt::write!(f, "DuplicateLine({})", line),
            Self::UnsupportedRows(rows) => defmt::write!(f, "UnsupportedRows({})", rows),
            Self::Spawn => defmt::write!(f, "Spawn"),
        }
    }
}

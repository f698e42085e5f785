//! Status display collaborator contract.
//!
//! The core reports human-readable status as `(row, col, text)` writes
//! followed by a `refresh`. Implementations must never block the caller:
//! a sink that cannot keep up drops messages instead.

use core::fmt::{self, Write};

/// Maximum characters in one status write.
pub const STATUS_TEXT_CAPACITY: usize = 32;

/// Fixed-capacity status string (no heap in the control loop).
pub type StatusText = heapless::String<STATUS_TEXT_CAPACITY>;

/// Format into a [`StatusText`], truncating at capacity.
pub fn status_text(args: fmt::Arguments<'_>) -> StatusText {
    let mut text = StatusText::new();
    let _ = Truncating(&mut text).write_fmt(args);
    text
}

struct Truncating<'a>(&'a mut StatusText);

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Receiver of status text.
pub trait StatusSink: Send + Sync {
    /// Place `text` at `(row, col)`.
    fn write(&self, row: u8, col: u8, text: &str);

    /// Present everything written since the last refresh.
    fn refresh(&self);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatus;

impl StatusSink for NullStatus {
    fn write(&self, _row: u8, _col: u8, _text: &str) {}

    fn refresh(&self) {}
}

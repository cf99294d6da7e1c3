//! HTTP/2 flow control (RFC 7540 Section 5.2)
//!
//! Flow control applies at both the connection and stream level. Each
//! direction keeps a signed window of byte credits: receiving DATA debits
//! the receive window (by the full payload length, padding included), and a
//! WINDOW_UPDATE from the peer credits the send window. A window can go
//! negative when SETTINGS_INITIAL_WINDOW_SIZE shrinks mid-stream.

use crate::error::{Error, Result};
use crate::DEFAULT_INITIAL_WINDOW_SIZE;

/// A flow control window: a signed counter of available byte credits.
#[derive(Debug, Clone)]
pub struct FlowControlWindow {
    /// Initial window size
    initial_size: u32,
    /// Current window size (can go negative)
    current_size: i64,
}

/// Maximum window size allowed (2^31 - 1)
const MAX_WINDOW_SIZE: i64 = 0x7FFF_FFFF;

impl FlowControlWindow {
    /// Create a new flow control window with the protocol default size
    pub fn new() -> Self {
        Self::with_initial_size(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Create a new flow control window with the specified initial size
    pub fn with_initial_size(initial_size: u32) -> Self {
        FlowControlWindow {
            initial_size,
            current_size: initial_size as i64,
        }
    }

    /// Current window size
    pub fn size(&self) -> i64 {
        self.current_size
    }

    /// Initial window size
    pub fn initial_size(&self) -> u32 {
        self.initial_size
    }

    /// Whether the window can cover `amount` octets
    pub fn can_send(&self, amount: usize) -> bool {
        self.current_size >= amount as i64
    }

    /// Consume capacity before sending data. Returns the amount actually
    /// available, which may be less than requested (zero when exhausted).
    pub fn consume(&mut self, amount: usize) -> usize {
        if amount == 0 || self.current_size <= 0 {
            return 0;
        }
        let granted = std::cmp::min(amount as i64, self.current_size);
        self.current_size -= granted;
        granted as usize
    }

    /// Credit the window from a WINDOW_UPDATE.
    ///
    /// A zero increment and overflow past 2^31 - 1 are both flow-control
    /// errors (RFC 7540 Section 6.9).
    pub fn increase(&mut self, increment: u32) -> Result<i64> {
        if increment == 0 {
            return Err(Error::FlowControl(
                "window update increment must be non-zero".to_string(),
            ));
        }

        let new_size = self.current_size + increment as i64;
        if new_size > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl(format!(
                "window size {} exceeds maximum (2^31-1)",
                new_size
            )));
        }

        self.current_size = new_size;
        Ok(self.current_size)
    }

    /// Debit the window for received data
    pub fn decrease(&mut self, amount: usize) {
        self.current_size -= amount as i64;
    }

    /// Replenish a depleted receive window.
    ///
    /// When the window has dropped to zero or below, credit it by one
    /// initial-window-size worth of octets and return the increment to send
    /// in a WINDOW_UPDATE. Otherwise no update is due.
    pub fn replenish(&mut self) -> Option<u32> {
        if self.current_size > 0 {
            return None;
        }
        self.current_size += self.initial_size as i64;
        Some(self.initial_size)
    }

    /// Apply a changed SETTINGS_INITIAL_WINDOW_SIZE (RFC 7540 Section
    /// 6.9.2): the current size shifts by the difference, which may push an
    /// in-flight window negative.
    pub fn update_initial_size(&mut self, new_initial_size: u32) -> Result<()> {
        let diff = new_initial_size as i64 - self.initial_size as i64;
        let new_current = self.current_size + diff;

        if new_current > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl(format!(
                "adjusted window size {} exceeds maximum (2^31-1)",
                new_current
            )));
        }

        self.initial_size = new_initial_size;
        self.current_size = new_current;
        Ok(())
    }
}

impl Default for FlowControlWindow {
    fn default() -> Self {
        Self::new()
    }
}

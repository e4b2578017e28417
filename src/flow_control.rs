//! Flow control.
//!
//! Two controllers exist per connection: the local side governs inbound
//! consumption limits advertised to the peer (receive windows), the remote
//! side governs how much this endpoint may send (send windows). Each tracks
//! one connection-level window plus one window per active stream.
//!
//! Windows are signed: a settings-initiated reduction of the initial window
//! size may legally drive a stream's send window negative, after which no
//! sends are permitted until WINDOW_UPDATE credit brings it non-negative.

use crate::error::{Error, Result};

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Maximum window size (2^31 - 1)
pub const MAX_WINDOW_SIZE: i64 = 0x7FFFFFFF;

/// Flow control window
///
/// Tracks the available byte credit in one direction.
#[derive(Debug, Clone)]
pub struct FlowWindow {
    /// Initial window size
    initial_size: u32,
    /// Current window size (negative after an over-committing settings change)
    current_size: i64,
}

impl FlowWindow {
    /// Create a new flow control window with default size
    pub fn new() -> Self {
        Self::with_initial_size(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Create a new flow control window with specified initial size
    pub fn with_initial_size(initial_size: u32) -> Self {
        FlowWindow {
            initial_size,
            current_size: initial_size as i64,
        }
    }

    /// Get current window size
    pub fn size(&self) -> i64 {
        self.current_size
    }

    /// Get initial window size
    pub fn initial_size(&self) -> u32 {
        self.initial_size
    }

    /// Check if the window can cover `amount` bytes
    pub fn can_send(&self, amount: usize) -> bool {
        self.current_size >= amount as i64
    }

    /// Reserve `amount` bytes for sending.
    ///
    /// Fails with [`Error::WindowExceeded`] if the window would go negative.
    /// The caller must defer and retry after a WINDOW_UPDATE.
    pub fn reserve(&mut self, amount: usize) -> Result<()> {
        if (amount as i64) > self.current_size {
            return Err(Error::WindowExceeded {
                requested: amount,
                available: self.current_size,
            });
        }
        self.current_size -= amount as i64;
        Ok(())
    }

    /// Apply WINDOW_UPDATE credit.
    ///
    /// `stream_id` scopes the error: nonzero ids produce stream-scoped flow
    /// errors, id 0 connection-scoped. Returns the new window size.
    pub fn increase(&mut self, increment: u32, stream_id: u32) -> Result<i64> {
        if increment == 0 {
            return Err(Error::FlowControl {
                stream_id,
                reason: "Window update increment must be non-zero".to_string(),
            });
        }

        let new_size = self.current_size + increment as i64;
        if new_size > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl {
                stream_id,
                reason: format!("Window size {} exceeds maximum (2^31-1)", new_size),
            });
        }

        self.current_size = new_size;
        Ok(self.current_size)
    }

    /// Decrease window size (accounting received data)
    pub fn decrease(&mut self, amount: usize) {
        self.current_size -= amount as i64;
    }

    /// Apply a SETTINGS-driven change of the initial window size.
    ///
    /// The delta (new - old) is applied to the current size, which may go
    /// negative. That is legal transiently; only overflow past 2^31-1 fails.
    pub fn update_initial_size(&mut self, new_initial_size: u32, stream_id: u32) -> Result<()> {
        let diff = new_initial_size as i64 - self.initial_size as i64;
        let new_current = self.current_size + diff;

        if new_current > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl {
                stream_id,
                reason: format!("New window size {} exceeds maximum (2^31-1)", new_current),
            });
        }

        self.initial_size = new_initial_size;
        self.current_size = new_current;

        Ok(())
    }
}

impl Default for FlowWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection-level flow control
#[derive(Debug)]
pub struct ConnectionFlowControl {
    /// Send window (outbound data, governed by peer credit)
    send_window: FlowWindow,
    /// Receive window (inbound data, advertised to the peer)
    recv_window: FlowWindow,
}

impl ConnectionFlowControl {
    /// Create new connection-level flow control with default windows
    pub fn new() -> Self {
        ConnectionFlowControl {
            send_window: FlowWindow::new(),
            recv_window: FlowWindow::new(),
        }
    }

    /// Create with specified initial window sizes
    pub fn with_initial_sizes(send_size: u32, recv_size: u32) -> Self {
        ConnectionFlowControl {
            send_window: FlowWindow::with_initial_size(send_size),
            recv_window: FlowWindow::with_initial_size(recv_size),
        }
    }

    /// Get send window
    pub fn send_window(&self) -> &FlowWindow {
        &self.send_window
    }

    /// Get receive window
    pub fn recv_window(&self) -> &FlowWindow {
        &self.recv_window
    }

    /// Reserve connection send window for outbound data
    pub fn reserve_send(&mut self, amount: usize) -> Result<()> {
        self.send_window.reserve(amount)
    }

    /// Apply WINDOW_UPDATE credit to the connection send window
    pub fn credit_send(&mut self, increment: u32) -> Result<i64> {
        self.send_window.increase(increment, 0)
    }

    /// Account received data against the connection receive window
    pub fn consume_recv(&mut self, amount: usize) {
        self.recv_window.decrease(amount);
    }

    /// Replenish increment if consumption crossed the threshold fraction.
    ///
    /// Returns the increment restoring the window to its advertised size,
    /// or None while consumption stays below the threshold. Batching the
    /// resulting WINDOW_UPDATE with other outbound traffic avoids
    /// update-per-byte chattiness.
    pub fn replenish_recv(&mut self, threshold_percent: u8) -> Option<u32> {
        replenish(&mut self.recv_window, threshold_percent)
    }
}

impl Default for ConnectionFlowControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream-level flow control
#[derive(Debug)]
pub struct StreamFlowControl {
    /// Stream ID
    stream_id: u32,
    /// Send window (outbound data)
    send_window: FlowWindow,
    /// Receive window (inbound data)
    recv_window: FlowWindow,
}

impl StreamFlowControl {
    /// Create stream-level flow control with specified initial window sizes
    pub fn with_initial_sizes(stream_id: u32, send_size: u32, recv_size: u32) -> Self {
        StreamFlowControl {
            stream_id,
            send_window: FlowWindow::with_initial_size(send_size),
            recv_window: FlowWindow::with_initial_size(recv_size),
        }
    }

    /// Get stream ID
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Get send window
    pub fn send_window(&self) -> &FlowWindow {
        &self.send_window
    }

    /// Get receive window
    pub fn recv_window(&self) -> &FlowWindow {
        &self.recv_window
    }

    /// Reserve stream send window for outbound data
    pub fn reserve_send(&mut self, amount: usize) -> Result<()> {
        self.send_window.reserve(amount)
    }

    /// Apply WINDOW_UPDATE credit to the stream send window
    pub fn credit_send(&mut self, increment: u32) -> Result<i64> {
        self.send_window.increase(increment, self.stream_id)
    }

    /// Account received data against the stream receive window
    pub fn consume_recv(&mut self, amount: usize) {
        self.recv_window.decrease(amount);
    }

    /// Apply a SETTINGS-driven initial-window-size change to the send window
    pub fn update_initial_send_size(&mut self, new_initial_size: u32) -> Result<()> {
        self.send_window
            .update_initial_size(new_initial_size, self.stream_id)
    }

    /// Replenish increment if consumption crossed the threshold fraction
    pub fn replenish_recv(&mut self, threshold_percent: u8) -> Option<u32> {
        replenish(&mut self.recv_window, threshold_percent)
    }
}

/// Shared replenish rule: once the outstanding (consumed) portion of the
/// advertised window crosses the threshold, restore it in one increment.
fn replenish(window: &mut FlowWindow, threshold_percent: u8) -> Option<u32> {
    let advertised = window.initial_size() as i64;
    let consumed = advertised - window.size();
    let threshold = advertised * threshold_percent as i64 / 100;

    if consumed > 0 && consumed >= threshold {
        let increment = consumed as u32;
        // Restores exactly to advertised size; cannot overflow.
        window
            .increase(increment, 0)
            .expect("replenish within advertised size");
        Some(increment)
    } else {
        None
    }
}

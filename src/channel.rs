//! Per-stream outbound channel bookkeeping.
//!
//! Each stream tracks its pending-outbound-byte count: write submission
//! increments it, write completion decrements it. Crossing the high-water
//! mark flips the stream to "not writable"; dropping back below the
//! low-water mark flips it back, but only while the parent connection is
//! itself writable. The flip methods return whether writability changed so
//! the connection can queue a notification for its processing turn instead
//! of firing synchronously.

/// Default high-water mark (64 KiB)
pub const DEFAULT_HIGH_WATER: usize = 64 * 1024;

/// Default low-water mark (32 KiB)
pub const DEFAULT_LOW_WATER: usize = 32 * 1024;

/// Outbound channel state for one stream
#[derive(Debug)]
pub struct StreamChannel {
    /// Stream ID
    stream_id: u32,
    /// Bytes submitted but not yet completed
    pending_bytes: usize,
    /// Pending bytes at or above this flip writability off
    high_water: usize,
    /// Pending bytes below this may flip writability back on
    low_water: usize,
    /// Current writability as last reported
    writable: bool,
    /// Last known writability of the parent connection
    connection_writable: bool,
}

impl StreamChannel {
    /// Create a channel with default watermarks
    pub fn new(stream_id: u32) -> Self {
        Self::with_watermarks(stream_id, DEFAULT_HIGH_WATER, DEFAULT_LOW_WATER)
    }

    /// Create a channel with explicit watermarks
    pub fn with_watermarks(stream_id: u32, high_water: usize, low_water: usize) -> Self {
        debug_assert!(low_water <= high_water);
        StreamChannel {
            stream_id,
            pending_bytes: 0,
            high_water,
            low_water,
            writable: true,
            connection_writable: true,
        }
    }

    /// Get stream ID
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Current pending-outbound-byte count
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Whether the stream currently accepts writes without backpressure
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Record a write submission of `len` bytes.
    ///
    /// Returns true if writability flipped off; the caller queues the
    /// writability-changed notification.
    pub fn submit(&mut self, len: usize) -> bool {
        self.pending_bytes += len;
        if self.writable && self.pending_bytes >= self.high_water {
            self.writable = false;
            return true;
        }
        false
    }

    /// Record a write completion of `len` bytes.
    ///
    /// Returns true if writability flipped back on. The flip only happens
    /// below the low-water mark and while the connection itself is
    /// writable.
    pub fn complete(&mut self, len: usize) -> bool {
        self.pending_bytes = self.pending_bytes.saturating_sub(len);
        self.maybe_restore()
    }

    /// Propagate a connection-level writability change into this stream.
    ///
    /// Returns true if this stream's writability changed as a result.
    pub fn set_connection_writable(&mut self, writable: bool) -> bool {
        self.connection_writable = writable;
        if !writable {
            if self.writable {
                self.writable = false;
                return true;
            }
            return false;
        }
        self.maybe_restore()
    }

    fn maybe_restore(&mut self) -> bool {
        if !self.writable && self.connection_writable && self.pending_bytes < self.low_water {
            self.writable = true;
            return true;
        }
        false
    }
}

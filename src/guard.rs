//! Control-frame flood guard.
//!
//! Acknowledgement-style control frames (SETTINGS ack, PING ack,
//! RST_STREAM) are cheap for a peer to provoke and must never accumulate
//! without bound. The guard decorates a [`FrameSink`] and counts guarded
//! frames written but not yet confirmed by the transport. At the limit it
//! attempts one flush; if that frees nothing, the sink is permanently
//! poisoned and the connection must terminate. All other frame types pass
//! through untouched.

use crate::error::{Error, Result};
use crate::frames::Frame;

/// Destination for outbound frames.
///
/// Composable capability boundary: the connection writes through whatever
/// stack of sinks it is built with rather than through inheritance.
pub trait FrameSink {
    /// Write one frame
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush buffered writes toward the transport.
    ///
    /// Returns the number of guarded control frames whose write completed
    /// as a result of this flush.
    fn flush(&mut self) -> Result<usize>;
}

/// Decorator counting outstanding guarded control frames
#[derive(Debug)]
pub struct ControlFrameGuard<S> {
    /// Decorated sink
    inner: S,
    /// Guarded frames written but not yet completed
    outstanding: usize,
    /// Limit past which the connection aborts
    max_outstanding: usize,
    /// Once set, every further write fails
    poisoned: bool,
}

impl<S: FrameSink> ControlFrameGuard<S> {
    /// Wrap a sink with the given outstanding limit
    pub fn new(inner: S, max_outstanding: usize) -> Self {
        ControlFrameGuard {
            inner,
            outstanding: 0,
            max_outstanding,
            poisoned: false,
        }
    }

    /// Current outstanding guarded-frame count
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Whether the limit was reached and the sink is dead
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Access the decorated sink
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Access the decorated sink mutably
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Record `count` guarded-frame write completions from the transport
    pub fn complete(&mut self, count: usize) {
        self.outstanding = self.outstanding.saturating_sub(count);
    }
}

impl<S: FrameSink> FrameSink for ControlFrameGuard<S> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.poisoned {
            return Err(Error::ControlFrameFlood(self.outstanding));
        }

        if !frame.is_guarded_control() {
            return self.inner.write_frame(frame);
        }

        if self.outstanding >= self.max_outstanding {
            // One flush attempt before giving up
            let completed = self.inner.flush()?;
            self.outstanding = self.outstanding.saturating_sub(completed);

            if self.outstanding >= self.max_outstanding {
                self.poisoned = true;
                return Err(Error::ControlFrameFlood(self.outstanding + 1));
            }
        }

        self.inner.write_frame(frame)?;
        self.outstanding += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<usize> {
        let completed = self.inner.flush()?;
        self.outstanding = self.outstanding.saturating_sub(completed);
        Ok(completed)
    }
}

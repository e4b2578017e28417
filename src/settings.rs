//! Connection settings exchanged at session start.
//!
//! Wire-negotiated parameters are the concurrency limit, the initial
//! flow-control window size, and the maximum frame size. The control-frame
//! outstanding limit and the window replenish threshold are local-only
//! safety knobs: they ride in the same struct for configuration convenience
//! but are never encoded on the wire.

use crate::error::{Error, Result};
use std::fmt;

/// Default maximum number of unacknowledged guarded control frames
pub const DEFAULT_MAX_OUTSTANDING_CONTROL_FRAMES: usize = 10_000;

/// Default replenish threshold: send WINDOW_UPDATE once consumption
/// crosses this percentage of the advertised window
pub const DEFAULT_REPLENISH_THRESHOLD_PERCENT: u8 = 50;

/// Wire settings parameter identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingsParameter {
    /// Maximum number of concurrent streams the sender will accept
    MaxConcurrentStreams = 0x3,

    /// Sender's initial window size for stream-level flow control
    InitialWindowSize = 0x4,

    /// Size of the largest frame payload the sender will accept
    MaxFrameSize = 0x5,
}

impl SettingsParameter {
    /// Convert to u16
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Create from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x3 => Some(SettingsParameter::MaxConcurrentStreams),
            0x4 => Some(SettingsParameter::InitialWindowSize),
            0x5 => Some(SettingsParameter::MaxFrameSize),
            _ => None,
        }
    }

    /// Get parameter name
    pub fn name(&self) -> &'static str {
        match self {
            SettingsParameter::MaxConcurrentStreams => "MAX_CONCURRENT_STREAMS",
            SettingsParameter::InitialWindowSize => "INITIAL_WINDOW_SIZE",
            SettingsParameter::MaxFrameSize => "MAX_FRAME_SIZE",
        }
    }
}

impl fmt::Display for SettingsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u16())
    }
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Maximum concurrent streams (None = unlimited)
    pub max_concurrent_streams: Option<u32>,

    /// Initial window size (default: 65535)
    pub initial_window_size: Option<u32>,

    /// Maximum frame size (default: 16384, range: 16384-16777215)
    pub max_frame_size: Option<u32>,

    /// Local-only: abort the connection past this many unacknowledged
    /// guarded control frames. Never sent on the wire.
    pub max_outstanding_control_frames: usize,

    /// Local-only: percentage of the advertised receive window that must
    /// be consumed before an outbound WINDOW_UPDATE is queued.
    pub replenish_threshold_percent: u8,
}

impl Settings {
    /// Create empty settings (all wire parameters unset)
    pub fn new() -> Self {
        Settings {
            max_concurrent_streams: None,
            initial_window_size: None,
            max_frame_size: None,
            max_outstanding_control_frames: DEFAULT_MAX_OUTSTANDING_CONTROL_FRAMES,
            replenish_threshold_percent: DEFAULT_REPLENISH_THRESHOLD_PERCENT,
        }
    }

    /// Get max concurrent streams (None = unlimited)
    pub fn get_max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    /// Get initial window size (with default)
    pub fn get_initial_window_size(&self) -> u32 {
        self.initial_window_size.unwrap_or(65535)
    }

    /// Get max frame size (with default)
    pub fn get_max_frame_size(&self) -> u32 {
        self.max_frame_size.unwrap_or(16384)
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if let Some(initial_window_size) = self.initial_window_size {
            if initial_window_size > 0x7FFFFFFF {
                return Err(Error::InvalidSettings(format!(
                    "Initial window size {} exceeds maximum (2^31-1)",
                    initial_window_size
                )));
            }
        }

        if let Some(max_frame_size) = self.max_frame_size {
            if !(16384..=16777215).contains(&max_frame_size) {
                return Err(Error::InvalidSettings(format!(
                    "Max frame size {} outside valid range (16384-16777215)",
                    max_frame_size
                )));
            }
        }

        if self.replenish_threshold_percent == 0 || self.replenish_threshold_percent > 100 {
            return Err(Error::InvalidSettings(format!(
                "Replenish threshold {}% outside valid range (1-100)",
                self.replenish_threshold_percent
            )));
        }

        Ok(())
    }

    /// Merge wire parameters from another Settings object
    /// (values set in `other` override values in `self`; local-only knobs
    /// are not touched)
    pub fn merge(&mut self, other: &Settings) {
        if other.max_concurrent_streams.is_some() {
            self.max_concurrent_streams = other.max_concurrent_streams;
        }
        if other.initial_window_size.is_some() {
            self.initial_window_size = other.initial_window_size;
        }
        if other.max_frame_size.is_some() {
            self.max_frame_size = other.max_frame_size;
        }
    }

    /// Wire parameters as (id, value) pairs in encode order
    pub fn wire_params(&self) -> Vec<(SettingsParameter, u32)> {
        let mut params = Vec::new();
        if let Some(val) = self.max_concurrent_streams {
            params.push((SettingsParameter::MaxConcurrentStreams, val));
        }
        if let Some(val) = self.initial_window_size {
            params.push((SettingsParameter::InitialWindowSize, val));
        }
        if let Some(val) = self.max_frame_size {
            params.push((SettingsParameter::MaxFrameSize, val));
        }
        params
    }

    /// Apply a single wire parameter, ignoring unknown identifiers
    pub fn apply_wire_param(&mut self, id: u16, value: u32) -> Result<()> {
        match SettingsParameter::from_u16(id) {
            Some(SettingsParameter::MaxConcurrentStreams) => {
                self.max_concurrent_streams = Some(value);
            }
            Some(SettingsParameter::InitialWindowSize) => {
                if value > 0x7FFFFFFF {
                    return Err(Error::FlowControl {
                        stream_id: 0,
                        reason: format!("Initial window size {} exceeds maximum", value),
                    });
                }
                self.initial_window_size = Some(value);
            }
            Some(SettingsParameter::MaxFrameSize) => {
                if !(16384..=16777215).contains(&value) {
                    return Err(Error::Protocol(format!(
                        "Max frame size {} outside valid range",
                        value
                    )));
                }
                self.max_frame_size = Some(value);
            }
            // Unknown parameters are ignored for extensibility
            None => {}
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new()
    }
}

/// Builder for connection settings
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Create a new settings builder
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings::new(),
        }
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings.max_concurrent_streams = Some(max);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings.initial_window_size = Some(size);
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings.max_frame_size = Some(size);
        self
    }

    /// Set the local-only control-frame outstanding limit
    pub fn max_outstanding_control_frames(mut self, max: usize) -> Self {
        self.settings.max_outstanding_control_frames = max;
        self
    }

    /// Set the local-only window replenish threshold percentage
    pub fn replenish_threshold_percent(mut self, percent: u8) -> Self {
        self.settings.replenish_threshold_percent = percent;
        self
    }

    /// Build the settings
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_parameter_conversion() {
        assert_eq!(SettingsParameter::MaxConcurrentStreams.as_u16(), 0x3);
        assert_eq!(SettingsParameter::InitialWindowSize.as_u16(), 0x4);

        assert_eq!(
            SettingsParameter::from_u16(0x4),
            Some(SettingsParameter::InitialWindowSize)
        );
        assert_eq!(SettingsParameter::from_u16(0xff), None);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.get_max_concurrent_streams(), None);
        assert_eq!(settings.get_initial_window_size(), 65535);
        assert_eq!(settings.get_max_frame_size(), 16384);
        assert_eq!(
            settings.max_outstanding_control_frames,
            DEFAULT_MAX_OUTSTANDING_CONTROL_FRAMES
        );
    }

    #[test]
    fn test_settings_builder() {
        let settings = SettingsBuilder::new()
            .max_concurrent_streams(100)
            .initial_window_size(32768)
            .max_outstanding_control_frames(16)
            .build()
            .unwrap();

        assert_eq!(settings.get_max_concurrent_streams(), Some(100));
        assert_eq!(settings.get_initial_window_size(), 32768);
        assert_eq!(settings.max_outstanding_control_frames, 16);
    }

    #[test]
    fn test_settings_validation() {
        let settings = SettingsBuilder::new()
            .initial_window_size(65535)
            .max_frame_size(16384)
            .build();
        assert!(settings.is_ok());

        let settings = SettingsBuilder::new()
            .initial_window_size(0x80000000) // 2^31
            .build();
        assert!(settings.is_err());

        let settings = SettingsBuilder::new().max_frame_size(1024).build();
        assert!(settings.is_err());

        let settings = SettingsBuilder::new().max_frame_size(16777216).build();
        assert!(settings.is_err());

        let settings = SettingsBuilder::new().replenish_threshold_percent(0).build();
        assert!(settings.is_err());
    }

    #[test]
    fn test_settings_merge() {
        let mut settings1 = SettingsBuilder::new()
            .max_concurrent_streams(10)
            .build()
            .unwrap();

        let settings2 = SettingsBuilder::new()
            .max_concurrent_streams(100)
            .initial_window_size(8192)
            .build()
            .unwrap();

        settings1.merge(&settings2);

        assert_eq!(settings1.get_max_concurrent_streams(), Some(100));
        assert_eq!(settings1.get_initial_window_size(), 8192);
    }

    #[test]
    fn test_apply_wire_param_ignores_unknown() {
        let mut settings = Settings::new();
        settings.apply_wire_param(0xbeef, 42).unwrap();
        assert_eq!(settings, Settings::new());
    }

    #[test]
    fn test_apply_wire_param_rejects_oversized_window() {
        let mut settings = Settings::new();
        let err = settings.apply_wire_param(0x4, 0x80000000).unwrap_err();
        assert!(matches!(err, Error::FlowControl { stream_id: 0, .. }));
    }
}

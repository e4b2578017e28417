//! Error types for the multiplexing engine.
//!
//! Errors come in two severities: a *stream* error resets the offending
//! stream and leaves the connection running, while a *connection* error is
//! fatal and terminates the session with a GOAWAY. [`Error::severity`]
//! encodes that classification so the connection driver never has to
//! re-derive it at each call site.

use std::fmt;

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the transport boundary
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame header, flags, or payload layout
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame length exceeds the negotiated maximum frame size
    #[error("Frame size error: {0}")]
    FrameSize(String),

    /// Stream refused: concurrency limit reached or id not usable
    #[error("Refused stream: {0}")]
    RefusedStream(u32),

    /// Flow-control window violation or overflow
    ///
    /// `stream_id` 0 means the connection window was the target.
    #[error("Flow control error on stream {stream_id}: {reason}")]
    FlowControl { stream_id: u32, reason: String },

    /// A send cannot proceed without exhausting a flow-control window.
    ///
    /// Not a wire error: the caller defers the write and retries after a
    /// window-update event.
    #[error("Send of {requested} bytes exceeds available window ({available})")]
    WindowExceeded { requested: usize, available: i64 },

    /// Frame received for a stream in an incompatible state
    #[error("Invalid frame for stream {stream_id} in state {state}")]
    StreamState { stream_id: u32, state: &'static str },

    /// Frame received for a closed stream
    #[error("Stream closed: {0}")]
    StreamClosed(u32),

    /// Too many outstanding control frames; the connection must terminate
    #[error("Control frame flood: {0} unacknowledged frames")]
    ControlFrameFlood(usize),

    /// Header translation failure at the compatibility boundary
    #[error("Header translation error: {0}")]
    Translation(String),

    /// Mutation attempted on a read-only header view
    #[error("Header block is read-only")]
    ReadOnlyHeaders,

    /// Invalid settings value
    #[error("Invalid settings value: {0}")]
    InvalidSettings(String),

    /// Connection already terminated
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Error severity, deciding how the connection driver reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Reset the offending stream, keep the connection alive
    Stream,
    /// Send GOAWAY and tear the connection down
    Connection,
    /// Not a protocol failure; surfaced to the caller for retry
    Local,
}

impl Error {
    /// Classify this error as stream-scoped, connection-fatal, or local.
    pub fn severity(&self) -> Severity {
        match self {
            Error::Protocol(_) | Error::FrameSize(_) | Error::ControlFrameFlood(_) => {
                Severity::Connection
            }
            // Window-update overflow escalates only when the target is the
            // connection window (stream id 0).
            Error::FlowControl { stream_id, .. } => {
                if *stream_id == 0 {
                    Severity::Connection
                } else {
                    Severity::Stream
                }
            }
            Error::RefusedStream(_) | Error::StreamState { .. } | Error::StreamClosed(_) => {
                Severity::Stream
            }
            Error::WindowExceeded { .. } | Error::ReadOnlyHeaders => Severity::Local,
            Error::Io(_) | Error::ConnectionClosed => Severity::Connection,
            Error::Translation(_) | Error::InvalidSettings(_) => Severity::Local,
        }
    }

    /// Wire error code to carry in RST_STREAM or GOAWAY for this error.
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            Error::Protocol(_) => ErrorCode::ProtocolError,
            Error::FrameSize(_) => ErrorCode::FrameSizeError,
            Error::RefusedStream(_) => ErrorCode::RefusedStream,
            Error::FlowControl { .. } => ErrorCode::FlowControlError,
            Error::StreamState { .. } | Error::StreamClosed(_) => ErrorCode::StreamClosed,
            Error::ControlFrameFlood(_) => ErrorCode::EnhanceYourCalm,
            _ => ErrorCode::InternalError,
        }
    }
}

/// Wire error codes carried by RST_STREAM and GOAWAY frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown
    NoError = 0x0,
    /// Protocol error detected
    ProtocolError = 0x1,
    /// Implementation fault
    InternalError = 0x2,
    /// Flow-control limits exceeded
    FlowControlError = 0x3,
    /// Settings not acknowledged
    SettingsTimeout = 0x4,
    /// Frame received for closed stream
    StreamClosed = 0x5,
    /// Frame size incorrect
    FrameSizeError = 0x6,
    /// Stream not processed
    RefusedStream = 0x7,
    /// Stream cancelled
    Cancel = 0x8,
    /// Compression state not updated
    CompressionError = 0x9,
    /// TCP connection error for CONNECT method
    ConnectError = 0xa,
    /// Processing capacity exceeded
    EnhanceYourCalm = 0xb,
    /// Negotiated TLS parameters not acceptable
    InadequateSecurity = 0xc,
    /// Use HTTP/1.1 for the request
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Convert error code to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create error code from u32
    ///
    /// Unknown codes map to `InternalError` rather than failing, since a
    /// peer may use codes from extensions we do not know about.
    pub fn from_u32(code: u32) -> Self {
        match code {
            0x0 => ErrorCode::NoError,
            0x1 => ErrorCode::ProtocolError,
            0x2 => ErrorCode::InternalError,
            0x3 => ErrorCode::FlowControlError,
            0x4 => ErrorCode::SettingsTimeout,
            0x5 => ErrorCode::StreamClosed,
            0x6 => ErrorCode::FrameSizeError,
            0x7 => ErrorCode::RefusedStream,
            0x8 => ErrorCode::Cancel,
            0x9 => ErrorCode::CompressionError,
            0xa => ErrorCode::ConnectError,
            0xb => ErrorCode::EnhanceYourCalm,
            0xc => ErrorCode::InadequateSecurity,
            0xd => ErrorCode::Http11Required,
            _ => ErrorCode::InternalError,
        }
    }

    /// Get error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

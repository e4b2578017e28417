//! Multiplexed binary framing engine
//!
//! This crate implements a sans-io connection engine for an HTTP/2-style
//! multiplexed protocol: many independent streams over one transport
//! connection, with binary framing, nested flow control, and watermark
//! backpressure.
//!
//! # Architecture
//!
//! The engine never touches a socket. A [`Connection`] is fed inbound
//! transport bytes with [`Connection::recv`] and drained with
//! [`Connection::poll_event`] (decoded application events) and
//! [`Connection::poll_output`] (framed outbound bytes). All protocol
//! state lives inside the connection and is mutated only by those calls,
//! so one connection is one serialization domain.
//!
//! - **Frame codec**: incremental decoding and encoding of the 9-byte
//!   frame header plus typed payloads; unknown frame types pass through
//!   verbatim
//! - **Stream lifecycle**: forward-only state machine with odd/even id
//!   allocation, concurrency limits, and idempotent reset
//! - **Flow control**: signed windows at connection and stream level in
//!   both directions, with threshold-batched replenishment
//! - **Flood guard**: bounds unacknowledged SETTINGS acks, PING acks,
//!   and RST_STREAM frames a peer can provoke
//! - **Backpressure**: per-stream pending-byte watermarks gated on
//!   connection writability
//! - **Header translation**: pseudo-header blocks to and from an
//!   HTTP/1.x-style representation at the compatibility boundary
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use h2mux::{Connection, Event, Role, Settings};
//!
//! # fn main() -> h2mux::Result<()> {
//! let mut client = Connection::new(Role::Client, Settings::default());
//! let mut server = Connection::new(Role::Server, Settings::default());
//!
//! // Settings exchange
//! while let Some(bytes) = client.poll_output() {
//!     server.recv(&bytes)?;
//! }
//! while let Some(bytes) = server.poll_output() {
//!     client.recv(&bytes)?;
//! }
//!
//! let id = client.open_stream()?;
//! client.send_headers(id, Bytes::from_static(b"headers"), false)?;
//! client.send_data(id, Bytes::from_static(b"hello"), true)?;
//! while let Some(bytes) = client.poll_output() {
//!     server.recv(&bytes)?;
//! }
//!
//! while let Some(event) = server.poll_event() {
//!     if let Event::Data { data, .. } = event {
//!         assert_eq!(&data[..], b"hello");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod connection;
pub mod error;
pub mod flow_control;
pub mod frames;
pub mod guard;
pub mod headers;
pub mod settings;
pub mod stream;
pub mod translate;

pub use channel::StreamChannel;
pub use codec::{FrameCodec, FRAME_HEADER_SIZE};
pub use connection::{Connection, Event};
pub use error::{Error, ErrorCode, Result, Severity};
pub use flow_control::{
    ConnectionFlowControl, FlowWindow, StreamFlowControl, DEFAULT_INITIAL_WINDOW_SIZE,
};
pub use frames::{
    DataFrame, Frame, FrameFlags, FrameType, GoawayFrame, HeadersFrame, PingFrame,
    RstStreamFrame, SettingsFrame, UnknownFrame, WindowUpdateFrame,
};
pub use guard::{ControlFrameGuard, FrameSink};
pub use headers::{HeaderBlock, HeaderView};
pub use settings::{Settings, SettingsBuilder};
pub use stream::{Role, Stream, StreamId, StreamRegistry, StreamState};
pub use translate::{HeaderTranslator, Http1Request, Http1Response};

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFFFFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;

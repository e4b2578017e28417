//! Connection engine.
//!
//! One `Connection` is one transport session and one serialization domain:
//! the driver feeds inbound bytes with [`Connection::recv`], drains decoded
//! application events with [`Connection::poll_event`] and framed outbound
//! bytes with [`Connection::poll_output`]. All state mutation happens
//! inside those calls; nothing blocks and nothing runs on a timer.
//!
//! A send that cannot proceed under flow control fails with
//! `WindowExceeded` and is retried by the caller when a
//! [`Event::WindowAvailable`] is processed, never busy-waited.

use crate::codec::FrameCodec;
use crate::error::{Error, ErrorCode, Result, Severity};
use crate::flow_control::ConnectionFlowControl;
use crate::frames::*;
use crate::guard::{ControlFrameGuard, FrameSink};
use crate::settings::Settings;
use crate::stream::{Role, StreamId, StreamRegistry, StreamState};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Outbound queue bytes above which the connection stops being writable
pub const CONNECTION_HIGH_WATER: usize = 256 * 1024;

/// Outbound queue bytes below which connection writability is restored
pub const CONNECTION_LOW_WATER: usize = 128 * 1024;

/// Events surfaced to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Peer settings received and applied
    RemoteSettings(Settings),
    /// Peer acknowledged our settings
    SettingsAck,
    /// Header block fragment received on a stream
    Headers {
        stream_id: StreamId,
        block: Bytes,
        end_stream: bool,
        end_headers: bool,
    },
    /// Continuation of a header block exceeding one frame
    Continuation {
        stream_id: StreamId,
        fragment: Bytes,
        end_headers: bool,
    },
    /// Data received on a stream
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    /// Peer-advised stream priority
    Priority {
        stream_id: StreamId,
        priority: PrioritySpec,
    },
    /// Stream reset (by the peer or by a local protocol violation)
    StreamReset {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    /// Flow-control credit arrived; deferred sends may be retried.
    /// Stream id 0 means the connection window.
    WindowAvailable { stream_id: StreamId },
    /// A stream's writability flipped
    WritabilityChanged {
        stream_id: StreamId,
        writable: bool,
    },
    /// Peer ping; the acknowledgement is already queued
    Ping { data: [u8; 8] },
    /// Peer acknowledged our ping
    PingAck { data: [u8; 8] },
    /// Peer is shutting the connection down
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    /// Frame of an unknown type, handed over without validation
    Unknown(UnknownFrame),
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    /// Normal operation
    Active,
    /// GOAWAY sent or received; existing streams may finish
    Closing,
    /// Fatal error or transport gone; no further input accepted
    Closed,
}

/// One frame's worth of queued outbound bytes
#[derive(Debug)]
struct QueuedFrame {
    bytes: Bytes,
    /// Counts against the flood guard
    guarded: bool,
    /// Data frames carry (stream id, flow bytes) for channel completion
    stream: Option<(StreamId, usize)>,
}

/// Outbound frame queue; the innermost [`FrameSink`]
#[derive(Debug, Default)]
struct OutboundQueue {
    queue: VecDeque<QueuedFrame>,
    queued_bytes: usize,
}

impl OutboundQueue {
    fn pop(&mut self) -> Option<QueuedFrame> {
        let item = self.queue.pop_front()?;
        self.queued_bytes -= item.bytes.len();
        Some(item)
    }

    /// Serialize and queue a frame; never fails
    fn enqueue(&mut self, frame: &Frame) {
        let bytes = FrameCodec::encode(frame);
        let stream = match frame {
            Frame::Data(f) => Some((f.stream_id, f.flow_size())),
            _ => None,
        };
        self.queued_bytes += bytes.len();
        self.queue.push_back(QueuedFrame {
            bytes,
            guarded: frame.is_guarded_control(),
            stream,
        });
    }
}

impl FrameSink for OutboundQueue {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.enqueue(frame);
        Ok(())
    }

    fn flush(&mut self) -> Result<usize> {
        // Completion is driven by the transport draining poll_output
        Ok(0)
    }
}

/// Connection engine
pub struct Connection {
    role: Role,
    state: ConnState,
    codec: FrameCodec,
    registry: StreamRegistry,
    conn_flow: ConnectionFlowControl,
    local_settings: Settings,
    remote_settings: Settings,
    outbound: ControlFrameGuard<OutboundQueue>,
    events: VecDeque<Event>,
    /// Highest remote-initiated stream id fully processed (for GOAWAY)
    last_processed: StreamId,
    /// Connection-level writability mirrored into each stream channel
    writable: bool,
}

impl Connection {
    /// Create a connection and queue the initial SETTINGS exchange
    pub fn new(role: Role, local_settings: Settings) -> Self {
        let initial_recv = local_settings.get_initial_window_size();
        // Until the peer's settings arrive, its defaults apply
        let remote_settings = Settings::default();
        let initial_send = remote_settings.get_initial_window_size();

        let mut conn = Connection {
            role,
            state: ConnState::Active,
            codec: FrameCodec::with_max_frame_size(local_settings.get_max_frame_size()),
            registry: StreamRegistry::new(role, initial_send, initial_recv),
            conn_flow: ConnectionFlowControl::with_initial_sizes(initial_send, initial_recv),
            outbound: ControlFrameGuard::new(
                OutboundQueue::default(),
                local_settings.max_outstanding_control_frames,
            ),
            local_settings,
            remote_settings,
            events: VecDeque::new(),
            last_processed: 0,
            writable: true,
        };

        let settings = Frame::Settings(SettingsFrame::new(conn.local_settings.clone()));
        conn.outbound.inner_mut().enqueue(&settings);
        conn
    }

    /// This endpoint's role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the connection accepts new work
    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Closed
    }

    /// Connection-level writability (outbound queue below high water)
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Our settings
    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    /// Last applied peer settings
    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    /// State of a stream, if it is still registered
    pub fn stream_state(&self, stream_id: StreamId) -> Option<StreamState> {
        self.registry.get(stream_id).map(|s| s.state())
    }

    /// Whether a stream currently accepts writes without backpressure
    pub fn stream_is_writable(&self, stream_id: StreamId) -> bool {
        self.registry
            .get(stream_id)
            .map(|s| s.channel().is_writable())
            .unwrap_or(false)
    }

    /// Available send window for a stream (min of stream and connection)
    pub fn send_capacity(&self, stream_id: StreamId) -> i64 {
        let conn = self.conn_flow.send_window().size();
        self.registry
            .get(stream_id)
            .map(|s| s.flow().send_window().size().min(conn))
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Inbound path
    // ------------------------------------------------------------------

    /// Feed inbound transport bytes.
    ///
    /// Connection-fatal errors queue a GOAWAY, close the connection, and
    /// are returned. Stream-scoped errors reset the offending stream and
    /// processing continues.
    pub fn recv(&mut self, input: &[u8]) -> Result<()> {
        if self.state == ConnState::Closed {
            return Err(Error::ConnectionClosed);
        }

        let frames = match self.codec.decode(input) {
            Ok(frames) => frames,
            Err(err) => return Err(self.fatal(err)),
        };

        for frame in frames {
            if self.state == ConnState::Closed {
                break;
            }
            if let Err(err) = self.handle_frame(frame) {
                return Err(err);
            }
        }

        self.registry.evict_closed();
        Ok(())
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Settings(f) => self.on_settings(f),
            Frame::Ping(f) => self.on_ping(f),
            Frame::WindowUpdate(f) => self.on_window_update(f),
            Frame::Headers(f) => self.on_headers(f),
            Frame::Continuation(f) => self.on_continuation(f),
            Frame::Data(f) => self.on_data(f),
            Frame::RstStream(f) => self.on_rst_stream(f),
            Frame::Goaway(f) => self.on_goaway(f),
            Frame::Priority(f) => {
                self.events.push_back(Event::Priority {
                    stream_id: f.stream_id,
                    priority: f.priority,
                });
                Ok(())
            }
            Frame::Unknown(f) => {
                // Extensibility rule: no conformance checks, straight to
                // the application
                self.events.push_back(Event::Unknown(f));
                Ok(())
            }
        }
    }

    fn on_settings(&mut self, frame: SettingsFrame) -> Result<()> {
        if frame.ack {
            self.events.push_back(Event::SettingsAck);
            return Ok(());
        }

        let old_window = self.remote_settings.get_initial_window_size();
        self.remote_settings.merge(&frame.settings);
        let new_window = self.remote_settings.get_initial_window_size();

        if new_window != old_window {
            // Retroactively adjust every open stream's send window by the
            // delta; a negative result is legal and blocks sending until
            // WINDOW_UPDATE credit restores it.
            self.registry.set_initial_send_window(new_window);
            let mut failures = Vec::new();
            for stream in self.registry.iter_mut() {
                if stream.state().is_closed() {
                    continue;
                }
                if let Err(err) = stream.flow_mut().update_initial_send_size(new_window) {
                    failures.push((stream.id(), err));
                }
            }
            for (stream_id, err) in failures {
                self.dispatch_error(err, stream_id)?;
            }
        }

        debug!(settings = ?self.remote_settings, "applied peer settings");
        self.events
            .push_back(Event::RemoteSettings(frame.settings));
        self.write_frame(Frame::Settings(SettingsFrame::ack()))
    }

    fn on_ping(&mut self, frame: PingFrame) -> Result<()> {
        if frame.ack {
            self.events.push_back(Event::PingAck { data: frame.data });
            return Ok(());
        }
        self.events.push_back(Event::Ping { data: frame.data });
        self.write_frame(Frame::Ping(PingFrame::ack(frame.data)))
    }

    fn on_window_update(&mut self, frame: WindowUpdateFrame) -> Result<()> {
        if frame.stream_id == 0 {
            if let Err(err) = self.conn_flow.credit_send(frame.size_increment) {
                // Connection-window overflow is always fatal
                return Err(self.fatal(err));
            }
            self.events
                .push_back(Event::WindowAvailable { stream_id: 0 });
            return Ok(());
        }

        let result = match self.registry.get_mut(frame.stream_id) {
            Some(stream) => stream.flow_mut().credit_send(frame.size_increment).map(|_| ()),
            None => {
                if self.known_stream_id(frame.stream_id) {
                    // Credit for an already-evicted stream is harmless
                    return Ok(());
                }
                return Err(self.fatal(Error::Protocol(format!(
                    "WINDOW_UPDATE for idle stream {}",
                    frame.stream_id
                ))));
            }
        };

        match result {
            Ok(()) => {
                self.events.push_back(Event::WindowAvailable {
                    stream_id: frame.stream_id,
                });
                Ok(())
            }
            Err(err) => self.dispatch_error(err, frame.stream_id),
        }
    }

    fn on_headers(&mut self, frame: HeadersFrame) -> Result<()> {
        let stream_id = frame.stream_id;

        let result = match self.registry.get_mut(stream_id) {
            Some(stream) => stream.recv_headers(frame.end_stream),
            None => {
                if self.known_stream_id(stream_id) {
                    // Headers for a stream already closed and evicted
                    Err(Error::StreamClosed(stream_id))
                } else {
                    let limit = self.local_settings.get_max_concurrent_streams();
                    self.registry
                        .open_remote(stream_id, limit)
                        .and_then(|stream| stream.recv_headers(frame.end_stream))
                }
            }
        };

        if let Err(err) = result {
            return self.dispatch_error(err, stream_id);
        }

        self.note_processed(stream_id);
        self.note_terminal(stream_id);
        self.events.push_back(Event::Headers {
            stream_id,
            block: frame.header_block,
            end_stream: frame.end_stream,
            end_headers: frame.end_headers,
        });
        Ok(())
    }

    fn on_continuation(&mut self, frame: ContinuationFrame) -> Result<()> {
        if self.registry.get(frame.stream_id).is_none() {
            return Err(self.fatal(Error::Protocol(format!(
                "CONTINUATION for unopened stream {}",
                frame.stream_id
            ))));
        }
        self.events.push_back(Event::Continuation {
            stream_id: frame.stream_id,
            fragment: frame.header_block,
            end_headers: frame.end_headers,
        });
        Ok(())
    }

    fn on_data(&mut self, frame: DataFrame) -> Result<()> {
        let stream_id = frame.stream_id;
        let flow_len = frame.flow_size();

        // Every data byte counts against the connection window, even when
        // the stream turns out to be in the wrong state
        self.conn_flow.consume_recv(flow_len);
        if let Some(increment) = self
            .conn_flow
            .replenish_recv(self.local_settings.replenish_threshold_percent)
        {
            self.write_frame(Frame::WindowUpdate(WindowUpdateFrame::new(0, increment)))?;
        }

        let result = match self.registry.get_mut(stream_id) {
            Some(stream) => stream.recv_data(flow_len, frame.end_stream),
            None => {
                if self.known_stream_id(stream_id) {
                    Err(Error::StreamClosed(stream_id))
                } else {
                    return Err(self.fatal(Error::Protocol(format!(
                        "DATA for idle stream {}",
                        stream_id
                    ))));
                }
            }
        };

        if let Err(err) = result {
            return self.dispatch_error(err, stream_id);
        }

        let threshold = self.local_settings.replenish_threshold_percent;
        if let Some(stream) = self.registry.get_mut(stream_id) {
            if !stream.state().is_closed() {
                if let Some(increment) = stream.flow_mut().replenish_recv(threshold) {
                    self.write_frame(Frame::WindowUpdate(WindowUpdateFrame::new(
                        stream_id, increment,
                    )))?;
                }
            }
        }

        self.note_processed(stream_id);
        self.note_terminal(stream_id);
        self.events.push_back(Event::Data {
            stream_id,
            data: frame.data,
            end_stream: frame.end_stream,
        });
        Ok(())
    }

    fn on_rst_stream(&mut self, frame: RstStreamFrame) -> Result<()> {
        if !self.known_stream_id(frame.stream_id) {
            if self.role.peer().owns(frame.stream_id) {
                // The peer refused its own allocation: this RST is the
                // first and last frame naming the id. Retire it so later
                // frames for it read as stale, not as a desync.
                self.registry.retire_remote(frame.stream_id);
                self.events.push_back(Event::StreamReset {
                    stream_id: frame.stream_id,
                    error_code: frame.error_code,
                });
                return Ok(());
            }
            return Err(self.fatal(Error::Protocol(format!(
                "RST_STREAM for idle stream {}",
                frame.stream_id
            ))));
        }

        self.registry.reset(frame.stream_id);
        if let Some(stream) = self.registry.get_mut(frame.stream_id) {
            stream.set_terminal_notified();
        }
        self.events.push_back(Event::StreamReset {
            stream_id: frame.stream_id,
            error_code: frame.error_code,
        });
        Ok(())
    }

    fn on_goaway(&mut self, frame: GoawayFrame) -> Result<()> {
        debug!(last_stream_id = frame.last_stream_id, code = %frame.error_code, "peer sent GOAWAY");
        self.state = ConnState::Closing;
        self.events.push_back(Event::GoAway {
            last_stream_id: frame.last_stream_id,
            error_code: frame.error_code,
            debug_data: frame.debug_data,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Application-side operations
    // ------------------------------------------------------------------

    /// Open a locally initiated stream, allocating the next id.
    ///
    /// When the peer's concurrency limit refuses the stream, an
    /// RST_STREAM(REFUSED_STREAM) is queued and the error is returned;
    /// the connection stays up.
    pub fn open_stream(&mut self) -> Result<StreamId> {
        self.ensure_open()?;
        let peer_limit = self.remote_settings.get_max_concurrent_streams();
        match self.registry.open_local(peer_limit) {
            Ok(id) => Ok(id),
            Err(err @ Error::RefusedStream(id)) => {
                warn!(stream_id = id, "stream refused by concurrency limit");
                self.write_frame(Frame::RstStream(RstStreamFrame {
                    stream_id: id,
                    error_code: ErrorCode::RefusedStream,
                }))?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Send a header block on a stream.
    ///
    /// A block larger than the peer's maximum frame size continues across
    /// CONTINUATION frames; END_STREAM stays on the HEADERS frame.
    pub fn send_headers(
        &mut self,
        stream_id: StreamId,
        block: Bytes,
        end_stream: bool,
    ) -> Result<()> {
        self.ensure_open()?;
        let stream = self
            .registry
            .get_mut(stream_id)
            .ok_or(Error::StreamClosed(stream_id))?;
        stream.send_headers(end_stream)?;
        self.note_terminal(stream_id);

        let max_frame = self.remote_settings.get_max_frame_size() as usize;
        if block.len() <= max_frame {
            return self.write_frame(Frame::Headers(HeadersFrame::new(
                stream_id, block, end_stream, true,
            )));
        }

        self.write_frame(Frame::Headers(HeadersFrame::new(
            stream_id,
            block.slice(..max_frame),
            end_stream,
            false,
        )))?;
        let mut offset = max_frame;
        while offset < block.len() {
            let end = (offset + max_frame).min(block.len());
            self.write_frame(Frame::Continuation(ContinuationFrame {
                stream_id,
                header_block: block.slice(offset..end),
                end_headers: end == block.len(),
            }))?;
            offset = end;
        }
        Ok(())
    }

    /// Send a trailing header block, ending the stream
    pub fn send_trailers(&mut self, stream_id: StreamId, block: Bytes) -> Result<()> {
        self.send_headers(stream_id, block, true)
    }

    /// Send data on a stream.
    ///
    /// Reserves both the stream and the connection send window for the
    /// whole payload, all or nothing: a shortfall in either fails with
    /// [`Error::WindowExceeded`] and the caller retries after
    /// [`Event::WindowAvailable`]. The payload is split into frames of the
    /// peer's maximum frame size.
    pub fn send_data(&mut self, stream_id: StreamId, data: Bytes, end_stream: bool) -> Result<()> {
        self.ensure_open()?;
        let conn_available = self.conn_flow.send_window().size();
        let stream = self
            .registry
            .get_mut(stream_id)
            .ok_or(Error::StreamClosed(stream_id))?;

        if !stream.state().can_send() {
            return Err(Error::StreamClosed(stream_id));
        }

        let available = stream.flow().send_window().size().min(conn_available);
        if (data.len() as i64) > available {
            return Err(Error::WindowExceeded {
                requested: data.len(),
                available,
            });
        }

        stream.send_data(data.len(), end_stream)?;
        let flipped = stream.channel_mut().submit(data.len());
        // Cannot fail: both windows were checked against `available`
        self.conn_flow.reserve_send(data.len())?;
        self.note_terminal(stream_id);

        if flipped {
            self.events.push_back(Event::WritabilityChanged {
                stream_id,
                writable: false,
            });
        }

        let max_frame = self.remote_settings.get_max_frame_size() as usize;
        if data.is_empty() {
            self.write_frame(Frame::Data(DataFrame::new(stream_id, data, end_stream)))?;
        } else {
            let mut offset = 0;
            while offset < data.len() {
                let end = (offset + max_frame).min(data.len());
                let last = end == data.len();
                self.write_frame(Frame::Data(DataFrame::new(
                    stream_id,
                    data.slice(offset..end),
                    end_stream && last,
                )))?;
                offset = end;
            }
        }
        Ok(())
    }

    /// Reset a stream.
    ///
    /// Idempotent and safe at any point in the lifecycle: resetting a
    /// closed, evicted, or never-created stream is a no-op.
    pub fn reset_stream(&mut self, stream_id: StreamId, error_code: ErrorCode) -> Result<()> {
        if self.state == ConnState::Closed {
            return Ok(());
        }
        let active = self
            .registry
            .get(stream_id)
            .map(|s| !s.state().is_closed())
            .unwrap_or(false);
        if !active {
            return Ok(());
        }

        self.registry.reset(stream_id);
        if let Some(stream) = self.registry.get_mut(stream_id) {
            stream.set_terminal_notified();
        }
        self.write_frame(Frame::RstStream(RstStreamFrame {
            stream_id,
            error_code,
        }))?;
        self.events.push_back(Event::StreamReset {
            stream_id,
            error_code,
        });
        Ok(())
    }

    /// Send a ping (not guarded; only acknowledgements are)
    pub fn ping(&mut self, data: [u8; 8]) -> Result<()> {
        self.ensure_open()?;
        self.write_frame(Frame::Ping(PingFrame::new(data)))
    }

    /// Initiate graceful shutdown
    pub fn go_away(&mut self, error_code: ErrorCode) -> Result<()> {
        if self.state == ConnState::Closed {
            return Err(Error::ConnectionClosed);
        }
        self.state = ConnState::Closing;
        self.write_frame(Frame::Goaway(GoawayFrame::new(
            self.last_processed,
            error_code,
            Bytes::new(),
        )))
    }

    // ------------------------------------------------------------------
    // Output and events
    // ------------------------------------------------------------------

    /// Drain the next chunk of framed outbound bytes.
    ///
    /// Handing bytes to the transport completes the corresponding writes:
    /// guarded control frames release flood-guard capacity and data frames
    /// release stream channel capacity.
    pub fn poll_output(&mut self) -> Option<Bytes> {
        let item = self.outbound.inner_mut().pop()?;

        if item.guarded {
            self.outbound.complete(1);
        }
        if let Some((stream_id, len)) = item.stream {
            if let Some(stream) = self.registry.get_mut(stream_id) {
                if stream.channel_mut().complete(len) {
                    self.events.push_back(Event::WritabilityChanged {
                        stream_id,
                        writable: true,
                    });
                }
            }
        }

        self.refresh_writability();
        Some(item.bytes)
    }

    /// Drain the next queued event
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ConnState::Closed => Err(Error::ConnectionClosed),
            _ => Ok(()),
        }
    }

    /// Whether `stream_id` was ever opened by either side
    fn known_stream_id(&self, stream_id: StreamId) -> bool {
        self.registry.was_remote_id(stream_id) || self.registry.was_local_id(stream_id)
    }

    fn note_processed(&mut self, stream_id: StreamId) {
        if self.registry.was_remote_id(stream_id) && stream_id > self.last_processed {
            self.last_processed = stream_id;
        }
    }

    /// Mark streams that just reached Closed so they can be evicted once
    /// the application has seen the terminal event
    fn note_terminal(&mut self, stream_id: StreamId) {
        if let Some(stream) = self.registry.get_mut(stream_id) {
            if stream.state().is_closed() {
                stream.set_terminal_notified();
            }
        }
    }

    /// Route an error by severity: reset the stream or kill the connection
    fn dispatch_error(&mut self, err: Error, stream_id: StreamId) -> Result<()> {
        match err.severity() {
            Severity::Stream => {
                warn!(stream_id, error = %err, "stream error");
                let code = err.wire_code();
                self.registry.reset(stream_id);
                if let Some(stream) = self.registry.get_mut(stream_id) {
                    stream.set_terminal_notified();
                }
                self.write_frame(Frame::RstStream(RstStreamFrame {
                    stream_id,
                    error_code: code,
                }))?;
                self.events.push_back(Event::StreamReset {
                    stream_id,
                    error_code: code,
                });
                Ok(())
            }
            _ => Err(self.fatal(err)),
        }
    }

    /// Terminal failure: queue GOAWAY, close, and hand the error back
    fn fatal(&mut self, err: Error) -> Error {
        if self.state != ConnState::Closed {
            tracing::error!(error = %err, "connection error");
            let goaway = Frame::Goaway(GoawayFrame::new(
                self.last_processed,
                err.wire_code(),
                Bytes::new(),
            ));
            // Bypass the guard so the GOAWAY escapes even a poisoned sink
            self.outbound.inner_mut().enqueue(&goaway);
            self.state = ConnState::Closed;
        }
        err
    }

    /// Write through the flood guard, escalating a poisoned sink
    fn write_frame(&mut self, frame: Frame) -> Result<()> {
        match self.outbound.write_frame(&frame) {
            Ok(()) => {
                self.refresh_writability();
                Ok(())
            }
            Err(err @ Error::ControlFrameFlood(_)) => Err(self.fatal(err)),
            Err(err) => Err(err),
        }
    }

    /// Recompute connection writability from queued bytes, with
    /// hysteresis, and mirror changes into every stream channel
    fn refresh_writability(&mut self) {
        let queued = self.outbound.inner().queued_bytes;
        let writable = if self.writable {
            queued < CONNECTION_HIGH_WATER
        } else {
            queued < CONNECTION_LOW_WATER
        };

        if writable == self.writable {
            return;
        }
        self.writable = writable;

        let mut flips = Vec::new();
        for stream in self.registry.iter_mut() {
            if stream.channel_mut().set_connection_writable(writable) {
                flips.push((stream.id(), stream.channel().is_writable()));
            }
        }
        for (stream_id, writable) in flips {
            self.events.push_back(Event::WritabilityChanged {
                stream_id,
                writable,
            });
        }
    }
}

//! Stream lifecycle and registry.
//!
//! Streams only move forward through the state machine: Idle opens on
//! HEADERS, END_STREAM half-closes a direction, RST_STREAM closes from any
//! state. The registry owns all streams of one connection, allocates ids
//! (odd for client-initiated, even for server-initiated, never reused) and
//! enforces the concurrency limit and id-ordering rules.

use crate::channel::StreamChannel;
use crate::error::{Error, Result};
use crate::flow_control::StreamFlowControl;
use std::collections::{HashMap, HashSet};

/// Stream ID type
pub type StreamId = u32;

/// Connection endpoint role, deciding the stream-id parity this side uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiates odd-numbered streams
    Client,
    /// Initiates even-numbered streams
    Server,
}

impl Role {
    /// First stream id this role may allocate
    fn first_id(self) -> StreamId {
        match self {
            Role::Client => 1,
            Role::Server => 2,
        }
    }

    /// Whether `id` belongs to this role's id space
    pub fn owns(self, id: StreamId) -> bool {
        match self {
            Role::Client => id % 2 == 1,
            Role::Server => id % 2 == 0,
        }
    }

    /// The opposite endpoint role
    pub fn peer(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

/// Stream lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No frames have been sent or received
    Idle,
    /// Both sides may send frames
    Open,
    /// We sent END_STREAM; the peer may still send
    HalfClosedLocal,
    /// The peer sent END_STREAM; we may still send
    HalfClosedRemote,
    /// Both directions ended, or the stream was reset
    Closed,
}

impl StreamState {
    /// Check if this side may still send data
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if the peer may still send data
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if the stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }

    /// State name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            StreamState::Idle => "Idle",
            StreamState::Open => "Open",
            StreamState::HalfClosedLocal => "HalfClosedLocal",
            StreamState::HalfClosedRemote => "HalfClosedRemote",
            StreamState::Closed => "Closed",
        }
    }
}

/// One multiplexed stream
#[derive(Debug)]
pub struct Stream {
    /// Stream ID
    id: StreamId,
    /// Lifecycle state
    state: StreamState,
    /// Per-stream flow control windows
    flow: StreamFlowControl,
    /// Outbound channel bookkeeping (pending bytes, writability)
    channel: StreamChannel,
    /// Whether a terminal notification was delivered to the application
    terminal_notified: bool,
    /// Whether our initial header block went out
    local_headers_sent: bool,
    /// Whether the peer's initial header block arrived
    remote_headers_received: bool,
}

impl Stream {
    /// Create a new stream with specified window sizes
    pub fn new(id: StreamId, send_size: u32, recv_size: u32) -> Self {
        Stream {
            id,
            state: StreamState::Idle,
            flow: StreamFlowControl::with_initial_sizes(id, send_size, recv_size),
            channel: StreamChannel::new(id),
            terminal_notified: false,
            local_headers_sent: false,
            remote_headers_received: false,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Get flow control
    pub fn flow(&self) -> &StreamFlowControl {
        &self.flow
    }

    /// Get mutable flow control
    pub fn flow_mut(&mut self) -> &mut StreamFlowControl {
        &mut self.flow
    }

    /// Get the outbound channel
    pub fn channel(&self) -> &StreamChannel {
        &self.channel
    }

    /// Get the mutable outbound channel
    pub fn channel_mut(&mut self) -> &mut StreamChannel {
        &mut self.channel
    }

    /// Mark the terminal notification as delivered
    pub fn set_terminal_notified(&mut self) {
        self.terminal_notified = true;
    }

    /// Whether the stream may be evicted from the registry
    pub fn evictable(&self) -> bool {
        self.state.is_closed() && self.terminal_notified
    }

    fn state_error(&self) -> Error {
        Error::StreamState {
            stream_id: self.id,
            state: self.state.name(),
        }
    }

    /// Process an inbound HEADERS frame.
    ///
    /// On a locally opened stream the peer's initial block arrives in
    /// `Open` or `HalfClosedLocal`; only a block after that is a trailer
    /// and must end the stream.
    pub fn recv_headers(&mut self, end_stream: bool) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.state = if end_stream {
                    StreamState::HalfClosedRemote
                } else {
                    StreamState::Open
                };
            }
            StreamState::Open | StreamState::HalfClosedLocal => {
                // Trailers must end the stream
                if self.remote_headers_received && !end_stream {
                    return Err(self.state_error());
                }
                if end_stream {
                    self.state = match self.state {
                        StreamState::Open => StreamState::HalfClosedRemote,
                        _ => StreamState::Closed,
                    };
                }
            }
            StreamState::HalfClosedRemote | StreamState::Closed => {
                return Err(self.state_error());
            }
        }
        self.remote_headers_received = true;
        Ok(())
    }

    /// Process an inbound DATA frame of `len` flow-controlled bytes
    pub fn recv_data(&mut self, len: usize, end_stream: bool) -> Result<()> {
        if !self.state.can_receive() {
            // Data after the peer half-closed is a stream error, never fatal
            return Err(Error::StreamClosed(self.id));
        }

        self.flow.consume_recv(len);

        if end_stream {
            self.state = match self.state {
                StreamState::Open => StreamState::HalfClosedRemote,
                StreamState::HalfClosedLocal => StreamState::Closed,
                _ => self.state,
            };
        }

        Ok(())
    }

    /// Record an outbound HEADERS frame.
    ///
    /// Mirrors [`Stream::recv_headers`]: the initial block may leave in
    /// any sendable state, a second block is a trailer and must end the
    /// stream.
    pub fn send_headers(&mut self, end_stream: bool) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.state = if end_stream {
                    StreamState::HalfClosedLocal
                } else {
                    StreamState::Open
                };
            }
            StreamState::Open | StreamState::HalfClosedRemote => {
                if self.local_headers_sent && !end_stream {
                    return Err(self.state_error());
                }
                if end_stream {
                    self.state = match self.state {
                        StreamState::Open => StreamState::HalfClosedLocal,
                        _ => StreamState::Closed,
                    };
                }
            }
            StreamState::HalfClosedLocal | StreamState::Closed => {
                return Err(self.state_error());
            }
        }
        self.local_headers_sent = true;
        Ok(())
    }

    /// Reserve the stream window and record an outbound DATA frame.
    ///
    /// The connection window reservation happens at the connection level;
    /// this only covers the stream-scoped half.
    pub fn send_data(&mut self, len: usize, end_stream: bool) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::StreamClosed(self.id));
        }

        self.flow.reserve_send(len)?;

        if end_stream {
            self.state = match self.state {
                StreamState::Open => StreamState::HalfClosedLocal,
                StreamState::HalfClosedRemote => StreamState::Closed,
                _ => self.state,
            };
        }

        Ok(())
    }

    /// Close the stream immediately (RST_STREAM in either direction).
    ///
    /// Idempotent: closing a closed stream is a no-op.
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }
}

/// Stream registry
///
/// Owns all streams of one connection.
#[derive(Debug)]
pub struct StreamRegistry {
    /// Active streams
    streams: HashMap<StreamId, Stream>,
    /// This endpoint's role
    role: Role,
    /// Next id to allocate for local streams
    next_local_id: StreamId,
    /// Highest remote-initiated id observed
    highest_remote_id: StreamId,
    /// Ids spent and gone: evicted streams plus refused allocations.
    /// Frames naming a retired id are stale, not a desync.
    retired: HashSet<StreamId>,
    /// Initial send window for new streams (peer's initial window size)
    initial_send_window: u32,
    /// Initial receive window for new streams (our advertised size)
    initial_recv_window: u32,
}

impl StreamRegistry {
    /// Create a new registry for the given role
    pub fn new(role: Role, initial_send_window: u32, initial_recv_window: u32) -> Self {
        StreamRegistry {
            streams: HashMap::new(),
            role,
            next_local_id: role.first_id(),
            highest_remote_id: 0,
            retired: HashSet::new(),
            initial_send_window,
            initial_recv_window,
        }
    }

    /// Get this endpoint's role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Update the initial send window applied to newly created streams
    pub fn set_initial_send_window(&mut self, size: u32) {
        self.initial_send_window = size;
    }

    /// Highest remote-initiated stream id observed so far
    pub fn highest_remote_id(&self) -> StreamId {
        self.highest_remote_id
    }

    /// Open a locally initiated stream, allocating the next id.
    ///
    /// Fails with [`Error::RefusedStream`] when the peer's concurrency
    /// limit is already met; the caller must answer with
    /// RST_STREAM(REFUSED_STREAM), never tear down the connection.
    pub fn open_local(&mut self, peer_max_concurrent: Option<u32>) -> Result<StreamId> {
        let id = self.next_local_id;
        self.open_local_at(id, peer_max_concurrent)?;
        Ok(id)
    }

    /// Open a locally initiated stream at an explicit id.
    ///
    /// The id must belong to this role's parity space and exceed every id
    /// previously used by this role; ids are never reused.
    pub fn open_local_at(
        &mut self,
        id: StreamId,
        peer_max_concurrent: Option<u32>,
    ) -> Result<()> {
        if id == 0 || !self.role.owns(id) {
            return Err(Error::RefusedStream(id));
        }
        if id < self.next_local_id {
            return Err(Error::RefusedStream(id));
        }
        if let Some(max) = peer_max_concurrent {
            if self.active_count() >= max as usize {
                // The refusal RST_STREAM names this id on the wire, so the
                // id is spent either way; ids are never reused
                self.next_local_id = id + 2;
                self.retired.insert(id);
                return Err(Error::RefusedStream(id));
            }
        }

        self.next_local_id = id + 2;
        self.streams.insert(
            id,
            Stream::new(id, self.initial_send_window, self.initial_recv_window),
        );
        Ok(())
    }

    /// Register a remotely initiated stream from an inbound HEADERS frame.
    ///
    /// An id lower than one already seen from the peer indicates a
    /// desynchronized id sequence and is a connection error. Exceeding our
    /// advertised concurrency limit refuses the stream (stream error).
    pub fn open_remote(
        &mut self,
        id: StreamId,
        local_max_concurrent: Option<u32>,
    ) -> Result<&mut Stream> {
        if id == 0 || !self.role.peer().owns(id) {
            return Err(Error::Protocol(format!(
                "Peer opened stream {} outside its id space",
                id
            )));
        }
        if id <= self.highest_remote_id {
            return Err(Error::Protocol(format!(
                "Peer opened stream {} after already using {}",
                id, self.highest_remote_id
            )));
        }
        if let Some(max) = local_max_concurrent {
            if self.active_count() >= max as usize {
                // The peer consumed the id by sending HEADERS for it
                self.highest_remote_id = id;
                self.retired.insert(id);
                return Err(Error::RefusedStream(id));
            }
        }

        self.highest_remote_id = id;
        self.streams.insert(
            id,
            Stream::new(id, self.initial_send_window, self.initial_recv_window),
        );
        Ok(self.streams.get_mut(&id).expect("stream just inserted"))
    }

    /// Get a stream by ID
    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    /// Get a mutable stream by ID
    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    /// Whether this id was ever actually opened or spent by the peer.
    ///
    /// A lower id the peer skipped is not "was": creating it later is a
    /// desync, not a frame for a closed stream.
    pub fn was_remote_id(&self, id: StreamId) -> bool {
        self.role.peer().owns(id)
            && (self.streams.contains_key(&id) || self.retired.contains(&id))
    }

    /// Whether this id was ever opened or spent locally
    pub fn was_local_id(&self, id: StreamId) -> bool {
        self.role.owns(id)
            && (self.streams.contains_key(&id) || self.retired.contains(&id))
    }

    /// Record a remote-parity id as spent without ever opening it.
    ///
    /// Covers a peer refusing its own allocation: the first and last frame
    /// naming the id is the RST_STREAM it sent us.
    pub fn retire_remote(&mut self, id: StreamId) {
        self.retired.insert(id);
        if id > self.highest_remote_id {
            self.highest_remote_id = id;
        }
    }

    /// Number of streams not yet closed
    pub fn active_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| !s.state().is_closed())
            .count()
    }

    /// Iterate over all streams mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stream> {
        self.streams.values_mut()
    }

    /// Reset a stream. Idempotent and safe for ids that were never created.
    pub fn reset(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.get_mut(&id) {
            stream.close();
        }
    }

    /// Evict streams that are closed and fully notified, retiring their ids
    pub fn evict_closed(&mut self) {
        let retired = &mut self.retired;
        self.streams.retain(|id, stream| {
            if stream.evictable() {
                retired.insert(*id);
                return false;
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn registry(role: Role) -> StreamRegistry {
        StreamRegistry::new(role, 65535, 65535)
    }

    #[test]
    fn test_state_transitions_send() {
        let mut stream = Stream::new(1, 65535, 65535);
        assert_eq!(stream.state(), StreamState::Idle);

        stream.send_headers(false).unwrap();
        assert_eq!(stream.state(), StreamState::Open);

        stream.send_data(100, true).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);

        // Peer finishes too
        stream.recv_data(10, true).unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_state_transitions_recv() {
        let mut stream = Stream::new(2, 65535, 65535);

        stream.recv_headers(true).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedRemote);

        stream.send_headers(false).unwrap();
        stream.send_data(5, true).unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_data_after_half_close_is_stream_error() {
        let mut stream = Stream::new(1, 65535, 65535);
        stream.recv_headers(true).unwrap();

        let err = stream.recv_data(10, false).unwrap_err();
        assert!(matches!(err, Error::StreamClosed(1)));
    }

    #[test]
    fn test_trailers_must_end_stream() {
        let mut stream = Stream::new(1, 65535, 65535);
        stream.recv_headers(false).unwrap();

        // Second HEADERS without END_STREAM is not a valid trailer block
        let err = stream.recv_headers(false).unwrap_err();
        assert!(matches!(err, Error::StreamState { stream_id: 1, .. }));

        // With END_STREAM it is
        stream.recv_headers(true).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedRemote);
    }

    #[test]
    fn test_response_headers_arrive_in_open() {
        let mut stream = Stream::new(1, 65535, 65535);
        stream.send_headers(false).unwrap();

        // The peer's initial block arrives while Open and need not end
        // the stream
        stream.recv_headers(false).unwrap();
        assert_eq!(stream.state(), StreamState::Open);

        // A second block from the peer is a trailer
        let err = stream.recv_headers(false).unwrap_err();
        assert!(matches!(err, Error::StreamState { stream_id: 1, .. }));
        stream.recv_headers(true).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedRemote);
    }

    #[test]
    fn test_second_outbound_headers_must_end_stream() {
        let mut stream = Stream::new(2, 65535, 65535);
        stream.recv_headers(false).unwrap();

        stream.send_headers(false).unwrap();
        let err = stream.send_headers(false).unwrap_err();
        assert!(matches!(err, Error::StreamState { .. }));
        stream.send_headers(true).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut stream = Stream::new(1, 65535, 65535);
        stream.close();
        assert_eq!(stream.state(), StreamState::Closed);
        stream.close();
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_registry_allocates_by_role() {
        let mut client = registry(Role::Client);
        assert_eq!(client.open_local(None).unwrap(), 1);
        assert_eq!(client.open_local(None).unwrap(), 3);
        assert_eq!(client.open_local(None).unwrap(), 5);

        let mut server = registry(Role::Server);
        assert_eq!(server.open_local(None).unwrap(), 2);
        assert_eq!(server.open_local(None).unwrap(), 4);
    }

    #[test]
    fn test_registry_id_monotonicity() {
        let mut reg = registry(Role::Client);
        reg.open_local_at(5, None).unwrap();

        // Lower and equal ids for the same role are refused
        assert!(matches!(
            reg.open_local_at(3, None).unwrap_err(),
            Error::RefusedStream(3)
        ));
        assert!(matches!(
            reg.open_local_at(5, None).unwrap_err(),
            Error::RefusedStream(5)
        ));

        reg.open_local_at(7, None).unwrap();
    }

    #[test]
    fn test_registry_wrong_parity_refused() {
        let mut reg = registry(Role::Client);
        assert!(matches!(
            reg.open_local_at(2, None).unwrap_err(),
            Error::RefusedStream(2)
        ));
    }

    #[test]
    fn test_registry_concurrency_limit() {
        let mut reg = registry(Role::Client);
        reg.open_local(Some(2)).unwrap();
        reg.open_local(Some(2)).unwrap();

        let err = reg.open_local(Some(2)).unwrap_err();
        assert!(matches!(err, Error::RefusedStream(5)));

        // Closing one frees a slot; the refused id went on the wire in an
        // RST_STREAM and is never handed out again
        reg.reset(1);
        assert_eq!(reg.open_local(Some(2)).unwrap(), 7);
        assert!(reg.was_local_id(5));
    }

    #[test]
    fn test_remote_lower_id_is_connection_error() {
        let mut reg = registry(Role::Server);
        reg.open_remote(5, None).unwrap();

        let err = reg.open_remote(3, None).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_remote_concurrency_limit_refuses() {
        let mut reg = registry(Role::Server);
        reg.open_remote(1, Some(1)).unwrap();

        let err = reg.open_remote(3, Some(1)).unwrap_err();
        assert!(matches!(err, Error::RefusedStream(3)));
    }

    #[test]
    fn test_skipped_remote_id_is_not_known() {
        let mut reg = registry(Role::Server);
        reg.open_remote(5, None).unwrap();

        // id 3 was skipped by the peer, never opened
        assert!(!reg.was_remote_id(3));
        assert!(reg.was_remote_id(5));

        // Evicted streams stay known
        reg.get_mut(5).unwrap().close();
        reg.get_mut(5).unwrap().set_terminal_notified();
        reg.evict_closed();
        assert!(reg.get(5).is_none());
        assert!(reg.was_remote_id(5));
    }

    #[test]
    fn test_retire_remote_spends_the_id() {
        let mut reg = registry(Role::Server);
        reg.retire_remote(3);
        assert!(reg.was_remote_id(3));

        // The peer cannot open a retired id again
        let err = reg.open_remote(3, None).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        reg.open_remote(5, None).unwrap();
    }

    #[test]
    fn test_reset_unknown_stream_is_noop() {
        let mut reg = registry(Role::Client);
        reg.reset(99);
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn test_eviction_requires_notification() {
        let mut reg = registry(Role::Client);
        let id = reg.open_local(None).unwrap();

        reg.reset(id);
        reg.evict_closed();
        // Closed but not yet notified: still present
        assert!(reg.get(id).is_some());

        reg.get_mut(id).unwrap().set_terminal_notified();
        reg.evict_closed();
        assert!(reg.get(id).is_none());
    }
}

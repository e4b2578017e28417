//! Frame encoding and decoding.
//!
//! The codec owns an accumulation buffer fed from the transport and yields
//! zero or more complete frames per feed. Encoding guarantees the byte-exact
//! wire layout: 24-bit length, 8-bit type, 8-bit flags, 1 reserved bit +
//! 31-bit stream id, then the type-specific payload.
//!
//! Frames of an unknown type are decoded into an opaque payload without any
//! structural validation, per the protocol extensibility rule.

use crate::error::{Error, ErrorCode, Result};
use crate::frames::*;
use crate::settings::Settings;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Frame codec with an incremental read buffer
pub struct FrameCodec {
    /// Accumulated inbound bytes not yet forming a complete frame
    read_buffer: BytesMut,
    /// Negotiated maximum frame payload size
    max_frame_size: u32,
}

impl FrameCodec {
    /// Create a new frame codec with the default max frame size
    pub fn new() -> Self {
        FrameCodec {
            read_buffer: BytesMut::with_capacity(4096),
            max_frame_size: 16384,
        }
    }

    /// Create a codec enforcing a specific maximum frame size
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        FrameCodec {
            read_buffer: BytesMut::with_capacity(4096),
            max_frame_size,
        }
    }

    /// Update the negotiated maximum frame size (SETTINGS change)
    pub fn set_max_frame_size(&mut self, max_frame_size: u32) {
        self.max_frame_size = max_frame_size;
    }

    /// Encode a frame header
    pub fn encode_header(
        frame_type: u8,
        flags: FrameFlags,
        stream_id: u32,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        // Type (8 bits)
        header[3] = frame_type;

        // Flags (8 bits)
        header[4] = flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit is 0 on send)
        let stream_id = stream_id & 0x7FFFFFFF;
        header[5] = ((stream_id >> 24) & 0xFF) as u8;
        header[6] = ((stream_id >> 16) & 0xFF) as u8;
        header[7] = ((stream_id >> 8) & 0xFF) as u8;
        header[8] = (stream_id & 0xFF) as u8;

        header
    }

    /// Decode a frame header: (raw type, flags, stream id, payload length)
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> (u8, FrameFlags, u32, usize) {
        let length =
            ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);

        let frame_type = bytes[3];
        let flags = FrameFlags::from_u8(bytes[4]);

        // Reserved bit is ignored on receive
        let stream_id = ((bytes[5] as u32 & 0x7F) << 24)
            | ((bytes[6] as u32) << 16)
            | ((bytes[7] as u32) << 8)
            | (bytes[8] as u32);

        (frame_type, flags, stream_id, length)
    }

    /// Feed inbound bytes and decode every complete frame available.
    ///
    /// Partial trailing bytes stay buffered for the next feed. A declared
    /// payload length above the negotiated maximum fails with
    /// [`Error::FrameSize`] before any payload is consumed.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<Frame>> {
        self.read_buffer.extend_from_slice(input);

        let mut frames = Vec::new();
        loop {
            if self.read_buffer.len() < FRAME_HEADER_SIZE {
                break;
            }

            let mut header = [0u8; FRAME_HEADER_SIZE];
            header.copy_from_slice(&self.read_buffer[..FRAME_HEADER_SIZE]);
            let (frame_type, flags, stream_id, payload_len) = Self::decode_header(&header);

            if payload_len > self.max_frame_size as usize {
                return Err(Error::FrameSize(format!(
                    "Frame of {} bytes exceeds negotiated maximum {}",
                    payload_len, self.max_frame_size
                )));
            }

            if self.read_buffer.len() < FRAME_HEADER_SIZE + payload_len {
                break;
            }

            self.read_buffer.advance(FRAME_HEADER_SIZE);
            let payload = self.read_buffer.split_to(payload_len).freeze();

            frames.push(Self::decode_payload(frame_type, flags, stream_id, payload)?);
        }

        Ok(frames)
    }

    /// Decode a payload into a typed frame
    fn decode_payload(
        frame_type: u8,
        flags: FrameFlags,
        stream_id: u32,
        payload: Bytes,
    ) -> Result<Frame> {
        let known = FrameType::from_u8(frame_type);

        let frame = match known {
            Some(FrameType::Data) => {
                Self::require_stream(FrameType::Data, stream_id)?;
                let (data, padding) = Self::strip_padding(payload, flags)?;
                Frame::Data(DataFrame {
                    stream_id,
                    data,
                    end_stream: flags.is_end_stream(),
                    padding,
                })
            }
            Some(FrameType::Headers) => {
                Self::require_stream(FrameType::Headers, stream_id)?;
                let (data, padding) = Self::strip_padding(payload, flags)?;
                let (priority, fragment) = if flags.is_set(FrameFlags::PRIORITY) {
                    if data.len() < 5 {
                        return Err(Error::Protocol(
                            "HEADERS priority field truncated".to_string(),
                        ));
                    }
                    let spec = Self::decode_priority_spec(&data[..5]);
                    (Some(spec), data.slice(5..))
                } else {
                    (None, data)
                };
                Frame::Headers(HeadersFrame {
                    stream_id,
                    header_block: fragment,
                    end_stream: flags.is_end_stream(),
                    end_headers: flags.is_end_headers(),
                    priority,
                    padding,
                })
            }
            Some(FrameType::Priority) => {
                Self::require_stream(FrameType::Priority, stream_id)?;
                if payload.len() != 5 {
                    return Err(Error::Protocol(format!(
                        "PRIORITY payload must be 5 bytes, got {}",
                        payload.len()
                    )));
                }
                Frame::Priority(PriorityFrame {
                    stream_id,
                    priority: Self::decode_priority_spec(&payload),
                })
            }
            Some(FrameType::RstStream) => {
                Self::require_stream(FrameType::RstStream, stream_id)?;
                if payload.len() != 4 {
                    return Err(Error::Protocol(format!(
                        "RST_STREAM payload must be 4 bytes, got {}",
                        payload.len()
                    )));
                }
                let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Frame::RstStream(RstStreamFrame {
                    stream_id,
                    error_code: ErrorCode::from_u32(code),
                })
            }
            Some(FrameType::Settings) => {
                Self::require_connection(FrameType::Settings, stream_id)?;
                let ack = flags.is_ack();
                if ack && !payload.is_empty() {
                    return Err(Error::Protocol(
                        "SETTINGS ACK must carry an empty payload".to_string(),
                    ));
                }
                if payload.len() % 6 != 0 {
                    return Err(Error::Protocol(format!(
                        "SETTINGS payload length {} not a multiple of 6",
                        payload.len()
                    )));
                }
                let mut settings = Settings::new();
                for chunk in payload.chunks_exact(6) {
                    let id = u16::from_be_bytes([chunk[0], chunk[1]]);
                    let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
                    settings.apply_wire_param(id, value)?;
                }
                Frame::Settings(SettingsFrame { ack, settings })
            }
            Some(FrameType::Ping) => {
                Self::require_connection(FrameType::Ping, stream_id)?;
                if payload.len() != 8 {
                    return Err(Error::Protocol(format!(
                        "PING payload must be 8 bytes, got {}",
                        payload.len()
                    )));
                }
                let mut data = [0u8; 8];
                data.copy_from_slice(&payload);
                Frame::Ping(PingFrame {
                    ack: flags.is_ack(),
                    data,
                })
            }
            Some(FrameType::Goaway) => {
                Self::require_connection(FrameType::Goaway, stream_id)?;
                if payload.len() < 8 {
                    return Err(Error::Protocol(format!(
                        "GOAWAY payload must be at least 8 bytes, got {}",
                        payload.len()
                    )));
                }
                let last_stream_id =
                    u32::from_be_bytes([payload[0] & 0x7F, payload[1], payload[2], payload[3]]);
                let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
                Frame::Goaway(GoawayFrame {
                    last_stream_id,
                    error_code: ErrorCode::from_u32(code),
                    debug_data: payload.slice(8..),
                })
            }
            Some(FrameType::WindowUpdate) => {
                // Valid on stream 0 (connection window) and nonzero ids
                if payload.len() != 4 {
                    return Err(Error::Protocol(format!(
                        "WINDOW_UPDATE payload must be 4 bytes, got {}",
                        payload.len()
                    )));
                }
                let increment =
                    u32::from_be_bytes([payload[0] & 0x7F, payload[1], payload[2], payload[3]]);
                Frame::WindowUpdate(WindowUpdateFrame {
                    stream_id,
                    size_increment: increment,
                })
            }
            Some(FrameType::Continuation) => {
                Self::require_stream(FrameType::Continuation, stream_id)?;
                Frame::Continuation(ContinuationFrame {
                    stream_id,
                    header_block: payload,
                    end_headers: flags.is_end_headers(),
                })
            }
            None => Frame::Unknown(UnknownFrame {
                frame_type,
                stream_id,
                flags,
                payload,
            }),
        };

        Ok(frame)
    }

    fn require_stream(frame_type: FrameType, stream_id: u32) -> Result<()> {
        if stream_id == 0 {
            return Err(Error::Protocol(format!(
                "{} frame on connection stream id 0",
                frame_type.name()
            )));
        }
        Ok(())
    }

    fn require_connection(frame_type: FrameType, stream_id: u32) -> Result<()> {
        if stream_id != 0 {
            return Err(Error::Protocol(format!(
                "{} frame on nonzero stream id {}",
                frame_type.name(),
                stream_id
            )));
        }
        Ok(())
    }

    fn decode_priority_spec(bytes: &[u8]) -> PrioritySpec {
        PrioritySpec {
            exclusive: bytes[0] & 0x80 != 0,
            stream_dependency: u32::from_be_bytes([bytes[0] & 0x7F, bytes[1], bytes[2], bytes[3]]),
            weight: bytes[4],
        }
    }

    /// Validate a padding declaration and split payload into (data, padding)
    fn strip_padding(payload: Bytes, flags: FrameFlags) -> Result<(Bytes, Option<u8>)> {
        if !flags.is_padded() {
            return Ok((payload, None));
        }

        if payload.is_empty() {
            return Err(Error::Protocol(
                "PADDED frame with empty payload".to_string(),
            ));
        }

        let pad_len = payload[0] as usize;
        if pad_len >= payload.len() {
            return Err(Error::Protocol(format!(
                "Padding length {} exceeds payload of {} bytes",
                pad_len,
                payload.len() - 1
            )));
        }

        let data = payload.slice(1..payload.len() - pad_len);
        Ok((data, Some(pad_len as u8)))
    }

    /// Encode any frame variant
    pub fn encode(frame: &Frame) -> Bytes {
        match frame {
            Frame::Data(f) => Self::encode_data_frame(f),
            Frame::Headers(f) => Self::encode_headers_frame(f),
            Frame::Priority(f) => Self::encode_priority_frame(f),
            Frame::RstStream(f) => Self::encode_rst_stream_frame(f),
            Frame::Settings(f) => Self::encode_settings_frame(f),
            Frame::Ping(f) => Self::encode_ping_frame(f),
            Frame::Goaway(f) => Self::encode_goaway_frame(f),
            Frame::WindowUpdate(f) => Self::encode_window_update_frame(f),
            Frame::Continuation(f) => Self::encode_continuation_frame(f),
            Frame::Unknown(f) => Self::encode_unknown_frame(f),
        }
    }

    /// Encode a DATA frame
    pub fn encode_data_frame(frame: &DataFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut payload_len = frame.data.len();
        let mut flags = FrameFlags::empty();

        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header =
            Self::encode_header(FrameType::Data.as_u8(), flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }

        buf.put_slice(&frame.data);

        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }

        buf.freeze()
    }

    /// Encode a HEADERS frame
    pub fn encode_headers_frame(frame: &HeadersFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut payload_len = frame.header_block.len();
        let mut flags = FrameFlags::empty();

        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        if frame.priority.is_some() {
            flags.set(FrameFlags::PRIORITY);
            payload_len += 5;
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header =
            Self::encode_header(FrameType::Headers.as_u8(), flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }

        if let Some(priority) = &frame.priority {
            Self::put_priority_spec(&mut buf, priority);
        }

        buf.put_slice(&frame.header_block);

        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }

        buf.freeze()
    }

    /// Encode a PRIORITY frame
    pub fn encode_priority_frame(frame: &PriorityFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header = Self::encode_header(
            FrameType::Priority.as_u8(),
            FrameFlags::empty(),
            frame.stream_id,
            5,
        );
        buf.put_slice(&header);
        Self::put_priority_spec(&mut buf, &frame.priority);

        buf.freeze()
    }

    fn put_priority_spec(buf: &mut BytesMut, priority: &PrioritySpec) {
        let mut dep = priority.stream_dependency & 0x7FFFFFFF;
        if priority.exclusive {
            dep |= 0x80000000;
        }
        buf.put_u32(dep);
        buf.put_u8(priority.weight);
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream_frame(frame: &RstStreamFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header = Self::encode_header(
            FrameType::RstStream.as_u8(),
            FrameFlags::empty(),
            frame.stream_id,
            4,
        );
        buf.put_slice(&header);
        buf.put_u32(frame.error_code.as_u32());

        buf.freeze()
    }

    /// Encode a SETTINGS frame
    pub fn encode_settings_frame(frame: &SettingsFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        // Each parameter is 6 bytes (2 byte id + 4 byte value)
        let mut settings_data = BytesMut::new();
        if !frame.ack {
            for (param, value) in frame.settings.wire_params() {
                settings_data.put_u16(param.as_u16());
                settings_data.put_u32(value);
            }
        }

        let header = Self::encode_header(
            FrameType::Settings.as_u8(),
            flags,
            0,
            settings_data.len(),
        );
        buf.put_slice(&header);
        buf.put_slice(&settings_data);

        buf.freeze()
    }

    /// Encode a PING frame
    pub fn encode_ping_frame(frame: &PingFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let header = Self::encode_header(FrameType::Ping.as_u8(), flags, 0, 8);
        buf.put_slice(&header);
        buf.put_slice(&frame.data);

        buf.freeze()
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(frame: &GoawayFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let payload_len = 8 + frame.debug_data.len();

        let header = Self::encode_header(
            FrameType::Goaway.as_u8(),
            FrameFlags::empty(),
            0,
            payload_len,
        );
        buf.put_slice(&header);
        buf.put_u32(frame.last_stream_id & 0x7FFFFFFF);
        buf.put_u32(frame.error_code.as_u32());
        buf.put_slice(&frame.debug_data);

        buf.freeze()
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update_frame(frame: &WindowUpdateFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header = Self::encode_header(
            FrameType::WindowUpdate.as_u8(),
            FrameFlags::empty(),
            frame.stream_id,
            4,
        );
        buf.put_slice(&header);
        buf.put_u32(frame.size_increment & 0x7FFFFFFF);

        buf.freeze()
    }

    /// Encode a CONTINUATION frame
    pub fn encode_continuation_frame(frame: &ContinuationFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut flags = FrameFlags::empty();
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let header = Self::encode_header(
            FrameType::Continuation.as_u8(),
            flags,
            frame.stream_id,
            frame.header_block.len(),
        );
        buf.put_slice(&header);
        buf.put_slice(&frame.header_block);

        buf.freeze()
    }

    /// Re-encode an unknown frame verbatim
    pub fn encode_unknown_frame(frame: &UnknownFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header = Self::encode_header(
            frame.frame_type,
            frame.flags,
            frame.stream_id,
            frame.payload.len(),
        );
        buf.put_slice(&header);
        buf.put_slice(&frame.payload);

        buf.freeze()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsBuilder;

    fn decode_one(bytes: &[u8]) -> Frame {
        let mut codec = FrameCodec::new();
        let mut frames = codec.decode(bytes).unwrap();
        assert_eq!(frames.len(), 1);
        frames.pop().unwrap()
    }

    #[test]
    fn test_encode_decode_header() {
        let flags = FrameFlags::from_u8(FrameFlags::END_STREAM | FrameFlags::END_HEADERS);
        let header = FrameCodec::encode_header(FrameType::Headers.as_u8(), flags, 42, 1234);
        let (decoded_type, decoded_flags, decoded_id, decoded_len) =
            FrameCodec::decode_header(&header);

        assert_eq!(decoded_type, FrameType::Headers.as_u8());
        assert_eq!(decoded_flags.as_u8(), flags.as_u8());
        assert_eq!(decoded_id, 42);
        assert_eq!(decoded_len, 1234);
    }

    #[test]
    fn test_encode_data_frame() {
        let frame = DataFrame::new(1, Bytes::from("Hello"), true);
        let encoded = FrameCodec::encode_data_frame(&frame);

        assert_eq!(encoded[0..3], [0, 0, 5]); // Length = 5
        assert_eq!(encoded[3], FrameType::Data.as_u8());
        assert_eq!(encoded[4], FrameFlags::END_STREAM);
        assert_eq!(&encoded[5..9], &[0, 0, 0, 1]); // Stream ID = 1
        assert_eq!(&encoded[9..], b"Hello");
    }

    #[test]
    fn test_encode_data_frame_with_padding() {
        let frame = DataFrame::new(1, Bytes::from("Hi"), false).with_padding(10);
        let encoded = FrameCodec::encode_data_frame(&frame);

        // Length: 1 (pad length) + 2 (data) + 10 (padding) = 13
        assert_eq!(encoded[0..3], [0, 0, 13]);
        assert_eq!(encoded[4] & FrameFlags::PADDED, FrameFlags::PADDED);
        assert_eq!(encoded[9], 10);
        assert_eq!(&encoded[10..12], b"Hi");
        assert_eq!(&encoded[12..22], &[0u8; 10]);
    }

    #[test]
    fn test_data_frame_round_trip_all_padding_lengths() {
        for pad in 0..=255u16 {
            let frame = Frame::Data(
                DataFrame::new(7, Bytes::from("payload"), pad % 2 == 0).with_padding(pad as u8),
            );
            let encoded = FrameCodec::encode(&frame);
            assert_eq!(decode_one(&encoded), frame, "padding {}", pad);
        }
    }

    #[test]
    fn test_headers_frame_round_trip() {
        let frame = Frame::Headers(
            HeadersFrame::new(3, Bytes::from("fragment"), true, true)
                .with_priority(PrioritySpec::new(1, true, 200))
                .with_padding(5),
        );
        let encoded = FrameCodec::encode(&frame);
        assert_eq!(decode_one(&encoded), frame);
    }

    #[test]
    fn test_all_variants_round_trip() {
        let settings = SettingsBuilder::new()
            .max_concurrent_streams(100)
            .initial_window_size(32768)
            .max_frame_size(16384)
            .build()
            .unwrap();

        let frames = vec![
            Frame::Data(DataFrame::new(1, Bytes::from("abc"), false)),
            Frame::Headers(HeadersFrame::new(1, Bytes::from("hdr"), false, true)),
            Frame::Priority(PriorityFrame {
                stream_id: 5,
                priority: PrioritySpec::new(3, false, 16),
            }),
            Frame::RstStream(RstStreamFrame {
                stream_id: 1,
                error_code: ErrorCode::Cancel,
            }),
            Frame::Settings(SettingsFrame::new(settings)),
            Frame::Settings(SettingsFrame::ack()),
            Frame::Ping(PingFrame::new([1, 2, 3, 4, 5, 6, 7, 8])),
            Frame::Ping(PingFrame::ack([8, 7, 6, 5, 4, 3, 2, 1])),
            Frame::Goaway(GoawayFrame::new(9, ErrorCode::NoError, Bytes::from("bye"))),
            Frame::WindowUpdate(WindowUpdateFrame::new(0, 65535)),
            Frame::WindowUpdate(WindowUpdateFrame::new(3, 100)),
            Frame::Continuation(ContinuationFrame {
                stream_id: 1,
                header_block: Bytes::from("rest"),
                end_headers: true,
            }),
            Frame::Unknown(UnknownFrame {
                frame_type: 0xAA,
                stream_id: 0,
                flags: FrameFlags::from_u8(0xFF),
                payload: Bytes::from("opaque"),
            }),
        ];

        for frame in frames {
            let encoded = FrameCodec::encode(&frame);
            assert_eq!(decode_one(&encoded), frame, "{:?}", frame);
        }
    }

    #[test]
    fn test_incremental_decode() {
        let frame = Frame::Data(DataFrame::new(1, Bytes::from("streaming"), false));
        let encoded = FrameCodec::encode(&frame);

        let mut codec = FrameCodec::new();
        let (first, second) = encoded.split_at(6);
        assert!(codec.decode(first).unwrap().is_empty());
        let frames = codec.decode(second).unwrap();
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_decode_two_frames_one_feed() {
        let a = FrameCodec::encode(&Frame::Ping(PingFrame::new([0; 8])));
        let b = FrameCodec::encode(&Frame::WindowUpdate(WindowUpdateFrame::new(0, 10)));
        let mut both = a.to_vec();
        both.extend_from_slice(&b);

        let mut codec = FrameCodec::new();
        let frames = codec.decode(&both).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut codec = FrameCodec::with_max_frame_size(16384);
        let header = FrameCodec::encode_header(
            FrameType::Data.as_u8(),
            FrameFlags::empty(),
            1,
            16385,
        );
        let err = codec.decode(&header).unwrap_err();
        assert!(matches!(err, Error::FrameSize(_)));
    }

    #[test]
    fn test_bad_padding_rejected() {
        // PADDED flag, pad length 10 but only 5 payload bytes total
        let mut bytes = FrameCodec::encode_header(
            FrameType::Data.as_u8(),
            FrameFlags::from_u8(FrameFlags::PADDED),
            1,
            5,
        )
        .to_vec();
        bytes.extend_from_slice(&[10, 0, 0, 0, 0]);

        let mut codec = FrameCodec::new();
        let err = codec.decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_settings_on_nonzero_stream_rejected() {
        let bytes = FrameCodec::encode_header(
            FrameType::Settings.as_u8(),
            FrameFlags::empty(),
            1,
            0,
        );

        let mut codec = FrameCodec::new();
        let err = codec.decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_data_on_stream_zero_rejected() {
        let bytes =
            FrameCodec::encode_header(FrameType::Data.as_u8(), FrameFlags::empty(), 0, 0);

        let mut codec = FrameCodec::new();
        let err = codec.decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_unknown_frame_bypasses_validation() {
        // Type 0xE0 with nonsense flags and stream id must decode untouched
        let mut bytes =
            FrameCodec::encode_header(0xE0, FrameFlags::from_u8(0xAB), 0, 3).to_vec();
        bytes.extend_from_slice(b"xyz");

        match decode_one(&bytes) {
            Frame::Unknown(f) => {
                assert_eq!(f.frame_type, 0xE0);
                assert_eq!(f.flags.as_u8(), 0xAB);
                assert_eq!(&f.payload[..], b"xyz");
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_reserved_bit_masked_on_receive() {
        let mut bytes =
            FrameCodec::encode_header(FrameType::WindowUpdate.as_u8(), FrameFlags::empty(), 3, 4)
                .to_vec();
        bytes[5] |= 0x80; // Set the reserved bit
        bytes.extend_from_slice(&100u32.to_be_bytes());

        match decode_one(&bytes) {
            Frame::WindowUpdate(f) => assert_eq!(f.stream_id, 3),
            other => panic!("expected WindowUpdate, got {:?}", other),
        }
    }
}

//! HTTP/2 frame encoding and decoding (RFC 7540 Section 4)
//!
//! Every frame starts with a 9-octet header: a 24-bit big-endian payload
//! length, one type octet, one flags octet, and a 31-bit stream identifier
//! whose high bit is reserved (cleared on transmit, ignored on receipt).
//! Payload layout is type specific and handled per variant below.

use crate::error::{Error, ErrorCode, Result};
use crate::frames::*;
use crate::session::SessionOps;
use crate::settings::Settings;
use bytes::{BufMut, Bytes, BytesMut};

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Largest value the 24-bit length field can carry (2^24 - 1)
pub const MAX_FRAME_LEN: usize = 0x00FF_FFFF;

/// A decoded 9-octet frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length
    pub length: usize,
    /// Raw frame type octet
    pub frame_type: u8,
    /// Flags
    pub flags: FrameFlags,
    /// Stream identifier (reserved bit cleared)
    pub stream_id: u32,
}

/// Frame codec: stateless encode/decode of frames and their headers
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame header into its 9-octet wire form
    pub fn encode_header(
        frame_type: FrameType,
        flags: FrameFlags,
        stream_id: u32,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        Self::encode_header_raw(frame_type.as_u8(), flags, stream_id, length)
    }

    fn encode_header_raw(
        type_byte: u8,
        flags: FrameFlags,
        stream_id: u32,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        // Type and flags
        header[3] = type_byte;
        header[4] = flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit cleared)
        let stream_id = stream_id & 0x7FFF_FFFF;
        header[5..9].copy_from_slice(&stream_id.to_be_bytes());

        header
    }

    /// Decode a 9-octet frame header
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> FrameHeader {
        let length =
            ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);
        let frame_type = bytes[3];
        let flags = FrameFlags::from_u8(bytes[4]);
        let stream_id =
            u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & 0x7FFF_FFFF;

        FrameHeader {
            length,
            frame_type,
            flags,
            stream_id,
        }
    }

    /// Encode a complete frame to wire bytes
    pub fn encode(frame: &Frame) -> Bytes {
        match frame {
            Frame::Data(f) => Self::encode_data_frame(f),
            Frame::Headers(f) => Self::encode_headers_frame(f),
            Frame::Priority(f) => Self::encode_priority_frame(f),
            Frame::RstStream(f) => Self::encode_rst_stream_frame(f),
            Frame::Settings(f) => Self::encode_settings_frame(f),
            Frame::PushPromise(f) => Self::encode_push_promise_frame(f),
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

        let header = Self::encode_header(FrameType::Data, flags, frame.stream_id, payload_len);
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

        let header = Self::encode_header(FrameType::Headers, flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }
        if let Some(priority) = &frame.priority {
            let mut dep = priority.stream_dependency & 0x7FFF_FFFF;
            if priority.exclusive {
                dep |= 0x8000_0000;
            }
            buf.put_u32(dep);
            buf.put_u8(priority.weight);
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

        let header =
            Self::encode_header(FrameType::Priority, FrameFlags::empty(), frame.stream_id, 5);
        buf.put_slice(&header);

        let mut dep = frame.priority.stream_dependency & 0x7FFF_FFFF;
        if frame.priority.exclusive {
            dep |= 0x8000_0000;
        }
        buf.put_u32(dep);
        buf.put_u8(frame.priority.weight);

        buf.freeze()
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream_frame(frame: &RstStreamFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header =
            Self::encode_header(FrameType::RstStream, FrameFlags::empty(), frame.stream_id, 4);
        buf.put_slice(&header);
        buf.put_u32(frame.error_code.as_u32());

        buf.freeze()
    }

    /// Encode a SETTINGS frame (stream ID is always 0)
    pub fn encode_settings_frame(frame: &SettingsFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let mut settings_data = BytesMut::new();
        if !frame.ack {
            for (id, value) in frame.settings.to_entries() {
                settings_data.put_u16(id);
                settings_data.put_u32(value);
            }
        }

        let header = Self::encode_header(FrameType::Settings, flags, 0, settings_data.len());
        buf.put_slice(&header);
        buf.put_slice(&settings_data);

        buf.freeze()
    }

    /// Encode a PUSH_PROMISE frame
    pub fn encode_push_promise_frame(frame: &PushPromiseFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut payload_len = 4 + frame.header_block.len();
        let mut flags = FrameFlags::empty();
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header =
            Self::encode_header(FrameType::PushPromise, flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }
        buf.put_u32(frame.promised_stream_id & 0x7FFF_FFFF);
        buf.put_slice(&frame.header_block);
        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }

        buf.freeze()
    }

    /// Encode a PING frame (payload is always 8 bytes, stream ID 0)
    pub fn encode_ping_frame(frame: &PingFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let header = Self::encode_header(FrameType::Ping, flags, 0, 8);
        buf.put_slice(&header);
        buf.put_slice(&frame.data);

        buf.freeze()
    }

    /// Encode a GOAWAY frame (stream ID is always 0)
    pub fn encode_goaway_frame(frame: &GoawayFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let payload_len = 8 + frame.debug_data.len();
        let header = Self::encode_header(FrameType::Goaway, FrameFlags::empty(), 0, payload_len);
        buf.put_slice(&header);

        buf.put_u32(frame.last_stream_id & 0x7FFF_FFFF);
        buf.put_u32(frame.error_code.as_u32());
        buf.put_slice(&frame.debug_data);

        buf.freeze()
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update_frame(frame: &WindowUpdateFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header = Self::encode_header(
            FrameType::WindowUpdate,
            FrameFlags::empty(),
            frame.stream_id,
            4,
        );
        buf.put_slice(&header);
        buf.put_u32(frame.size_increment & 0x7FFF_FFFF);

        buf.freeze()
    }

    /// Encode a CONTINUATION frame: the fragment alone, from offset 0
    pub fn encode_continuation_frame(frame: &ContinuationFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut flags = FrameFlags::empty();
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let header = Self::encode_header(
            FrameType::Continuation,
            flags,
            frame.stream_id,
            frame.header_block.len(),
        );
        buf.put_slice(&header);
        buf.put_slice(&frame.header_block);

        buf.freeze()
    }

    /// Encode an unknown-type frame verbatim
    pub fn encode_unknown_frame(frame: &UnknownFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header = Self::encode_header_raw(
            frame.frame_type,
            frame.flags,
            frame.stream_id,
            frame.payload.len(),
        );
        buf.put_slice(&header);
        buf.put_slice(&frame.payload);

        buf.freeze()
    }

    /// Parse a frame payload against its decoded header
    pub fn parse(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        debug_assert_eq!(header.length, payload.len());

        let Some(frame_type) = FrameType::from_u8(header.frame_type) else {
            return Ok(Frame::Unknown(UnknownFrame {
                frame_type: header.frame_type,
                flags: header.flags,
                stream_id: header.stream_id,
                payload,
            }));
        };

        match frame_type {
            FrameType::Data => Self::parse_data(header, payload),
            FrameType::Headers => Self::parse_headers(header, payload),
            FrameType::Priority => Self::parse_priority(header, payload),
            FrameType::RstStream => Self::parse_rst_stream(header, payload),
            FrameType::Settings => Self::parse_settings(header, payload),
            FrameType::PushPromise => Self::parse_push_promise(header, payload),
            FrameType::Ping => Self::parse_ping(header, payload),
            FrameType::Goaway => Self::parse_goaway(header, payload),
            FrameType::WindowUpdate => Self::parse_window_update(header, payload),
            FrameType::Continuation => Ok(Frame::Continuation(ContinuationFrame {
                stream_id: header.stream_id,
                header_block: payload,
                end_headers: header.flags.is_end_headers(),
            })),
        }
    }

    fn parse_data(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id == 0 {
            return Err(Error::Protocol("DATA frame on stream 0".into()));
        }
        let (padding, data_start) = Self::read_pad_length(&header, &payload)?;
        let pad = padding.unwrap_or(0) as usize;
        let data = payload.slice(data_start..payload.len() - pad);

        Ok(Frame::Data(DataFrame {
            stream_id: header.stream_id,
            data,
            end_stream: header.flags.is_end_stream(),
            padding,
        }))
    }

    fn parse_headers(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id == 0 {
            return Err(Error::Protocol("HEADERS frame on stream 0".into()));
        }
        let (padding, mut i) = Self::read_pad_length(&header, &payload)?;
        let pad = padding.unwrap_or(0) as usize;

        let priority = if header.flags.is_priority() {
            if payload.len() < i + 5 {
                return Err(Error::FrameSize("HEADERS priority fields truncated".into()));
            }
            let word =
                u32::from_be_bytes([payload[i], payload[i + 1], payload[i + 2], payload[i + 3]]);
            let priority = PrioritySpec {
                stream_dependency: word & 0x7FFF_FFFF,
                exclusive: word & 0x8000_0000 != 0,
                weight: payload[i + 4],
            };
            i += 5;
            Some(priority)
        } else {
            None
        };

        if i + pad > payload.len() {
            return Err(Error::Protocol("HEADERS padding exceeds payload".into()));
        }
        // The fragment runs from after the pad/priority fields to the start
        // of the trailing padding.
        let header_block = payload.slice(i..payload.len() - pad);

        Ok(Frame::Headers(HeadersFrame {
            stream_id: header.stream_id,
            header_block,
            end_stream: header.flags.is_end_stream(),
            end_headers: header.flags.is_end_headers(),
            priority,
            padding,
        }))
    }

    fn parse_priority(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if payload.len() != 5 {
            return Err(Error::FrameSize(format!(
                "PRIORITY payload must be 5 bytes, got {}",
                payload.len()
            )));
        }
        let word = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);

        Ok(Frame::Priority(PriorityFrame {
            stream_id: header.stream_id,
            priority: PrioritySpec {
                stream_dependency: word & 0x7FFF_FFFF,
                exclusive: word & 0x8000_0000 != 0,
                weight: payload[4],
            },
        }))
    }

    fn parse_rst_stream(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id == 0 {
            return Err(Error::Protocol("RST_STREAM frame on stream 0".into()));
        }
        if payload.len() != 4 {
            return Err(Error::FrameSize(format!(
                "RST_STREAM payload must be 4 bytes, got {}",
                payload.len()
            )));
        }
        let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);

        Ok(Frame::RstStream(RstStreamFrame {
            stream_id: header.stream_id,
            error_code: ErrorCode::from_u32(code),
        }))
    }

    fn parse_settings(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id != 0 {
            return Err(Error::Protocol("SETTINGS frame on non-zero stream".into()));
        }
        if header.flags.is_ack() {
            if !payload.is_empty() {
                return Err(Error::FrameSize("SETTINGS ACK with non-empty payload".into()));
            }
            return Ok(Frame::Settings(SettingsFrame::ack()));
        }

        if payload.len() % 6 != 0 {
            return Err(Error::FrameSize(format!(
                "SETTINGS payload length {} not a multiple of 6",
                payload.len()
            )));
        }

        let mut settings = Settings::new();
        for chunk in payload.chunks_exact(6) {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            settings.apply_raw(id, value)?;
        }

        Ok(Frame::Settings(SettingsFrame::new(settings)))
    }

    fn parse_push_promise(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        let (padding, mut i) = Self::read_pad_length(&header, &payload)?;
        let pad = padding.unwrap_or(0) as usize;

        if payload.len() < i + 4 + pad {
            return Err(Error::FrameSize("PUSH_PROMISE payload truncated".into()));
        }
        let promised =
            u32::from_be_bytes([payload[i], payload[i + 1], payload[i + 2], payload[i + 3]])
                & 0x7FFF_FFFF;
        i += 4;

        Ok(Frame::PushPromise(PushPromiseFrame {
            stream_id: header.stream_id,
            promised_stream_id: promised,
            header_block: payload.slice(i..payload.len() - pad),
            end_headers: header.flags.is_end_headers(),
            padding,
        }))
    }

    fn parse_ping(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id != 0 {
            return Err(Error::Protocol("PING frame on non-zero stream".into()));
        }
        if payload.len() != 8 {
            return Err(Error::FrameSize(format!(
                "PING payload must be 8 bytes, got {}",
                payload.len()
            )));
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(&payload);

        Ok(Frame::Ping(PingFrame {
            ack: header.flags.is_ack(),
            data,
        }))
    }

    fn parse_goaway(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id != 0 {
            return Err(Error::Protocol("GOAWAY frame on non-zero stream".into()));
        }
        if payload.len() < 8 {
            return Err(Error::FrameSize(format!(
                "GOAWAY payload must be at least 8 bytes, got {}",
                payload.len()
            )));
        }
        let last = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
            & 0x7FFF_FFFF;
        let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);

        Ok(Frame::Goaway(GoawayFrame {
            last_stream_id: last,
            error_code: ErrorCode::from_u32(code),
            debug_data: payload.slice(8..),
        }))
    }

    fn parse_window_update(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if payload.len() != 4 {
            return Err(Error::FrameSize(format!(
                "WINDOW_UPDATE payload must be 4 bytes, got {}",
                payload.len()
            )));
        }
        let increment = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
            & 0x7FFF_FFFF;

        Ok(Frame::WindowUpdate(WindowUpdateFrame {
            stream_id: header.stream_id,
            size_increment: increment,
        }))
    }

    /// Consume the optional pad-length octet. Returns (padding, offset) and
    /// rejects padding that would swallow the whole payload.
    fn read_pad_length(header: &FrameHeader, payload: &Bytes) -> Result<(Option<u8>, usize)> {
        if !header.flags.is_padded() {
            return Ok((None, 0));
        }
        if payload.is_empty() {
            return Err(Error::FrameSize("PADDED frame with empty payload".into()));
        }
        let pad = payload[0];
        if 1 + pad as usize > payload.len() {
            return Err(Error::Protocol(format!(
                "pad length {} exceeds payload length {}",
                pad,
                payload.len()
            )));
        }
        Ok((Some(pad), 1))
    }

    /// Read one frame from a session: the 9-octet header, then the payload.
    ///
    /// The length field is bounded by the 24-bit encoding; frames larger
    /// than our advertised `max_frame_size` fail with FRAME_SIZE_ERROR.
    pub fn read_frame<S: SessionOps + ?Sized>(session: &mut S, max_frame_size: usize) -> Result<Frame> {
        let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
        session.read_exact(&mut header_bytes)?;

        let header = Self::decode_header(&header_bytes);
        if header.length > max_frame_size.min(MAX_FRAME_LEN) {
            return Err(Error::FrameSize(format!(
                "frame payload {} exceeds maximum {}",
                header.length, max_frame_size
            )));
        }

        let mut payload = vec![0u8; header.length];
        session.read_exact(&mut payload)?;

        Self::parse(header, Bytes::from(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsBuilder;

    #[test]
    fn test_encode_decode_header() {
        let flags = FrameFlags::from_u8(FrameFlags::END_STREAM | FrameFlags::END_HEADERS);
        let header = FrameCodec::encode_header(FrameType::Headers, flags, 42, 1234);
        let decoded = FrameCodec::decode_header(&header);

        assert_eq!(decoded.frame_type, FrameType::Headers.as_u8());
        assert_eq!(decoded.flags.as_u8(), flags.as_u8());
        assert_eq!(decoded.stream_id, 42);
        assert_eq!(decoded.length, 1234);
    }

    #[test]
    fn test_header_wire_bytes() {
        // {length=0x010203, type=HEADERS, flags=0x05, streamId=0x7fffffff}
        let header = FrameCodec::encode_header(
            FrameType::Headers,
            FrameFlags::from_u8(0x05),
            0x7FFF_FFFF,
            0x010203,
        );
        assert_eq!(header, [0x01, 0x02, 0x03, 0x01, 0x05, 0x7f, 0xff, 0xff, 0xff]);

        let decoded = FrameCodec::decode_header(&header);
        assert_eq!(decoded.length, 0x010203);
        assert_eq!(decoded.frame_type, 0x01);
        assert_eq!(decoded.flags.as_u8(), 0x05);
        assert_eq!(decoded.stream_id, 0x7FFF_FFFF);
    }

    #[test]
    fn test_reserved_bit_cleared() {
        // The high bit of the stream id is reserved and cleared on transmit.
        let header =
            FrameCodec::encode_header(FrameType::Data, FrameFlags::empty(), 0xFFFF_FFFF, 0);
        assert_eq!(header[5], 0x7f);
    }

    #[test]
    fn test_encode_data_frame() {
        let frame = DataFrame::new(1, Bytes::from("Hello"), true);
        let encoded = FrameCodec::encode_data_frame(&frame);

        assert_eq!(encoded[0..3], [0, 0, 5]);
        assert_eq!(encoded[3], FrameType::Data.as_u8());
        assert_eq!(encoded[4], FrameFlags::END_STREAM);
        assert_eq!(&encoded[5..9], &[0, 0, 0, 1]);
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
    fn test_encode_settings_ack() {
        let encoded = FrameCodec::encode_settings_frame(&SettingsFrame::ack());
        assert_eq!(encoded[0..3], [0, 0, 0]);
        assert_eq!(encoded[4], FrameFlags::ACK);
        assert_eq!(&encoded[5..9], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_continuation_fragment_at_offset_zero() {
        let frame = ContinuationFrame {
            stream_id: 3,
            header_block: Bytes::from_static(b"frag"),
            end_headers: true,
        };
        let encoded = FrameCodec::encode_continuation_frame(&frame);
        assert_eq!(encoded[0..3], [0, 0, 4]);
        assert_eq!(encoded[3], FrameType::Continuation.as_u8());
        assert_eq!(encoded[4], FrameFlags::END_HEADERS);
        assert_eq!(&encoded[9..], b"frag");
    }

    fn roundtrip(frame: Frame) {
        let encoded = FrameCodec::encode(&frame);
        let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
        header_bytes.copy_from_slice(&encoded[..FRAME_HEADER_SIZE]);
        let header = FrameCodec::decode_header(&header_bytes);
        assert_eq!(header.length, encoded.len() - FRAME_HEADER_SIZE);
        let decoded =
            FrameCodec::parse(header, encoded.slice(FRAME_HEADER_SIZE..)).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_roundtrip_every_variant() {
        roundtrip(Frame::Data(
            DataFrame::new(1, Bytes::from_static(b"payload"), true).with_padding(3),
        ));
        roundtrip(Frame::Headers(
            HeadersFrame::new(3, Bytes::from_static(b"\x82\x84"), false, true)
                .with_priority(PrioritySpec::new(1, true, 15))
                .with_padding(2),
        ));
        roundtrip(Frame::Priority(PriorityFrame {
            stream_id: 5,
            priority: PrioritySpec::new(3, false, 200),
        }));
        roundtrip(Frame::RstStream(RstStreamFrame {
            stream_id: 7,
            error_code: ErrorCode::Cancel,
        }));
        roundtrip(Frame::Settings(SettingsFrame::new(
            SettingsBuilder::new()
                .header_table_size(8192)
                .enable_push(false)
                .initial_window_size(131_072)
                .build()
                .unwrap(),
        )));
        roundtrip(Frame::Settings(SettingsFrame::ack()));
        roundtrip(Frame::PushPromise(PushPromiseFrame {
            stream_id: 9,
            promised_stream_id: 10,
            header_block: Bytes::from_static(b"\x82"),
            end_headers: true,
            padding: None,
        }));
        roundtrip(Frame::Ping(PingFrame::new([1, 2, 3, 4, 5, 6, 7, 8])));
        roundtrip(Frame::Ping(PingFrame::ack([8, 7, 6, 5, 4, 3, 2, 1])));
        roundtrip(Frame::Goaway(GoawayFrame::new(
            11,
            ErrorCode::ProtocolError,
            Bytes::from_static(b"debug info"),
        )));
        roundtrip(Frame::WindowUpdate(WindowUpdateFrame::new(0, 65535)));
        roundtrip(Frame::Continuation(ContinuationFrame {
            stream_id: 13,
            header_block: Bytes::from_static(b"rest of block"),
            end_headers: true,
        }));
        roundtrip(Frame::Unknown(UnknownFrame {
            frame_type: 0xa0,
            flags: FrameFlags::from_u8(0x7),
            stream_id: 15,
            payload: Bytes::from_static(b"opaque"),
        }));
    }

    #[test]
    fn test_parse_headers_padding_slice() {
        // PADDED HEADERS: pad length 2, fragment "abc", padding zeros.
        let payload = Bytes::from_static(&[2, b'a', b'b', b'c', 0, 0]);
        let header = FrameHeader {
            length: payload.len(),
            frame_type: FrameType::Headers.as_u8(),
            flags: FrameFlags::from_u8(FrameFlags::PADDED | FrameFlags::END_HEADERS),
            stream_id: 1,
        };
        let frame = FrameCodec::parse(header, payload).unwrap();
        match frame {
            Frame::Headers(h) => assert_eq!(&h.header_block[..], b"abc"),
            other => panic!("expected HEADERS, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_padding_too_long() {
        let payload = Bytes::from_static(&[200, b'x']);
        let header = FrameHeader {
            length: payload.len(),
            frame_type: FrameType::Data.as_u8(),
            flags: FrameFlags::from_u8(FrameFlags::PADDED),
            stream_id: 1,
        };
        assert!(matches!(
            FrameCodec::parse(header, payload),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_settings_rejects_bad_length() {
        let payload = Bytes::from_static(&[0, 1, 0, 0]);
        let header = FrameHeader {
            length: payload.len(),
            frame_type: FrameType::Settings.as_u8(),
            flags: FrameFlags::empty(),
            stream_id: 0,
        };
        assert!(matches!(
            FrameCodec::parse(header, payload),
            Err(Error::FrameSize(_))
        ));
    }

    #[test]
    fn test_parse_settings_rejects_bad_enable_push() {
        let payload = Bytes::from_static(&[0x00, 0x02, 0, 0, 0, 2]);
        let header = FrameHeader {
            length: payload.len(),
            frame_type: FrameType::Settings.as_u8(),
            flags: FrameFlags::empty(),
            stream_id: 0,
        };
        assert!(matches!(
            FrameCodec::parse(header, payload),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_unknown_type_is_opaque() {
        let payload = Bytes::from_static(b"anything");
        let header = FrameHeader {
            length: payload.len(),
            frame_type: 0x42,
            flags: FrameFlags::from_u8(0xff),
            stream_id: 21,
        };
        let frame = FrameCodec::parse(header, payload.clone()).unwrap();
        match frame {
            Frame::Unknown(u) => {
                assert_eq!(u.frame_type, 0x42);
                assert_eq!(u.payload, payload);
            }
            other => panic!("expected UNKNOWN, got {:?}", other),
        }
    }
}

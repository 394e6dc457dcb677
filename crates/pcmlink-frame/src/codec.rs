use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::protocol::{CommandKind, CommandSet, Direction, ProtocolForm, EXTENDED_LENGTH};

/// Decoded command byte(s): what the frame is and how much payload follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub kind: CommandKind,
    pub length: usize,
}

impl CommandHeader {
    pub const fn new(kind: CommandKind, length: usize) -> Self {
        Self { kind, length }
    }
}

/// A command with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: CommandKind,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: CommandKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A frame with no payload.
    pub fn empty(kind: CommandKind) -> Self {
        Self::new(kind, Bytes::new())
    }

    pub fn header(&self) -> CommandHeader {
        CommandHeader::new(self.kind, self.payload.len())
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self, codec: &HeaderCodec) -> usize {
        codec.header_len(self.payload.len()) + self.payload.len()
    }

    /// Append the wire encoding of this frame to `dst`.
    pub fn encode(&self, codec: &HeaderCodec, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(self.wire_size(codec));
        codec.encode_header(self.kind, self.payload.len(), dst)?;
        dst.put_slice(&self.payload);
        Ok(())
    }
}

/// Table-driven command header codec for one protocol form and command set.
///
/// Wire format of the command byte:
/// ```text
///  narrow:          wide:              wide extended, long payload:
/// ┌────┬────────┐  ┌─────┬───────┐    ┌─────┬───────┬────────────────┐
/// │kind│ length │  │kind │length │    │kind │ 0x10  │ length (2B BE) │
/// │7:6 │  5:0   │  │7:5  │  4:0  │    │7:5  │  4:0  │                │
/// └────┴────────┘  └─────┴───────┘    └─────┴───────┴────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderCodec {
    form: ProtocolForm,
    commands: CommandSet,
}

impl HeaderCodec {
    pub const fn new(form: ProtocolForm, commands: CommandSet) -> Self {
        Self { form, commands }
    }

    pub const fn form(&self) -> ProtocolForm {
        self.form
    }

    pub const fn command_set(&self) -> CommandSet {
        self.commands
    }

    /// Largest payload a frame can carry in this form.
    pub const fn max_payload(&self) -> usize {
        self.form.max_payload()
    }

    /// Header bytes needed for a payload of `length` bytes.
    pub fn header_len(&self, length: usize) -> usize {
        if self.uses_extended_length(length) {
            3
        } else {
            1
        }
    }

    fn uses_extended_length(&self, length: usize) -> bool {
        self.form == ProtocolForm::WideExtended
            && (length == usize::from(EXTENDED_LENGTH) || length > 0x1f)
    }

    /// Append the header for `kind` carrying `length` payload bytes.
    pub fn encode_header(&self, kind: CommandKind, length: usize, dst: &mut BytesMut) -> Result<()> {
        let max = self.max_payload();
        if length > max {
            return Err(FrameError::InvalidLength { length, max });
        }

        let base = self.commands.code(kind) << 6;
        if self.uses_extended_length(length) {
            dst.put_u8(base | EXTENDED_LENGTH);
            dst.put_u16(length as u16);
        } else {
            dst.put_u8(base | length as u8);
        }
        Ok(())
    }

    /// Decode a header from the start of `src`.
    ///
    /// Returns `Ok(None)` if `src` doesn't contain the whole header yet.
    /// On success returns the header and the number of header bytes used.
    pub fn decode_header(
        &self,
        direction: Direction,
        src: &[u8],
    ) -> Result<Option<(CommandHeader, usize)>> {
        let Some(&byte) = src.first() else {
            return Ok(None);
        };

        let unknown = FrameError::UnknownCommand { byte, direction };
        if self.form != ProtocolForm::Narrow && byte & 0x20 != 0 {
            return Err(unknown);
        }
        let Some(kind) = self.commands.kind(direction, byte >> 6) else {
            return Err(unknown);
        };

        let field = byte & self.form.length_mask();
        if self.form == ProtocolForm::WideExtended && field == EXTENDED_LENGTH {
            if src.len() < 3 {
                return Ok(None); // Need more data
            }
            let length = usize::from(u16::from_be_bytes([src[1], src[2]]));
            return Ok(Some((CommandHeader::new(kind, length), 3)));
        }

        Ok(Some((CommandHeader::new(kind, usize::from(field)), 1)))
    }

    /// Decode a whole frame from a buffer.
    ///
    /// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
    /// On success, consumes the frame bytes from the buffer.
    pub fn decode_frame(&self, direction: Direction, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some((header, header_len)) = self.decode_header(direction, src)? else {
            return Ok(None);
        };

        let total = header_len + header.length;
        if src.len() < total {
            return Ok(None); // Need more data
        }

        src.advance(header_len);
        let payload = src.split_to(header.length).freeze();
        Ok(Some(Frame::new(header.kind, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NARROW_AUDIO: HeaderCodec = HeaderCodec::new(ProtocolForm::Narrow, CommandSet::Audio);
    const WIDE_AUDIO: HeaderCodec = HeaderCodec::new(ProtocolForm::Wide, CommandSet::Audio);
    const EXTENDED_AUDIO: HeaderCodec =
        HeaderCodec::new(ProtocolForm::WideExtended, CommandSet::Audio);

    fn encode(codec: &HeaderCodec, kind: CommandKind, length: usize) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode_header(kind, length, &mut buf).unwrap();
        buf
    }

    #[test]
    fn narrow_command_bytes() {
        assert_eq!(&encode(&NARROW_AUDIO, CommandKind::SetupOutput, 1)[..], &[0x01]);
        assert_eq!(&encode(&NARROW_AUDIO, CommandKind::StreamOutput, 60)[..], &[0xbc]);
        assert_eq!(&encode(&NARROW_AUDIO, CommandKind::Stop, 0)[..], &[0xc0]);
    }

    #[test]
    fn header_roundtrip_every_length_every_form() {
        for codec in [NARROW_AUDIO, WIDE_AUDIO, EXTENDED_AUDIO] {
            let step = if codec.max_payload() > 1024 { 97 } else { 1 };
            for kind in [
                CommandKind::SetupOutput,
                CommandKind::StreamOutput,
                CommandKind::Stop,
            ] {
                let mut length = 0;
                while length <= codec.max_payload() {
                    let buf = encode(&codec, kind, length);
                    let (header, used) = codec
                        .decode_header(Direction::HostToDevice, &buf)
                        .unwrap()
                        .unwrap();
                    assert_eq!(header, CommandHeader::new(kind, length));
                    assert_eq!(used, buf.len());
                    length += step;
                }
            }
        }
    }

    #[test]
    fn length_over_form_maximum_is_rejected() {
        let mut buf = BytesMut::new();
        let err = NARROW_AUDIO
            .encode_header(CommandKind::StreamOutput, 64, &mut buf)
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { length: 64, max: 63 }));

        let err = WIDE_AUDIO
            .encode_header(CommandKind::StreamOutput, 32, &mut buf)
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { length: 32, max: 31 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn extended_length_encoding() {
        assert_eq!(
            &encode(&EXTENDED_AUDIO, CommandKind::StreamOutput, 0x10)[..],
            &[0x90, 0x00, 0x10]
        );
        assert_eq!(
            &encode(&EXTENDED_AUDIO, CommandKind::StreamOutput, 0x1234)[..],
            &[0x90, 0x12, 0x34]
        );
        assert_eq!(
            &encode(&EXTENDED_AUDIO, CommandKind::StreamOutput, 0x0f)[..],
            &[0x8f]
        );
        assert_eq!(EXTENDED_AUDIO.header_len(17), 1);
        assert_eq!(EXTENDED_AUDIO.header_len(32), 3);
    }

    #[test]
    fn extended_header_needs_all_bytes() {
        let partial = [0xd0, 0x00];
        assert!(EXTENDED_AUDIO
            .decode_header(Direction::DeviceToHost, &partial)
            .unwrap()
            .is_none());
        assert!(EXTENDED_AUDIO
            .decode_header(Direction::DeviceToHost, &[])
            .unwrap()
            .is_none());
    }

    #[test]
    fn unknown_device_command_rejected() {
        let err = NARROW_AUDIO
            .decode_header(Direction::DeviceToHost, &[0x05])
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnknownCommand {
                byte: 0x05,
                direction: Direction::DeviceToHost
            }
        ));
    }

    #[test]
    fn unknown_host_command_in_test_set_rejected() {
        let codec = HeaderCodec::new(ProtocolForm::Narrow, CommandSet::Test);
        let err = codec
            .decode_header(Direction::HostToDevice, &[0xc0])
            .unwrap_err();
        assert!(matches!(err, FrameError::UnknownCommand { byte: 0xc0, .. }));
    }

    #[test]
    fn wide_kind_with_low_bit_set_is_unknown() {
        for byte in [0x20, 0x61, 0xe0] {
            let err = WIDE_AUDIO
                .decode_header(Direction::DeviceToHost, &[byte])
                .unwrap_err();
            assert!(matches!(err, FrameError::UnknownCommand { .. }));
        }
    }

    #[test]
    fn decode_frame_waits_for_payload() {
        let mut buf = BytesMut::new();
        Frame::new(CommandKind::StreamOutput, vec![1, 2, 3])
            .encode(&NARROW_AUDIO, &mut buf)
            .unwrap();
        let mut partial = BytesMut::from(&buf[..2]);
        assert!(NARROW_AUDIO
            .decode_frame(Direction::HostToDevice, &mut partial)
            .unwrap()
            .is_none());
        assert_eq!(partial.len(), 2);

        let frame = NARROW_AUDIO
            .decode_frame(Direction::HostToDevice, &mut buf)
            .unwrap()
            .unwrap();
        assert_eq!(frame.kind, CommandKind::StreamOutput);
        assert_eq!(frame.payload.as_ref(), &[1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_wire_size() {
        let frame = Frame::new(CommandKind::StreamOutput, vec![0u8; 40]);
        assert_eq!(frame.wire_size(&NARROW_AUDIO), 41);
        assert_eq!(frame.wire_size(&EXTENDED_AUDIO), 43);
        assert_eq!(Frame::empty(CommandKind::Stop).wire_size(&NARROW_AUDIO), 1);
    }
}

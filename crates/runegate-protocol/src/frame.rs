//! The frame codec: opcode, optional length prefix, payload.
//!
//! [`FrameCodec`] implements tokio-util's [`Decoder`] and [`Encoder`], so a
//! session can feed it from a `BytesMut` read buffer or wrap a stream in
//! `Framed`. Decoding is incremental: when a frame is only partly buffered
//! the codec returns `Ok(None)` and remembers how far it got, so the
//! opcode keystream is advanced exactly once per frame no matter how the
//! bytes are split across reads.
//!
//! ```text
//! [opcode: 1][prefix: 0 | 1 | 2][payload: N]
//! ```
//!
//! Once a session is authenticated the opcode byte is shifted by the
//! session's keystream. That is obfuscation, nothing more.

use std::mem;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::cipher::CipherKeystreamPair;
use crate::error::ProtocolError;
use crate::opcode::{Framing, LengthRule, OpcodeEntry, OpcodeTable, PrefixWidth};
use crate::types::Message;

/// Default cap on an inbound payload.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// A raw frame: an opcode and its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }
}

/// Where the decoder stopped in the current frame.
#[derive(Debug)]
enum DecodeState {
    /// Waiting for an opcode byte.
    Opcode,
    /// Opcode read; waiting for the length prefix.
    Length(OpcodeEntry, PrefixWidth),
    /// Length known; waiting for the payload.
    Payload(OpcodeEntry, usize),
}

/// Frames messages against one [`OpcodeTable`], optionally shifting
/// opcodes with a [`CipherKeystreamPair`].
#[derive(Debug)]
pub struct FrameCodec {
    table: Arc<OpcodeTable>,
    cipher: Option<CipherKeystreamPair>,
    state: DecodeState,
    max_payload_len: usize,
}

impl FrameCodec {
    /// A codec that writes opcodes unchanged.
    pub fn plain(table: Arc<OpcodeTable>) -> Self {
        Self {
            table,
            cipher: None,
            state: DecodeState::Opcode,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }

    /// A codec that shifts every opcode with `cipher`.
    pub fn ciphered(table: Arc<OpcodeTable>, cipher: CipherKeystreamPair) -> Self {
        Self {
            cipher: Some(cipher),
            ..Self::plain(table)
        }
    }

    /// Rejects inbound frames whose declared length exceeds `max`.
    pub fn with_max_payload_len(mut self, max: usize) -> Self {
        self.max_payload_len = max;
        self
    }

    pub fn table(&self) -> &Arc<OpcodeTable> {
        &self.table
    }

    pub fn max_payload_len(&self) -> usize {
        self.max_payload_len
    }

    pub fn is_ciphered(&self) -> bool {
        self.cipher.is_some()
    }

    /// `true` when no frame is partly decoded.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::Opcode)
    }

    /// Cuts the next complete frame out of `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Bytes already
    /// consumed for a partial frame are held in the codec, not lost.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownOpcode`] for an opcode the table doesn't
    /// know, [`ProtocolError::FrameTooLarge`] for a declared length over
    /// the limit.
    pub fn decode_frame(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<(OpcodeEntry, Frame)>, ProtocolError> {
        loop {
            match mem::replace(&mut self.state, DecodeState::Opcode) {
                DecodeState::Opcode => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let mut opcode = src.get_u8();
                    if let Some(cipher) = self.cipher.as_mut() {
                        opcode = opcode.wrapping_sub(cipher.next_decode_byte());
                    }
                    let entry = self.table.lookup(opcode)?.clone();
                    self.state = match entry.length_rule {
                        LengthRule::Fixed(len) => DecodeState::Payload(entry, len),
                        LengthRule::VariablePrefixed(width) => {
                            DecodeState::Length(entry, width)
                        }
                    };
                }
                DecodeState::Length(entry, width) => {
                    if src.len() < width.byte_len() {
                        self.state = DecodeState::Length(entry, width);
                        return Ok(None);
                    }
                    let len = match width {
                        PrefixWidth::Byte => usize::from(src.get_u8()),
                        PrefixWidth::Short => usize::from(src.get_u16()),
                    };
                    if len > self.max_payload_len {
                        return Err(ProtocolError::FrameTooLarge {
                            len,
                            max: self.max_payload_len,
                        });
                    }
                    self.state = DecodeState::Payload(entry, len);
                }
                DecodeState::Payload(entry, len) => {
                    if src.len() < len {
                        src.reserve(len - src.len());
                        self.state = DecodeState::Payload(entry, len);
                        return Ok(None);
                    }
                    let payload = src.split_to(len).freeze();
                    let frame = Frame {
                        opcode: entry.opcode,
                        payload,
                    };
                    tracing::trace!(
                        opcode = frame.opcode,
                        len,
                        table = self.table.name(),
                        "decoded frame"
                    );
                    return Ok(Some((entry, frame)));
                }
            }
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        match self.decode_frame(src)? {
            Some((entry, frame)) => entry.codec.decode(frame.opcode, frame.payload).map(Some),
            None => Ok(None),
        }
    }
}

/// Writes a raw frame using the table's inbound rule for its opcode, the
/// way the peer would send it.
impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let rule = self.table.lookup(frame.opcode)?.length_rule;
        put_frame(self.cipher.as_mut(), frame.opcode, rule, &frame.payload, dst)
    }
}

/// Writes a message using the table's outbound binding for its kind.
impl Encoder<Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let entry = self.table.outbound(message.kind())?;
        let mut payload = BytesMut::new();
        entry.codec.encode(&message, &mut payload)?;
        match entry.framing {
            Framing::Headless => {
                dst.extend_from_slice(&payload);
                Ok(())
            }
            Framing::Opcode {
                opcode,
                length_rule,
            } => put_frame(self.cipher.as_mut(), opcode, length_rule, &payload, dst),
        }
    }
}

/// Validates the length before touching the keystream, so a rejected
/// frame leaves the cipher in step with the peer.
fn put_frame(
    cipher: Option<&mut CipherKeystreamPair>,
    opcode: u8,
    rule: LengthRule,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<(), ProtocolError> {
    rule.check(opcode, payload.len())?;

    let wire_opcode = match cipher {
        Some(cipher) => opcode.wrapping_add(cipher.next_encode_byte()),
        None => opcode,
    };

    dst.reserve(1 + 2 + payload.len());
    dst.put_u8(wire_opcode);
    if let LengthRule::VariablePrefixed(width) = rule {
        // Lengths were checked against the prefix capacity above.
        match width {
            PrefixWidth::Byte => dst.put_u8(payload.len() as u8),
            PrefixWidth::Short => dst.put_u16(payload.len() as u16),
        }
    }
    dst.extend_from_slice(payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CommandCodec, HandshakeCodec, PingCodec, ServerChatCodec};
    use crate::types::{CommandMessage, HandshakeRequest, ServerChatMessage};

    fn table() -> Arc<OpcodeTable> {
        let mut table = OpcodeTable::new("test");
        table
            .register(0, LengthRule::Fixed(0), PingCodec)
            .expect("register ping");
        table
            .register(14, LengthRule::Fixed(1), HandshakeCodec)
            .expect("register handshake");
        table
            .register(
                103,
                LengthRule::VariablePrefixed(PrefixWidth::Byte),
                CommandCodec,
            )
            .expect("register command");
        table
            .register_outbound(
                Framing::Opcode {
                    opcode: 253,
                    length_rule: LengthRule::VariablePrefixed(PrefixWidth::Byte),
                },
                ServerChatCodec,
            )
            .expect("bind server chat");
        Arc::new(table)
    }

    #[test]
    fn test_decode_empty_buffer_suspends() {
        let mut codec = FrameCodec::plain(table());
        let mut src = BytesMut::new();
        assert!(codec.decode(&mut src).expect("decode").is_none());
        assert!(codec.is_idle());
    }

    #[test]
    fn test_decode_fixed_frame() {
        let mut codec = FrameCodec::plain(table());
        let mut src = BytesMut::from(&[14u8, 0x2a][..]);
        let msg = codec.decode(&mut src).expect("decode").expect("frame");
        assert_eq!(msg, Message::Handshake(HandshakeRequest { name_hash: 0x2a }));
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_zero_length_frame_needs_only_opcode() {
        let mut codec = FrameCodec::plain(table());
        let mut src = BytesMut::from(&[0u8, 0u8][..]);
        assert_eq!(codec.decode(&mut src).expect("decode"), Some(Message::Ping));
        assert_eq!(codec.decode(&mut src).expect("decode"), Some(Message::Ping));
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_waits_for_payload_without_losing_opcode() {
        let mut codec = FrameCodec::plain(table());
        let mut src = BytesMut::from(&[103u8, 4, b'p', b'o'][..]);
        assert!(codec.decode(&mut src).expect("decode").is_none());
        assert!(!codec.is_idle());

        src.extend_from_slice(b"s\n");
        let msg = codec.decode(&mut src).expect("decode").expect("frame");
        assert_eq!(
            msg,
            Message::Command(CommandMessage { line: "pos".into() })
        );
        assert!(codec.is_idle());
    }

    #[test]
    fn test_decode_unknown_opcode_fails() {
        let mut codec = FrameCodec::plain(table());
        let mut src = BytesMut::from(&[99u8][..]);
        let err = codec.decode(&mut src).expect_err("unknown opcode");
        assert!(matches!(err, ProtocolError::UnknownOpcode { opcode: 99, .. }));
    }

    #[test]
    fn test_decode_declared_length_over_limit_fails() {
        let mut codec = FrameCodec::plain(table()).with_max_payload_len(8);
        let mut src = BytesMut::from(&[103u8, 9][..]);
        let err = codec.decode(&mut src).expect_err("too large");
        assert!(matches!(err, ProtocolError::FrameTooLarge { len: 9, max: 8 }));
    }

    #[test]
    fn test_encode_message_uses_outbound_binding() {
        let mut codec = FrameCodec::plain(table());
        let mut dst = BytesMut::new();
        codec
            .encode(
                Message::ServerChat(ServerChatMessage { text: "hi".into() }),
                &mut dst,
            )
            .expect("encode");
        assert_eq!(&dst[..], &[253, 3, b'h', b'i', b'\n']);
    }

    #[test]
    fn test_encode_is_not_bound_by_inbound_limit() {
        let mut codec = FrameCodec::plain(table()).with_max_payload_len(2);
        let mut dst = BytesMut::new();
        codec
            .encode(
                Message::ServerChat(ServerChatMessage { text: "hi".into() }),
                &mut dst,
            )
            .expect("outbound frames aren't size-checked");
        assert_eq!(dst.len(), 5);
    }

    #[test]
    fn test_encode_unbound_message_fails() {
        let mut codec = FrameCodec::plain(table());
        let mut dst = BytesMut::new();
        let err = codec.encode(Message::Ping, &mut dst).expect_err("unbound");
        assert!(matches!(err, ProtocolError::UnboundMessage { .. }));
        assert!(dst.is_empty());
    }

    #[test]
    fn test_encode_fixed_frame_wrong_length_fails() {
        let mut codec = FrameCodec::plain(table());
        let mut dst = BytesMut::new();
        let err = codec
            .encode(Frame::new(14, vec![1u8, 2]), &mut dst)
            .expect_err("wrong length");
        assert!(matches!(err, ProtocolError::LengthMismatch { .. }));
    }

    #[test]
    fn test_ciphered_rejected_frame_does_not_advance_keystream() {
        let seed = [5, 6, 7, 8];
        let mut server = FrameCodec::ciphered(table(), CipherKeystreamPair::derive(seed));
        let mut client = FrameCodec::ciphered(table(), CipherKeystreamPair::derive_peer(seed));

        let mut wire = BytesMut::new();
        assert!(client.encode(Frame::new(14, vec![1u8, 2]), &mut wire).is_err());
        client
            .encode(Frame::new(0, Bytes::new()), &mut wire)
            .expect("encode ping");

        assert_eq!(server.decode(&mut wire).expect("decode"), Some(Message::Ping));
    }
}

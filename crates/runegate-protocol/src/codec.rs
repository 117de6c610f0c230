//! Payload codecs: how the bytes of one frame become a [`Message`].
//!
//! The frame codec only knows opcodes and lengths. Once a complete payload
//! has been cut out of the stream it is handed to the [`PayloadCodec`]
//! bound to that opcode, which produces the typed message. The same trait
//! serializes outbound messages back into payload bytes.
//!
//! Several fields use the client's byte transforms:
//!
//! - *add*: the byte is sent as `v + 128`
//! - *subtract*: the byte is sent as `128 - v`
//! - *negate*: the byte is sent as `-v`
//!
//! All arithmetic wraps at 8 bits.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::types::{
    ARCHIVE_COUNT, ChatMessage, CommandMessage, HandshakeRequest, HandshakeResponse,
    LoginBlock, LoginResponse, Message, MessageKind, ResponseCode, ServerChatMessage,
    WalkRequest,
};

/// Terminator of the client's strings.
const STRING_TERMINATOR: u8 = 10;

/// Number of 32-bit session key words in a login block.
pub const SESSION_KEY_COUNT: usize = 4;

/// Opcode of the login frame sent when reconnecting.
pub const RECONNECT_LOGIN_OPCODE: u8 = 18;

/// Opcode of the minimap walk, which carries trailing anti-cheat bytes.
pub const MINIMAP_WALK_OPCODE: u8 = 248;

/// Anti-cheat bytes appended to a minimap walk.
pub const MINIMAP_WALK_TRAILER: usize = 14;

/// Converts between payload bytes and one kind of [`Message`].
///
/// Codecs are stateless and shared by every session through the opcode
/// tables, so they must be `Send + Sync + 'static`.
pub trait PayloadCodec: Send + Sync + 'static {
    /// Decodes a complete payload received with `opcode`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Malformed`] if the bytes don't form a
    /// valid message.
    fn decode(&self, opcode: u8, payload: Bytes) -> Result<Message, ProtocolError>;

    /// Appends the payload for `message` to `dst`.
    ///
    /// The default implementation rejects every message, for codecs that
    /// only decode.
    ///
    /// # Errors
    /// Returns [`ProtocolError::WrongKind`] if `message` isn't the kind
    /// this codec handles.
    fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let _ = dst;
        Err(ProtocolError::WrongKind {
            codec: self.kind(),
            actual: message.kind(),
        })
    }

    /// The kind of message this codec produces.
    fn kind(&self) -> MessageKind;
}

// ---------------------------------------------------------------------------
// Payload reader
// ---------------------------------------------------------------------------

/// Bounds-checked reads over a payload, reporting short input as a
/// malformed message instead of panicking.
struct PayloadReader {
    kind: MessageKind,
    buf: Bytes,
}

impl PayloadReader {
    fn new(kind: MessageKind, buf: Bytes) -> Self {
        Self { kind, buf }
    }

    fn need(&self, n: usize, field: &str) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            return Err(ProtocolError::malformed(
                self.kind,
                format!(
                    "truncated {field}: need {n} bytes, {} left",
                    self.buf.remaining()
                ),
            ));
        }
        Ok(())
    }

    fn u8(&mut self, field: &str) -> Result<u8, ProtocolError> {
        self.need(1, field)?;
        Ok(self.buf.get_u8())
    }

    fn i8(&mut self, field: &str) -> Result<i8, ProtocolError> {
        self.need(1, field)?;
        Ok(self.buf.get_i8())
    }

    fn u16(&mut self, field: &str) -> Result<u16, ProtocolError> {
        self.need(2, field)?;
        Ok(self.buf.get_u16())
    }

    fn u16_le(&mut self, field: &str) -> Result<u16, ProtocolError> {
        self.need(2, field)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self, field: &str) -> Result<u32, ProtocolError> {
        self.need(4, field)?;
        Ok(self.buf.get_u32())
    }

    fn string(&mut self, field: &str) -> Result<String, ProtocolError> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == STRING_TERMINATOR)
            .ok_or_else(|| {
                ProtocolError::malformed(self.kind, format!("unterminated {field}"))
            })?;
        let raw = self.buf.split_to(end);
        self.buf.advance(1);
        String::from_utf8(raw.to_vec()).map_err(|_| {
            ProtocolError::malformed(self.kind, format!("{field} is not valid UTF-8"))
        })
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn rest(&mut self) -> Bytes {
        self.buf.split_off(0)
    }

    fn finish(self) -> Result<(), ProtocolError> {
        if self.buf.has_remaining() {
            return Err(ProtocolError::malformed(
                self.kind,
                format!("{} trailing bytes", self.buf.remaining()),
            ));
        }
        Ok(())
    }
}

fn put_string(
    kind: MessageKind,
    text: &str,
    dst: &mut BytesMut,
) -> Result<(), ProtocolError> {
    if text.as_bytes().contains(&STRING_TERMINATOR) {
        return Err(ProtocolError::malformed(kind, "string contains a line feed"));
    }
    dst.put_slice(text.as_bytes());
    dst.put_u8(STRING_TERMINATOR);
    Ok(())
}

fn wrong_kind(codec: MessageKind, message: &Message) -> ProtocolError {
    ProtocolError::WrongKind {
        codec,
        actual: message.kind(),
    }
}

// ---------------------------------------------------------------------------
// Login stage
// ---------------------------------------------------------------------------

/// Opcode 14: a single name-hash byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandshakeCodec;

impl PayloadCodec for HandshakeCodec {
    fn decode(&self, _opcode: u8, payload: Bytes) -> Result<Message, ProtocolError> {
        let mut reader = PayloadReader::new(self.kind(), payload);
        let name_hash = reader.u8("name hash")?;
        reader.finish()?;
        Ok(Message::Handshake(HandshakeRequest { name_hash }))
    }

    fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match message {
            Message::Handshake(request) => {
                dst.put_u8(request.name_hash);
                Ok(())
            }
            other => Err(wrong_kind(self.kind(), other)),
        }
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Handshake
    }
}

/// Opcodes 16 and 18: the login block.
///
/// Layout: magic, version (u16), detail, nine archive checksums, block
/// length (must equal the bytes that follow), block operation, four
/// session key words, user id, username, password.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginBlockCodec;

impl PayloadCodec for LoginBlockCodec {
    fn decode(&self, opcode: u8, payload: Bytes) -> Result<Message, ProtocolError> {
        let mut reader = PayloadReader::new(self.kind(), payload);

        let magic = reader.u8("magic")?;
        let client_version = reader.u16("client version")?;
        let detail = reader.u8("detail")?;
        let mut archive_crcs = [0u32; ARCHIVE_COUNT];
        for crc in &mut archive_crcs {
            *crc = reader.u32("archive checksum")?;
        }

        let block_len = usize::from(reader.u8("block length")?);
        if block_len != reader.remaining() {
            return Err(ProtocolError::malformed(
                self.kind(),
                format!(
                    "block length {block_len} does not match {} remaining bytes",
                    reader.remaining()
                ),
            ));
        }

        let block_operation = reader.u8("block operation")?;
        let mut session_keys = Vec::with_capacity(SESSION_KEY_COUNT);
        for _ in 0..SESSION_KEY_COUNT {
            session_keys.push(reader.u32("session key")?);
        }
        let user_id = reader.u32("user id")?;
        let username = reader.string("username")?;
        let password = reader.string("password")?;
        reader.finish()?;

        Ok(Message::Login(LoginBlock {
            reconnecting: opcode == RECONNECT_LOGIN_OPCODE,
            magic,
            client_version,
            detail,
            archive_crcs,
            block_operation,
            session_keys,
            user_id,
            username,
            password,
        }))
    }

    fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let Message::Login(block) = message else {
            return Err(wrong_kind(self.kind(), message));
        };

        dst.put_u8(block.magic);
        dst.put_u16(block.client_version);
        dst.put_u8(block.detail);
        for crc in block.archive_crcs {
            dst.put_u32(crc);
        }

        let mut rest = BytesMut::new();
        rest.put_u8(block.block_operation);
        for key in &block.session_keys {
            rest.put_u32(*key);
        }
        rest.put_u32(block.user_id);
        put_string(self.kind(), &block.username, &mut rest)?;
        put_string(self.kind(), &block.password, &mut rest)?;

        let block_len = u8::try_from(rest.len()).map_err(|_| {
            ProtocolError::malformed(self.kind(), "login block longer than 255 bytes")
        })?;
        dst.put_u8(block_len);
        dst.extend_from_slice(&rest);
        Ok(())
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Login
    }
}

/// The 17-byte handshake response: status, eight zero bytes, server key.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandshakeResponseCodec;

impl PayloadCodec for HandshakeResponseCodec {
    fn decode(&self, _opcode: u8, payload: Bytes) -> Result<Message, ProtocolError> {
        let mut reader = PayloadReader::new(self.kind(), payload);
        let status = reader.u8("status")?;
        let _ = reader.u32("exchange block")?;
        let _ = reader.u32("exchange block")?;
        let high = u64::from(reader.u32("server key")?);
        let low = u64::from(reader.u32("server key")?);
        reader.finish()?;
        Ok(Message::HandshakeResponse(HandshakeResponse {
            status,
            server_key: (high << 32) | low,
        }))
    }

    fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match message {
            Message::HandshakeResponse(response) => {
                dst.put_u8(response.status);
                dst.put_u64(0);
                dst.put_u64(response.server_key);
                Ok(())
            }
            other => Err(wrong_kind(self.kind(), other)),
        }
    }

    fn kind(&self) -> MessageKind {
        MessageKind::HandshakeResponse
    }
}

/// The 3-byte login response: code, privilege, flagged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginResponseCodec;

impl PayloadCodec for LoginResponseCodec {
    fn decode(&self, _opcode: u8, payload: Bytes) -> Result<Message, ProtocolError> {
        let mut reader = PayloadReader::new(self.kind(), payload);
        let code = ResponseCode::from_u8(reader.u8("code")?);
        let privilege = reader.u8("privilege")?;
        let flagged = reader.u8("flagged")? != 0;
        reader.finish()?;
        Ok(Message::LoginResponse(LoginResponse {
            code,
            privilege,
            flagged,
        }))
    }

    fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match message {
            Message::LoginResponse(response) => {
                dst.put_u8(response.code.as_u8());
                dst.put_u8(response.privilege);
                dst.put_u8(u8::from(response.flagged));
                Ok(())
            }
            other => Err(wrong_kind(self.kind(), other)),
        }
    }

    fn kind(&self) -> MessageKind {
        MessageKind::LoginResponse
    }
}

// ---------------------------------------------------------------------------
// Game stage
// ---------------------------------------------------------------------------

/// Opcode 0: keep-alive, no payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingCodec;

impl PayloadCodec for PingCodec {
    fn decode(&self, _opcode: u8, payload: Bytes) -> Result<Message, ProtocolError> {
        PayloadReader::new(self.kind(), payload).finish()?;
        Ok(Message::Ping)
    }

    fn encode(&self, message: &Message, _dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match message {
            Message::Ping => Ok(()),
            other => Err(wrong_kind(self.kind(), other)),
        }
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Ping
    }
}

/// Opcode 4: public chat.
///
/// Effects and colour are *subtract*-transformed; the compressed text is
/// sent in reverse order with each byte *add*-transformed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCodec;

impl PayloadCodec for ChatCodec {
    fn decode(&self, _opcode: u8, payload: Bytes) -> Result<Message, ProtocolError> {
        let mut reader = PayloadReader::new(self.kind(), payload);
        let effects = 128u8.wrapping_sub(reader.u8("effects")?);
        let color = 128u8.wrapping_sub(reader.u8("color")?);
        let text = reader
            .rest()
            .iter()
            .rev()
            .map(|b| b.wrapping_sub(128))
            .collect();
        Ok(Message::Chat(ChatMessage {
            effects,
            color,
            text,
        }))
    }

    fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let Message::Chat(chat) = message else {
            return Err(wrong_kind(self.kind(), message));
        };
        dst.put_u8(128u8.wrapping_sub(chat.effects));
        dst.put_u8(128u8.wrapping_sub(chat.color));
        for b in chat.text.iter().rev() {
            dst.put_u8(b.wrapping_add(128));
        }
        Ok(())
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Chat
    }
}

/// Opcodes 81, 248, 164 and 98: a walk path.
///
/// Layout: first x (u16 little-endian, low byte *add*-transformed), one
/// signed (dx, dy) pair per step, first y (u16 little-endian), run flag
/// (*negate*-transformed). The minimap opcode appends 14 anti-cheat bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkCodec;

impl PayloadCodec for WalkCodec {
    fn decode(&self, opcode: u8, payload: Bytes) -> Result<Message, ProtocolError> {
        let mut payload = payload;
        let anti_cheat = if opcode == MINIMAP_WALK_OPCODE {
            if payload.len() < MINIMAP_WALK_TRAILER {
                return Err(ProtocolError::malformed(
                    self.kind(),
                    "minimap walk is missing its trailer",
                ));
            }
            payload.split_off(payload.len() - MINIMAP_WALK_TRAILER).to_vec()
        } else {
            Vec::new()
        };

        let path_len = payload.len().checked_sub(5).ok_or_else(|| {
            ProtocolError::malformed(self.kind(), "walk shorter than 5 bytes")
        })?;
        if path_len % 2 != 0 {
            return Err(ProtocolError::malformed(
                self.kind(),
                "step list has an odd number of bytes",
            ));
        }

        let mut reader = PayloadReader::new(self.kind(), payload);
        let raw_x = reader.u16_le("first x")?;
        let first_x = (raw_x & 0xff00) | u16::from((raw_x as u8).wrapping_sub(128));
        let mut steps = Vec::with_capacity(path_len / 2);
        for _ in 0..path_len / 2 {
            steps.push((reader.i8("step x")?, reader.i8("step y")?));
        }
        let first_y = reader.u16_le("first y")?;
        let run = reader.u8("run flag")?.wrapping_neg() == 1;
        reader.finish()?;

        Ok(Message::Walk(WalkRequest {
            first_x,
            first_y,
            steps,
            run,
            anti_cheat,
        }))
    }

    fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let Message::Walk(walk) = message else {
            return Err(wrong_kind(self.kind(), message));
        };
        dst.put_u8((walk.first_x as u8).wrapping_add(128));
        dst.put_u8((walk.first_x >> 8) as u8);
        for (dx, dy) in &walk.steps {
            dst.put_i8(*dx);
            dst.put_i8(*dy);
        }
        dst.put_u16_le(walk.first_y);
        dst.put_u8(u8::from(walk.run).wrapping_neg());
        dst.put_slice(&walk.anti_cheat);
        Ok(())
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Walk
    }
}

/// Opcode 103: a `::command` line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandCodec;

impl PayloadCodec for CommandCodec {
    fn decode(&self, _opcode: u8, payload: Bytes) -> Result<Message, ProtocolError> {
        let mut reader = PayloadReader::new(self.kind(), payload);
        let line = reader.string("command")?;
        reader.finish()?;
        Ok(Message::Command(CommandMessage { line }))
    }

    fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match message {
            Message::Command(command) => put_string(self.kind(), &command.line, dst),
            other => Err(wrong_kind(self.kind(), other)),
        }
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Command
    }
}

/// Opcode 253: a line of server text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerChatCodec;

impl PayloadCodec for ServerChatCodec {
    fn decode(&self, _opcode: u8, payload: Bytes) -> Result<Message, ProtocolError> {
        let mut reader = PayloadReader::new(self.kind(), payload);
        let text = reader.string("text")?;
        reader.finish()?;
        Ok(Message::ServerChat(ServerChatMessage { text }))
    }

    fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match message {
            Message::ServerChat(chat) => put_string(self.kind(), &chat.text, dst),
            other => Err(wrong_kind(self.kind(), other)),
        }
    }

    fn kind(&self) -> MessageKind {
        MessageKind::ServerChat
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_with(codec: &dyn PayloadCodec, message: &Message) -> BytesMut {
        let mut dst = BytesMut::new();
        codec.encode(message, &mut dst).expect("should encode");
        dst
    }

    fn sample_login() -> LoginBlock {
        LoginBlock {
            reconnecting: false,
            magic: 255,
            client_version: 317,
            detail: 1,
            archive_crcs: [7; ARCHIVE_COUNT],
            block_operation: 10,
            session_keys: vec![1, 2, 3, 4],
            user_id: 42,
            username: "zezima".into(),
            password: "hunter2".into(),
        }
    }

    #[test]
    fn test_handshake_decode_reads_name_hash() {
        let msg = HandshakeCodec
            .decode(14, Bytes::from_static(&[0x1f]))
            .expect("should decode");
        assert_eq!(msg, Message::Handshake(HandshakeRequest { name_hash: 0x1f }));
    }

    #[test]
    fn test_handshake_response_encode_is_17_bytes() {
        let msg = Message::HandshakeResponse(HandshakeResponse {
            status: 0,
            server_key: 0x0102_0304_0506_0708,
        });
        let bytes = encode_with(&HandshakeResponseCodec, &msg);
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[0], 0);
        assert!(bytes[1..9].iter().all(|b| *b == 0));
        assert_eq!(&bytes[9..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_login_response_encode_leads_with_code() {
        let msg = Message::LoginResponse(LoginResponse::rejected(ResponseCode::GameUpdated));
        let bytes = encode_with(&LoginResponseCodec, &msg);
        assert_eq!(&bytes[..], &[6, 0, 0]);
    }

    #[test]
    fn test_login_block_decode_reads_every_field() {
        let bytes = encode_with(&LoginBlockCodec, &Message::Login(sample_login()));
        let msg = LoginBlockCodec
            .decode(RECONNECT_LOGIN_OPCODE, bytes.freeze())
            .expect("should decode");
        let Message::Login(block) = msg else {
            panic!("expected a login block");
        };
        assert!(block.reconnecting);
        assert_eq!(block.client_version, 317);
        assert_eq!(block.session_keys, vec![1, 2, 3, 4]);
        assert_eq!(block.username, "zezima");
        assert_eq!(block.password, "hunter2");
    }

    #[test]
    fn test_login_block_decode_block_length_mismatch_is_malformed() {
        let mut bytes = encode_with(&LoginBlockCodec, &Message::Login(sample_login()));
        // magic + version + detail + checksums
        let len_index = 1 + 2 + 1 + 4 * ARCHIVE_COUNT;
        bytes[len_index] += 1;
        let err = LoginBlockCodec
            .decode(16, bytes.freeze())
            .expect_err("should reject");
        assert!(matches!(err, ProtocolError::Malformed { kind: MessageKind::Login, .. }));
    }

    #[test]
    fn test_login_block_decode_unterminated_password_is_malformed() {
        let mut bytes = encode_with(&LoginBlockCodec, &Message::Login(sample_login()));
        bytes.truncate(bytes.len() - 1);
        let len_index = 1 + 2 + 1 + 4 * ARCHIVE_COUNT;
        bytes[len_index] -= 1;
        let err = LoginBlockCodec
            .decode(16, bytes.freeze())
            .expect_err("should reject");
        assert!(err.to_string().contains("unterminated password"));
    }

    #[test]
    fn test_login_block_decode_truncated_header_is_malformed() {
        let err = LoginBlockCodec
            .decode(16, Bytes::from_static(&[255, 1]))
            .expect_err("should reject");
        assert!(err.to_string().contains("client version"));
    }

    #[test]
    fn test_ping_decode_with_payload_is_malformed() {
        assert!(PingCodec.decode(0, Bytes::from_static(&[1])).is_err());
        assert_eq!(
            PingCodec.decode(0, Bytes::new()).expect("should decode"),
            Message::Ping
        );
    }

    #[test]
    fn test_chat_decode_reverses_and_untransforms_text() {
        // effects 0 -> 128, color 3 -> 125, text [1, 2] -> reversed [130, 129]
        let msg = ChatCodec
            .decode(4, Bytes::from_static(&[128, 125, 130, 129]))
            .expect("should decode");
        assert_eq!(
            msg,
            Message::Chat(ChatMessage {
                effects: 0,
                color: 3,
                text: vec![1, 2],
            })
        );
    }

    #[test]
    fn test_walk_decode_reads_path_and_run_flag() {
        // x = 3200 = 0x0c80 -> low byte 0x80 + 128 = 0x00
        let payload = [0x00, 0x0c, 1, 0, 2, 0xff, 0x80, 0x0c, 0xff];
        let msg = WalkCodec
            .decode(164, Bytes::copy_from_slice(&payload))
            .expect("should decode");
        let Message::Walk(walk) = msg else {
            panic!("expected a walk");
        };
        assert_eq!(walk.first_x, 3200);
        assert_eq!(walk.first_y, 3200);
        assert_eq!(walk.steps, vec![(1, 0), (2, -1)]);
        assert!(walk.run);
        assert!(walk.anti_cheat.is_empty());
    }

    #[test]
    fn test_walk_decode_minimap_strips_trailer() {
        let mut payload = vec![0x00, 0x0c, 0x80, 0x0c, 0x00];
        payload.extend_from_slice(&[9; MINIMAP_WALK_TRAILER]);
        let msg = WalkCodec
            .decode(MINIMAP_WALK_OPCODE, Bytes::from(payload))
            .expect("should decode");
        let Message::Walk(walk) = msg else {
            panic!("expected a walk");
        };
        assert!(walk.steps.is_empty());
        assert!(!walk.run);
        assert_eq!(walk.anti_cheat, vec![9; MINIMAP_WALK_TRAILER]);
    }

    #[test]
    fn test_walk_decode_odd_step_bytes_is_malformed() {
        let payload = [0, 0, 1, 0, 0, 0];
        assert!(WalkCodec.decode(98, Bytes::copy_from_slice(&payload)).is_err());
    }

    #[test]
    fn test_command_decode_reads_line() {
        let msg = CommandCodec
            .decode(103, Bytes::from_static(b"tele 3200 3200\n"))
            .expect("should decode");
        assert_eq!(
            msg,
            Message::Command(CommandMessage {
                line: "tele 3200 3200".into()
            })
        );
    }

    #[test]
    fn test_command_decode_invalid_utf8_is_malformed() {
        let err = CommandCodec
            .decode(103, Bytes::from_static(&[0xff, 0xfe, 10]))
            .expect_err("should reject");
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_server_chat_encode_rejects_line_feed() {
        let msg = Message::ServerChat(ServerChatMessage {
            text: "two\nlines".into(),
        });
        let mut dst = BytesMut::new();
        assert!(ServerChatCodec.encode(&msg, &mut dst).is_err());
    }

    #[test]
    fn test_encode_wrong_message_kind_fails() {
        let mut dst = BytesMut::new();
        let err = ServerChatCodec
            .encode(&Message::Ping, &mut dst)
            .expect_err("should reject");
        assert!(matches!(
            err,
            ProtocolError::WrongKind {
                codec: MessageKind::ServerChat,
                actual: MessageKind::Ping
            }
        ));
    }
}

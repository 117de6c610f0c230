//! Wire protocol for Runegate.
//!
//! This crate turns bytes into typed messages and back:
//!
//! - **Opcode tables** ([`OpcodeTable`]): which opcodes exist, how their
//!   payload length is encoded, and which codec reads them.
//! - **Frame codec** ([`FrameCodec`]): incremental framing over a
//!   `BytesMut`, plain or with a shifted opcode keystream.
//! - **Keystream** ([`CipherKeystreamPair`]): the ISAAC streams used to
//!   obfuscate opcodes after login.
//! - **Messages** ([`Message`], [`MessageKind`]) and their
//!   [`PayloadCodec`]s.
//! - **Reference tables** ([`reference`]): the opcode layout of the 317
//!   client.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Frame → Message) → Session (state machine)
//! ```
//!
//! The protocol layer knows nothing about connections or players.

mod cipher;
mod codec;
mod error;
mod frame;
mod opcode;
pub mod reference;
mod types;

pub use cipher::{CipherKeystreamPair, ENCODE_SEED_OFFSET, IsaacRandom};
pub use codec::{
    ChatCodec, CommandCodec, HandshakeCodec, HandshakeResponseCodec, LoginBlockCodec,
    LoginResponseCodec, MINIMAP_WALK_OPCODE, MINIMAP_WALK_TRAILER, PayloadCodec, PingCodec,
    RECONNECT_LOGIN_OPCODE, SESSION_KEY_COUNT, ServerChatCodec, WalkCodec,
};
pub use error::ProtocolError;
pub use frame::{DEFAULT_MAX_PAYLOAD_LEN, Frame, FrameCodec};
pub use opcode::{Framing, LengthRule, OpcodeEntry, OpcodeTable, OutboundEntry, PrefixWidth};
pub use types::{
    ARCHIVE_COUNT, ChatMessage, CommandMessage, HandshakeRequest, HandshakeResponse,
    LoginBlock, LoginResponse, Message, MessageKind, ResponseCode, ServerChatMessage,
    WalkRequest,
};

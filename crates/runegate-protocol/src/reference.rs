//! Opcode tables for the 317 game client.

use std::sync::Arc;

use crate::codec::{
    ChatCodec, CommandCodec, HandshakeCodec, HandshakeResponseCodec, LoginBlockCodec,
    LoginResponseCodec, MINIMAP_WALK_OPCODE, PayloadCodec, PingCodec, RECONNECT_LOGIN_OPCODE,
    ServerChatCodec, WalkCodec,
};
use crate::error::ProtocolError;
use crate::opcode::{Framing, LengthRule, OpcodeTable, PrefixWidth};

pub const HANDSHAKE: u8 = 14;
pub const LOGIN: u8 = 16;
pub const RECONNECT: u8 = RECONNECT_LOGIN_OPCODE;

pub const PING: u8 = 0;
pub const CHAT: u8 = 4;
pub const WALK_HERE: u8 = 164;
pub const WALK_MINIMAP: u8 = MINIMAP_WALK_OPCODE;
pub const WALK_INTERACT: u8 = 98;
pub const WALK_ALTERNATE: u8 = 81;
pub const COMMAND: u8 = 103;

pub const SERVER_CHAT: u8 = 253;

pub const LOGIN_TABLE: &str = "login";
pub const GAME_TABLE: &str = "game";

const BYTE_PREFIX: LengthRule = LengthRule::VariablePrefixed(PrefixWidth::Byte);
const SHORT_PREFIX: LengthRule = LengthRule::VariablePrefixed(PrefixWidth::Short);

/// The table active before authentication: the handshake, both login
/// opcodes, and the two headless responses.
pub fn login_table() -> Result<OpcodeTable, ProtocolError> {
    let mut table = OpcodeTable::new(LOGIN_TABLE);
    table.register(HANDSHAKE, LengthRule::Fixed(1), HandshakeCodec)?;

    let login: Arc<dyn PayloadCodec> = Arc::new(LoginBlockCodec);
    table.register_shared(LOGIN, SHORT_PREFIX, Arc::clone(&login))?;
    table.register_shared(RECONNECT, SHORT_PREFIX, login)?;

    table.register_outbound(Framing::Headless, HandshakeResponseCodec)?;
    table.register_outbound(Framing::Headless, LoginResponseCodec)?;
    Ok(table)
}

/// The table active once a player is in the game.
pub fn game_table() -> Result<OpcodeTable, ProtocolError> {
    let mut table = OpcodeTable::new(GAME_TABLE);
    table.register(PING, LengthRule::Fixed(0), PingCodec)?;
    table.register(CHAT, BYTE_PREFIX, ChatCodec)?;
    table.register(COMMAND, BYTE_PREFIX, CommandCodec)?;

    let walk: Arc<dyn PayloadCodec> = Arc::new(WalkCodec);
    for opcode in [WALK_ALTERNATE, WALK_MINIMAP, WALK_HERE, WALK_INTERACT] {
        table.register_shared(opcode, BYTE_PREFIX, Arc::clone(&walk))?;
    }

    table.register_outbound(
        Framing::Opcode {
            opcode: SERVER_CHAT,
            length_rule: BYTE_PREFIX,
        },
        ServerChatCodec,
    )?;
    Ok(table)
}

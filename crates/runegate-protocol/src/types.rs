//! Typed messages carried by frames.
//!
//! A [`Frame`](crate::Frame) is just an opcode and some bytes; a
//! [`Message`] is what those bytes mean once a payload codec has read
//! them. [`MessageKind`] is the logical type of a message, independent of
//! which opcode carried it, and is what dispatch is keyed on.

use std::fmt;

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The logical type of a [`Message`].
///
/// Several opcodes may decode to the same kind (both login opcodes yield
/// [`MessageKind::Login`], all four walk opcodes yield
/// [`MessageKind::Walk`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    /// Client → server: opens the login exchange.
    Handshake,
    /// Client → server: the login block with credentials and session keys.
    Login,
    /// Client → server: keep-alive with no payload.
    Ping,
    /// Client → server: public chat.
    Chat,
    /// Client → server: a walk path.
    Walk,
    /// Client → server: a `::command` typed by the player.
    Command,
    /// Server → client: reply to the handshake.
    HandshakeResponse,
    /// Server → client: the login status.
    LoginResponse,
    /// Server → client: a line of text in the chat box.
    ServerChat,
}

impl MessageKind {
    /// Returns a short, stable name for logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Login => "login",
            Self::Ping => "ping",
            Self::Chat => "chat",
            Self::Walk => "walk",
            Self::Command => "command",
            Self::HandshakeResponse => "handshake-response",
            Self::LoginResponse => "login-response",
            Self::ServerChat => "server-chat",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// ResponseCode
// ---------------------------------------------------------------------------

/// A login status code, as understood by the game client.
///
/// The client shows a different message for each code, so a rejected
/// login must be answered with the code that matches the actual cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Wait two seconds and retry.
    Delay,
    /// Login accepted.
    Ok,
    /// Wrong username or password.
    InvalidCredentials,
    /// The account is disabled.
    AccountDisabled,
    /// The account is already logged in.
    AccountOnline,
    /// The client is out of date.
    GameUpdated,
    /// The world is full.
    ServerFull,
    /// The login server could not be reached.
    LoginServerOffline,
    /// Too many connections from this address.
    TooManyConnections,
    /// The session keys don't match the handshake.
    BadSessionId,
    /// The login server rejected the session.
    LoginServerRejectedSession,
    /// A members account is required.
    MembersAccountRequired,
    /// Login could not be completed.
    CouldNotComplete,
    /// The server is being updated.
    Updating,
    /// Reconnection accepted.
    ReconnectionOk,
    /// Too many login attempts.
    TooManyLogins,
    /// Standing in a members area on a free world.
    InMembersArea,
    /// Invalid login server requested.
    InvalidLoginServer,
    /// The profile is being transferred.
    ProfileTransfer,
    /// Any code this server doesn't name.
    Other(u8),
}

impl ResponseCode {
    /// Returns the wire value of this code.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Delay => 1,
            Self::Ok => 2,
            Self::InvalidCredentials => 3,
            Self::AccountDisabled => 4,
            Self::AccountOnline => 5,
            Self::GameUpdated => 6,
            Self::ServerFull => 7,
            Self::LoginServerOffline => 8,
            Self::TooManyConnections => 9,
            Self::BadSessionId => 10,
            Self::LoginServerRejectedSession => 11,
            Self::MembersAccountRequired => 12,
            Self::CouldNotComplete => 13,
            Self::Updating => 14,
            Self::ReconnectionOk => 15,
            Self::TooManyLogins => 16,
            Self::InMembersArea => 17,
            Self::InvalidLoginServer => 20,
            Self::ProfileTransfer => 21,
            Self::Other(code) => code,
        }
    }

    /// Maps a wire value back to a code.
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::Delay,
            2 => Self::Ok,
            3 => Self::InvalidCredentials,
            4 => Self::AccountDisabled,
            5 => Self::AccountOnline,
            6 => Self::GameUpdated,
            7 => Self::ServerFull,
            8 => Self::LoginServerOffline,
            9 => Self::TooManyConnections,
            10 => Self::BadSessionId,
            11 => Self::LoginServerRejectedSession,
            12 => Self::MembersAccountRequired,
            13 => Self::CouldNotComplete,
            14 => Self::Updating,
            15 => Self::ReconnectionOk,
            16 => Self::TooManyLogins,
            17 => Self::InMembersArea,
            20 => Self::InvalidLoginServer,
            21 => Self::ProfileTransfer,
            other => Self::Other(other),
        }
    }

    /// `true` for the codes that admit the player into the game.
    ///
    /// Decided by wire value, so `Other(2)` counts as `Ok`.
    pub fn is_success(self) -> bool {
        matches!(self.as_u8(), 2 | 15)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "{code}"),
            named => write!(f, "{named:?}({})", named.as_u8()),
        }
    }
}

// ---------------------------------------------------------------------------
// Login stage payloads
// ---------------------------------------------------------------------------

/// Opens the login exchange. The single byte is derived from the username
/// and is not used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub name_hash: u8,
}

/// The server's answer to a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// 0 means "continue with the login block".
    pub status: u8,
    /// The key the client must echo back in its login block.
    pub server_key: u64,
}

/// Number of cache archive checksums in a login block.
pub const ARCHIVE_COUNT: usize = 9;

/// The login block: protocol constants, session keys, and credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginBlock {
    /// `true` when sent with the reconnect opcode.
    pub reconnecting: bool,
    /// Always 255 for a well-behaved client.
    pub magic: u8,
    pub client_version: u16,
    /// 0 = low detail, 1 = high detail.
    pub detail: u8,
    pub archive_crcs: [u32; ARCHIVE_COUNT],
    /// Always 10 for a well-behaved client.
    pub block_operation: u8,
    /// Client key halves followed by the server key halves.
    pub session_keys: Vec<u32>,
    pub user_id: u32,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginBlock")
            .field("reconnecting", &self.reconnecting)
            .field("magic", &self.magic)
            .field("client_version", &self.client_version)
            .field("detail", &self.detail)
            .field("block_operation", &self.block_operation)
            .field("session_keys", &self.session_keys.len())
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The login status sent back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginResponse {
    pub code: ResponseCode,
    /// Rights level shown by the client (0 = player).
    pub privilege: u8,
    /// Whether the client should report extra input telemetry.
    pub flagged: bool,
}

impl LoginResponse {
    /// A response that carries only a status code.
    pub fn rejected(code: ResponseCode) -> Self {
        Self {
            code,
            privilege: 0,
            flagged: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Game stage payloads
// ---------------------------------------------------------------------------

/// Public chat. The text stays in the client's compressed form; this layer
/// only undoes the byte transforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub effects: u8,
    pub color: u8,
    pub text: Vec<u8>,
}

/// A walk request: an absolute first step followed by relative steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkRequest {
    pub first_x: u16,
    pub first_y: u16,
    pub steps: Vec<(i8, i8)>,
    pub run: bool,
    /// Trailing bytes the minimap walk opcode appends; empty otherwise.
    pub anti_cheat: Vec<u8>,
}

impl WalkRequest {
    /// Absolute coordinates of every step, starting with the first.
    pub fn positions(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        let (x, y) = (i32::from(self.first_x), i32::from(self.first_y));
        std::iter::once((x, y)).chain(
            self.steps
                .iter()
                .map(move |(dx, dy)| (x + i32::from(*dx), y + i32::from(*dy))),
        )
    }
}

/// A `::command` line, without the leading colons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub line: String,
}

/// A line of text written to the client's chat box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerChatMessage {
    pub text: String,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A decoded (or to-be-encoded) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake(HandshakeRequest),
    Login(LoginBlock),
    Ping,
    Chat(ChatMessage),
    Walk(WalkRequest),
    Command(CommandMessage),
    HandshakeResponse(HandshakeResponse),
    LoginResponse(LoginResponse),
    ServerChat(ServerChatMessage),
}

impl Message {
    /// Returns the logical type of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Handshake(_) => MessageKind::Handshake,
            Self::Login(_) => MessageKind::Login,
            Self::Ping => MessageKind::Ping,
            Self::Chat(_) => MessageKind::Chat,
            Self::Walk(_) => MessageKind::Walk,
            Self::Command(_) => MessageKind::Command,
            Self::HandshakeResponse(_) => MessageKind::HandshakeResponse,
            Self::LoginResponse(_) => MessageKind::LoginResponse,
            Self::ServerChat(_) => MessageKind::ServerChat,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

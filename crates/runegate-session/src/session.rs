//! One live connection and the state it has reached.
//!
//! A [`Session`] owns the byte stream, its read and write buffers, and a
//! single [`FrameCodec`] slot. The slot starts with a plain codec over the
//! login table and is replaced exactly once, by
//! [`enter_game`](Session::enter_game), with a ciphered codec over the game
//! table.
//!
//! ```text
//!   AwaitingHandshake ──(handshake)──→ AwaitingLoginBlock ──(valid block)──→ Authenticating
//!                                                                               │
//!                                                Authenticated ←──(Ok)──────────┘
//!
//!   any state ──(error, EOF, rejection)──→ Closed
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use rand::Rng;
use runegate_protocol::{
    CipherKeystreamPair, FrameCodec, HandshakeResponse, Message, MessageKind, OpcodeTable,
    ProtocolError,
};
use runegate_transport::ConnectionId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::SessionError;

const INITIAL_BUFFER: usize = 512;

// ---------------------------------------------------------------------------
// SessionInfo
// ---------------------------------------------------------------------------

/// Who is on the other end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: ConnectionId,
    pub peer: Option<SocketAddr>,
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peer {
            Some(peer) => write!(f, "{} ({peer})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a session is in the login exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Only a handshake is accepted.
    AwaitingHandshake,
    /// The handshake was answered; only a login block is accepted.
    AwaitingLoginBlock,
    /// The login block is with the authenticator. No frames are decoded.
    Authenticating,
    /// In the game, with a ciphered codec over the game table.
    Authenticated,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// The inbound message kinds this state accepts, as text for errors.
    fn expected(self) -> &'static str {
        match self {
            Self::AwaitingHandshake => "a handshake",
            Self::AwaitingLoginBlock => "a login block",
            Self::Authenticating => "nothing while authenticating",
            Self::Authenticated => "a game message",
            Self::Closed => "nothing on a closed session",
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A connection being driven through the login exchange and into the game.
pub struct Session<S> {
    info: SessionInfo,
    stream: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    codec: FrameCodec,
    state: SessionState,
    server_key: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts a session in `AwaitingHandshake` with a fresh random server
    /// key. `codec` should be a plain codec over the login table.
    pub fn new(info: SessionInfo, stream: S, codec: FrameCodec) -> Self {
        Self::with_server_key(info, stream, codec, generate_server_key())
    }

    /// Like [`new`](Self::new) with a chosen server key.
    pub fn with_server_key(
        info: SessionInfo,
        stream: S,
        codec: FrameCodec,
        server_key: u64,
    ) -> Self {
        Self {
            info,
            stream,
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER),
            write_buf: BytesMut::with_capacity(INITIAL_BUFFER),
            codec,
            state: SessionState::AwaitingHandshake,
            server_key,
        }
    }

    pub fn info(&self) -> SessionInfo {
        self.info
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn server_key(&self) -> u64 {
        self.server_key
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Reads until one message is decoded.
    ///
    /// Returns `Ok(None)` on a clean end of stream (or if the session is
    /// closed). Not to be called while authenticating; use
    /// [`buffer_incoming`](Self::buffer_incoming) instead.
    pub async fn read_message(&mut self) -> Result<Option<Message>, SessionError> {
        if self.is_closed() {
            return Ok(None);
        }
        loop {
            if let Some(message) = self.codec.decode(&mut self.read_buf)? {
                self.check_inbound(message.kind())?;
                return Ok(Some(message));
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                if self.read_buf.is_empty() && self.codec.is_idle() {
                    return Ok(None);
                }
                return Err(SessionError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream ended mid-frame",
                )));
            }
        }
    }

    /// Reads whatever is available into the buffer without decoding it.
    ///
    /// Returns the number of bytes read; 0 means the peer closed. This is
    /// cancel-safe, so it can race another future in `select!`.
    pub async fn buffer_incoming(&mut self) -> Result<usize, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        Ok(self.stream.read_buf(&mut self.read_buf).await?)
    }

    /// Encodes `message` into the write buffer without sending it.
    pub fn queue(&mut self, message: Message) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.codec.encode(message, &mut self.write_buf)?;
        Ok(())
    }

    /// Writes out everything queued.
    pub async fn flush(&mut self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if !self.write_buf.is_empty() {
            self.stream.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Queues and flushes one message.
    pub async fn send(&mut self, message: Message) -> Result<(), SessionError> {
        self.queue(message)?;
        self.flush().await
    }

    /// Answers the handshake with the server key and waits for the login
    /// block.
    pub async fn respond_to_handshake(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::AwaitingHandshake, MessageKind::HandshakeResponse)?;
        self.send(Message::HandshakeResponse(HandshakeResponse {
            status: 0,
            server_key: self.server_key,
        }))
        .await?;
        self.state = SessionState::AwaitingLoginBlock;
        Ok(())
    }

    /// Freezes the session while the authenticator decides.
    pub fn begin_authentication(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::AwaitingLoginBlock, MessageKind::Login)?;
        self.state = SessionState::Authenticating;
        Ok(())
    }

    /// Replaces the codec with a ciphered one over `game_table` and marks
    /// the session authenticated. Bytes buffered during authentication are
    /// decoded by the new codec.
    pub fn enter_game(
        &mut self,
        game_table: Arc<OpcodeTable>,
        cipher: CipherKeystreamPair,
    ) -> Result<(), SessionError> {
        self.require(SessionState::Authenticating, MessageKind::LoginResponse)?;
        let max = self.codec.max_payload_len();
        self.codec = FrameCodec::ciphered(game_table, cipher).with_max_payload_len(max);
        self.state = SessionState::Authenticated;
        tracing::debug!(session = %self.info, "codec switched to game table");
        Ok(())
    }

    /// Closes the session, discarding anything buffered but not decoded.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = SessionState::Closed;
        self.read_buf.clear();
        self.write_buf.clear();
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(session = %self.info, error = %e, "shutdown failed");
        }
    }

    fn check_inbound(&self, kind: MessageKind) -> Result<(), SessionError> {
        let accepted = match self.state {
            SessionState::AwaitingHandshake => kind == MessageKind::Handshake,
            SessionState::AwaitingLoginBlock => kind == MessageKind::Login,
            SessionState::Authenticated => {
                !matches!(kind, MessageKind::Handshake | MessageKind::Login)
            }
            SessionState::Authenticating | SessionState::Closed => false,
        };
        if accepted {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedMessage {
                kind,
                expected: self.state.expected(),
            }
            .into())
        }
    }

    fn require(&self, state: SessionState, kind: MessageKind) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        if self.state != state {
            return Err(ProtocolError::UnexpectedMessage {
                kind,
                expected: self.state.expected(),
            }
            .into());
        }
        Ok(())
    }
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("state", &self.state)
            .field("buffered", &self.read_buf.len())
            .finish_non_exhaustive()
    }
}

/// A random, non-zero server key.
fn generate_server_key() -> u64 {
    let mut rng = rand::rng();
    loop {
        let key: u64 = rng.random();
        if key != 0 {
            return key;
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

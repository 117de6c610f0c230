//! Per-connection driver.
//!
//! Walks one connection through the login exchange and then runs its game
//! loop, all on the connection's own task:
//!
//! 1. Read the handshake, answer with the server key.
//! 2. Read and validate the login block.
//! 3. Hand the credentials to the authenticator on a separate task and
//!    wait, buffering (but not decoding) anything the client sends.
//! 4. Admit the player, send the OK response, switch to the ciphered game
//!    codec.
//! 5. Decode → dispatch → write replies, until the client leaves or errs.
//!
//! A refused login gets its 3-byte login response before the connection
//! is closed; every other failure closes the connection without a word.

use std::sync::Arc;
use std::time::Duration;

use runegate_protocol::{
    CipherKeystreamPair, FrameCodec, LoginResponse, Message, ProtocolError, ResponseCode,
};
use runegate_session::{
    AuthenticationRequest, Authenticator, Credentials, DispatchContext, Player, Session,
    SessionError, SessionInfo, validate_login,
};
use runegate_transport::ConnectionId;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::RunegateError;
use crate::server::ServerContext;

/// Opcode plus a two-byte length prefix.
const MAX_FRAME_HEADER: usize = 3;

/// Removes the player from the online registry when the connection task
/// ends, however it ends.
struct PlayerGuard<A: Authenticator> {
    username: String,
    connection: ConnectionId,
    context: Arc<ServerContext<A>>,
}

impl<A: Authenticator> Drop for PlayerGuard<A> {
    fn drop(&mut self) {
        let username = std::mem::take(&mut self.username);
        let connection = self.connection;
        let context = Arc::clone(&self.context);
        // Drop can't be async; hand the removal to the runtime.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%username, "no runtime, player left in registry");
            return;
        };
        runtime.spawn(async move {
            context.players.lock().await.remove(&username, connection);
        });
    }
}

/// Drives one connection from its first byte to close.
///
/// Works over any byte stream; the accept loop passes TCP streams and the
/// tests pass in-memory duplex pipes. Returns `Ok(())` when the client
/// disconnects cleanly, at any stage.
pub async fn serve_connection<S, A>(
    stream: S,
    info: SessionInfo,
    context: Arc<ServerContext<A>>,
) -> Result<(), RunegateError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    A: Authenticator,
{
    tracing::info!(session = %info, "connection opened");

    let codec = FrameCodec::plain(Arc::clone(&context.login_table))
        .with_max_payload_len(context.config.max_payload_len);
    let mut session = Session::new(info, stream, codec);

    let result = drive(&mut session, &context).await;

    if let Err(e) = &result {
        if let Some(code) = e.response_code() {
            tracing::debug!(session = %info, %code, "login refused");
            let response = Message::LoginResponse(LoginResponse::rejected(code));
            if let Err(send_err) = session.send(response).await {
                tracing::debug!(
                    session = %info,
                    error = %send_err,
                    "failed to send login response"
                );
            }
        } else {
            tracing::debug!(session = %info, error = %e, "closing connection");
        }
    }
    session.close().await;
    tracing::info!(session = %info, "connection closed");

    result.map_err(RunegateError::from)
}

async fn drive<S, A>(
    session: &mut Session<S>,
    context: &Arc<ServerContext<A>>,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    A: Authenticator,
{
    let info = session.info();
    let stage_timeout = context.config.handshake_timeout();

    // --- Handshake ---
    let Some(handshake) = read_within(session, stage_timeout).await? else {
        return Ok(());
    };
    dispatch_anonymous(info, context, &handshake);
    session.respond_to_handshake().await?;

    // --- Login block ---
    let Some(message) = read_within(session, stage_timeout).await? else {
        return Ok(());
    };
    dispatch_anonymous(info, context, &message);
    let Message::Login(block) = message else {
        return Err(ProtocolError::UnexpectedMessage {
            kind: message.kind(),
            expected: "a login block",
        }
        .into());
    };
    let keys = validate_login(&block, &context.config.login_policy(), session.server_key())
        .map_err(SessionError::Rejected)?;

    // --- Authentication ---
    session.begin_authentication()?;
    let credentials = Credentials::from_login(block, keys);
    let player = Player {
        user_id: credentials.user_id,
        username: credentials.username.clone(),
        privilege: 0,
        reconnecting: credentials.reconnecting,
        connection: info.id,
    };
    let request = AuthenticationRequest {
        session: info,
        credentials,
    };
    let Some(verdict) = authenticate(session, context, request).await? else {
        tracing::debug!(session = %info, "client left during authentication");
        return Ok(());
    };
    let code = ResponseCode::from_u8(verdict.as_u8());
    if !code.is_success() {
        return Err(SessionError::AuthenticationFailed(code));
    }

    context
        .players
        .lock()
        .await
        .admit(player.clone())
        .map_err(SessionError::AuthenticationFailed)?;
    let _guard = PlayerGuard {
        username: player.username.clone(),
        connection: info.id,
        context: Arc::clone(context),
    };

    // The response goes out under the plain login codec; everything after
    // it is ciphered.
    session
        .send(Message::LoginResponse(LoginResponse {
            code,
            privilege: player.privilege,
            flagged: false,
        }))
        .await?;
    session.enter_game(
        Arc::clone(&context.game_table),
        CipherKeystreamPair::derive(keys),
    )?;
    tracing::info!(session = %info, player = %player, "player logged in");

    // --- Game ---
    let idle_timeout = context.config.idle_timeout();
    loop {
        let message = match read_within(session, idle_timeout).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::info!(session = %info, player = %player, "player disconnected");
                return Ok(());
            }
            Err(SessionError::TimedOut) => {
                tracing::info!(session = %info, player = %player, "player idle, disconnecting");
                return Err(SessionError::TimedOut);
            }
            Err(e) => return Err(e),
        };
        tracing::trace!(session = %info, kind = %message.kind(), "message received");

        let mut ctx = DispatchContext::new(info, Some(&player));
        context.dispatch.dispatch(&mut ctx, &message);
        for reply in ctx.into_outbox() {
            session.queue(reply)?;
        }
        session.flush().await?;
    }
}

/// Reads one message, giving up after `limit`.
async fn read_within<S>(
    session: &mut Session<S>,
    limit: Duration,
) -> Result<Option<Message>, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(limit, session.read_message()).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::TimedOut),
    }
}

/// Offers a pre-login message to its handler.
///
/// Nothing may precede the handshake and login responses on the wire, so
/// replies queued here are dropped.
fn dispatch_anonymous<A>(info: SessionInfo, context: &ServerContext<A>, message: &Message) {
    let mut ctx = DispatchContext::new(info, None);
    context.dispatch.dispatch(&mut ctx, message);
    let dropped = ctx.into_outbox().len();
    if dropped > 0 {
        tracing::debug!(session = %info, dropped, "replies before login discarded");
    }
}

/// Runs the authenticator on its own task and waits for its verdict.
///
/// Bytes that arrive meanwhile are buffered for the game codec, up to one
/// maximum-size frame; past that the socket isn't read until the verdict
/// is in. Returns `None` if the client closes first; the verdict is then
/// ignored.
async fn authenticate<S, A>(
    session: &mut Session<S>,
    context: &ServerContext<A>,
    request: AuthenticationRequest,
) -> Result<Option<ResponseCode>, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    A: Authenticator,
{
    let info = request.session;
    let auth = Arc::clone(&context.auth);
    let mut task = tokio::spawn(async move { auth.authenticate(request).await });
    let deadline = tokio::time::sleep(context.config.auth_timeout());
    tokio::pin!(deadline);
    let buffer_limit = context.config.max_payload_len + MAX_FRAME_HEADER;

    loop {
        tokio::select! {
            joined = &mut task => {
                return Ok(Some(match joined {
                    Ok(code) => code,
                    Err(e) => {
                        tracing::error!(session = %info, error = %e, "authenticator failed");
                        ResponseCode::CouldNotComplete
                    }
                }));
            }
            () = &mut deadline => {
                tracing::warn!(session = %info, "authenticator timed out");
                task.abort();
                return Ok(Some(ResponseCode::LoginServerOffline));
            }
            read = session.buffer_incoming(), if session.buffered() < buffer_limit => {
                if read? == 0 {
                    return Ok(None);
                }
            }
        }
    }
}

//! Server configuration, shared context, and the accept loop.

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use runegate_protocol::{DEFAULT_MAX_PAYLOAD_LEN, Message, MessageKind, OpcodeTable, reference};
use runegate_session::{
    Authenticator, DEFAULT_CLIENT_VERSION, DispatchContext, DispatchRegistry, LoginPolicy,
    MessageHandler, PlayerRegistry, SessionInfo,
};
use runegate_transport::{Connection, TcpTransport, Transport};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::RunegateError;
use crate::handler::serve_connection;

/// Port the 317 client connects to by default.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:43594";

/// Pause after a failed accept before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Everything about the server that can be tuned without code.
///
/// Every field has a default, so a config file only needs the fields it
/// changes:
///
/// ```json
/// { "bind_addr": "127.0.0.1:43594", "max_players": 200 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Client build the login block must carry.
    pub client_version: u16,
    /// Check that the login block echoes the handshake's server key.
    pub verify_server_key: bool,
    /// Time allowed for each of the handshake and login block to arrive.
    pub handshake_timeout_secs: u64,
    /// Time allowed for the authenticator to answer.
    pub auth_timeout_secs: u64,
    /// An in-game session that sends nothing for this long is closed.
    pub idle_timeout_secs: u64,
    pub max_players: usize,
    /// Largest inbound payload the decoder accepts. Frames the server
    /// encodes aren't checked against it.
    pub max_payload_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            client_version: DEFAULT_CLIENT_VERSION,
            verify_server_key: true,
            handshake_timeout_secs: 5,
            auth_timeout_secs: 10,
            idle_timeout_secs: 60,
            max_players: 2000,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

impl ServerConfig {
    /// Reads a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RunegateError> {
        let text = std::fs::read_to_string(path).map_err(RunegateError::ConfigIo)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, RunegateError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The login-block checks this config asks for.
    pub fn login_policy(&self) -> LoginPolicy {
        LoginPolicy {
            client_version: self.client_version,
            verify_server_key: self.verify_server_key,
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// ServerContext
// ---------------------------------------------------------------------------

/// State shared by every connection task.
///
/// Built once and handed to each task behind an `Arc`. The tables and the
/// dispatch registry are read-only from then on; only the player registry
/// changes, under its mutex.
pub struct ServerContext<A> {
    pub(crate) login_table: Arc<OpcodeTable>,
    pub(crate) game_table: Arc<OpcodeTable>,
    pub(crate) auth: Arc<A>,
    pub(crate) dispatch: DispatchRegistry,
    pub(crate) players: Mutex<PlayerRegistry>,
    pub(crate) config: ServerConfig,
}

impl<A: Authenticator> ServerContext<A> {
    /// Assembles a context, checking that the tables can encode every
    /// message the server itself sends.
    pub fn new(
        login_table: OpcodeTable,
        game_table: OpcodeTable,
        auth: A,
        dispatch: DispatchRegistry,
        config: ServerConfig,
    ) -> Result<Self, RunegateError> {
        login_table.require_outbound([
            MessageKind::HandshakeResponse,
            MessageKind::LoginResponse,
        ])?;
        Ok(Self {
            login_table: Arc::new(login_table),
            game_table: Arc::new(game_table),
            auth: Arc::new(auth),
            dispatch,
            players: Mutex::new(PlayerRegistry::new(config.max_players)),
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn login_table(&self) -> &Arc<OpcodeTable> {
        &self.login_table
    }

    pub fn game_table(&self) -> &Arc<OpcodeTable> {
        &self.game_table
    }

    pub fn dispatch(&self) -> &DispatchRegistry {
        &self.dispatch
    }

    /// Who is in the game right now.
    pub fn players(&self) -> &Mutex<PlayerRegistry> {
        &self.players
    }
}

impl<A> fmt::Debug for ServerContext<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("login_table", &self.login_table.name())
            .field("game_table", &self.game_table.name())
            .field("dispatch", &self.dispatch)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a [`RunegateServer`].
///
/// # Example
///
/// ```rust,no_run
/// use runegate::prelude::*;
///
/// struct AllowAll;
///
/// impl Authenticator for AllowAll {
///     async fn authenticate(&self, _request: AuthenticationRequest) -> ResponseCode {
///         ResponseCode::Ok
///     }
/// }
///
/// # async fn run() -> Result<(), RunegateError> {
/// let server = RunegateServerBuilder::new()
///     .bind("127.0.0.1:43594")
///     .handler_fn(MessageKind::Ping, |_ctx, _msg| {})
///     .build(AllowAll)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RunegateServerBuilder {
    config: ServerConfig,
    dispatch: DispatchRegistry,
    tables: Option<(OpcodeTable, OpcodeTable)>,
}

impl RunegateServerBuilder {
    /// Creates a builder with the default config and the reference tables.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            dispatch: DispatchRegistry::new(),
            tables: None,
        }
    }

    /// Replaces the whole config.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn client_version(mut self, version: u16) -> Self {
        self.config.client_version = version;
        self
    }

    pub fn max_players(mut self, max: usize) -> Self {
        self.config.max_players = max;
        self
    }

    /// Uses custom login and game tables instead of the reference ones.
    pub fn tables(mut self, login: OpcodeTable, game: OpcodeTable) -> Self {
        self.tables = Some((login, game));
        self
    }

    /// Routes messages of `kind` to `handler`.
    pub fn handler(mut self, kind: MessageKind, handler: impl MessageHandler) -> Self {
        self.dispatch.register(kind, handler);
        self
    }

    /// Closure form of [`handler`](Self::handler).
    pub fn handler_fn<F>(mut self, kind: MessageKind, handler: F) -> Self
    where
        F: Fn(&mut DispatchContext<'_>, &Message) + Send + Sync + 'static,
    {
        self.dispatch.register_fn(kind, handler);
        self
    }

    /// Builds the shared context without binding a socket.
    pub fn build_context<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<Arc<ServerContext<A>>, RunegateError> {
        let (login, game) = match self.tables {
            Some(tables) => tables,
            None => (reference::login_table()?, reference::game_table()?),
        };
        Ok(Arc::new(ServerContext::new(
            login,
            game,
            auth,
            self.dispatch,
            self.config,
        )?))
    }

    /// Builds the server and binds its listener.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<RunegateServer<A>, RunegateError> {
        let bind_addr = self.config.bind_addr.clone();
        let context = self.build_context(auth)?;
        let transport = TcpTransport::bind(&bind_addr).await?;
        Ok(RunegateServer { transport, context })
    }
}

impl Default for RunegateServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound server, ready to accept game clients.
pub struct RunegateServer<A> {
    transport: TcpTransport,
    context: Arc<ServerContext<A>>,
}

impl<A: Authenticator> RunegateServer<A> {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn context(&self) -> &Arc<ServerContext<A>> {
        &self.context
    }

    /// Accepts connections forever, one task each.
    ///
    /// Runs until the future is dropped. A failed accept is logged and
    /// retried after [`ACCEPT_BACKOFF`], so a persistent error such as
    /// running out of file descriptors doesn't spin the loop.
    pub async fn run(mut self) -> Result<(), RunegateError> {
        tracing::info!(
            addr = ?self.transport.local_addr().ok(),
            max_players = self.context.config.max_players,
            "server running"
        );

        accept_loop(&mut self.transport, &self.context).await;
        Ok(())
    }
}

/// Hands each accepted connection to its own task. Never returns.
async fn accept_loop<T, A>(transport: &mut T, context: &Arc<ServerContext<A>>)
where
    T: Transport,
    A: Authenticator,
{
    loop {
        let conn = match transport.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let info = SessionInfo {
            id: conn.id(),
            peer: conn.peer_addr(),
        };
        let context = Arc::clone(context);

        tokio::spawn(async move {
            if let Err(e) = serve_connection(conn.into_stream(), info, context).await {
                tracing::debug!(session = %info, error = %e, "connection ended with error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use runegate_protocol::ResponseCode;
    use runegate_session::AuthenticationRequest;
    use runegate_transport::ConnectionId;

    use super::*;

    struct Deny;

    impl Authenticator for Deny {
        async fn authenticate(&self, _request: AuthenticationRequest) -> ResponseCode {
            ResponseCode::InvalidCredentials
        }
    }

    /// A listener whose every accept fails, as when the process is out of
    /// file descriptors.
    struct ExhaustedTransport {
        accepts: Arc<AtomicUsize>,
    }

    struct NeverAccepted;

    impl runegate_transport::Connection for NeverAccepted {
        type Stream = tokio::io::DuplexStream;

        fn id(&self) -> ConnectionId {
            ConnectionId::new(0)
        }

        fn peer_addr(&self) -> Option<SocketAddr> {
            None
        }

        fn into_stream(self) -> Self::Stream {
            tokio::io::duplex(1).0
        }
    }

    impl Transport for ExhaustedTransport {
        type Connection = NeverAccepted;
        type Error = std::io::Error;

        async fn accept(&mut self) -> Result<NeverAccepted, std::io::Error> {
            self.accepts.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::other("too many open files"))
        }

        fn local_addr(&self) -> std::io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
        }
    }

    #[test]
    fn test_config_default_matches_reference_client() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:43594");
        assert_eq!(config.client_version, 317);
        assert!(config.verify_server_key);
        assert_eq!(config.auth_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_payload_len, 65535);
    }

    #[test]
    fn test_config_from_json_partial_keeps_defaults() {
        let config =
            ServerConfig::from_json_str(r#"{ "max_players": 3, "verify_server_key": false }"#)
                .expect("valid config");
        assert_eq!(config.max_players, 3);
        assert!(!config.verify_server_key);
        assert_eq!(config.client_version, 317);
        assert_eq!(config.idle_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_json_wrong_type_is_error() {
        let err = ServerConfig::from_json_str(r#"{ "max_players": "lots" }"#).unwrap_err();
        assert!(matches!(err, RunegateError::Config(_)));
    }

    #[test]
    fn test_config_from_missing_file_is_io_error() {
        let err = ServerConfig::from_json_file("/nonexistent/runegate.json").unwrap_err();
        assert!(matches!(err, RunegateError::ConfigIo(_)));
    }

    #[test]
    fn test_login_policy_follows_config() {
        let config = ServerConfig {
            client_version: 377,
            verify_server_key: false,
            ..ServerConfig::default()
        };
        let policy = config.login_policy();
        assert_eq!(policy.client_version, 377);
        assert!(!policy.verify_server_key);
    }

    #[test]
    fn test_build_context_uses_reference_tables() {
        let context = RunegateServerBuilder::new()
            .max_players(7)
            .handler_fn(MessageKind::Ping, |_ctx, _msg| {})
            .build_context(Deny)
            .expect("reference tables are complete");
        assert_eq!(context.login_table().name(), reference::LOGIN_TABLE);
        assert_eq!(context.game_table().name(), reference::GAME_TABLE);
        assert!(context.dispatch().contains(MessageKind::Ping));
        assert_eq!(context.config().max_players, 7);
    }

    #[test]
    fn test_build_context_login_table_without_responses_is_error() {
        let empty_login = OpcodeTable::new("bare");
        let game = reference::game_table().expect("game table");
        let err = RunegateServerBuilder::new()
            .tables(empty_login, game)
            .build_context(Deny)
            .unwrap_err();
        assert!(matches!(err, RunegateError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_loop_failing_accept_backs_off() {
        let accepts = Arc::new(AtomicUsize::new(0));
        let mut transport = ExhaustedTransport {
            accepts: Arc::clone(&accepts),
        };
        let context = RunegateServerBuilder::new().build_context(Deny).expect("context");
        let task = tokio::spawn(async move { accept_loop(&mut transport, &context).await });

        // One attempt at t=0, then one per back-off period.
        tokio::time::sleep(ACCEPT_BACKOFF * 9 + ACCEPT_BACKOFF / 2).await;
        let attempts = accepts.load(Ordering::SeqCst);
        assert!((9..=11).contains(&attempts), "accepted {attempts} times");
        task.abort();
    }

    #[tokio::test]
    async fn test_build_binds_ephemeral_port() {
        let server = RunegateServerBuilder::new()
            .bind("127.0.0.1:0")
            .build(Deny)
            .await
            .expect("should bind");
        let addr = server.local_addr().expect("local addr");
        assert_ne!(addr.port(), 0);
        assert!(server.context().players().lock().await.is_empty());
    }
}

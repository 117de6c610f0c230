//! # Runegate
//!
//! A login-to-game session server for 317-era game clients.
//!
//! Runegate takes care of everything between the socket and your game:
//! framing, the handshake and login exchange, the opcode keystream, and
//! routing each decoded message to a handler. You supply an
//! [`Authenticator`] that checks credentials and register handlers for the
//! messages you care about.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runegate::prelude::*;
//!
//! struct AllowAll;
//!
//! impl Authenticator for AllowAll {
//!     async fn authenticate(&self, _request: AuthenticationRequest) -> ResponseCode {
//!         ResponseCode::Ok
//!     }
//! }
//!
//! # async fn run() -> Result<(), RunegateError> {
//! let server = RunegateServerBuilder::new()
//!     .bind("0.0.0.0:43594")
//!     .handler_fn(MessageKind::Command, |ctx, msg| {
//!         if let Message::Command(command) = msg {
//!             ctx.reply(Message::ServerChat(ServerChatMessage {
//!                 text: format!("unknown command: {}", command.line),
//!             }));
//!         }
//!     })
//!     .build(AllowAll)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::RunegateError;
pub use handler::serve_connection;
pub use server::{
    ACCEPT_BACKOFF, DEFAULT_BIND_ADDR, RunegateServer, RunegateServerBuilder, ServerConfig,
    ServerContext,
};

pub use runegate_protocol as protocol;
pub use runegate_protocol::reference;
pub use runegate_session as session;
pub use runegate_transport as transport;

/// Everything needed to stand up a server and write handlers.
pub mod prelude {
    pub use crate::{
        RunegateError, RunegateServer, RunegateServerBuilder, ServerConfig, ServerContext,
        serve_connection,
    };
    pub use runegate_protocol::{
        ChatMessage, CommandMessage, LoginResponse, Message, MessageKind, ResponseCode,
        ServerChatMessage, WalkRequest,
    };
    pub use runegate_session::{
        AuthenticationRequest, Authenticator, Credentials, DispatchContext, MessageHandler,
        Player, SessionInfo,
    };
    pub use runegate_transport::ConnectionId;
}

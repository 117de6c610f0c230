//! Session layer for Runegate.
//!
//! Everything that happens to one connection between the first byte and
//! the last:
//!
//! 1. **State machine** ([`Session`], [`SessionState`]): handshake, login
//!    block, authentication, game.
//! 2. **Login validation** ([`validate_login`], [`LoginPolicy`]): local
//!    checks that map each failure to its own response code.
//! 3. **Authentication** ([`Authenticator`]): the hand-off to your
//!    credential check.
//! 4. **Dispatch** ([`DispatchRegistry`]): routing decoded messages to
//!    handlers.
//! 5. **Online players** ([`PlayerRegistry`]): one login per account, and
//!    a cap on the world.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← drives sessions, one task per connection
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← frames, messages, opcode keystream
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod dispatch;
mod error;
mod login;
mod players;
mod session;

pub use auth::{AuthenticationRequest, Authenticator, Credentials};
pub use dispatch::{DispatchContext, DispatchRegistry, MessageHandler};
pub use error::SessionError;
pub use login::{
    BLOCK_OPERATION, DEFAULT_CLIENT_VERSION, LOGIN_MAGIC, LoginPolicy, validate_login,
};
pub use players::{Player, PlayerRegistry};
pub use session::{Session, SessionInfo, SessionState};

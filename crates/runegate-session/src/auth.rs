//! Authentication hand-off.
//!
//! Runegate doesn't check passwords itself. Once a login block has passed
//! local validation the credentials are packed into an
//! [`AuthenticationRequest`] and handed to your [`Authenticator`], which
//! answers with a [`ResponseCode`]: `Ok` to admit the player, anything
//! else to refuse them with that code.

use std::fmt;

use runegate_protocol::{LoginBlock, ResponseCode};

use crate::session::SessionInfo;

/// Decides whether a login may proceed.
///
/// Implementations are shared by every connection task, so they must be
/// `Send + Sync + 'static`. Each request is submitted exactly once.
///
/// # Example
///
/// ```rust
/// use runegate_session::{AuthenticationRequest, Authenticator};
/// use runegate_protocol::ResponseCode;
///
/// /// Admits anyone whose password is their username reversed.
/// struct MirrorAuthenticator;
///
/// impl Authenticator for MirrorAuthenticator {
///     async fn authenticate(&self, request: AuthenticationRequest) -> ResponseCode {
///         let creds = &request.credentials;
///         if creds.password.chars().eq(creds.username.chars().rev()) {
///             ResponseCode::Ok
///         } else {
///             ResponseCode::InvalidCredentials
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Resolves the request to exactly one response code.
    fn authenticate(
        &self,
        request: AuthenticationRequest,
    ) -> impl std::future::Future<Output = ResponseCode> + Send;
}

/// What the client claimed in its login block.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: u32,
    pub username: String,
    pub password: String,
    /// The validated session keys; they also seed the opcode keystream.
    pub session_keys: [u32; 4],
    pub reconnecting: bool,
}

impl Credentials {
    /// Takes the credentials out of a validated login block.
    pub fn from_login(block: LoginBlock, session_keys: [u32; 4]) -> Self {
        Self {
            user_id: block.user_id,
            username: block.username,
            password: block.password,
            session_keys,
            reconnecting: block.reconnecting,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("reconnecting", &self.reconnecting)
            .finish_non_exhaustive()
    }
}

/// One login attempt awaiting a verdict.
#[derive(Debug, Clone)]
pub struct AuthenticationRequest {
    pub session: SessionInfo,
    pub credentials: Credentials,
}

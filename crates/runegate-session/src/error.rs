//! Error types for the session layer.

use runegate_protocol::{ProtocolError, ResponseCode};

/// Errors that end a session.
///
/// How the connection is closed depends on the variant: protocol and
/// transport errors close it straight away, while `Rejected` and
/// `AuthenticationFailed` first tell the client why with a login response.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer broke framing or sent something it shouldn't have.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The byte stream failed.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// The login block failed local validation.
    #[error("login rejected: {0}")]
    Rejected(ResponseCode),

    /// The authenticator (or the player registry) refused the login.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(ResponseCode),

    /// The session is closed; nothing more can be read or written.
    #[error("session closed")]
    Closed,

    /// The peer didn't send anything in time.
    #[error("session timed out")]
    TimedOut,
}

impl SessionError {
    /// The login response to send before closing, if any.
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            Self::Rejected(code) | Self::AuthenticationFailed(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err)
    }
}

/// Failures of the listening socket.
///
/// Errors on an accepted stream are plain `io::Error`s and belong to the
/// session that owns it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The socket was accepted but couldn't be configured.
    #[error("socket setup failed: {0}")]
    SocketSetup(#[source] std::io::Error),
}

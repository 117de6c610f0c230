//! Unified error type for the Runegate server.

use runegate_protocol::ProtocolError;
use runegate_session::SessionError;
use runegate_transport::TransportError;

/// Top-level error that wraps the errors of every layer.
///
/// The `#[from]` conversions let `?` lift a layer's error into this one,
/// so code built on the `runegate` crate only has to name a single type.
#[derive(Debug, thiserror::Error)]
pub enum RunegateError {
    /// Binding or accepting failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A table couldn't be built, or lacks an outbound binding the server
    /// needs.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A connection ended abnormally.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The config file couldn't be read.
    #[error("failed to read config: {0}")]
    ConfigIo(#[source] std::io::Error),

    /// The config file isn't valid JSON for [`ServerConfig`](crate::ServerConfig).
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

//! Error types for the protocol layer.
//!
//! Every variant here is fatal to the session that produced it: the
//! connection is closed after any in-flight response has been flushed.
//! Table registration errors surface at startup instead, while the
//! tables are being built.

use crate::MessageKind;

/// Errors that can occur while building tables or framing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A frame arrived with an opcode the active table doesn't know.
    #[error("opcode {opcode} is not registered in the {table} table")]
    UnknownOpcode { opcode: u8, table: &'static str },

    /// An opcode was registered twice in the same table.
    #[error("opcode {opcode} is already registered in the {table} table")]
    DuplicateOpcode { opcode: u8, table: &'static str },

    /// A message kind was bound for encoding twice in the same table.
    #[error("{kind} is already bound for encoding in the {table} table")]
    DuplicateBinding {
        kind: MessageKind,
        table: &'static str,
    },

    /// The server tried to write a message the active table can't encode.
    #[error("{kind} has no encoding binding in the {table} table")]
    UnboundMessage {
        kind: MessageKind,
        table: &'static str,
    },

    /// A payload doesn't fit in its opcode's length prefix.
    #[error(
        "payload of {len} bytes exceeds the {max}-byte capacity of opcode {opcode}"
    )]
    PayloadTooLarge { opcode: u8, len: usize, max: usize },

    /// A payload doesn't match its opcode's fixed length.
    #[error("opcode {opcode} expects exactly {expected} payload bytes, got {actual}")]
    LengthMismatch {
        opcode: u8,
        expected: usize,
        actual: usize,
    },

    /// A declared frame length is larger than the codec accepts.
    #[error("declared frame length {len} exceeds the limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// A payload codec was handed a message of another kind.
    #[error("{codec} codec cannot encode a {actual} message")]
    WrongKind {
        codec: MessageKind,
        actual: MessageKind,
    },

    /// The payload bytes don't form a valid message.
    #[error("malformed {kind} payload: {reason}")]
    Malformed { kind: MessageKind, reason: String },

    /// A well-formed message arrived at the wrong point in the session.
    #[error("unexpected {kind} message, expected {expected}")]
    UnexpectedMessage {
        kind: MessageKind,
        expected: &'static str,
    },

    /// The underlying stream failed while framing.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(kind: MessageKind, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}

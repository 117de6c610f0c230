//! Opcode tables: which opcodes exist, how long their payloads are, and
//! which codec reads them.
//!
//! A table is built once at startup with `register` and
//! `register_outbound`, then wrapped in an `Arc` and shared read-only by
//! every session. The server keeps two: one for the login exchange and
//! one for the game.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::PayloadCodec;
use crate::error::ProtocolError;
use crate::types::MessageKind;

/// Width of a variable-length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    /// One unsigned byte, payloads up to 255 bytes.
    Byte,
    /// Two bytes, big-endian, payloads up to 65535 bytes.
    Short,
}

impl PrefixWidth {
    /// Number of prefix bytes on the wire.
    pub fn byte_len(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
        }
    }

    /// Largest payload the prefix can describe.
    pub fn max_payload(self) -> usize {
        match self {
            Self::Byte => u8::MAX as usize,
            Self::Short => u16::MAX as usize,
        }
    }
}

/// How the payload length of an opcode is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    /// Exactly this many bytes follow the opcode. `Fixed(0)` is valid.
    Fixed(usize),
    /// A length prefix of the given width follows the opcode.
    VariablePrefixed(PrefixWidth),
}

impl LengthRule {
    /// Checks that a payload of `len` bytes can be framed under this rule.
    ///
    /// # Errors
    /// [`ProtocolError::LengthMismatch`] for a fixed rule of another size,
    /// [`ProtocolError::PayloadTooLarge`] when the prefix can't hold `len`.
    pub fn check(self, opcode: u8, len: usize) -> Result<(), ProtocolError> {
        match self {
            Self::Fixed(expected) if expected != len => Err(ProtocolError::LengthMismatch {
                opcode,
                expected,
                actual: len,
            }),
            Self::VariablePrefixed(width) if len > width.max_payload() => {
                Err(ProtocolError::PayloadTooLarge {
                    opcode,
                    len,
                    max: width.max_payload(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// One inbound opcode binding.
#[derive(Clone)]
pub struct OpcodeEntry {
    pub opcode: u8,
    pub length_rule: LengthRule,
    pub kind: MessageKind,
    pub codec: Arc<dyn PayloadCodec>,
}

impl fmt::Debug for OpcodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeEntry")
            .field("opcode", &self.opcode)
            .field("length_rule", &self.length_rule)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// How an outbound message is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The payload is written as-is, with no opcode or prefix. Used by the
    /// handshake and login responses, which the client reads by size.
    Headless,
    /// A regular frame: opcode, length prefix, payload.
    Opcode { opcode: u8, length_rule: LengthRule },
}

/// One outbound message binding.
#[derive(Clone)]
pub struct OutboundEntry {
    pub kind: MessageKind,
    pub framing: Framing,
    pub codec: Arc<dyn PayloadCodec>,
}

impl fmt::Debug for OutboundEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundEntry")
            .field("kind", &self.kind)
            .field("framing", &self.framing)
            .finish_non_exhaustive()
    }
}

/// A named set of inbound opcode entries and outbound bindings.
#[derive(Debug)]
pub struct OpcodeTable {
    name: &'static str,
    inbound: HashMap<u8, OpcodeEntry>,
    outbound: HashMap<MessageKind, OutboundEntry>,
}

impl OpcodeTable {
    /// Creates an empty table. The name appears in errors and logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inbound: HashMap::new(),
            outbound: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Binds an inbound opcode.
    ///
    /// # Errors
    /// [`ProtocolError::DuplicateOpcode`] if the opcode is already bound.
    pub fn register(
        &mut self,
        opcode: u8,
        length_rule: LengthRule,
        codec: impl PayloadCodec,
    ) -> Result<(), ProtocolError> {
        self.register_shared(opcode, length_rule, Arc::new(codec))
    }

    /// Like [`register`](Self::register), for a codec already shared with
    /// other opcodes.
    pub fn register_shared(
        &mut self,
        opcode: u8,
        length_rule: LengthRule,
        codec: Arc<dyn PayloadCodec>,
    ) -> Result<(), ProtocolError> {
        if self.inbound.contains_key(&opcode) {
            return Err(ProtocolError::DuplicateOpcode {
                opcode,
                table: self.name,
            });
        }
        let kind = codec.kind();
        self.inbound.insert(
            opcode,
            OpcodeEntry {
                opcode,
                length_rule,
                kind,
                codec,
            },
        );
        Ok(())
    }

    /// Finds the entry for an inbound opcode.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownOpcode`] if nothing is bound.
    pub fn lookup(&self, opcode: u8) -> Result<&OpcodeEntry, ProtocolError> {
        self.inbound
            .get(&opcode)
            .ok_or(ProtocolError::UnknownOpcode {
                opcode,
                table: self.name,
            })
    }

    /// Binds the codec's message kind for encoding.
    ///
    /// # Errors
    /// [`ProtocolError::DuplicateBinding`] if the kind is already bound,
    /// [`ProtocolError::DuplicateOpcode`] if another outbound kind uses the
    /// same opcode.
    pub fn register_outbound(
        &mut self,
        framing: Framing,
        codec: impl PayloadCodec,
    ) -> Result<(), ProtocolError> {
        let kind = codec.kind();
        if self.outbound.contains_key(&kind) {
            return Err(ProtocolError::DuplicateBinding {
                kind,
                table: self.name,
            });
        }
        if let Framing::Opcode { opcode, .. } = framing {
            let taken = self.outbound.values().any(|entry| {
                matches!(entry.framing, Framing::Opcode { opcode: other, .. } if other == opcode)
            });
            if taken {
                return Err(ProtocolError::DuplicateOpcode {
                    opcode,
                    table: self.name,
                });
            }
        }
        self.outbound.insert(
            kind,
            OutboundEntry {
                kind,
                framing,
                codec: Arc::new(codec),
            },
        );
        Ok(())
    }

    /// Finds the binding used to encode `kind`.
    ///
    /// # Errors
    /// [`ProtocolError::UnboundMessage`] if the kind can't be encoded.
    pub fn outbound(&self, kind: MessageKind) -> Result<&OutboundEntry, ProtocolError> {
        self.outbound
            .get(&kind)
            .ok_or(ProtocolError::UnboundMessage {
                kind,
                table: self.name,
            })
    }

    /// Checks at startup that every kind the server will write is bound.
    pub fn require_outbound(
        &self,
        kinds: impl IntoIterator<Item = MessageKind>,
    ) -> Result<(), ProtocolError> {
        kinds
            .into_iter()
            .try_for_each(|kind| self.outbound(kind).map(|_| ()))
    }

    /// Number of inbound opcodes.
    pub fn len(&self) -> usize {
        self.inbound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inbound.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CommandCodec, HandshakeCodec, PingCodec, ServerChatCodec};

    #[test]
    fn test_register_duplicate_opcode_fails() {
        let mut table = OpcodeTable::new("test");
        table
            .register(0, LengthRule::Fixed(0), PingCodec)
            .expect("first register");
        let err = table
            .register(0, LengthRule::Fixed(1), HandshakeCodec)
            .expect_err("second register");
        assert!(matches!(
            err,
            ProtocolError::DuplicateOpcode { opcode: 0, table: "test" }
        ));
    }

    #[test]
    fn test_lookup_returns_registered_entry() {
        let mut table = OpcodeTable::new("test");
        table
            .register(103, LengthRule::VariablePrefixed(PrefixWidth::Byte), CommandCodec)
            .expect("register");
        let entry = table.lookup(103).expect("lookup");
        assert_eq!(entry.kind, MessageKind::Command);
        assert_eq!(
            entry.length_rule,
            LengthRule::VariablePrefixed(PrefixWidth::Byte)
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_opcode_fails() {
        let table = OpcodeTable::new("game");
        let err = table.lookup(77).expect_err("should fail");
        assert!(matches!(
            err,
            ProtocolError::UnknownOpcode { opcode: 77, table: "game" }
        ));
    }

    #[test]
    fn test_register_shared_codec_under_several_opcodes() {
        let mut table = OpcodeTable::new("test");
        let codec: Arc<dyn PayloadCodec> = Arc::new(PingCodec);
        for opcode in [1, 2, 3] {
            table
                .register_shared(opcode, LengthRule::Fixed(0), Arc::clone(&codec))
                .expect("register");
        }
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_register_outbound_duplicate_kind_fails() {
        let mut table = OpcodeTable::new("game");
        let framing = Framing::Opcode {
            opcode: 253,
            length_rule: LengthRule::VariablePrefixed(PrefixWidth::Byte),
        };
        table
            .register_outbound(framing, ServerChatCodec)
            .expect("first bind");
        let err = table
            .register_outbound(Framing::Headless, ServerChatCodec)
            .expect_err("second bind");
        assert!(matches!(err, ProtocolError::DuplicateBinding { .. }));
    }

    #[test]
    fn test_register_outbound_reused_opcode_fails() {
        let mut table = OpcodeTable::new("game");
        let framing = Framing::Opcode {
            opcode: 253,
            length_rule: LengthRule::VariablePrefixed(PrefixWidth::Byte),
        };
        table
            .register_outbound(framing, ServerChatCodec)
            .expect("first bind");
        let err = table
            .register_outbound(framing, PingCodec)
            .expect_err("reused opcode");
        assert!(matches!(err, ProtocolError::DuplicateOpcode { opcode: 253, .. }));
    }

    #[test]
    fn test_require_outbound_reports_missing_kind() {
        let mut table = OpcodeTable::new("game");
        table
            .register_outbound(Framing::Headless, ServerChatCodec)
            .expect("bind");
        assert!(table.require_outbound([MessageKind::ServerChat]).is_ok());
        let err = table
            .require_outbound([MessageKind::ServerChat, MessageKind::LoginResponse])
            .expect_err("missing binding");
        assert!(matches!(
            err,
            ProtocolError::UnboundMessage {
                kind: MessageKind::LoginResponse,
                ..
            }
        ));
    }

    #[test]
    fn test_length_rule_check_boundaries() {
        let byte = LengthRule::VariablePrefixed(PrefixWidth::Byte);
        let short = LengthRule::VariablePrefixed(PrefixWidth::Short);
        assert!(byte.check(4, 255).is_ok());
        assert!(byte.check(4, 256).is_err());
        assert!(short.check(16, 65_535).is_ok());
        assert!(short.check(16, 65_536).is_err());
        assert!(LengthRule::Fixed(0).check(0, 0).is_ok());
        assert!(matches!(
            LengthRule::Fixed(1).check(14, 2),
            Err(ProtocolError::LengthMismatch { expected: 1, actual: 2, .. })
        ));
    }
}

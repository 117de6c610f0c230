//! Message dispatch: routes each decoded message to at most one handler.
//!
//! Handlers are registered per [`MessageKind`] while the server is being
//! built. At runtime the registry is read-only and shared by every
//! connection task. A handler runs synchronously on the connection's task;
//! anything it wants sent back goes into the context's outbox and is
//! written, in order, once the handler returns.

use std::collections::HashMap;
use std::fmt;

use runegate_protocol::{Message, MessageKind};

use crate::players::Player;
use crate::session::SessionInfo;

/// What a handler can see and do.
pub struct DispatchContext<'a> {
    pub session: SessionInfo,
    /// `None` before the session is authenticated.
    pub player: Option<&'a Player>,
    outbox: Vec<Message>,
}

impl<'a> DispatchContext<'a> {
    pub fn new(session: SessionInfo, player: Option<&'a Player>) -> Self {
        Self {
            session,
            player,
            outbox: Vec::new(),
        }
    }

    /// Queues a message to send once the handler returns.
    pub fn reply(&mut self, message: Message) {
        self.outbox.push(message);
    }

    pub fn is_authenticated(&self) -> bool {
        self.player.is_some()
    }

    /// The replies queued so far, in order.
    pub fn into_outbox(self) -> Vec<Message> {
        self.outbox
    }
}

impl fmt::Debug for DispatchContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("session", &self.session)
            .field("player", &self.player.map(|p| p.username.as_str()))
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

/// Handles one kind of message.
///
/// Closures taking `(&mut DispatchContext, &Message)` implement this trait.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, ctx: &mut DispatchContext<'_>, message: &Message);
}

impl<F> MessageHandler for F
where
    F: Fn(&mut DispatchContext<'_>, &Message) + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut DispatchContext<'_>, message: &Message) {
        self(ctx, message)
    }
}

/// Maps message kinds to their handler.
#[derive(Default)]
pub struct DispatchRegistry {
    handlers: HashMap<MessageKind, Box<dyn MessageHandler>>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handler for `kind`, replacing any previous one.
    ///
    /// Returns `true` if a handler was replaced.
    pub fn register(&mut self, kind: MessageKind, handler: impl MessageHandler) -> bool {
        let replaced = self.handlers.insert(kind, Box::new(handler)).is_some();
        if replaced {
            tracing::debug!(%kind, "replaced message handler");
        }
        replaced
    }

    /// Closure form of [`register`](Self::register), so the argument types
    /// don't need spelling out.
    pub fn register_fn<F>(&mut self, kind: MessageKind, handler: F) -> bool
    where
        F: Fn(&mut DispatchContext<'_>, &Message) + Send + Sync + 'static,
    {
        self.register(kind, handler)
    }

    /// Runs the handler for `message`, if there is one.
    ///
    /// Returns whether a handler ran. Messages without a handler are
    /// dropped.
    pub fn dispatch(&self, ctx: &mut DispatchContext<'_>, message: &Message) -> bool {
        let kind = message.kind();
        match self.handlers.get(&kind) {
            Some(handler) => {
                handler.handle(ctx, message);
                true
            }
            None => {
                tracing::trace!(%kind, session = %ctx.session, "no handler, message dropped");
                false
            }
        }
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("DispatchRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use runegate_protocol::{CommandMessage, ServerChatMessage};
    use runegate_transport::ConnectionId;

    use super::*;

    fn info() -> SessionInfo {
        SessionInfo {
            id: ConnectionId::new(3),
            peer: None,
        }
    }

    fn player() -> Player {
        Player {
            user_id: 1,
            username: "zezima".into(),
            privilege: 0,
            reconnecting: false,
            connection: ConnectionId::new(3),
        }
    }

    #[test]
    fn test_dispatch_runs_registered_handler() {
        let mut registry = DispatchRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        registry.register_fn(MessageKind::Ping, move |_ctx, _msg| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut ctx = DispatchContext::new(info(), None);
        assert!(registry.dispatch(&mut ctx, &Message::Ping));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_unhandled_message_is_dropped() {
        let registry = DispatchRegistry::new();
        let mut ctx = DispatchContext::new(info(), None);
        assert!(!registry.dispatch(&mut ctx, &Message::Ping));
        assert!(ctx.into_outbox().is_empty());
    }

    #[test]
    fn test_register_replaces_previous_handler() {
        let mut registry = DispatchRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        assert!(!registry.register_fn(MessageKind::Ping, move |_ctx, _msg| {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        let s = Arc::clone(&second);
        assert!(registry.register_fn(MessageKind::Ping, move |_ctx, _msg| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(registry.len(), 1);

        let mut ctx = DispatchContext::new(info(), None);
        registry.dispatch(&mut ctx, &Message::Ping);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_replies_keep_order() {
        let mut registry = DispatchRegistry::new();
        registry.register_fn(MessageKind::Command, |ctx, msg| {
            if let Message::Command(command) = msg {
                for word in command.line.split_whitespace() {
                    ctx.reply(Message::ServerChat(ServerChatMessage { text: word.into() }));
                }
            }
        });

        let player = player();
        let mut ctx = DispatchContext::new(info(), Some(&player));
        registry.dispatch(
            &mut ctx,
            &Message::Command(CommandMessage {
                line: "one two three".into(),
            }),
        );
        let texts: Vec<_> = ctx
            .into_outbox()
            .into_iter()
            .map(|m| match m {
                Message::ServerChat(chat) => chat.text,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_dispatch_context_exposes_player_after_login() {
        let mut registry = DispatchRegistry::new();
        registry.register_fn(MessageKind::Ping, |ctx, _msg| {
            let name = ctx
                .player
                .map(|p| p.username.clone())
                .unwrap_or_else(|| "nobody".into());
            ctx.reply(Message::ServerChat(ServerChatMessage { text: name }));
        });

        let mut anon = DispatchContext::new(info(), None);
        registry.dispatch(&mut anon, &Message::Ping);
        assert!(!anon.is_authenticated());

        let player = player();
        let mut known = DispatchContext::new(info(), Some(&player));
        registry.dispatch(&mut known, &Message::Ping);
        assert!(known.is_authenticated());

        assert_eq!(
            anon.into_outbox(),
            vec![Message::ServerChat(ServerChatMessage { text: "nobody".into() })]
        );
        assert_eq!(
            known.into_outbox(),
            vec![Message::ServerChat(ServerChatMessage { text: "zezima".into() })]
        );
    }

    #[test]
    fn test_registry_debug_lists_kinds() {
        let mut registry = DispatchRegistry::new();
        registry.register_fn(MessageKind::Walk, |_ctx, _msg| {});
        assert!(format!("{registry:?}").contains("Walk"));
        assert!(registry.contains(MessageKind::Walk));
        assert!(!registry.contains(MessageKind::Chat));
    }
}

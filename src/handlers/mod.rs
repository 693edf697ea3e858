//! IRC command handlers.
//!
//! The [`Registry`] maps verbs to [`Handler`] objects. A handler either
//! sends its success-path replies through the session's delivery handle
//! or returns a [`HandlerError`], which the session dispatcher converts
//! into the matching numeric at the boundary.

mod channel;
mod connection;
mod messaging;
mod misc;
mod mode;

pub use channel::{JoinHandler, KickHandler, PartHandler, TopicHandler};
pub use connection::{CapHandler, NickHandler, PingHandler, PongHandler, QuitHandler, UserHandler};
pub use messaging::{NoticeHandler, PrivmsgHandler};
pub use misc::IsonHandler;
pub use mode::ModeHandler;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use gossip_proto::{Message, Prefix, Response};

use crate::error::{HandlerError, HandlerResult};
use crate::state::{SessionHandle, SessionId, StateManager};

/// Handler context passed to each command handler.
pub struct Context<'a> {
    /// This connection's id.
    pub session_id: SessionId,
    /// Shared server state.
    pub state: &'a Arc<StateManager>,
    /// This session's own delivery handle, for direct replies.
    pub handle: &'a SessionHandle,
    /// Registration progress for this session.
    pub handshake: &'a mut HandshakeState,
    /// Remote address of the client.
    pub remote_addr: SocketAddr,
}

/// Placeholder host recorded for clients; no ident or reverse DNS is done.
pub(crate) const CLIENT_HOST: &str = "localhost";

impl Context<'_> {
    pub fn server_name(&self) -> &str {
        &self.state.server_name
    }

    /// The `nick!user@host` origin for lines this session's user sends.
    /// Only valid once registered.
    pub fn user_prefix(&self) -> Result<Prefix, HandlerError> {
        match (&self.handshake.nick, &self.handshake.username) {
            (Some(nick), Some(username)) => Ok(Prefix::user(nick, username, CLIENT_HOST)),
            _ => Err(HandlerError::NickOrUserMissing),
        }
    }

    /// The nick used in numeric replies; `*` until one is set.
    pub fn current_nick(&self) -> &str {
        self.handshake.nick.as_deref().unwrap_or("*")
    }

    /// Enqueue a direct reply to this session.
    pub async fn send(&self, msg: Message) {
        self.handle.deliver(msg).await;
    }

    /// Enqueue a numeric reply addressed to the current nick.
    pub async fn reply(&self, response: Response, params: Vec<String>) {
        let msg = Message::numeric(self.server_name(), response, self.current_nick(), params);
        self.send(msg).await;
    }
}

/// State tracked while a session registers.
#[derive(Debug, Default)]
pub struct HandshakeState {
    /// Nick accepted from NICK.
    pub nick: Option<String>,
    /// Username from USER.
    pub username: Option<String>,
    /// Realname from USER.
    pub realname: Option<String>,
    /// Whether registration completed (001–004 sent).
    pub registered: bool,
}

impl HandshakeState {
    /// Both NICK and USER accepted, registration still pending.
    pub fn can_register(&self) -> bool {
        self.nick.is_some() && self.username.is_some() && !self.registered
    }
}

/// Trait implemented by all command handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult;
}

/// Verbs a session may use before completing registration.
fn allowed_unregistered(verb: &str) -> bool {
    matches!(verb, "NICK" | "USER" | "CAP" | "PING" | "PONG" | "QUIT")
}

/// Registry of command handlers.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    /// Create a registry with every handler registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Connection / registration
        handlers.insert("NICK", Box::new(NickHandler));
        handlers.insert("USER", Box::new(UserHandler));
        handlers.insert("PING", Box::new(PingHandler));
        handlers.insert("PONG", Box::new(PongHandler));
        handlers.insert("QUIT", Box::new(QuitHandler));
        handlers.insert("CAP", Box::new(CapHandler));

        // Channels
        handlers.insert("JOIN", Box::new(JoinHandler));
        handlers.insert("PART", Box::new(PartHandler));
        handlers.insert("TOPIC", Box::new(TopicHandler));
        handlers.insert("MODE", Box::new(ModeHandler));
        handlers.insert("KICK", Box::new(KickHandler));

        // Messaging
        handlers.insert("PRIVMSG", Box::new(PrivmsgHandler));
        handlers.insert("NOTICE", Box::new(NoticeHandler));

        // Queries
        handlers.insert("ISON", Box::new(IsonHandler));

        Self { handlers }
    }

    /// Dispatch a message to its handler.
    ///
    /// Enforces the registration gate and answers 421 for unknown verbs.
    /// Prefixes on client lines are ignored per RFC 1459.
    pub async fn dispatch(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let verb = msg.command.verb().to_ascii_uppercase();

        let Some(handler) = self.handlers.get(verb.as_str()) else {
            return Err(HandlerError::UnknownCommand(if verb.is_empty() {
                "???".to_string()
            } else {
                verb
            }));
        };

        if !ctx.handshake.registered && !allowed_unregistered(&verb) {
            return Err(HandlerError::NotRegistered);
        }

        handler.handle(ctx, msg).await
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_registration_verbs() {
        for verb in ["NICK", "USER", "CAP", "PING", "PONG", "QUIT"] {
            assert!(allowed_unregistered(verb), "{verb} should be allowed");
        }
        for verb in ["JOIN", "PART", "PRIVMSG", "TOPIC", "MODE", "KICK", "ISON"] {
            assert!(!allowed_unregistered(verb), "{verb} should be gated");
        }
    }

    #[test]
    fn handshake_completion_requires_both_commands() {
        let mut hs = HandshakeState::default();
        assert!(!hs.can_register());

        hs.nick = Some("alice".into());
        assert!(!hs.can_register());

        hs.username = Some("alice".into());
        assert!(hs.can_register());

        hs.registered = true;
        assert!(!hs.can_register());
    }
}

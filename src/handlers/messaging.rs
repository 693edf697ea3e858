//! Messaging handlers: PRIVMSG and NOTICE.
//!
//! Both share one routing path; they differ in the stored message kind
//! and in that NOTICE never generates error replies.

use async_trait::async_trait;
use gossip_proto::{Command, Message};

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::{MessageKind, deliver_all};

/// Whether the target names a channel.
fn is_channel(target: &str) -> bool {
    target.starts_with('#')
}

/// Route a message to a channel (all members except the sender) or to a
/// user (all of their sessions), storing it either way.
async fn route_message(
    ctx: &Context<'_>,
    target: &str,
    text: &str,
    notice: bool,
) -> HandlerResult {
    let nick = ctx
        .handshake
        .nick
        .as_deref()
        .ok_or(HandlerError::NickOrUserMissing)?;
    let prefix = ctx.user_prefix()?;

    let recipients = if is_channel(target) {
        let kind = if notice {
            MessageKind::Notice
        } else {
            MessageKind::Channel
        };
        ctx.state.channel_message(nick, target, text, kind).await?
    } else {
        let kind = if notice {
            MessageKind::Notice
        } else {
            MessageKind::Private
        };
        ctx.state.private_message(nick, target, text, kind).await?
    };

    let command = if notice {
        Command::NOTICE(target.to_string(), text.to_string())
    } else {
        Command::PRIVMSG(target.to_string(), text.to_string())
    };
    let line = Message::new(command).with_prefix(prefix);
    deliver_all(&recipients, &line).await;
    Ok(())
}

/// Handler for PRIVMSG.
pub struct PrivmsgHandler;

#[async_trait]
impl Handler for PrivmsgHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::PRIVMSG(target, text) = &msg.command else {
            return Err(HandlerError::NeedMoreParams);
        };
        route_message(ctx, target, text, false).await
    }
}

/// Handler for NOTICE. Routing errors are swallowed: the protocol
/// forbids automatic replies to NOTICE.
pub struct NoticeHandler;

#[async_trait]
impl Handler for NoticeHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::NOTICE(target, text) = &msg.command else {
            return Ok(());
        };
        let _ = route_message(ctx, target, text, true).await;
        Ok(())
    }
}

//! Channel command handlers: JOIN, PART, TOPIC, KICK.

use async_trait::async_trait;
use gossip_proto::{Command, Message, Prefix, Response};
use tracing::debug;

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::{JoinOutcome, MessageKind, StoredMessage, deliver_all};

/// Handler for JOIN. Accepts comma-separated channel and key lists.
pub struct JoinHandler;

#[async_trait]
impl Handler for JoinHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::JOIN(channels, keys) = &msg.command else {
            return Err(HandlerError::NeedMoreParams);
        };
        let channels = channels.clone();
        let keys: Vec<String> = keys
            .as_deref()
            .map(|k| k.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        for (i, channel) in channels.split(',').enumerate() {
            let channel = channel.trim();
            if channel.is_empty() {
                continue;
            }
            if !channel.starts_with('#') {
                ctx.reply(
                    Response::ERR_NOSUCHCHANNEL,
                    vec![channel.to_string(), "Invalid channel name".into()],
                )
                .await;
                continue;
            }

            let key = keys.get(i).map(String::as_str).filter(|k| !k.is_empty());
            if let Err(e) = join_one(ctx, channel, key).await {
                // Per-channel failure: report it and keep going down the list.
                if let Some(reply) = e.to_irc_reply(ctx.server_name(), ctx.current_nick(), "JOIN") {
                    ctx.send(reply).await;
                }
            }
        }
        Ok(())
    }
}

/// Join a single channel and emit the join flow for it.
async fn join_one(ctx: &mut Context<'_>, channel: &str, key: Option<&str>) -> HandlerResult {
    let nick = ctx
        .handshake
        .nick
        .clone()
        .ok_or(HandlerError::NickOrUserMissing)?;
    let prefix = ctx.user_prefix()?;

    let outcome = ctx.state.join_channel(&nick, channel, key).await?;

    if outcome.newly_joined {
        let line = Message::new(Command::JOIN(outcome.canonical.clone(), None))
            .with_prefix(prefix.clone());
        deliver_all(&outcome.recipients, &line).await;
        send_topic_and_names(ctx, &outcome).await;
    } else if outcome.rejoined {
        // Reconnect after a transport loss: only the joining session needs
        // the join flow again, plus whatever it missed.
        let line =
            Message::new(Command::JOIN(outcome.canonical.clone(), None)).with_prefix(prefix);
        ctx.send(line).await;
        send_topic_and_names(ctx, &outcome).await;
        for stored in &outcome.replay {
            ctx.send(replayed_line(stored, &outcome.canonical)).await;
        }
        if !outcome.replay.is_empty() {
            debug!(
                nick = %nick,
                channel = %outcome.canonical,
                count = outcome.replay.len(),
                "replayed missed messages"
            );
        }
    }
    // Already a member with no pending replay: JOIN is a no-op.

    Ok(())
}

/// Send the 332/331 topic reply and the 353/366 names block to the
/// joining session.
async fn send_topic_and_names(ctx: &Context<'_>, outcome: &JoinOutcome) {
    if outcome.topic.is_empty() {
        ctx.reply(
            Response::RPL_NOTOPIC,
            vec![outcome.canonical.clone(), "No topic is set".into()],
        )
        .await;
    } else {
        ctx.reply(
            Response::RPL_TOPIC,
            vec![outcome.canonical.clone(), outcome.topic.clone()],
        )
        .await;
    }

    ctx.reply(
        Response::RPL_NAMREPLY,
        vec![
            "=".to_string(),
            outcome.canonical.clone(),
            outcome.names.join(" "),
        ],
    )
    .await;
    ctx.reply(
        Response::RPL_ENDOFNAMES,
        vec![outcome.canonical.clone(), "End of /NAMES list".into()],
    )
    .await;
}

/// Format a stored message for replay, keeping the prefix it was
/// originally sent with.
fn replayed_line(stored: &StoredMessage, channel: &str) -> Message {
    let prefix = Prefix::user(&stored.sender.nick, &stored.sender.username, &stored.sender.host);
    let command = match stored.kind {
        MessageKind::Notice => Command::NOTICE(channel.to_string(), stored.content.clone()),
        _ => Command::PRIVMSG(channel.to_string(), stored.content.clone()),
    };
    Message::new(command).with_prefix(prefix)
}

/// Handler for PART. Accepts a comma-separated channel list.
pub struct PartHandler;

#[async_trait]
impl Handler for PartHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::PART(channels, reason) = &msg.command else {
            return Err(HandlerError::NeedMoreParams);
        };
        let channels = channels.clone();
        let reason = reason.clone();
        let nick = ctx
            .handshake
            .nick
            .clone()
            .ok_or(HandlerError::NickOrUserMissing)?;
        let prefix = ctx.user_prefix()?;

        for channel in channels.split(',') {
            let channel = channel.trim();
            if channel.is_empty() {
                continue;
            }

            match ctx.state.part_channel(&nick, channel).await {
                Ok(outcome) => {
                    let line =
                        Message::new(Command::PART(outcome.canonical.clone(), reason.clone()))
                            .with_prefix(prefix.clone());
                    deliver_all(&outcome.recipients, &line).await;
                }
                Err(e) => {
                    if let Some(reply) =
                        e.to_irc_reply(ctx.server_name(), ctx.current_nick(), "PART")
                    {
                        ctx.send(reply).await;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Handler for TOPIC: query without an argument, set with one.
pub struct TopicHandler;

#[async_trait]
impl Handler for TopicHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::TOPIC(channel, new_topic) = &msg.command else {
            return Err(HandlerError::NeedMoreParams);
        };
        let (channel, new_topic) = (channel.clone(), new_topic.clone());
        let nick = ctx
            .handshake
            .nick
            .clone()
            .ok_or(HandlerError::NickOrUserMissing)?;

        match new_topic {
            None => {
                let (canonical, topic) = ctx.state.topic(&channel).await?;
                if topic.is_empty() {
                    ctx.reply(
                        Response::RPL_NOTOPIC,
                        vec![canonical, "No topic is set".into()],
                    )
                    .await;
                } else {
                    ctx.reply(Response::RPL_TOPIC, vec![canonical, topic]).await;
                }
            }
            Some(text) => {
                let prefix = ctx.user_prefix()?;
                let outcome = ctx.state.set_topic(&channel, &nick, &text).await?;
                let line =
                    Message::new(Command::TOPIC(outcome.canonical.clone(), Some(text.clone())))
                        .with_prefix(prefix);
                deliver_all(&outcome.recipients, &line).await;
            }
        }
        Ok(())
    }
}

/// Handler for KICK. Operator-only; the kicked user sees the line too.
pub struct KickHandler;

#[async_trait]
impl Handler for KickHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::KICK(channel, target, reason) = &msg.command else {
            return Err(HandlerError::NeedMoreParams);
        };
        let (channel, target) = (channel.clone(), target.clone());
        let nick = ctx
            .handshake
            .nick
            .clone()
            .ok_or(HandlerError::NickOrUserMissing)?;
        let reason = reason.clone().unwrap_or_else(|| nick.clone());
        let prefix = ctx.user_prefix()?;

        let outcome = ctx.state.kick_user(&channel, &nick, &target).await?;
        let line = Message::new(Command::KICK(
            outcome.canonical.clone(),
            outcome.target_nick.clone(),
            Some(reason),
        ))
        .with_prefix(prefix);
        deliver_all(&outcome.recipients, &line).await;
        Ok(())
    }
}

//! Connection and registration handlers.
//!
//! NICK, USER, PING, PONG, QUIT, and the CAP negotiation stubs.

use async_trait::async_trait;
use gossip_proto::{Command, Message, Response};
use tracing::{debug, info};

use super::{CLIENT_HOST, Context, Handler, HandshakeState};
use crate::error::{HandlerError, HandlerResult};
use crate::state::NickClaim;

/// Server version advertised in the welcome burst.
const SERVER_VERSION: &str = concat!("gossipd-", env!("CARGO_PKG_VERSION"));

/// Validate a nickname: a letter followed by up to eight letters, digits,
/// underscores, or hyphens.
fn is_valid_nick(nick: &str) -> bool {
    if nick.is_empty() || nick.len() > 9 {
        return false;
    }
    let mut chars = nick.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Handler for NICK.
pub struct NickHandler;

#[async_trait]
impl Handler for NickHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::NICK(nick) = &msg.command else {
            return Err(HandlerError::NoNicknameGiven);
        };
        let nick = nick.clone();

        if !is_valid_nick(&nick) {
            return Err(HandlerError::ErroneousNickname(nick));
        }

        if ctx.handshake.registered {
            return rename_registered(ctx, &nick).await;
        }

        // Pre-registration: reserve (or adopt) the nickname.
        if ctx.handshake.nick.as_deref() == Some(nick.as_str()) {
            return Ok(());
        }
        match ctx.state.claim_nick(&nick).await {
            Ok(claim) => {
                if claim == NickClaim::Adopted {
                    debug!(nick = %nick, "reconnecting client adopted its old nick");
                }
                if let Some(old) = ctx.handshake.nick.take() {
                    ctx.state.release_reservation(&old).await;
                }
                ctx.handshake.nick = Some(nick.clone());
                debug!(nick = %nick, session = %ctx.session_id, "nick set");
            }
            Err(_) => return Err(HandlerError::NicknameInUse(nick)),
        }

        if ctx.handshake.can_register() {
            send_welcome_burst(ctx).await?;
        }
        Ok(())
    }
}

/// Rename a registered user and broadcast the change to every channel
/// they are in, their own sessions included.
async fn rename_registered(ctx: &mut Context<'_>, new_nick: &str) -> HandlerResult {
    let old_nick = ctx
        .handshake
        .nick
        .clone()
        .ok_or(HandlerError::NickOrUserMissing)?;
    if old_nick == new_nick {
        return Ok(());
    }

    let outcome = ctx
        .state
        .rename_user(&old_nick, new_nick)
        .await
        .map_err(|e| match e {
            crate::error::StateError::AlreadyExists => {
                HandlerError::NicknameInUse(new_nick.to_string())
            }
            crate::error::StateError::NotFound => HandlerError::NickOrUserMissing,
        })?;
    ctx.handshake.nick = Some(new_nick.to_string());

    let line = Message::new(Command::NICK(new_nick.to_string())).with_prefix(outcome.old_prefix);
    crate::state::deliver_all(&outcome.recipients, &line).await;
    Ok(())
}

/// Handler for USER.
pub struct UserHandler;

#[async_trait]
impl Handler for UserHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.handshake.registered {
            return Err(HandlerError::AlreadyRegistered);
        }
        let Command::USER(username, _mode, _unused, realname) = &msg.command else {
            return Err(HandlerError::NeedMoreParams);
        };
        if username.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }

        ctx.handshake.username = Some(username.clone());
        ctx.handshake.realname = Some(realname.clone());
        debug!(user = %username, realname = %realname, "user info set");

        if ctx.handshake.can_register() {
            send_welcome_burst(ctx).await?;
        }
        Ok(())
    }
}

/// Complete registration: attach the session to its user record and emit
/// the 001–004 welcome block.
async fn send_welcome_burst(ctx: &mut Context<'_>) -> HandlerResult {
    let HandshakeState {
        nick: Some(nick),
        username: Some(username),
        realname: Some(realname),
        ..
    } = &*ctx.handshake
    else {
        return Err(HandlerError::NickOrUserMissing);
    };
    let (nick, username, realname) = (nick.clone(), username.clone(), realname.clone());

    ctx.state
        .complete_registration(
            ctx.session_id,
            ctx.handle.clone(),
            &nick,
            &username,
            &realname,
            CLIENT_HOST,
        )
        .await
        .map_err(|_| HandlerError::NickOrUserMissing)?;
    ctx.handshake.registered = true;

    info!(nick = %nick, user = %username, session = %ctx.session_id, "client registered");

    let server = ctx.server_name().to_string();
    ctx.reply(
        Response::RPL_WELCOME,
        vec![format!(
            "Welcome to the Gossip IRC Network {nick}!{username}@{CLIENT_HOST}"
        )],
    )
    .await;
    ctx.reply(
        Response::RPL_YOURHOST,
        vec![format!("Your host is {server}, running version {SERVER_VERSION}")],
    )
    .await;
    ctx.reply(
        Response::RPL_CREATED,
        vec![format!(
            "This server was created {}",
            ctx.state.created_at.to_rfc2822()
        )],
    )
    .await;
    ctx.reply(
        Response::RPL_MYINFO,
        vec![
            server,
            SERVER_VERSION.to_string(),
            "aio".to_string(),
            "bikmnopstv".to_string(),
        ],
    )
    .await;

    Ok(())
}

/// Handler for PING.
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let token = match &msg.command {
            Command::PING(token) => token.as_str(),
            _ => "",
        };
        ctx.send(Message::pong(token)).await;
        Ok(())
    }
}

/// Handler for PONG. Receipt alone refreshes the session's activity
/// clock, which the dispatcher tracks.
pub struct PongHandler;

#[async_trait]
impl Handler for PongHandler {
    async fn handle(&self, _ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        Ok(())
    }
}

/// Handler for QUIT. Signals the session loop, which runs the teardown.
pub struct QuitHandler;

#[async_trait]
impl Handler for QuitHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let reason = match &msg.command {
            Command::QUIT(reason) => reason.clone(),
            _ => None,
        };
        info!(nick = ?ctx.handshake.nick, reason = ?reason, "client quit");
        Err(HandlerError::Quit(reason))
    }
}

/// Handler for CAP. No capabilities are advertised; LS and REQ get empty
/// replies and END is a no-op, enough for clients that negotiate before
/// registering.
pub struct CapHandler;

#[async_trait]
impl Handler for CapHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::CAP(subcommand, _args) = &msg.command else {
            return Err(HandlerError::NeedMoreParams);
        };

        match subcommand.to_ascii_uppercase().as_str() {
            "LS" => {
                ctx.send(Message::new(Command::CAP(
                    "*".into(),
                    vec!["LS".into(), String::new()],
                )))
                .await;
            }
            "REQ" => {
                ctx.send(Message::new(Command::CAP(
                    "*".into(),
                    vec!["ACK".into(), String::new()],
                )))
                .await;
            }
            "END" => {}
            other => {
                debug!(subcommand = %other, "ignoring unknown CAP subcommand");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nick_validation_follows_the_grammar() {
        assert!(is_valid_nick("alice"));
        assert!(is_valid_nick("a"));
        assert!(is_valid_nick("A1_b-c"));
        assert!(is_valid_nick("abcdefghi")); // 9 chars, at the limit

        assert!(!is_valid_nick(""));
        assert!(!is_valid_nick("abcdefghij")); // 10 chars
        assert!(!is_valid_nick("1alice")); // must start with a letter
        assert!(!is_valid_nick("-alice"));
        assert!(!is_valid_nick("al ice"));
        assert!(!is_valid_nick("al!ce"));
    }
}

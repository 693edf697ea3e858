//! MODE handler for channel and user targets.

use async_trait::async_trait;
use gossip_proto::{Command, Message, Response, irc_eq};

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::deliver_all;

/// Handler for MODE.
///
/// Channel form: a bare `MODE #chan` answers 324; writes support the
/// argument modes `k o v b l` and the flag toggles `i m n p s t`, each
/// broadcast to the channel on success. User form: a bare `MODE nick`
/// for oneself answers 221; user-mode writes answer 501.
pub struct ModeHandler;

#[async_trait]
impl Handler for ModeHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::MODE(target, args) = &msg.command else {
            return Err(HandlerError::NeedMoreParams);
        };
        let (target, args) = (target.clone(), args.clone());
        let nick = ctx
            .handshake
            .nick
            .clone()
            .ok_or(HandlerError::NickOrUserMissing)?;

        if target.starts_with('#') {
            return channel_mode(ctx, &nick, &target, &args).await;
        }

        if irc_eq(&target, &nick) {
            if args.is_empty() {
                let modes = match ctx.state.users.get(&nick).await {
                    Some(user) => user.read().await.modes.as_mode_string(),
                    None => "+".to_string(),
                };
                ctx.reply(Response::RPL_UMODEIS, vec![modes]).await;
                return Ok(());
            }
            // User-mode writes are not supported.
            return Err(HandlerError::UmodeUnknownFlag);
        }

        Err(HandlerError::NoSuchChannel(target))
    }
}

async fn channel_mode(
    ctx: &Context<'_>,
    nick: &str,
    channel: &str,
    args: &[String],
) -> HandlerResult {
    if args.is_empty() {
        let (canonical, mode_params) = ctx.state.channel_modes(channel, nick).await?;
        let mut params = vec![canonical];
        params.extend(mode_params);
        ctx.reply(Response::RPL_CHANNELMODEIS, params).await;
        return Ok(());
    }

    let flag = args[0].as_str();
    let arg = args.get(1).map(String::as_str);
    let outcome = ctx.state.apply_channel_mode(channel, nick, flag, arg).await?;

    let line = Message::new(Command::MODE(outcome.canonical.clone(), outcome.args.clone()))
        .with_prefix(ctx.user_prefix()?);
    deliver_all(&outcome.recipients, &line).await;
    Ok(())
}

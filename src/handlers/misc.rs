//! Miscellaneous query handlers.

use async_trait::async_trait;
use gossip_proto::{Command, Message, Response};

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};

/// Handler for ISON: answers 303 with the queried nicks that are online,
/// case preserved as the client typed them.
pub struct IsonHandler;

#[async_trait]
impl Handler for IsonHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::ISON(nicks) = &msg.command else {
            return Err(HandlerError::NeedMoreParams);
        };

        let mut online = Vec::new();
        for nick in nicks {
            if ctx.state.users.exists(nick).await {
                online.push(nick.clone());
            }
        }

        ctx.reply(Response::RPL_ISON, vec![online.join(" ")]).await;
        Ok(())
    }
}

//! Typed IRC commands.
//!
//! [`Command::new`] never fails: a verb the server does not model, or a
//! known verb with too few parameters for its variant, falls back to
//! [`Command::Raw`] and the engine decides which numeric to answer.

use std::borrow::Cow;

use crate::response::Response;

/// A parsed IRC command with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `NICK <nickname>`
    NICK(String),
    /// `USER <user> <mode> <unused> :<realname>`
    USER(String, String, String, String),
    /// `JOIN <channels> [<keys>]` (comma-separated lists)
    JOIN(String, Option<String>),
    /// `PART <channels> [:<reason>]`
    PART(String, Option<String>),
    /// `PRIVMSG <target> :<text>`
    PRIVMSG(String, String),
    /// `NOTICE <target> :<text>`
    NOTICE(String, String),
    /// `TOPIC <channel> [:<topic>]`
    TOPIC(String, Option<String>),
    /// `MODE <target> [<flags> [<args>…]]`
    MODE(String, Vec<String>),
    /// `KICK <channel> <nick> [:<reason>]`
    KICK(String, String, Option<String>),
    /// `ISON <nick> [<nick>…]`
    ISON(Vec<String>),
    /// `QUIT [:<reason>]`
    QUIT(Option<String>),
    /// `PING :<token>`
    PING(String),
    /// `PONG :<token>`
    PONG(String),
    /// `CAP <subcommand> [<args>…]`
    CAP(String, Vec<String>),
    /// A numeric server reply.
    Response(Response, Vec<String>),
    /// Anything else, kept verbatim.
    Raw(String, Vec<String>),
}

impl Command {
    /// Build a command from an uppercased verb and its parameter list.
    pub fn new(verb: &str, mut params: Vec<String>) -> Command {
        // Three-digit verbs are numeric replies.
        if verb.len() == 3 && verb.bytes().all(|b| b.is_ascii_digit()) {
            if let Some(resp) = verb.parse::<u16>().ok().and_then(Response::from_code) {
                return Command::Response(resp, params);
            }
            return Command::Raw(verb.to_string(), params);
        }

        match (verb, params.len()) {
            ("NICK", 1..) => Command::NICK(params.swap_remove(0)),
            ("USER", 4..) => {
                let mut it = params.drain(..4);
                Command::USER(
                    it.next().unwrap_or_default(),
                    it.next().unwrap_or_default(),
                    it.next().unwrap_or_default(),
                    it.next().unwrap_or_default(),
                )
            }
            ("JOIN", 1) => Command::JOIN(params.swap_remove(0), None),
            ("JOIN", 2..) => {
                let keys = params.swap_remove(1);
                Command::JOIN(params.swap_remove(0), Some(keys))
            }
            ("PART", 1) => Command::PART(params.swap_remove(0), None),
            ("PART", 2..) => {
                let reason = params.swap_remove(1);
                Command::PART(params.swap_remove(0), Some(reason))
            }
            ("PRIVMSG", 2..) => {
                let text = params.swap_remove(1);
                Command::PRIVMSG(params.swap_remove(0), text)
            }
            ("NOTICE", 2..) => {
                let text = params.swap_remove(1);
                Command::NOTICE(params.swap_remove(0), text)
            }
            ("TOPIC", 1) => Command::TOPIC(params.swap_remove(0), None),
            ("TOPIC", 2..) => {
                let topic = params.swap_remove(1);
                Command::TOPIC(params.swap_remove(0), Some(topic))
            }
            ("MODE", 1..) => {
                let target = params.remove(0);
                Command::MODE(target, params)
            }
            ("KICK", 2) => {
                let nick = params.swap_remove(1);
                Command::KICK(params.swap_remove(0), nick, None)
            }
            ("KICK", 3..) => {
                let reason = params.swap_remove(2);
                let nick = params.swap_remove(1);
                Command::KICK(params.swap_remove(0), nick, Some(reason))
            }
            ("ISON", 1..) => Command::ISON(params),
            ("QUIT", 0) => Command::QUIT(None),
            ("QUIT", 1..) => Command::QUIT(Some(params.swap_remove(0))),
            ("PING", 1..) => Command::PING(params.swap_remove(0)),
            ("PONG", 1..) => Command::PONG(params.swap_remove(0)),
            ("CAP", 1..) => {
                let sub = params.remove(0);
                Command::CAP(sub, params)
            }
            _ => Command::Raw(verb.to_string(), params),
        }
    }

    /// The command verb, for dispatch. Numeric replies have no verb.
    pub fn verb(&self) -> &str {
        match self {
            Command::NICK(..) => "NICK",
            Command::USER(..) => "USER",
            Command::JOIN(..) => "JOIN",
            Command::PART(..) => "PART",
            Command::PRIVMSG(..) => "PRIVMSG",
            Command::NOTICE(..) => "NOTICE",
            Command::TOPIC(..) => "TOPIC",
            Command::MODE(..) => "MODE",
            Command::KICK(..) => "KICK",
            Command::ISON(..) => "ISON",
            Command::QUIT(..) => "QUIT",
            Command::PING(..) => "PING",
            Command::PONG(..) => "PONG",
            Command::CAP(..) => "CAP",
            Command::Response(..) => "",
            Command::Raw(verb, _) => verb,
        }
    }

    /// The wire form: verb token, parameters, and whether the final
    /// parameter is a trailing text that must be `:`-prefixed even when
    /// it contains no space.
    pub(crate) fn wire(&self) -> (Cow<'_, str>, Vec<&str>, bool) {
        match self {
            Command::NICK(nick) => ("NICK".into(), vec![nick.as_str()], true),
            Command::USER(user, mode, unused, realname) => (
                "USER".into(),
                vec![user, mode, unused, realname],
                true,
            ),
            Command::JOIN(channels, keys) => {
                let mut params = vec![channels.as_str()];
                params.extend(keys.as_deref());
                ("JOIN".into(), params, false)
            }
            Command::PART(channels, reason) => {
                let mut params = vec![channels.as_str()];
                params.extend(reason.as_deref());
                ("PART".into(), params, reason.is_some())
            }
            Command::PRIVMSG(target, text) => ("PRIVMSG".into(), vec![target, text], true),
            Command::NOTICE(target, text) => ("NOTICE".into(), vec![target, text], true),
            Command::TOPIC(channel, topic) => {
                let mut params = vec![channel.as_str()];
                params.extend(topic.as_deref());
                ("TOPIC".into(), params, topic.is_some())
            }
            Command::MODE(target, args) => {
                let mut params = vec![target.as_str()];
                params.extend(args.iter().map(String::as_str));
                ("MODE".into(), params, false)
            }
            Command::KICK(channel, nick, reason) => {
                let mut params = vec![channel.as_str(), nick.as_str()];
                params.extend(reason.as_deref());
                ("KICK".into(), params, reason.is_some())
            }
            Command::ISON(nicks) => (
                "ISON".into(),
                nicks.iter().map(String::as_str).collect(),
                false,
            ),
            Command::QUIT(reason) => (
                "QUIT".into(),
                reason.as_deref().into_iter().collect(),
                reason.is_some(),
            ),
            Command::PING(token) => ("PING".into(), vec![token.as_str()], true),
            Command::PONG(token) => ("PONG".into(), vec![token.as_str()], true),
            Command::CAP(sub, args) => {
                let mut params = vec![sub.as_str()];
                params.extend(args.iter().map(String::as_str));
                ("CAP".into(), params, false)
            }
            Command::Response(resp, params) => (
                format!("{:03}", resp.code()).into(),
                params.iter().map(String::as_str).collect(),
                false,
            ),
            Command::Raw(verb, params) => (
                verb.as_str().into(),
                params.iter().map(String::as_str).collect(),
                false,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_typed_variants() {
        let cmd = Command::new("NICK", vec!["alice".into()]);
        assert_eq!(cmd, Command::NICK("alice".into()));

        let cmd = Command::new(
            "USER",
            vec!["alice".into(), "0".into(), "*".into(), "Alice".into()],
        );
        assert!(matches!(cmd, Command::USER(..)));

        let cmd = Command::new("KICK", vec!["#x".into(), "bob".into()]);
        assert_eq!(cmd, Command::KICK("#x".into(), "bob".into(), None));
    }

    #[test]
    fn short_params_fall_back_to_raw() {
        assert_eq!(Command::new("NICK", vec![]), Command::Raw("NICK".into(), vec![]));
        assert_eq!(
            Command::new("USER", vec!["a".into(), "b".into()]),
            Command::Raw("USER".into(), vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn numeric_verbs_become_responses() {
        let cmd = Command::new("001", vec!["alice".into(), "Welcome".into()]);
        assert!(matches!(cmd, Command::Response(Response::RPL_WELCOME, _)));

        // Unmodeled numerics stay raw
        let cmd = Command::new("999", vec![]);
        assert!(matches!(cmd, Command::Raw(_, _)));
    }

    #[test]
    fn unknown_verbs_stay_raw() {
        let cmd = Command::new("WOBBLE", vec!["x".into()]);
        assert_eq!(cmd, Command::Raw("WOBBLE".into(), vec!["x".into()]));
        assert_eq!(cmd.verb(), "WOBBLE");
    }
}

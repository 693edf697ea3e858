//! Message prefixes.
//!
//! Server-originated lines carry a prefix naming either the server or the
//! originating user. Prefixes on client-originated lines are parsed but
//! ignored by the server.

use std::fmt;
use std::str::FromStr;

/// The source of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// A server name, e.g. `irc.gossip.local`.
    ServerName(String),
    /// A user origin as `nick!user@host`.
    Nickname(String, String, String),
}

impl Prefix {
    /// Build a `nick!user@host` prefix.
    pub fn user(nick: impl Into<String>, user: impl Into<String>, host: impl Into<String>) -> Self {
        Prefix::Nickname(nick.into(), user.into(), host.into())
    }

    /// The nickname, if this is a user prefix.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(nick, _, _) => Some(nick),
            Prefix::ServerName(_) => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => write!(f, "{name}"),
            Prefix::Nickname(nick, user, host) => write!(f, "{nick}!{user}@{host}"),
        }
    }
}

impl FromStr for Prefix {
    type Err = std::convert::Infallible;

    /// Parse a prefix token (without the leading `:`).
    ///
    /// Anything without a `!user@host` part is treated as a server name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((nick, rest)) = s.split_once('!') {
            if let Some((user, host)) = rest.split_once('@') {
                return Ok(Prefix::Nickname(
                    nick.to_string(),
                    user.to_string(),
                    host.to_string(),
                ));
            }
        }
        Ok(Prefix::ServerName(s.to_string()))
    }
}

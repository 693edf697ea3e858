//! Unified error handling for gossipd.
//!
//! Engine errors are converted into numeric replies at the dispatch
//! boundary; registry errors are sentinel values the engine maps onto the
//! protocol taxonomy. Transport errors never appear here, they terminate
//! the session directly.

use gossip_proto::{Message, Response};
use thiserror::Error;

/// Errors that can occur during command handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not enough parameters")]
    NeedMoreParams,

    #[error("no nickname given")]
    NoNicknameGiven,

    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    #[error("nickname in use: {0}")]
    NicknameInUse(String),

    #[error("not registered")]
    NotRegistered,

    #[error("already registered")]
    AlreadyRegistered,

    #[error("no such nick: {0}")]
    NoSuchNick(String),

    #[error("no such channel: {0}")]
    NoSuchChannel(String),

    #[error("not on channel: {0}")]
    NotOnChannel(String),

    #[error("not channel operator on {0}")]
    ChanOpPrivsNeeded(String),

    #[error("user {nick} is not on {channel}")]
    UserNotInChannel { nick: String, channel: String },

    #[error("bad channel key: {0}")]
    BadChannelKey(String),

    #[error("banned from channel: {0}")]
    BannedFromChan(String),

    #[error("unknown channel mode flag: {0}")]
    UnknownMode(String),

    #[error("unknown user mode flag")]
    UmodeUnknownFlag,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Client requested disconnect; carries the quit reason.
    #[error("client quit: {0:?}")]
    Quit(Option<String>),

    #[error("internal error: nick or user missing after registration")]
    NickOrUserMissing,
}

impl HandlerError {
    /// A static code string for log labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams => "need_more_params",
            Self::NoNicknameGiven => "no_nickname_given",
            Self::ErroneousNickname(_) => "erroneous_nickname",
            Self::NicknameInUse(_) => "nickname_in_use",
            Self::NotRegistered => "not_registered",
            Self::AlreadyRegistered => "already_registered",
            Self::NoSuchNick(_) => "no_such_nick",
            Self::NoSuchChannel(_) => "no_such_channel",
            Self::NotOnChannel(_) => "not_on_channel",
            Self::ChanOpPrivsNeeded(_) => "chanop_privs_needed",
            Self::UserNotInChannel { .. } => "user_not_in_channel",
            Self::BadChannelKey(_) => "bad_channel_key",
            Self::BannedFromChan(_) => "banned_from_chan",
            Self::UnknownMode(_) => "unknown_mode",
            Self::UmodeUnknownFlag => "umode_unknown_flag",
            Self::UnknownCommand(_) => "unknown_command",
            Self::Quit(_) => "quit",
            Self::NickOrUserMissing => "nick_or_user_missing",
        }
    }

    /// Convert to a numeric error reply.
    ///
    /// Returns `None` for errors with no client-visible numeric (quit,
    /// send failures, internal inconsistencies).
    pub fn to_irc_reply(&self, server: &str, nick: &str, cmd: &str) -> Option<Message> {
        let numeric =
            |response, params: Vec<String>| Some(Message::numeric(server, response, nick, params));

        match self {
            Self::NeedMoreParams => numeric(
                Response::ERR_NEEDMOREPARAMS,
                vec![cmd.to_string(), "Not enough parameters".into()],
            ),
            Self::NoNicknameGiven => numeric(
                Response::ERR_NONICKNAMEGIVEN,
                vec!["No nickname given".into()],
            ),
            Self::ErroneousNickname(bad) => numeric(
                Response::ERR_ERRONEUSNICKNAME,
                vec![bad.clone(), "Erroneous nickname".into()],
            ),
            Self::NicknameInUse(bad) => numeric(
                Response::ERR_NICKNAMEINUSE,
                vec![bad.clone(), "Nickname is already in use".into()],
            ),
            Self::NotRegistered => numeric(
                Response::ERR_NOTREGISTERED,
                vec!["You have not registered".into()],
            ),
            Self::AlreadyRegistered => numeric(
                Response::ERR_ALREADYREGISTRED,
                vec!["You may not reregister".into()],
            ),
            Self::NoSuchNick(target) => numeric(
                Response::ERR_NOSUCHNICK,
                vec![target.clone(), "No such nick/channel".into()],
            ),
            Self::NoSuchChannel(channel) => numeric(
                Response::ERR_NOSUCHCHANNEL,
                vec![channel.clone(), "No such channel".into()],
            ),
            Self::NotOnChannel(channel) => numeric(
                Response::ERR_NOTONCHANNEL,
                vec![channel.clone(), "You're not on that channel".into()],
            ),
            Self::ChanOpPrivsNeeded(channel) => numeric(
                Response::ERR_CHANOPRIVSNEEDED,
                vec![channel.clone(), "You're not channel operator".into()],
            ),
            Self::UserNotInChannel {
                nick: target,
                channel,
            } => numeric(
                Response::ERR_USERNOTINCHANNEL,
                vec![
                    target.clone(),
                    channel.clone(),
                    "They aren't on that channel".into(),
                ],
            ),
            Self::BadChannelKey(channel) => numeric(
                Response::ERR_BADCHANNELKEY,
                vec![channel.clone(), "Cannot join channel (+k) - bad key".into()],
            ),
            Self::BannedFromChan(channel) => numeric(
                Response::ERR_BANNEDFROMCHAN,
                vec![channel.clone(), "Cannot join channel (+b)".into()],
            ),
            Self::UnknownMode(flag) => numeric(
                Response::ERR_UNKNOWNMODE,
                vec![flag.clone(), "Unknown MODE flag".into()],
            ),
            Self::UmodeUnknownFlag => numeric(
                Response::ERR_UMODEUNKNOWNFLAG,
                vec!["Unknown MODE flag".into()],
            ),
            Self::UnknownCommand(verb) => numeric(
                Response::ERR_UNKNOWNCOMMAND,
                vec![verb.clone(), "Unknown command".into()],
            ),

            // No client-visible numeric for these.
            Self::Quit(_) | Self::NickOrUserMissing => None,
        }
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Registry operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("already exists")]
    AlreadyExists,

    #[error("not found")]
    NotFound,
}

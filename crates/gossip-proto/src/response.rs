//! IRC numeric response codes.
//!
//! Three-digit numerics defined by RFC 1459/2812, restricted to the set
//! this server emits. The wire form is
//! `:<server> NNN <nickname> <params…> [:<trailing>]`.

#![allow(non_camel_case_types)]

/// A numeric server response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Response {
    // === Connection registration ===
    /// 001 - Welcome to the network
    RPL_WELCOME = 1,
    /// 002 - Your host
    RPL_YOURHOST = 2,
    /// 003 - Server creation time
    RPL_CREATED = 3,
    /// 004 - Server name, version, supported modes
    RPL_MYINFO = 4,

    // === Command replies ===
    /// 221 - Current user modes
    RPL_UMODEIS = 221,
    /// 303 - ISON reply
    RPL_ISON = 303,
    /// 324 - Current channel modes
    RPL_CHANNELMODEIS = 324,
    /// 331 - No topic set
    RPL_NOTOPIC = 331,
    /// 332 - Channel topic
    RPL_TOPIC = 332,
    /// 353 - NAMES list entry
    RPL_NAMREPLY = 353,
    /// 366 - End of NAMES list
    RPL_ENDOFNAMES = 366,

    // === Error replies ===
    /// 401 - No such nick
    ERR_NOSUCHNICK = 401,
    /// 403 - No such channel
    ERR_NOSUCHCHANNEL = 403,
    /// 421 - Unknown command
    ERR_UNKNOWNCOMMAND = 421,
    /// 431 - No nickname given
    ERR_NONICKNAMEGIVEN = 431,
    /// 432 - Erroneous nickname
    ERR_ERRONEUSNICKNAME = 432,
    /// 433 - Nickname already in use
    ERR_NICKNAMEINUSE = 433,
    /// 441 - They aren't on that channel
    ERR_USERNOTINCHANNEL = 441,
    /// 442 - You're not on that channel
    ERR_NOTONCHANNEL = 442,
    /// 451 - You have not registered
    ERR_NOTREGISTERED = 451,
    /// 461 - Not enough parameters
    ERR_NEEDMOREPARAMS = 461,
    /// 462 - You may not reregister
    ERR_ALREADYREGISTRED = 462,
    /// 472 - Unknown channel mode flag
    ERR_UNKNOWNMODE = 472,
    /// 474 - Banned from channel (+b)
    ERR_BANNEDFROMCHAN = 474,
    /// 475 - Bad channel key (+k)
    ERR_BADCHANNELKEY = 475,
    /// 482 - Channel operator privileges needed
    ERR_CHANOPRIVSNEEDED = 482,
    /// 501 - Unknown user mode flag
    ERR_UMODEUNKNOWNFLAG = 501,
}

impl Response {
    /// The three-digit numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Whether this numeric is an error reply (4xx/5xx).
    pub fn is_error(self) -> bool {
        self.code() >= 400
    }

    /// Look up a numeric by code, for parsing server-originated lines.
    pub fn from_code(code: u16) -> Option<Response> {
        use Response::*;
        Some(match code {
            1 => RPL_WELCOME,
            2 => RPL_YOURHOST,
            3 => RPL_CREATED,
            4 => RPL_MYINFO,
            221 => RPL_UMODEIS,
            303 => RPL_ISON,
            324 => RPL_CHANNELMODEIS,
            331 => RPL_NOTOPIC,
            332 => RPL_TOPIC,
            353 => RPL_NAMREPLY,
            366 => RPL_ENDOFNAMES,
            401 => ERR_NOSUCHNICK,
            403 => ERR_NOSUCHCHANNEL,
            421 => ERR_UNKNOWNCOMMAND,
            431 => ERR_NONICKNAMEGIVEN,
            432 => ERR_ERRONEUSNICKNAME,
            433 => ERR_NICKNAMEINUSE,
            441 => ERR_USERNOTINCHANNEL,
            442 => ERR_NOTONCHANNEL,
            451 => ERR_NOTREGISTERED,
            461 => ERR_NEEDMOREPARAMS,
            462 => ERR_ALREADYREGISTRED,
            472 => ERR_UNKNOWNMODE,
            474 => ERR_BANNEDFROMCHAN,
            475 => ERR_BADCHANNELKEY,
            482 => ERR_CHANOPRIVSNEEDED,
            501 => ERR_UMODEUNKNOWNFLAG,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_rfc_numbers() {
        assert_eq!(Response::RPL_WELCOME.code(), 1);
        assert_eq!(Response::RPL_ISON.code(), 303);
        assert_eq!(Response::ERR_NICKNAMEINUSE.code(), 433);
        assert_eq!(Response::ERR_CHANOPRIVSNEEDED.code(), 482);
    }

    #[test]
    fn from_code_round_trips() {
        for resp in [
            Response::RPL_WELCOME,
            Response::RPL_CHANNELMODEIS,
            Response::ERR_BADCHANNELKEY,
            Response::ERR_UMODEUNKNOWNFLAG,
        ] {
            assert_eq!(Response::from_code(resp.code()), Some(resp));
        }
        assert_eq!(Response::from_code(999), None);
    }

    #[test]
    fn error_classification() {
        assert!(Response::ERR_NOSUCHNICK.is_error());
        assert!(!Response::RPL_TOPIC.is_error());
    }
}

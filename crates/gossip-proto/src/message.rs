//! Wire messages: parsing and serialization.

use std::fmt;
use std::str::FromStr;

use crate::command::Command;
use crate::error::ParseError;
use crate::prefix::Prefix;
use crate::response::Response;

/// Maximum line length in bytes, CRLF included (RFC 1459 §2.3).
pub const MAX_LINE_LEN: usize = 512;

/// Maximum number of parameters per message (RFC 1459 §2.3).
pub const MAX_PARAMS: usize = 15;

/// One protocol line: optional prefix plus a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<Prefix>,
    pub command: Command,
}

impl Message {
    /// A message with no prefix.
    pub fn new(command: Command) -> Message {
        Message {
            prefix: None,
            command,
        }
    }

    /// Attach a prefix.
    pub fn with_prefix(mut self, prefix: Prefix) -> Message {
        self.prefix = Some(prefix);
        self
    }

    /// `PING :<token>`
    pub fn ping(token: impl Into<String>) -> Message {
        Message::new(Command::PING(token.into()))
    }

    /// `PONG :<token>`
    pub fn pong(token: impl Into<String>) -> Message {
        Message::new(Command::PONG(token.into()))
    }

    /// A numeric reply from `server`, addressed to `nick`.
    pub fn numeric(
        server: impl Into<String>,
        response: Response,
        nick: impl Into<String>,
        params: impl IntoIterator<Item = String>,
    ) -> Message {
        let mut all = vec![nick.into()];
        all.extend(params);
        Message::new(Command::Response(response, all))
            .with_prefix(Prefix::ServerName(server.into()))
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Message {
        Message::new(command)
    }
}

impl FromStr for Message {
    type Err = ParseError;

    /// Parse one line. A trailing CRLF (or bare LF) is tolerated; the
    /// session layer is responsible for strict CRLF framing.
    fn from_str(s: &str) -> Result<Message, ParseError> {
        if s.len() > MAX_LINE_LEN {
            return Err(ParseError::LineTooLong {
                actual: s.len(),
                limit: MAX_LINE_LEN,
            });
        }

        let line = s
            .strip_suffix("\r\n")
            .or_else(|| s.strip_suffix('\n'))
            .unwrap_or(s);
        if line.is_empty() {
            return Err(ParseError::EmptyLine);
        }

        // Optional ":prefix "
        let (prefix, rest) = match line.strip_prefix(':') {
            Some(after) => {
                let (token, rest) = after.split_once(' ').ok_or(ParseError::MissingCommand)?;
                // Infallible by construction
                let prefix = token.parse::<Prefix>().unwrap_or_else(|e| match e {});
                (Some(prefix), rest.trim_start_matches(' '))
            }
            None => (None, line),
        };

        // Verb
        let (verb, mut rest) = match rest.split_once(' ') {
            Some((verb, rest)) => (verb, rest),
            None => (rest, ""),
        };
        if verb.is_empty() || !verb.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ParseError::InvalidCommand(verb.to_string()));
        }

        // Parameters; a ":"-led token starts the trailing parameter.
        let mut params: Vec<String> = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((token, tail)) => {
                    if !token.is_empty() {
                        params.push(token.to_string());
                    }
                    rest = tail;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }
        if params.len() > MAX_PARAMS {
            return Err(ParseError::TooManyParams(MAX_PARAMS));
        }

        Ok(Message {
            prefix,
            command: Command::new(&verb.to_ascii_uppercase(), params),
        })
    }
}

impl fmt::Display for Message {
    /// The wire form, without the CRLF terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }

        let (verb, params, force_trailing) = self.command.wire();
        write!(f, "{verb}")?;

        let last = params.len().saturating_sub(1);
        for (i, param) in params.iter().enumerate() {
            if i == last
                && (force_trailing
                    || param.is_empty()
                    || param.contains(' ')
                    || param.starts_with(':'))
            {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

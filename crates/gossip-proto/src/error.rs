//! Protocol parse errors.

use thiserror::Error;

/// Errors produced while parsing a wire line into a [`crate::Message`].
///
/// These are recoverable: the session logs them and keeps reading; a bad
/// line never disconnects the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    EmptyLine,

    #[error("line exceeds {limit} bytes (got {actual})")]
    LineTooLong { actual: usize, limit: usize },

    #[error("line has a prefix but no command")]
    MissingCommand,

    #[error("invalid command token: {0:?}")]
    InvalidCommand(String),

    #[error("more than {0} parameters")]
    TooManyParams(usize),
}

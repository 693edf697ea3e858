//! # gossip-proto
//!
//! Parsing and serialization for the RFC 1459 client-to-server protocol
//! subset spoken by gossipd.
//!
//! A wire line is at most 512 bytes including its CRLF terminator and
//! carries an optional prefix, a verb, and up to 15 parameters of which
//! the last may be a "trailing" parameter containing spaces:
//!
//! ```text
//! [":" prefix SPACE] verb (SPACE param)* [SPACE ":" trailing] CRLF
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use gossip_proto::{Command, Message};
//!
//! let msg: Message = ":alice!alice@localhost PRIVMSG #rust :hello".parse().unwrap();
//! assert!(matches!(msg.command, Command::PRIVMSG(_, _)));
//!
//! let pong = Message::pong("token");
//! assert_eq!(pong.to_string(), "PONG :token");
//! ```

pub mod casemap;
pub mod command;
pub mod error;
pub mod message;
pub mod prefix;
pub mod response;
pub mod util;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::command::Command;
pub use self::error::ParseError;
pub use self::message::{Message, MAX_LINE_LEN, MAX_PARAMS};
pub use self::prefix::Prefix;
pub use self::response::Response;
pub use self::util::matches_hostmask;

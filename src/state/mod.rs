//! Shared server state.
//!
//! The user registry, channel registry, and message store, fronted by the
//! [`StateManager`] façade that enforces the cross-registry lock order.

mod channel;
mod channels;
mod manager;
mod messages;
mod user;
mod users;

pub use channel::{Channel, ChannelModes};
pub use channels::ChannelManager;
pub use manager::{
    DisconnectOutcome, JoinOutcome, KickOutcome, ModeOutcome, NickClaim, PartOutcome,
    RenameOutcome, StateManager, TopicOutcome, deliver_all,
};
pub use messages::{MessageKind, MessageStore, SenderInfo, StoredMessage};
pub use user::{SessionHandle, SessionId, User, UserModes};
pub use users::UserManager;

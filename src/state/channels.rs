//! The channel registry: channel name → channel record.

use std::collections::HashMap;

use gossip_proto::irc_to_lower;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::state::channel::Channel;

/// Channel-name-keyed registry, guarded as one unit.
///
/// Channel lifecycle is driven by the state façade: creation happens on
/// first JOIN and empty channels are destroyed in the same write-lock
/// scope as the membership change that emptied them. Compound operations
/// (join enforcement, mode changes, snapshot + mutate) run inside a
/// single guard scope held by the façade; the guard accessors exist for
/// it, not for the network layer.
#[derive(Default)]
pub struct ChannelManager {
    channels: RwLock<HashMap<String, Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.channels.read().await.contains_key(&irc_to_lower(name))
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Channel>> {
        self.channels.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Channel>> {
        self.channels.write().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn contains_is_case_insensitive() {
        let channels = ChannelManager::new();
        channels
            .write()
            .await
            .insert("#rust".to_string(), Channel::new("#Rust"));

        assert!(channels.contains("#rust").await);
        assert!(channels.contains("#RUST").await);
        assert!(!channels.contains("#other").await);
    }
}

//! The state façade.
//!
//! `StateManager` owns the three registries and is the single entry point
//! the protocol engine uses to read or mutate shared state.
//!
//! # Lock order (deadlock prevention)
//!
//! When an operation spans registries, locks are taken in this order:
//!
//! 1. User registry (map lock, then a user's own lock)
//! 2. Channel registry
//! 3. Message store
//!
//! Never in reverse, and never a registry lock while holding an entity
//! lock from a later registry. No network I/O happens under any lock:
//! mutating operations compute the affected delivery handles, drop their
//! guards, and only then enqueue outbound lines.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gossip_proto::{Prefix, irc_to_lower};
use tracing::{debug, info};

use crate::error::{HandlerError, StateError};
use crate::state::channel::Channel;
use crate::state::channels::ChannelManager;
use crate::state::messages::{MessageKind, MessageStore, SenderInfo, StoredMessage};
use crate::state::user::{SessionHandle, SessionId, User};
use crate::state::users::UserManager;

/// How a NICK claim was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NickClaim {
    /// A fresh user record was created.
    Created,
    /// An existing record with no live sessions was taken over.
    Adopted,
}

/// Result of joining a channel.
#[derive(Debug)]
pub struct JoinOutcome {
    /// Case-preserved channel name.
    pub canonical: String,
    /// False when the user was already a member and nothing changed.
    pub newly_joined: bool,
    /// True when an already-member user came back after a transport loss;
    /// the joining session gets its JOIN echo, topic, names, and replay.
    pub rejoined: bool,
    /// Current topic; empty string means unset.
    pub topic: String,
    /// NAMES entries, prefixed and sorted.
    pub names: Vec<String>,
    /// Delivery handles of every member, the joiner included.
    pub recipients: Vec<SessionHandle>,
    /// Channel messages missed since the user's disconnect, oldest first.
    pub replay: Vec<StoredMessage>,
}

/// Result of leaving a channel.
#[derive(Debug)]
pub struct PartOutcome {
    pub canonical: String,
    /// Handles of the membership as it was before removal, self included.
    pub recipients: Vec<SessionHandle>,
}

/// Result of a kick.
#[derive(Debug)]
pub struct KickOutcome {
    pub canonical: String,
    /// The target's case-preserved nickname.
    pub target_nick: String,
    /// Handles of the membership before removal, target included.
    pub recipients: Vec<SessionHandle>,
}

/// Result of a topic change.
#[derive(Debug)]
pub struct TopicOutcome {
    pub canonical: String,
    pub recipients: Vec<SessionHandle>,
}

/// Result of a mode change.
pub struct ModeOutcome {
    pub canonical: String,
    /// The broadcast arguments, e.g. `["+o", "bob"]`.
    pub args: Vec<String>,
    pub recipients: Vec<SessionHandle>,
}

/// Result of a nickname rename.
pub struct RenameOutcome {
    /// The renamed user's old `nick!user@host` origin.
    pub old_prefix: Prefix,
    /// Everyone who must see the NICK line: every member of every channel
    /// the user is in, plus the user's own sessions.
    pub recipients: Vec<SessionHandle>,
}

/// Result of detaching a session.
pub struct DisconnectOutcome {
    /// True when this was the user's last session.
    pub last_session: bool,
    /// The user's origin prefix for the QUIT broadcast.
    pub prefix: Prefix,
    /// Co-members to notify (self excluded); empty unless `last_session`.
    pub recipients: Vec<SessionHandle>,
}

/// Central shared state: the three registries plus server identity.
pub struct StateManager {
    pub users: UserManager,
    pub channels: ChannelManager,
    pub messages: Arc<MessageStore>,
    /// Appears as the `<server>` token of every numeric reply.
    pub server_name: String,
    /// Startup time, reported in the 003 welcome line.
    pub created_at: DateTime<Utc>,
}

impl StateManager {
    pub fn new(server_name: impl Into<String>, max_messages_per_target: usize) -> Self {
        Self {
            users: UserManager::new(),
            channels: ChannelManager::new(),
            messages: Arc::new(MessageStore::new(max_messages_per_target)),
            server_name: server_name.into(),
            created_at: Utc::now(),
        }
    }

    // ========================================================================
    // Nickname lifecycle
    // ========================================================================

    /// Reserve a nickname for a connecting session.
    ///
    /// A record that still exists but has no live sessions (its client
    /// lost its connection without QUIT) is adopted rather than refused,
    /// so a reconnecting client gets its identity and memberships back.
    pub async fn claim_nick(&self, nick: &str) -> Result<NickClaim, StateError> {
        if let Some(user) = self.users.get(nick).await {
            let adoptable = user.read().await.sessions.is_empty();
            return if adoptable {
                debug!(nick = %nick, "nickname adopted by reconnecting client");
                Ok(NickClaim::Adopted)
            } else {
                Err(StateError::AlreadyExists)
            };
        }
        self.users.add(User::new(nick)).await?;
        Ok(NickClaim::Created)
    }

    /// Drop a pre-registration reservation made by `claim_nick`.
    ///
    /// Only removes pure reservations: a record with sessions or
    /// memberships is left for the rename path or the reaper.
    pub async fn release_reservation(&self, nick: &str) {
        if let Some(user) = self.users.get(nick).await {
            let bare = {
                let user = user.read().await;
                user.sessions.is_empty() && user.channels.is_empty()
            };
            if bare {
                let _ = self.users.remove(nick).await;
            }
        }
    }

    /// Finish registration: set identity fields and attach the session's
    /// delivery handle, making the user addressable.
    pub async fn complete_registration(
        &self,
        session_id: SessionId,
        handle: SessionHandle,
        nick: &str,
        username: &str,
        realname: &str,
        host: &str,
    ) -> Result<(), StateError> {
        let user = self.users.get(nick).await.ok_or(StateError::NotFound)?;
        let mut user = user.write().await;
        user.username = username.to_string();
        user.realname = realname.to_string();
        user.host = host.to_string();
        user.attach_session(session_id, handle);
        user.touch();
        Ok(())
    }

    /// Rename a registered user, atomically rewriting every channel
    /// reference, and compute the NICK broadcast set.
    pub async fn rename_user(&self, old: &str, new: &str) -> Result<RenameOutcome, StateError> {
        let user = self.users.get(old).await.ok_or(StateError::NotFound)?;
        let (old_prefix, joined) = {
            let user = user.read().await;
            (user.prefix(), user.channels.clone())
        };

        self.users.rename(old, new).await?;

        let old_lower = irc_to_lower(old);
        let new_lower = irc_to_lower(new);

        // Rewrite member/operator references and gather the audience.
        let mut audience: HashSet<String> = HashSet::new();
        {
            let mut channels = self.channels.write().await;
            for name in &joined {
                if let Some(chan) = channels.get_mut(name) {
                    chan.rename_member(&old_lower, &new_lower, new);
                    audience.extend(chan.members.keys().cloned());
                }
            }
        }
        // The user sees their own rename even when in no channel.
        audience.insert(new_lower);

        let recipients = self.handles_for(audience.iter().map(String::as_str), None).await;
        info!(old = %old, new = %new, "nickname changed");
        Ok(RenameOutcome {
            old_prefix,
            recipients,
        })
    }

    // ========================================================================
    // Channel membership
    // ========================================================================

    /// Join a channel, enforcing key and bans, creating it on first join.
    ///
    /// A join by a user who is already a member is a no-op unless the user
    /// carries a disconnect stamp, in which case the missed channel
    /// messages are returned for replay to the joining session.
    pub async fn join_channel(
        &self,
        nick: &str,
        channel: &str,
        key: Option<&str>,
    ) -> Result<JoinOutcome, HandlerError> {
        let lower = irc_to_lower(channel);
        let user = self
            .users
            .get(nick)
            .await
            .ok_or_else(|| HandlerError::NoSuchNick(nick.to_string()))?;
        let (nick_case, nick_lower, hostmask, last_disconnect) = {
            let user = user.read().await;
            (
                user.nick.clone(),
                irc_to_lower(&user.nick),
                user.hostmask(),
                user.last_disconnect,
            )
        };

        let (canonical, newly_joined, topic, names, member_nicks) = {
            let mut channels = self.channels.write().await;
            let creating = !channels.contains_key(&lower);
            let chan = channels
                .entry(lower.clone())
                .or_insert_with(|| Channel::new(channel));

            let newly_joined = if chan.is_member(&nick_lower) {
                false
            } else {
                if let Some(required) = &chan.key
                    && key != Some(required.as_str())
                {
                    return Err(HandlerError::BadChannelKey(chan.name.clone()));
                }
                if chan.is_banned(&hostmask) {
                    return Err(HandlerError::BannedFromChan(chan.name.clone()));
                }
                chan.add_member(nick_lower.clone(), nick_case.clone());
                if creating {
                    chan.operators.insert(nick_lower.clone());
                }
                true
            };

            (
                chan.name.clone(),
                newly_joined,
                chan.topic.clone(),
                chan.prefixed_names(),
                chan.members.keys().cloned().collect::<Vec<_>>(),
            )
        };

        // Track membership on the user and decide on replay.
        let replay_since = {
            let mut user = user.write().await;
            user.channels.insert(lower.clone());
            if !newly_joined && user.pending_replay.remove(&lower) {
                user.last_disconnect
            } else {
                None
            }
        };

        let rejoined = replay_since.is_some();
        let replay = match replay_since {
            Some(since) => self.messages.get_since(&lower, since).await,
            None => Vec::new(),
        };

        let recipients = if newly_joined {
            self.handles_for(member_nicks.iter().map(String::as_str), None)
                .await
        } else {
            Vec::new()
        };

        if newly_joined {
            info!(nick = %nick_case, channel = %canonical, "user joined channel");
        }

        Ok(JoinOutcome {
            canonical,
            newly_joined,
            rejoined,
            topic,
            names,
            recipients,
            replay,
        })
    }

    /// Leave a channel; the channel is destroyed once empty.
    pub async fn part_channel(&self, nick: &str, channel: &str) -> Result<PartOutcome, HandlerError> {
        let lower = irc_to_lower(channel);
        let nick_lower = irc_to_lower(nick);

        let (canonical, member_nicks) = {
            let mut channels = self.channels.write().await;
            let chan = channels
                .get_mut(&lower)
                .ok_or_else(|| HandlerError::NoSuchChannel(channel.to_string()))?;
            if !chan.is_member(&nick_lower) {
                return Err(HandlerError::NotOnChannel(chan.name.clone()));
            }
            let canonical = chan.name.clone();
            let members: Vec<String> = chan.members.keys().cloned().collect();
            chan.remove_member(&nick_lower);
            if chan.members.is_empty() {
                channels.remove(&lower);
                debug!(channel = %canonical, "channel destroyed (empty)");
            }
            (canonical, members)
        };

        if let Some(user) = self.users.get(nick).await {
            user.write().await.channels.remove(&lower);
        }

        let recipients = self
            .handles_for(member_nicks.iter().map(String::as_str), None)
            .await;
        info!(nick = %nick, channel = %canonical, "user left channel");
        Ok(PartOutcome {
            canonical,
            recipients,
        })
    }

    /// Kick a member out of a channel. Operator-only.
    pub async fn kick_user(
        &self,
        channel: &str,
        kicker: &str,
        target: &str,
    ) -> Result<KickOutcome, HandlerError> {
        let lower = irc_to_lower(channel);
        let kicker_lower = irc_to_lower(kicker);

        let target_user = self
            .users
            .get(target)
            .await
            .ok_or_else(|| HandlerError::NoSuchNick(target.to_string()))?;
        let (target_nick, target_lower) = {
            let user = target_user.read().await;
            (user.nick.clone(), irc_to_lower(&user.nick))
        };

        let (canonical, member_nicks) = {
            let mut channels = self.channels.write().await;
            let chan = channels
                .get_mut(&lower)
                .ok_or_else(|| HandlerError::NoSuchChannel(channel.to_string()))?;
            if !chan.is_operator(&kicker_lower) {
                return Err(HandlerError::ChanOpPrivsNeeded(chan.name.clone()));
            }
            if !chan.is_member(&target_lower) {
                return Err(HandlerError::UserNotInChannel {
                    nick: target_nick.clone(),
                    channel: chan.name.clone(),
                });
            }
            let canonical = chan.name.clone();
            let members: Vec<String> = chan.members.keys().cloned().collect();
            chan.remove_member(&target_lower);
            if chan.members.is_empty() {
                channels.remove(&lower);
            }
            (canonical, members)
        };

        target_user.write().await.channels.remove(&lower);

        let recipients = self
            .handles_for(member_nicks.iter().map(String::as_str), None)
            .await;
        info!(kicker = %kicker, target = %target_nick, channel = %canonical, "user kicked");
        Ok(KickOutcome {
            canonical,
            target_nick,
            recipients,
        })
    }

    // ========================================================================
    // Topic and modes
    // ========================================================================

    /// Read a channel's topic. Empty string means unset.
    pub async fn topic(&self, channel: &str) -> Result<(String, String), HandlerError> {
        let channels = self.channels.read().await;
        let chan = channels
            .get(&irc_to_lower(channel))
            .ok_or_else(|| HandlerError::NoSuchChannel(channel.to_string()))?;
        Ok((chan.name.clone(), chan.topic.clone()))
    }

    /// Set a channel's topic, honoring `+t`.
    pub async fn set_topic(
        &self,
        channel: &str,
        actor: &str,
        text: &str,
    ) -> Result<TopicOutcome, HandlerError> {
        let actor_lower = irc_to_lower(actor);
        let (canonical, member_nicks) = {
            let mut channels = self.channels.write().await;
            let chan = channels
                .get_mut(&irc_to_lower(channel))
                .ok_or_else(|| HandlerError::NoSuchChannel(channel.to_string()))?;
            if chan.modes.topic_ops_only && !chan.is_operator(&actor_lower) {
                return Err(HandlerError::ChanOpPrivsNeeded(chan.name.clone()));
            }
            chan.topic = text.to_string();
            (
                chan.name.clone(),
                chan.members.keys().cloned().collect::<Vec<_>>(),
            )
        };

        let recipients = self
            .handles_for(member_nicks.iter().map(String::as_str), None)
            .await;
        info!(channel = %canonical, by = %actor, "topic changed");
        Ok(TopicOutcome {
            canonical,
            recipients,
        })
    }

    /// Query channel modes for the 324 reply. The key is disclosed only
    /// to members.
    pub async fn channel_modes(
        &self,
        channel: &str,
        viewer: &str,
    ) -> Result<(String, Vec<String>), HandlerError> {
        let channels = self.channels.read().await;
        let chan = channels
            .get(&irc_to_lower(channel))
            .ok_or_else(|| HandlerError::NoSuchChannel(channel.to_string()))?;
        let for_member = chan.is_member(&irc_to_lower(viewer));
        Ok((chan.name.clone(), chan.mode_reply_params(for_member)))
    }

    /// Apply one channel mode change and compute its broadcast.
    ///
    /// Key changes require membership (442); everything else requires
    /// operator status (482). Targeted modes check the target is a member
    /// (441). Unknown flags answer 472.
    pub async fn apply_channel_mode(
        &self,
        channel: &str,
        actor: &str,
        flag: &str,
        arg: Option<&str>,
    ) -> Result<ModeOutcome, HandlerError> {
        let actor_lower = irc_to_lower(actor);
        let mut flag_chars = flag.chars();
        let (adding, mode_char) = match (flag_chars.next(), flag_chars.next(), flag_chars.next()) {
            (Some('+'), Some(c), None) => (true, c),
            (Some('-'), Some(c), None) => (false, c),
            _ => return Err(HandlerError::UnknownMode(flag.to_string())),
        };

        let (canonical, args, member_nicks) = {
            let mut channels = self.channels.write().await;
            let chan = channels
                .get_mut(&irc_to_lower(channel))
                .ok_or_else(|| HandlerError::NoSuchChannel(channel.to_string()))?;
            let canonical = chan.name.clone();

            let args: Vec<String> = match mode_char {
                'k' => {
                    if !chan.is_member(&actor_lower) {
                        return Err(HandlerError::NotOnChannel(canonical));
                    }
                    if adding {
                        let key = arg.ok_or(HandlerError::NeedMoreParams)?;
                        chan.key = Some(key.to_string());
                        vec!["+k".to_string(), key.to_string()]
                    } else {
                        chan.key = None;
                        vec!["-k".to_string()]
                    }
                }
                'o' | 'v' => {
                    if !chan.is_operator(&actor_lower) {
                        return Err(HandlerError::ChanOpPrivsNeeded(canonical));
                    }
                    let target = arg.ok_or(HandlerError::NeedMoreParams)?;
                    let target_lower = irc_to_lower(target);
                    if !chan.is_member(&target_lower) {
                        return Err(HandlerError::UserNotInChannel {
                            nick: target.to_string(),
                            channel: canonical,
                        });
                    }
                    let set = if mode_char == 'o' {
                        &mut chan.operators
                    } else {
                        &mut chan.voiced
                    };
                    if adding {
                        set.insert(target_lower);
                    } else {
                        set.remove(&target_lower);
                    }
                    vec![flag.to_string(), target.to_string()]
                }
                'b' => {
                    if !chan.is_operator(&actor_lower) {
                        return Err(HandlerError::ChanOpPrivsNeeded(canonical));
                    }
                    let mask = arg.ok_or(HandlerError::NeedMoreParams)?;
                    if adding {
                        if !chan.bans.iter().any(|m| m == mask) {
                            chan.bans.push(mask.to_string());
                        }
                    } else {
                        chan.bans.retain(|m| m != mask);
                    }
                    vec![flag.to_string(), mask.to_string()]
                }
                c => {
                    // Unknown flags answer 472 regardless of the actor's status.
                    if !matches!(c, 'i' | 'm' | 'n' | 'p' | 's' | 't') {
                        return Err(HandlerError::UnknownMode(flag.to_string()));
                    }
                    if !chan.is_operator(&actor_lower) {
                        return Err(HandlerError::ChanOpPrivsNeeded(canonical));
                    }
                    chan.modes.set_flag(c, adding);
                    vec![flag.to_string()]
                }
            };

            (
                chan.name.clone(),
                args,
                chan.members.keys().cloned().collect::<Vec<_>>(),
            )
        };

        let recipients = self
            .handles_for(member_nicks.iter().map(String::as_str), None)
            .await;
        info!(channel = %canonical, by = %actor, change = %args.join(" "), "mode changed");
        Ok(ModeOutcome {
            canonical,
            args,
            recipients,
        })
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// The stored-message sender identity for a nick.
    async fn sender_info(&self, nick: &str) -> Option<SenderInfo> {
        let user = self.users.get(nick).await?;
        let user = user.read().await;
        Some(SenderInfo {
            nick: user.nick.clone(),
            username: user.username.clone(),
            host: user.host.clone(),
        })
    }

    /// Route a message to a channel: store it, then hand back every
    /// member's delivery handles except the sender's.
    pub async fn channel_message(
        &self,
        sender: &str,
        channel: &str,
        text: &str,
        kind: MessageKind,
    ) -> Result<Vec<SessionHandle>, HandlerError> {
        let lower = irc_to_lower(channel);
        let member_nicks: Vec<String> = {
            let channels = self.channels.read().await;
            let chan = channels
                .get(&lower)
                .ok_or_else(|| HandlerError::NoSuchChannel(channel.to_string()))?;
            chan.members.keys().cloned().collect()
        };

        if let Some(info) = self.sender_info(sender).await {
            self.messages
                .store(StoredMessage::new(info, lower.clone(), text, kind))
                .await;
        }

        let sender_lower = irc_to_lower(sender);
        Ok(self
            .handles_for(member_nicks.iter().map(String::as_str), Some(&sender_lower))
            .await)
    }

    /// Route a message to a user: store it, then hand back the handles of
    /// all the target's sessions.
    pub async fn private_message(
        &self,
        sender: &str,
        target: &str,
        text: &str,
        kind: MessageKind,
    ) -> Result<Vec<SessionHandle>, HandlerError> {
        let target_user = self
            .users
            .get(target)
            .await
            .ok_or_else(|| HandlerError::NoSuchNick(target.to_string()))?;

        if let Some(info) = self.sender_info(sender).await {
            self.messages
                .store(StoredMessage::new(info, irc_to_lower(target), text, kind))
                .await;
        }

        let handles = target_user.read().await.handles();
        Ok(handles)
    }

    // ========================================================================
    // Session teardown
    // ========================================================================

    /// Detach a session from its user and, when it was the last one,
    /// compute the QUIT broadcast set.
    ///
    /// `remove_user` distinguishes an explicit QUIT (memberships and the
    /// record are removed immediately) from a transport loss (the record
    /// survives with a disconnect stamp so the client can reconnect and
    /// have missed messages replayed; the reaper removes it eventually).
    pub async fn detach_session(
        &self,
        nick: &str,
        session_id: &SessionId,
        remove_user: bool,
    ) -> Option<DisconnectOutcome> {
        let user = self.users.get(nick).await?;
        let (last_session, prefix, joined) = {
            let mut user = user.write().await;
            let last = user.detach_session(session_id);
            (last, user.prefix(), user.channels.clone())
        };

        if !last_session {
            return Some(DisconnectOutcome {
                last_session: false,
                prefix,
                recipients: Vec::new(),
            });
        }

        let nick_lower = irc_to_lower(nick);
        let mut audience: HashSet<String> = HashSet::new();
        {
            let mut channels = self.channels.write().await;
            for name in &joined {
                if let Some(chan) = channels.get_mut(name) {
                    audience.extend(chan.members.keys().cloned());
                    if remove_user {
                        chan.remove_member(&nick_lower);
                        if chan.members.is_empty() {
                            let canonical = chan.name.clone();
                            channels.remove(name);
                            debug!(channel = %canonical, "channel destroyed (empty)");
                        }
                    }
                }
            }
        }
        audience.remove(&nick_lower);

        if remove_user {
            let _ = self.users.remove(nick).await;
            info!(nick = %nick, "user removed from registry");
        } else {
            debug!(nick = %nick, "user kept for reconnect, disconnect stamped");
        }

        let recipients = self
            .handles_for(audience.iter().map(String::as_str), None)
            .await;
        Some(DisconnectOutcome {
            last_session: true,
            prefix,
            recipients,
        })
    }

    /// Remove user records that have had no sessions for `ttl`.
    ///
    /// Their QUIT was already broadcast when the last session dropped, so
    /// reaping is silent apart from membership cleanup.
    pub async fn reap_ghosts(&self, ttl: chrono::Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut ghosts: Vec<(String, HashSet<String>)> = Vec::new();
        for user in self.users.list().await {
            let user = user.read().await;
            if user.sessions.is_empty()
                && let Some(stamp) = user.last_disconnect
                && stamp < cutoff
            {
                ghosts.push((user.nick.clone(), user.channels.clone()));
            }
        }

        let mut reaped = 0;
        for (nick, joined) in ghosts {
            let nick_lower = irc_to_lower(&nick);
            {
                let mut channels = self.channels.write().await;
                for name in &joined {
                    if let Some(chan) = channels.get_mut(name) {
                        chan.remove_member(&nick_lower);
                        if chan.members.is_empty() {
                            channels.remove(name);
                        }
                    }
                }
            }
            if self.users.remove(&nick).await.is_ok() {
                info!(nick = %nick, "ghost user reaped");
                reaped += 1;
            }
        }
        reaped
    }

    /// Spawn the periodic ghost reaper.
    pub fn spawn_reaper(state: Arc<StateManager>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60 * 60));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                state.reap_ghosts(chrono::Duration::hours(1)).await;
            }
        })
    }

    // ========================================================================
    // Fan-out plumbing
    // ========================================================================

    /// Collect delivery handles for a set of nicknames, optionally
    /// excluding one (by lowercase nick). Locks are released before the
    /// caller enqueues anything.
    pub async fn handles_for<'a>(
        &self,
        nicks: impl IntoIterator<Item = &'a str>,
        exclude: Option<&str>,
    ) -> Vec<SessionHandle> {
        let mut handles = Vec::new();
        for nick in nicks {
            if exclude.is_some_and(|ex| gossip_proto::irc_eq(nick, ex)) {
                continue;
            }
            if let Some(user) = self.users.get(nick).await {
                handles.extend(user.read().await.handles());
            }
        }
        handles
    }

    /// Refresh a user's last-activity stamp. Called for every command a
    /// registered session sends.
    pub async fn touch_user(&self, nick: &str) {
        if let Some(user) = self.users.get(nick).await {
            user.write().await.touch();
        }
    }
}

/// Enqueue a line on every handle in `recipients`.
pub async fn deliver_all(recipients: &[SessionHandle], msg: &gossip_proto::Message) {
    for handle in recipients {
        handle.deliver(msg.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn state() -> StateManager {
        StateManager::new("irc.gossip.local", 100)
    }

    async fn register(
        state: &StateManager,
        nick: &str,
    ) -> (SessionId, mpsc::Receiver<gossip_proto::Message>) {
        let (tx, rx) = mpsc::channel(100);
        let id = SessionId::new_v4();
        state.claim_nick(nick).await.unwrap();
        state
            .complete_registration(
                id,
                SessionHandle::new(tx, CancellationToken::new()),
                nick,
                nick,
                nick,
                "localhost",
            )
            .await
            .unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn claim_conflicts_and_adoption() {
        let state = state();
        let (id, _rx) = register(&state, "alice").await;

        // Live user: the nickname is taken.
        assert_eq!(
            state.claim_nick("alice").await.unwrap_err(),
            StateError::AlreadyExists
        );

        // After the session detaches without QUIT, the record is adoptable.
        state.detach_session("alice", &id, false).await.unwrap();
        assert_eq!(state.claim_nick("alice").await.unwrap(), NickClaim::Adopted);
    }

    #[tokio::test]
    async fn join_makes_creator_operator_and_enforces_key() {
        let state = state();
        let _a = register(&state, "alice").await;
        let _b = register(&state, "bob").await;

        let outcome = state.join_channel("alice", "#x", None).await.unwrap();
        assert!(outcome.newly_joined);
        assert_eq!(outcome.canonical, "#x");
        assert_eq!(outcome.names, vec!["@alice"]);

        state
            .apply_channel_mode("#x", "alice", "+k", Some("secret"))
            .await
            .unwrap();

        let err = state.join_channel("bob", "#x", None).await.unwrap_err();
        assert!(matches!(err, HandlerError::BadChannelKey(_)));

        let ok = state.join_channel("bob", "#x", Some("secret")).await.unwrap();
        assert!(ok.newly_joined);
    }

    #[tokio::test]
    async fn join_enforces_ban_masks() {
        let state = state();
        let _a = register(&state, "alice").await;
        let _b = register(&state, "bob").await;

        state.join_channel("alice", "#x", None).await.unwrap();
        state
            .apply_channel_mode("#x", "alice", "+b", Some("bob!*@*"))
            .await
            .unwrap();

        let err = state.join_channel("bob", "#x", None).await.unwrap_err();
        assert!(matches!(err, HandlerError::BannedFromChan(_)));
    }

    #[tokio::test]
    async fn double_join_is_a_noop() {
        let state = state();
        let _a = register(&state, "alice").await;

        let first = state.join_channel("alice", "#x", None).await.unwrap();
        assert!(first.newly_joined);

        let second = state.join_channel("alice", "#x", None).await.unwrap();
        assert!(!second.newly_joined);
        assert!(second.recipients.is_empty());
        assert!(second.replay.is_empty());
    }

    #[tokio::test]
    async fn part_destroys_empty_channels_and_errors_on_non_member() {
        let state = state();
        let _a = register(&state, "alice").await;
        let _b = register(&state, "bob").await;

        state.join_channel("alice", "#x", None).await.unwrap();
        let err = state.part_channel("bob", "#x").await.unwrap_err();
        assert!(matches!(err, HandlerError::NotOnChannel(_)));

        state.part_channel("alice", "#x").await.unwrap();
        assert!(!state.channels.contains("#x").await);

        let err = state.part_channel("alice", "#x").await.unwrap_err();
        assert!(matches!(err, HandlerError::NoSuchChannel(_)));
    }

    #[tokio::test]
    async fn rename_rewrites_channel_references_atomically() {
        let state = state();
        let _a = register(&state, "alice").await;
        state.join_channel("alice", "#x", None).await.unwrap();

        let outcome = state.rename_user("alice", "alicia").await.unwrap();
        assert_eq!(outcome.old_prefix.nick(), Some("alice"));

        assert!(state.users.get("alice").await.is_none());
        assert!(state.users.get("alicia").await.is_some());

        let channels = state.channels.read().await;
        let chan = channels.get("#x").unwrap();
        assert!(chan.is_member("alicia"));
        assert!(chan.is_operator("alicia"));
        assert!(!chan.is_member("alice"));
    }

    #[tokio::test]
    async fn kick_requires_operator_and_membership() {
        let state = state();
        let _a = register(&state, "alice").await;
        let _b = register(&state, "bob").await;
        let _c = register(&state, "carol").await;

        state.join_channel("alice", "#x", None).await.unwrap();
        state.join_channel("bob", "#x", None).await.unwrap();

        let err = state.kick_user("#x", "bob", "alice").await.unwrap_err();
        assert!(matches!(err, HandlerError::ChanOpPrivsNeeded(_)));

        let err = state.kick_user("#x", "alice", "carol").await.unwrap_err();
        assert!(matches!(err, HandlerError::UserNotInChannel { .. }));

        let outcome = state.kick_user("#x", "alice", "bob").await.unwrap();
        assert_eq!(outcome.target_nick, "bob");
        let channels = state.channels.read().await;
        assert!(!channels.get("#x").unwrap().is_member("bob"));
    }

    #[tokio::test]
    async fn topic_ops_only_enforced_once_set() {
        let state = state();
        let _a = register(&state, "alice").await;
        let _b = register(&state, "bob").await;
        state.join_channel("alice", "#x", None).await.unwrap();
        state.join_channel("bob", "#x", None).await.unwrap();

        // Without +t anyone may set the topic.
        state.set_topic("#x", "bob", "new topic").await.unwrap();
        assert_eq!(state.topic("#x").await.unwrap().1, "new topic");

        state
            .apply_channel_mode("#x", "alice", "+t", None)
            .await
            .unwrap();
        let err = state.set_topic("#x", "bob", "later").await.unwrap_err();
        assert!(matches!(err, HandlerError::ChanOpPrivsNeeded(_)));
    }

    #[tokio::test]
    async fn quit_removes_user_but_transport_loss_keeps_it() {
        let state = state();
        let (alice_id, _arx) = register(&state, "alice").await;
        let (bob_id, _brx) = register(&state, "bob").await;
        state.join_channel("alice", "#x", None).await.unwrap();
        state.join_channel("bob", "#x", None).await.unwrap();

        // Explicit QUIT: record and membership go away immediately.
        let outcome = state.detach_session("alice", &alice_id, true).await.unwrap();
        assert!(outcome.last_session);
        assert!(state.users.get("alice").await.is_none());
        {
            let channels = state.channels.read().await;
            assert!(!channels.get("#x").unwrap().is_member("alice"));
        }

        // Transport loss: record and membership survive with a stamp.
        state.detach_session("bob", &bob_id, false).await.unwrap();
        let bob = state.users.get("bob").await.unwrap();
        assert!(bob.read().await.last_disconnect.is_some());
        assert!(state.channels.contains("#x").await);
    }

    #[tokio::test]
    async fn rejoin_after_loss_replays_missed_messages() {
        let state = state();
        let (alice_id, _arx) = register(&state, "alice").await;
        let _b = register(&state, "bob").await;
        state.join_channel("alice", "#x", None).await.unwrap();
        state.join_channel("bob", "#x", None).await.unwrap();

        state.detach_session("alice", &alice_id, false).await.unwrap();

        state
            .channel_message("bob", "#x", "you missed this", MessageKind::Channel)
            .await
            .unwrap();

        // Alice reconnects, adopts her nick, and rejoins.
        assert_eq!(state.claim_nick("alice").await.unwrap(), NickClaim::Adopted);
        let (tx, _rx) = mpsc::channel(8);
        state
            .complete_registration(
                SessionId::new_v4(),
                SessionHandle::new(tx, CancellationToken::new()),
                "alice",
                "alice",
                "alice",
                "localhost",
            )
            .await
            .unwrap();

        let outcome = state.join_channel("alice", "#x", None).await.unwrap();
        assert!(!outcome.newly_joined);
        assert_eq!(outcome.replay.len(), 1);
        assert_eq!(outcome.replay[0].content, "you missed this");

        // The stamp is cleared; a second JOIN replays nothing.
        let again = state.join_channel("alice", "#x", None).await.unwrap();
        assert!(again.replay.is_empty());
    }

    #[tokio::test]
    async fn reaper_removes_stale_ghosts() {
        let state = state();
        let (id, _rx) = register(&state, "alice").await;
        state.join_channel("alice", "#x", None).await.unwrap();
        state.detach_session("alice", &id, false).await.unwrap();

        // Fresh ghost survives an hour-scale reap.
        assert_eq!(state.reap_ghosts(chrono::Duration::hours(1)).await, 0);
        // With a zero TTL it is collected, along with its empty channel.
        assert_eq!(state.reap_ghosts(chrono::Duration::zero()).await, 1);
        assert!(state.users.get("alice").await.is_none());
        assert!(!state.channels.contains("#x").await);
    }
}

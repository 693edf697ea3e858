//! Channel records.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use gossip_proto::matches_hostmask;

/// Per-channel mode bits.
#[derive(Debug, Default, Clone)]
pub struct ChannelModes {
    pub invite_only: bool,    // +i
    pub moderated: bool,      // +m
    pub no_external: bool,    // +n
    pub private: bool,        // +p
    pub secret: bool,         // +s
    pub topic_ops_only: bool, // +t
}

impl ChannelModes {
    /// Set or clear one flag. Returns `false` for an unknown flag.
    pub fn set_flag(&mut self, flag: char, value: bool) -> bool {
        match flag {
            'i' => self.invite_only = value,
            'm' => self.moderated = value,
            'n' => self.no_external = value,
            'p' => self.private = value,
            's' => self.secret = value,
            't' => self.topic_ops_only = value,
            _ => return false,
        }
        true
    }

    /// The set flags, in canonical order.
    pub fn flag_string(&self) -> String {
        let mut s = String::new();
        for (flag, set) in [
            ('i', self.invite_only),
            ('m', self.moderated),
            ('n', self.no_external),
            ('p', self.private),
            ('s', self.secret),
            ('t', self.topic_ops_only),
        ] {
            if set {
                s.push(flag);
            }
        }
        s
    }
}

/// An IRC channel. Members are referenced by lowercase nickname and
/// resolved through the user registry; a nickname rename rewrites these
/// references atomically with the registry update.
#[derive(Debug)]
pub struct Channel {
    /// Case-preserved name as first seen.
    pub name: String,
    /// Empty string means no topic is set.
    pub topic: String,
    pub created_at: DateTime<Utc>,
    /// Member nicknames (lowercase), mapped to their case-preserved form.
    pub members: std::collections::HashMap<String, String>,
    /// Members bearing `@`. Always a subset of `members`.
    pub operators: HashSet<String>,
    /// Members bearing `+`.
    pub voiced: HashSet<String>,
    pub modes: ChannelModes,
    /// Key for `+k`; `None` means no key required.
    pub key: Option<String>,
    /// Member cap; 0 means unlimited.
    pub user_limit: usize,
    /// Ban masks matched against `nick!user@host`.
    pub bans: Vec<String>,
    /// Nicknames invited past `+i`.
    pub invites: Vec<String>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            topic: format!("Welcome to {name}!"),
            name,
            created_at: Utc::now(),
            members: std::collections::HashMap::new(),
            operators: HashSet::new(),
            voiced: HashSet::new(),
            modes: ChannelModes::default(),
            key: None,
            user_limit: 0,
            bans: Vec::new(),
            invites: Vec::new(),
        }
    }

    pub fn is_member(&self, nick_lower: &str) -> bool {
        self.members.contains_key(nick_lower)
    }

    pub fn is_operator(&self, nick_lower: &str) -> bool {
        self.operators.contains(nick_lower)
    }

    pub fn add_member(&mut self, nick_lower: impl Into<String>, nick: impl Into<String>) {
        self.members.insert(nick_lower.into(), nick.into());
    }

    /// Drop a member along with any operator/voice status.
    pub fn remove_member(&mut self, nick_lower: &str) {
        self.members.remove(nick_lower);
        self.operators.remove(nick_lower);
        self.voiced.remove(nick_lower);
    }

    /// Rewrite one member's nickname in place.
    pub fn rename_member(&mut self, old_lower: &str, new_lower: &str, new_nick: &str) {
        if self.members.remove(old_lower).is_some() {
            self.members
                .insert(new_lower.to_string(), new_nick.to_string());
        }
        if self.operators.remove(old_lower) {
            self.operators.insert(new_lower.to_string());
        }
        if self.voiced.remove(old_lower) {
            self.voiced.insert(new_lower.to_string());
        }
    }

    /// Whether a `nick!user@host` matches any ban mask.
    pub fn is_banned(&self, hostmask: &str) -> bool {
        self.bans.iter().any(|mask| matches_hostmask(mask, hostmask))
    }

    pub fn is_invited(&self, nick_lower: &str) -> bool {
        self.invites.iter().any(|n| n == nick_lower)
    }

    /// NAMES entries, `@`-prefixed for operators and `+` for voiced,
    /// sorted for deterministic output.
    pub fn prefixed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .members
            .iter()
            .map(|(lower, nick)| {
                if self.operators.contains(lower) {
                    format!("@{nick}")
                } else if self.voiced.contains(lower) {
                    format!("+{nick}")
                } else {
                    nick.clone()
                }
            })
            .collect();
        names.sort_by(|a, b| {
            a.trim_start_matches(['@', '+'])
                .cmp(b.trim_start_matches(['@', '+']))
        });
        names
    }

    /// The `324` mode reply parameters: flags plus the key, which is
    /// disclosed only to members.
    pub fn mode_reply_params(&self, for_member: bool) -> Vec<String> {
        let mut flags = String::from("+");
        flags.push_str(&self.modes.flag_string());
        let mut params = Vec::new();
        if self.key.is_some() {
            flags.push('k');
        }
        if self.user_limit > 0 {
            flags.push('l');
        }
        params.push(flags);
        if let Some(key) = &self.key
            && for_member
        {
            params.push(key.clone());
        }
        if self.user_limit > 0 {
            params.push(self.user_limit.to_string());
        }
        params
    }
}

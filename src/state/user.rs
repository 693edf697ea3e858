//! User records and delivery handles.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gossip_proto::{Message, Prefix};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

/// Identifies one client connection.
pub type SessionId = Uuid;

/// How long an outbound enqueue may block before the client is declared
/// stuck and its session cancelled.
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// The capability a user record holds for reaching one of its sessions:
/// the session's bounded outbound queue plus its stop signal. The state
/// layer never holds the session itself.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<Message>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Enqueue one line for the session's write task.
    ///
    /// A queue that stays full past [`ENQUEUE_TIMEOUT`] means the client
    /// has stopped draining its socket; the session is cancelled.
    pub async fn deliver(&self, msg: Message) {
        match self.tx.send_timeout(msg, ENQUEUE_TIMEOUT).await {
            Ok(()) => {}
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                warn!("outbound queue full for 5s, dropping stuck session");
                self.cancel.cancel();
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {}
        }
    }
}

/// Per-user mode bits.
#[derive(Debug, Default, Clone)]
pub struct UserModes {
    pub away: bool,      // +a
    pub invisible: bool, // +i
    pub operator: bool,  // +o
}

impl UserModes {
    /// Render as a mode string like `+io`.
    pub fn as_mode_string(&self) -> String {
        let mut s = String::from("+");
        if self.away {
            s.push('a');
        }
        if self.invisible {
            s.push('i');
        }
        if self.operator {
            s.push('o');
        }
        s
    }
}

/// A connected (or recently disconnected) user.
///
/// Created when a client first issues NICK; removed when its last session
/// ends via QUIT, or reaped after a transport loss goes unreclaimed.
#[derive(Debug)]
pub struct User {
    /// Current nickname, case-preserved.
    pub nick: String,
    pub username: String,
    pub realname: String,
    pub host: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// When the last session dropped. Replay cutoff for rejoins.
    pub last_disconnect: Option<DateTime<Utc>>,
    /// Channels whose messages must be replayed on the next JOIN, filled
    /// when the last session drops. Each JOIN consumes its entry, so a
    /// repeated JOIN never replays twice.
    pub pending_replay: HashSet<String>,
    /// Channels this user is in (lowercase names).
    pub channels: HashSet<String>,
    pub modes: UserModes,
    /// Live sessions, keyed by session id. A user may be connected
    /// through several sessions at once; traffic fans out to all.
    pub sessions: HashMap<SessionId, SessionHandle>,
}

impl User {
    pub fn new(nick: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            nick: nick.into(),
            username: String::new(),
            realname: String::new(),
            host: String::new(),
            created_at: now,
            last_active: now,
            last_disconnect: None,
            pending_replay: HashSet::new(),
            channels: HashSet::new(),
            modes: UserModes::default(),
            sessions: HashMap::new(),
        }
    }

    /// The `nick!user@host` origin for lines this user sends.
    pub fn prefix(&self) -> Prefix {
        Prefix::user(&self.nick, &self.username, &self.host)
    }

    /// The `nick!user@host` string bans are matched against.
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.username, self.host)
    }

    pub fn attach_session(&mut self, id: SessionId, handle: SessionHandle) {
        self.sessions.insert(id, handle);
    }

    /// Remove a session handle. Returns `true` if that was the last one;
    /// the disconnect stamp and replay set are then recorded for a later
    /// rejoin.
    pub fn detach_session(&mut self, id: &SessionId) -> bool {
        self.sessions.remove(id);
        if self.sessions.is_empty() {
            self.last_disconnect = Some(Utc::now());
            self.pending_replay = self.channels.clone();
            true
        } else {
            false
        }
    }

    /// Snapshot the delivery handles for lock-free fan-out.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.values().cloned().collect()
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }
}

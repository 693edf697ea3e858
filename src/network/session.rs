//! Per-connection session lifecycle.
//!
//! Each session runs three cooperating tasks over bounded queues:
//!
//! - a **reader** that frames CRLF-delimited lines onto the inbound queue,
//! - a **writer** that drains the outbound queue to the socket,
//! - a **dispatcher** that parses lines, runs the protocol engine, and
//!   enqueues direct replies.
//!
//! A keepalive timer inside the dispatcher sends `PING :<server>` every
//! 30 seconds; a client that stays silent through two of them is dead.
//! The session's cancellation token is observed by all three tasks, so a
//! transport error, a stuck outbound queue, or a QUIT tears everything
//! down through the same path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gossip_proto::{Command, MAX_LINE_LEN, Message};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::HandlerError;
use crate::handlers::{Context, HandshakeState, Registry};
use crate::state::{SessionHandle, SessionId, StateManager, deliver_all};

/// Outbound queue depth per session.
const OUTBOUND_QUEUE_DEPTH: usize = 100;
/// Inbound queue depth per session.
const INBOUND_QUEUE_DEPTH: usize = 100;
/// Keepalive period.
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);
/// Consecutive unanswered keepalives before the client is declared dead.
const MAX_MISSED_PINGS: u8 = 2;

/// One client connection.
pub struct Session {
    id: SessionId,
    state: Arc<StateManager>,
    registry: Arc<Registry>,
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        state: Arc<StateManager>,
        registry: Arc<Registry>,
        addr: SocketAddr,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: SessionId::new_v4(),
            state,
            registry,
            addr,
            cancel,
        }
    }

    /// Drive the connection to completion. Generic over the stream so
    /// plaintext TCP and TLS share the same lifecycle.
    pub async fn run<S>(self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        info!(session = %self.id, addr = %self.addr, "client connected");

        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(INBOUND_QUEUE_DEPTH);

        let writer = tokio::spawn(write_loop(write_half, outbound_rx, self.cancel.clone()));
        let reader = tokio::spawn(read_loop(read_half, inbound_tx, self.cancel.clone()));

        let handle = SessionHandle::new(outbound_tx, self.cancel.clone());
        let mut handshake = HandshakeState::default();
        let quit = self.dispatch_loop(inbound_rx, &handle, &mut handshake).await;

        self.teardown(&handle, &handshake, quit).await;

        self.cancel.cancel();
        let _ = writer.await;
        let _ = reader.await;
        info!(session = %self.id, addr = %self.addr, "client disconnected");
    }

    /// The dispatcher task: parse, dispatch, keepalive.
    ///
    /// Returns `Some(reason)` when the client sent QUIT; `None` for any
    /// other exit (transport loss, ping timeout, cancellation).
    async fn dispatch_loop(
        &self,
        mut inbound_rx: mpsc::Receiver<String>,
        handle: &SessionHandle,
        handshake: &mut HandshakeState,
    ) -> Option<Option<String>> {
        let mut keepalive = tokio::time::interval(KEEPALIVE_PERIOD);
        keepalive.tick().await; // the first tick fires immediately
        let mut pings_unanswered: u8 = 0;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,

                line = inbound_rx.recv() => {
                    let Some(line) = line else { return None };
                    pings_unanswered = 0;
                    if handshake.registered
                        && let Some(nick) = handshake.nick.as_deref()
                    {
                        self.state.touch_user(nick).await;
                    }

                    if !line.ends_with("\r\n") {
                        debug!(session = %self.id, "dropping line without CRLF terminator");
                        continue;
                    }
                    let msg: Message = match line.parse() {
                        Ok(msg) => msg,
                        Err(e) => {
                            debug!(session = %self.id, error = %e, "dropping malformed line");
                            continue;
                        }
                    };

                    let verb = msg.command.verb().to_string();
                    let result = {
                        let mut ctx = Context {
                            session_id: self.id,
                            state: &self.state,
                            handle,
                            handshake: &mut *handshake,
                            remote_addr: self.addr,
                        };
                        self.registry.dispatch(&mut ctx, &msg).await
                    };

                    match result {
                        Ok(()) => {}
                        Err(HandlerError::Quit(reason)) => return Some(reason),
                        Err(e) => {
                            debug!(session = %self.id, code = e.error_code(), "handler error");
                            let nick = handshake.nick.as_deref().unwrap_or("*");
                            if let Some(reply) =
                                e.to_irc_reply(&self.state.server_name, nick, &verb)
                            {
                                handle.deliver(reply).await;
                            }
                        }
                    }
                }

                _ = keepalive.tick() => {
                    if pings_unanswered >= MAX_MISSED_PINGS {
                        warn!(session = %self.id, nick = ?handshake.nick, "ping timeout");
                        return None;
                    }
                    handle.deliver(Message::ping(&self.state.server_name)).await;
                    pings_unanswered += 1;
                }
            }
        }
    }

    /// Detach from shared state and broadcast the QUIT where due.
    ///
    /// An explicit QUIT removes the user immediately; a transport loss
    /// keeps the record stamped for reconnect-and-replay.
    async fn teardown(
        &self,
        handle: &SessionHandle,
        handshake: &HandshakeState,
        quit: Option<Option<String>>,
    ) {
        let Some(nick) = handshake.nick.as_deref() else {
            return;
        };

        if !handshake.registered {
            // A bare reservation from NICK without USER.
            self.state.release_reservation(nick).await;
            return;
        }

        let explicit = quit.is_some();
        let reason = quit
            .flatten()
            .unwrap_or_else(|| "Client Quit".to_string());

        let Some(outcome) = self.state.detach_session(nick, &self.id, explicit).await else {
            return;
        };
        if outcome.last_session {
            let line = Message::new(Command::QUIT(Some(reason.clone())))
                .with_prefix(outcome.prefix.clone());
            deliver_all(&outcome.recipients, &line).await;
            if explicit {
                // Echo the QUIT to the quitting client as well.
                handle.deliver(line).await;
            }
        }
    }
}

/// The reader task: CRLF framing onto the inbound queue.
async fn read_loop<R>(read_half: R, tx: mpsc::Sender<String>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        tokio::select! {
            _ = cancel.cancelled() => break,

            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        if line.len() > MAX_LINE_LEN {
                            debug!("dropping over-length line ({} bytes)", line.len());
                            continue;
                        }
                        if tx.send(line.clone()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "read failed");
                        break;
                    }
                }
            }
        }
    }
    // Wake the other tasks whichever way we exited.
    cancel.cancel();
}

/// The writer task: drain the outbound queue to the socket.
async fn write_loop<W>(
    mut write_half: W,
    mut rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Best-effort flush of lines already queued (e.g. the QUIT echo).
                while let Ok(msg) = rx.try_recv() {
                    if write_line(&mut write_half, &msg).await.is_err() {
                        break;
                    }
                }
                break;
            }

            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = write_line(&mut write_half, &msg).await {
                    debug!(error = %e, "write failed");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
    let _ = write_half.shutdown().await;
}

async fn write_line<W>(write_half: &mut W, msg: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = format!("{msg}\r\n");
    write_half.write_all(line.as_bytes()).await?;
    write_half.flush().await
}

//! Test IRC client: sends commands, asserts on received lines.

use std::time::Duration;

use gossip_proto::{Command, Message, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// A raw IRC client for integration tests.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    nick: String,
}

impl TestClient {
    /// Connect to a test server.
    pub async fn connect(address: &str, nick: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            nick: nick.to_string(),
        })
    }

    /// Send a raw line, appending CRLF if missing.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with("\r\n") {
            self.writer.write_all(b"\r\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Send a typed command.
    pub async fn send(&mut self, cmd: Command) -> anyhow::Result<()> {
        self.send_raw(&Message::new(cmd).to_string()).await
    }

    /// Receive one message (5 s timeout).
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive one message with an explicit timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Message> {
        let mut line = String::new();
        let n = timeout(dur, self.reader.read_line(&mut line)).await??;
        if n == 0 {
            anyhow::bail!("connection closed");
        }
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("parse error on {line:?}: {e}"))
    }

    /// Receive until the predicate matches, returning everything read.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<Message>>
    where
        F: FnMut(&Message) -> bool,
    {
        let mut messages = Vec::new();
        loop {
            let msg = self.recv().await?;
            let done = predicate(&msg);
            messages.push(msg);
            if done {
                return Ok(messages);
            }
        }
    }

    /// Receive until a numeric with the given code arrives.
    pub async fn recv_until_numeric(&mut self, code: u16) -> anyhow::Result<Vec<Message>> {
        self.recv_until(|msg| {
            matches!(&msg.command, Command::Response(resp, _) if resp.code() == code)
        })
        .await
    }

    /// Register with NICK + USER and wait for the welcome block.
    pub async fn register(&mut self) -> anyhow::Result<()> {
        self.send(Command::NICK(self.nick.clone())).await?;
        self.send(Command::USER(
            self.nick.clone(),
            "0".to_string(),
            "*".to_string(),
            format!("Test User {}", self.nick),
        ))
        .await?;

        let messages = self.recv_until_numeric(Response::RPL_MYINFO.code()).await?;
        anyhow::ensure!(
            messages.iter().any(|msg| matches!(
                &msg.command,
                Command::Response(Response::RPL_WELCOME, _)
            )),
            "registration failed: no RPL_WELCOME received"
        );
        Ok(())
    }

    /// Join a channel and wait for the end of the NAMES block.
    pub async fn join(&mut self, channel: &str) -> anyhow::Result<()> {
        self.send(Command::JOIN(channel.to_string(), None)).await?;
        self.recv_until_numeric(Response::RPL_ENDOFNAMES.code())
            .await?;
        Ok(())
    }

    /// Send a PRIVMSG.
    pub async fn privmsg(&mut self, target: &str, text: &str) -> anyhow::Result<()> {
        self.send(Command::PRIVMSG(target.to_string(), text.to_string()))
            .await
    }

    /// Round-trip a PING so every line the server queued before it has
    /// been delivered.
    pub async fn sync(&mut self) -> anyhow::Result<Vec<Message>> {
        self.send_raw("PING :sync-token").await?;
        self.recv_until(|msg| matches!(&msg.command, Command::PONG(token) if token == "sync-token"))
            .await
    }

    /// Send QUIT.
    pub async fn quit(&mut self, reason: Option<String>) -> anyhow::Result<()> {
        self.send(Command::QUIT(reason)).await
    }
}

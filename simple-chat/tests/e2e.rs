use std::{process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow, ensure};
use simple_chat::message::write_line;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const LISTENING_BANNER: &str = "Server listening for connections on port";

/// One running `simple_chat` process with its console piped.
struct ChatProcess {
    name: String,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl ChatProcess {
    fn spawn(name: &str, args: &[&str], log_level: &str) -> Result<Self> {
        let mut child = Command::new(assert_cmd::cargo::cargo_bin!("simple_chat"))
            .args(args)
            .env("RUST_LOG", log_level)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {name}"))?;

        let stdin = child.stdin.take().context("stdin not piped")?;
        let stdout = child.stdout.take().context("stdout not piped")?;
        Ok(Self {
            name: name.to_string(),
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Hub on an ephemeral loopback port, logging at info so the banner shows.
    fn hub() -> Result<Self> {
        Self::spawn("hub", &["server", "0", "--bind", "127.0.0.1"], "info")
    }

    /// Client whose stdout carries only what the endpoint displays.
    fn client(login_id: &str, port: u16) -> Result<Self> {
        let port = port.to_string();
        Self::spawn(login_id, &["client", login_id, "127.0.0.1", &port], "warn")
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        write_line(&mut self.stdin, line)
            .await
            .with_context(|| format!("{}: failed to type {line:?}", self.name))
    }

    async fn next_line(&mut self) -> Result<String> {
        let line = timeout(READ_TIMEOUT, self.stdout.next_line())
            .await
            .map_err(|_| anyhow!("{}: no output within {READ_TIMEOUT:?}", self.name))??;
        line.with_context(|| format!("{}: output closed", self.name))
    }

    async fn expect_line(&mut self, expected: &str) -> Result<()> {
        let line = self.next_line().await?;
        ensure!(line == expected, "{}: expected {expected:?}, got {line:?}", self.name);
        Ok(())
    }

    /// Port taken from the hub's first log line.
    async fn listening_port(&mut self) -> Result<u16> {
        let banner = self.next_line().await?;
        let (_, port) = banner
            .rsplit_once(LISTENING_BANNER)
            .with_context(|| format!("unexpected hub banner: {banner}"))?;
        port.trim()
            .parse()
            .with_context(|| format!("hub banner port is not numeric: {banner}"))
    }

    /// Waits for a clean exit and returns the output nobody read yet.
    async fn finish(mut self) -> Result<Vec<String>> {
        let status = timeout(READ_TIMEOUT, self.child.wait())
            .await
            .map_err(|_| anyhow!("{} did not exit in time", self.name))??;
        ensure!(status.success(), "{} exited with {status}", self.name);

        let mut unread = Vec::new();
        while let Some(line) = self.stdout.next_line().await? {
            unread.push(line);
        }
        Ok(unread)
    }
}

#[tokio::test]
async fn cli_chat_end_to_end() -> Result<()> {
    let mut hub = ChatProcess::hub()?;
    let port = hub.listening_port().await?;

    let mut alice = ChatProcess::client("alice", port)?;
    alice.send("hello").await?;
    alice.expect_line("alice> hello").await?;

    let mut bob = ChatProcess::client("bob", port)?;
    bob.send("hi").await?;
    alice.expect_line("bob> hi").await?;
    bob.expect_line("bob> hi").await?;

    // Local commands never reach the hub.
    bob.send("#getport").await?;
    bob.expect_line(&port.to_string()).await?;

    hub.send("coffee break").await?;
    for client in [&mut alice, &mut bob] {
        client.expect_line("SERVER MSG> coffee break").await?;
    }

    // Closing the hub is fatal to both clients.
    hub.send("#close").await?;
    for client in [&mut alice, &mut bob] {
        client.expect_line("The server has shut down").await?;
    }
    alice.finish().await?;
    bob.finish().await?;

    // `#close` leaves the hub process running; `#quit` ends it.
    hub.send("#quit").await?;
    let hub_output = hub.finish().await?;
    assert!(
        hub_output.iter().any(|line| line == "coffee break"),
        "hub console never showed its own text: {hub_output:?}"
    );

    Ok(())
}

#[tokio::test]
async fn client_logoff_keeps_process_running() -> Result<()> {
    let mut hub = ChatProcess::hub()?;
    let port = hub.listening_port().await?;

    let mut carol = ChatProcess::client("carol", port)?;
    carol.send("#logoff").await?;
    carol.expect_line("Connection is closed").await?;

    carol.send("#sethost 127.0.0.1").await?;
    carol.send("#gethost").await?;
    carol.expect_line("127.0.0.1").await?;

    carol.send("#quit").await?;
    let unread = carol.finish().await?;
    assert!(unread.is_empty(), "unexpected client output: {unread:?}");

    hub.send("#quit").await?;
    hub.finish().await?;

    Ok(())
}

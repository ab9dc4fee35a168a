use std::io;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// First character of every operator command and of the login handshake.
pub const COMMAND_PREFIX: char = '#';

/// Literal that opens the handshake payload sent by every endpoint.
pub const LOGIN_COMMAND: &str = "#login";

/// Prefix the hub puts in front of text typed at its own console.
pub const SERVER_MSG_PREFIX: &str = "SERVER MSG> ";

/// Sent to a connection that repeats the handshake before it is dropped.
pub const ALREADY_LOGGED_IN: &str = "Error, already logged in. Terminating connection.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("login handshake is missing an identifier")]
    MissingLoginId,
}

/// Builds the handshake payload: `#login <identifier>`.
pub fn login_payload(login_id: &str) -> String {
    format!("{LOGIN_COMMAND} {login_id}")
}

/// Extracts the identifier from a handshake payload.
///
/// Returns `Ok(None)` when the payload is ordinary chat text. Anything that
/// starts with `#login` is treated as a handshake, so a bare `#login` is a
/// protocol error rather than chat.
pub fn parse_login(payload: &str) -> Result<Option<&str>, ProtocolError> {
    if !payload.starts_with(LOGIN_COMMAND) {
        return Ok(None);
    }

    payload
        .split_whitespace()
        .nth(1)
        .map(Some)
        .ok_or(ProtocolError::MissingLoginId)
}

/// Chat payload rebroadcast with the sender's identity: `<id>> <text>`.
pub fn chat_line(login_id: &str, text: &str) -> String {
    format!("{login_id}> {text}")
}

/// Text typed at the hub console, as every client receives it.
pub fn server_line(text: &str) -> String {
    format!("{SERVER_MSG_PREFIX}{text}")
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // One write per payload so a line never interleaves with another on the socket.
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

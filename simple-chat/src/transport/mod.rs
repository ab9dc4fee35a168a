//! Connection-oriented line transport the chat roles are built on.
//!
//! Each live connection is driven by a single tokio task that owns the socket.
//! Everything else talks to that task through an unbounded queue of
//! [`Outbound`] commands, which keeps writes to one socket serialized no
//! matter how many tasks send to it. Applications plug in through the hook
//! traits [`server::ServerHooks`] and [`client::ClientHooks`].

use std::io;

use thiserror::Error;

pub mod client;
pub mod server;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("connection closed by peer")]
    ClosedByPeer,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Work queued for a connection task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Line(String),
    Close,
}

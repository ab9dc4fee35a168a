//! Multi-client text chat over newline-delimited TCP.
//!
//! A hub accepts connections, learns each client's identity from a
//! `#login <id>` handshake and rebroadcasts chat as `<id>> <text>` to every
//! connected client. Endpoints connect, log in, and split operator input into
//! `#` commands and chat payload. Each module has one job:
//!
//! - [`transport`] owns sockets: accept loop, one task per connection,
//!   send/broadcast/close, and the hook traits the roles implement.
//! - [`hub`] is the server role: identity tracking, routing, console commands.
//! - [`endpoint`] is the client role: handshake, command/payload split,
//!   fatal versus graceful disconnects.
//! - [`command`] classifies operator input and parses command arguments.
//! - [`message`] holds the wire literals and line framing.
//! - [`config`], [`cli`], [`console`], [`shutdown`] and [`driver`] are the
//!   process plumbing around them.

pub mod cli;
pub mod command;
pub mod config;
pub mod console;
pub mod driver;
pub mod endpoint;
pub mod hub;
pub mod message;
pub mod shutdown;
pub mod transport;

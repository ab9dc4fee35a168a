//! Operator command parsing shared by the hub and the endpoint consoles.
//!
//! A line that starts with `#` is a command; anything else is chat payload and
//! is passed through untouched. The verb is chosen by testing the line against
//! each literal of the role's verb table in order (case-sensitive), the
//! remaining whitespace-separated tokens are positional arguments.
//!
//! Argument counts are not validated here. Handlers ask for the argument they
//! need with [`Command::arg`] or [`Command::port_arg`] and get a
//! [`CommandError`] back when it is missing or malformed.

use std::num::ParseIntError;

use thiserror::Error;

use crate::message::COMMAND_PREFIX;

/// Displayed for any `#` line that matches no verb of the role.
pub const INVALID_COMMAND: &str = "Invalid command";

/// A role's fixed set of command verbs.
pub trait Verb: Copy + PartialEq + 'static {
    /// Verb literals in matching order.
    const TABLE: &'static [(&'static str, Self)];

    fn literal(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, verb)| *verb == self)
            .map(|(literal, _)| *literal)
            .unwrap_or("#")
    }
}

/// Verbs understood by the hub console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerVerb {
    Quit,
    Stop,
    Close,
    SetPort,
    Start,
    GetPort,
}

impl Verb for ServerVerb {
    const TABLE: &'static [(&'static str, Self)] = &[
        ("#quit", ServerVerb::Quit),
        ("#stop", ServerVerb::Stop),
        ("#close", ServerVerb::Close),
        ("#setport", ServerVerb::SetPort),
        ("#start", ServerVerb::Start),
        ("#getport", ServerVerb::GetPort),
    ];
}

/// Verbs understood by the endpoint console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVerb {
    Quit,
    Logoff,
    SetHost,
    SetPort,
    Login,
    GetHost,
    GetPort,
}

impl Verb for ClientVerb {
    const TABLE: &'static [(&'static str, Self)] = &[
        ("#quit", ClientVerb::Quit),
        ("#logoff", ClientVerb::Logoff),
        ("#sethost", ClientVerb::SetHost),
        ("#setport", ClientVerb::SetPort),
        ("#login", ClientVerb::Login),
        ("#gethost", ClientVerb::GetHost),
        ("#getport", ClientVerb::GetPort),
    ];
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{command} requires an argument")]
    MissingArgument { command: &'static str },
    #[error("{command}: '{value}' is not a valid port")]
    InvalidPort {
        command: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<V> {
    pub verb: V,
    pub args: Vec<String>,
}

impl<V: Verb> Command<V> {
    /// Positional argument `index` (0 is the first token after the verb).
    pub fn arg(&self, index: usize) -> Result<&str, CommandError> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or(CommandError::MissingArgument {
                command: self.verb.literal(),
            })
    }

    /// First argument parsed as a TCP port.
    pub fn port_arg(&self) -> Result<u16, CommandError> {
        let value = self.arg(0)?;
        value.parse().map_err(|source| CommandError::InvalidPort {
            command: self.verb.literal(),
            value: value.to_string(),
            source,
        })
    }
}

/// Result of classifying one line of operator input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a, V> {
    /// Not a command: forward verbatim.
    Payload(&'a str),
    Command(Command<V>),
    /// Starts with `#` but names no verb of this role.
    Unknown(&'a str),
}

pub fn interpret<V: Verb>(line: &str) -> Input<'_, V> {
    if !line.starts_with(COMMAND_PREFIX) {
        return Input::Payload(line);
    }

    let Some(&(_, verb)) = V::TABLE
        .iter()
        .find(|(literal, _)| line.starts_with(literal))
    else {
        return Input::Unknown(line);
    };

    let args = line
        .split_whitespace()
        .skip(1)
        .map(str::to_string)
        .collect();

    Input::Command(Command { verb, args })
}

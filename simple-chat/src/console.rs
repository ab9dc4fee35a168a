//! Operator-facing output.
//!
//! Protocol code never prints directly; it hands finished lines to a
//! [`Console`]. The binary uses [`StdoutConsole`], tests and embedders can use
//! [`RecordingConsole`] to inspect what an operator would have seen.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
};

pub trait Console: Send + Sync + 'static {
    fn display(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn display(&self, message: &str) {
        let mut stdout = io::stdout().lock();
        // A closed stdout leaves nobody to tell.
        let _ = writeln!(stdout, "{message}").and_then(|()| stdout.flush());
    }
}

/// Keeps every displayed line in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingConsole {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line == message)
    }
}

impl Console for RecordingConsole {
    fn display(&self, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

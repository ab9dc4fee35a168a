//! Process termination as a signal instead of an exit call.
//!
//! Protocol code reports that the process should end, either by returning
//! [`Flow::Terminate`] from an input handler or by triggering a [`Shutdown`]
//! from a connection task. Only the driver in `main` actually exits.

use std::sync::Arc;

use tokio::sync::watch;

/// What the driver should do after handling one line of operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

impl Flow {
    pub fn is_terminate(self) -> bool {
        self == Flow::Terminate
    }
}

/// One-way latch shared between connection tasks and the driver.
#[derive(Debug, Clone)]
pub struct Shutdown {
    state: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn trigger(&self) {
        self.state.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`Shutdown::trigger`] has been called, immediately if it already was.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

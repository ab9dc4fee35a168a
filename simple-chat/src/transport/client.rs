use std::sync::Arc;

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    select,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{Outbound, TransportError};
use crate::message::write_line;

/// Callbacks a client application implements. They run on the connection
/// task (or, for `connection_established`, on the caller of
/// [`Client::open_connection`]) and must not block.
pub trait ClientHooks: Send + Sync + 'static {
    fn handle_message_from_server(&self, message: &str);

    /// Runs before `open_connection` returns, so anything sent here is queued
    /// ahead of every later send on the same connection.
    fn connection_established(&self, _server: &ServerLink) {}

    /// The connection ended because this side closed it.
    fn connection_closed(&self) {}

    /// The connection ended because the peer went away or the socket failed.
    fn connection_exception(&self, _error: TransportError) {}
}

/// Sending half of an open connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ServerLink {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ServerLink {
    pub fn send_to_server(&self, line: impl Into<String>) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Line(line.into()))
            .map_err(|_| TransportError::NotConnected)
    }

    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

struct ActiveConnection {
    server: ServerLink,
    task: JoinHandle<()>,
}

/// A single outbound connection that can be opened and closed repeatedly.
pub struct Client<H: ClientHooks> {
    host: String,
    port: u16,
    hooks: Arc<H>,
    connection: Option<ActiveConnection>,
}

impl<H: ClientHooks> Client<H> {
    pub fn new(host: impl Into<String>, port: u16, hooks: H) -> Self {
        Self {
            host: host.into(),
            port,
            hooks: Arc::new(hooks),
            connection: None,
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Takes effect on the next [`Client::open_connection`].
    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    /// Takes effect on the next [`Client::open_connection`].
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.server.is_open())
    }

    /// Connects to the configured host and port. No-op if already connected.
    pub async fn open_connection(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        info!(host = %self.host, port = self.port, "connected");

        let (outbound, rx) = mpsc::unbounded_channel();
        let server = ServerLink { outbound };
        let task = tokio::spawn(run_connection(stream, rx, Arc::clone(&self.hooks)));
        self.connection = Some(ActiveConnection {
            server: server.clone(),
            task,
        });

        self.hooks.connection_established(&server);
        Ok(())
    }

    pub fn send_to_server(&self, line: impl Into<String>) -> Result<(), TransportError> {
        match &self.connection {
            Some(connection) => connection.server.send_to_server(line),
            None => Err(TransportError::NotConnected),
        }
    }

    /// Hangs up after already-queued lines are written and waits for the
    /// connection task to finish. No-op when not connected.
    pub async fn close_connection(&mut self) {
        let Some(ActiveConnection { server, task }) = self.connection.take() else {
            return;
        };
        // Fails only if the task already ended on its own.
        let _ = server.outbound.send(Outbound::Close);
        if let Err(err) = task.await {
            warn!(error = ?err, "connection task ended abnormally");
        }
    }
}

enum Ending {
    Local,
    Lost(TransportError),
}

async fn run_connection<H: ClientHooks>(
    stream: TcpStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    hooks: Arc<H>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let ending = loop {
        select! {
            biased;

            command = outbound.recv() => match command {
                Some(Outbound::Line(line)) => {
                    if let Err(err) = write_line(&mut writer, &line).await {
                        break Ending::Lost(err.into());
                    }
                }
                Some(Outbound::Close) | None => break Ending::Local,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => hooks.handle_message_from_server(&line),
                Ok(None) => break Ending::Lost(TransportError::ClosedByPeer),
                Err(err) => break Ending::Lost(err.into()),
            },
        }
    };

    outbound.close();
    if let Err(err) = writer.shutdown().await {
        debug!(error = ?err, "failed to shut down writer");
    }

    match ending {
        Ending::Local => hooks.connection_closed(),
        Ending::Lost(err) => {
            debug!(error = %err, "connection lost");
            hooks.connection_exception(err);
        }
    }
}

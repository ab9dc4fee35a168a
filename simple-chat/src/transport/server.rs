use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, warn};

use super::{Outbound, TransportError};
use crate::{config::ListenerConfig, message::write_line};

pub type ConnectionId = u64;

/// Callbacks a server application implements. Every method runs on a
/// transport task and must not block.
pub trait ServerHooks: Send + Sync + 'static {
    /// Per-connection state, created empty on accept and owned by the
    /// connection's read task.
    type Session: Default + Send + 'static;

    /// Called for every line a client sends. Returning an error reports it
    /// through [`ServerHooks::client_exception`] and closes that connection.
    fn handle_message_from_client(
        &self,
        message: &str,
        session: &mut Self::Session,
        client: &ConnectionToClient,
        clients: &Clients,
    ) -> anyhow::Result<()>;

    fn server_started(&self, _local_addr: SocketAddr) {}

    fn server_stopped(&self) {}

    fn server_closed(&self) {}

    fn client_connected(&self, _client: &ConnectionToClient) {}

    /// Called once per connection after its task has stopped, whatever the cause.
    fn client_disconnected(&self, _client: &ConnectionToClient, _session: &Self::Session) {}

    fn client_exception(&self, _client: &ConnectionToClient, _error: &anyhow::Error) {}
}

/// Handle to one accepted connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionToClient {
    id: ConnectionId,
    peer: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionToClient {
    pub(crate) fn new(
        id: ConnectionId,
        peer: SocketAddr,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { id, peer, outbound }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Queues one line for this client.
    pub fn send_to_client(&self, line: impl Into<String>) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Line(line.into()))
            .map_err(|_| TransportError::NotConnected)
    }

    /// Asks the connection task to hang up once already-queued lines are written.
    pub fn close(&self) {
        if self.outbound.send(Outbound::Close).is_err() {
            debug!(client = %self, "close requested on a finished connection");
        }
    }

    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

impl fmt::Display for ConnectionToClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client {}", self.id)
    }
}

impl fmt::Debug for ConnectionToClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionToClient")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Registry of live connections, shared by the accept loop, every
/// connection task and the operator console.
#[derive(Clone, Default)]
pub struct Clients {
    inner: Arc<Mutex<HashMap<ConnectionId, ConnectionToClient>>>,
}

impl Clients {
    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionToClient>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `line` for every live connection. The registry stays locked
    /// while queueing, so concurrent broadcasts reach everyone in one order.
    pub fn send_to_all_clients(&self, line: &str) {
        let clients = self.lock();
        for client in clients.values() {
            if let Err(err) = client.send_to_client(line) {
                debug!(client = %client, error = %err, "skipping broadcast to closed connection");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn insert(&self, client: ConnectionToClient) {
        self.lock().insert(client.id(), client);
    }

    fn remove(&self, id: ConnectionId) -> Option<ConnectionToClient> {
        self.lock().remove(&id)
    }

    fn close_all(&self) {
        for client in self.lock().values() {
            client.close();
        }
    }
}

struct ServerState<H: ServerHooks> {
    hooks: Arc<H>,
    clients: Clients,
    next_id: AtomicU64,
}

impl<H: ServerHooks> ServerState<H> {
    fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

struct ListenerTask {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Accepts TCP connections and runs one task per client.
///
/// Listening and the set of open connections are independent: stopping the
/// listener keeps existing clients, [`Server::close`] ends both.
pub struct Server<H: ServerHooks> {
    config: ListenerConfig,
    state: Arc<ServerState<H>>,
    listener: Option<ListenerTask>,
}

impl<H: ServerHooks> Server<H> {
    pub fn new(config: ListenerConfig, hooks: H) -> Self {
        Self {
            config,
            state: Arc::new(ServerState {
                hooks: Arc::new(hooks),
                clients: Clients::default(),
                next_id: AtomicU64::new(1),
            }),
            listener: None,
        }
    }

    pub fn hooks(&self) -> &H {
        &self.state.hooks
    }

    pub fn clients(&self) -> &Clients {
        &self.state.clients
    }

    pub fn send_to_all_clients(&self, line: &str) {
        self.state.clients.send_to_all_clients(line);
    }

    /// Configured port. Takes effect on the next [`Server::listen`].
    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.config.port = port;
    }

    /// Address actually bound, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .filter(|listener| !listener.task.is_finished())
            .map(|listener| listener.local_addr)
    }

    pub fn is_listening(&self) -> bool {
        self.local_addr().is_some()
    }

    /// Binds the configured address and starts accepting. No-op if already listening.
    pub async fn listen(&mut self) -> std::io::Result<()> {
        if self.is_listening() {
            return Ok(());
        }

        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let local_addr = listener.local_addr()?;
        self.state.hooks.server_started(local_addr);

        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&self.state), stop_rx));
        self.listener = Some(ListenerTask {
            local_addr,
            stop,
            task,
        });
        Ok(())
    }

    /// Stops accepting new connections; open connections are left alone.
    pub async fn stop_listening(&mut self) {
        let Some(ListenerTask { stop, task, .. }) = self.listener.take() else {
            return;
        };
        // The loop may already be gone if accept hit a fatal error.
        let _ = stop.send(());
        if let Err(err) = task.await {
            warn!(error = ?err, "accept loop ended abnormally");
        }
    }

    /// Stops listening and hangs up on every client.
    pub async fn close(&mut self) {
        self.stop_listening().await;
        self.state.clients.close_all();
        self.state.hooks.server_closed();
    }
}

async fn accept_loop<H: ServerHooks>(
    listener: TcpListener,
    state: Arc<ServerState<H>>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        select! {
            _ = &mut stop => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => spawn_client_handler(stream, peer, &state),
                // Transient (e.g. out of descriptors); keep serving.
                Err(err) => warn!(error = ?err, "accept failed"),
            },
        }
    }
    drop(listener);
    state.hooks.server_stopped();
}

fn spawn_client_handler<H: ServerHooks>(
    stream: TcpStream,
    peer: SocketAddr,
    state: &Arc<ServerState<H>>,
) {
    let (client, outbound) = ConnectionToClient::new(state.next_id(), peer);
    state.clients.insert(client.clone());
    state.hooks.client_connected(&client);

    let state = Arc::clone(state);
    tokio::spawn(async move {
        handle_connection(stream, client, outbound, state).await;
    });
}

async fn handle_connection<H: ServerHooks>(
    stream: TcpStream,
    client: ConnectionToClient,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    state: Arc<ServerState<H>>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut session = H::Session::default();

    loop {
        select! {
            // Queued writes and closes go first so a close issued while
            // handling a line takes effect before the next line is read.
            biased;

            command = outbound.recv() => match command {
                Some(Outbound::Line(line)) => {
                    if let Err(err) = write_line(&mut writer, &line).await {
                        debug!(client = %client, error = ?err, "failed to deliver line");
                        break;
                    }
                }
                Some(Outbound::Close) | None => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(err) = state.hooks.handle_message_from_client(
                        &line,
                        &mut session,
                        &client,
                        &state.clients,
                    ) {
                        state.hooks.client_exception(&client, &err);
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    state.hooks.client_exception(&client, &anyhow::Error::from(err));
                    break;
                }
            },
        }
    }

    state.clients.remove(client.id());
    outbound.close();
    if let Err(err) = writer.shutdown().await {
        debug!(client = %client, error = ?err, "failed to shut down client writer");
    }
    state.hooks.client_disconnected(&client, &session);
}

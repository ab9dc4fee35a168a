//! Server role: tracks who each connection is and routes chat between them.

use std::{
    net::SocketAddr,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{info, warn};

use crate::{
    command::{self, Command, CommandError, INVALID_COMMAND, Input, ServerVerb},
    config::ListenerConfig,
    console::Console,
    message::{self, ALREADY_LOGGED_IN},
    shutdown::Flow,
    transport::server::{Clients, ConnectionToClient, Server, ServerHooks},
};

pub const SERVER_NOT_CLOSED: &str = "Error, server has not been closed.";
pub const SERVER_NOT_STOPPED: &str = "Error, server has not been stopped.";

/// How chat payloads are fanned out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// Clients must log in; chat goes out as `<loginid>> <text>`.
    #[default]
    IdentityPrefixed,
    /// Legacy echo server: every line, handshakes included, is broadcast
    /// unchanged and nobody has to log in.
    PassThrough,
}

/// Identity of one connection. Empty until the handshake, then fixed.
#[derive(Debug, Default)]
pub struct LoginState {
    login_id: Option<String>,
}

impl LoginState {
    pub fn login_id(&self) -> Option<&str> {
        self.login_id.as_deref()
    }
}

/// Transport callbacks for the hub.
#[derive(Debug, Default)]
pub struct HubHooks {
    routing: RoutingPolicy,
    closed: AtomicBool,
    disconnect_lock: Mutex<()>,
}

impl HubHooks {
    pub fn new(routing: RoutingPolicy) -> Self {
        Self {
            routing,
            ..Self::default()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn handle_login(
        &self,
        login_id: &str,
        session: &mut LoginState,
        client: &ConnectionToClient,
    ) {
        if let Some(existing) = session.login_id() {
            warn!(%client, login_id = existing, attempted = login_id, "repeated login, terminating connection");
            if let Err(err) = client.send_to_client(ALREADY_LOGGED_IN) {
                warn!(%client, error = %err, "could not deliver login rejection");
            }
            client.close();
            return;
        }

        info!(%client, login_id, "client logged in");
        session.login_id = Some(login_id.to_string());
    }
}

impl ServerHooks for HubHooks {
    type Session = LoginState;

    fn handle_message_from_client(
        &self,
        message: &str,
        session: &mut LoginState,
        client: &ConnectionToClient,
        clients: &Clients,
    ) -> anyhow::Result<()> {
        info!(%client, message, "message received");

        if self.routing == RoutingPolicy::PassThrough {
            clients.send_to_all_clients(message);
            return Ok(());
        }

        if let Some(login_id) = message::parse_login(message)? {
            self.handle_login(login_id, session, client);
            return Ok(());
        }

        match session.login_id() {
            Some(login_id) => clients.send_to_all_clients(&message::chat_line(login_id, message)),
            None => warn!(%client, "dropping chat from a connection that has not logged in"),
        }
        Ok(())
    }

    fn server_started(&self, local_addr: SocketAddr) {
        self.closed.store(false, Ordering::SeqCst);
        info!("Server listening for connections on port {}", local_addr.port());
    }

    fn server_stopped(&self) {
        info!("Server has stopped listening for connections.");
    }

    fn server_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        info!("Server closed.");
    }

    fn client_connected(&self, client: &ConnectionToClient) {
        info!(peer = %client.peer_addr(), "{client} has connected");
    }

    fn client_disconnected(&self, client: &ConnectionToClient, session: &LoginState) {
        let _guard = self
            .disconnect_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        info!(login_id = session.login_id(), "{client} has disconnected");
    }

    fn client_exception(&self, client: &ConnectionToClient, error: &anyhow::Error) {
        warn!(%client, error = %error, "closing connection after error");
    }
}

/// The server role: a listening transport plus the operator console commands.
pub struct Hub<C: Console> {
    server: Server<HubHooks>,
    console: C,
}

impl<C: Console> Hub<C> {
    pub fn new(config: ListenerConfig, routing: RoutingPolicy, console: C) -> Self {
        Self {
            server: Server::new(config, HubHooks::new(routing)),
            console,
        }
    }

    pub async fn start(&mut self) -> std::io::Result<()> {
        self.server.listen().await
    }

    pub fn is_listening(&self) -> bool {
        self.server.is_listening()
    }

    pub fn is_closed(&self) -> bool {
        self.server.hooks().is_closed()
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    pub fn clients(&self) -> &Clients {
        self.server.clients()
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    /// Handles one line typed at the hub console.
    pub async fn handle_message_from_server_ui(
        &mut self,
        line: &str,
    ) -> Result<Flow, CommandError> {
        match command::interpret::<ServerVerb>(line) {
            Input::Command(command) => self.handle_command(command).await,
            Input::Unknown(_) => {
                self.console.display(INVALID_COMMAND);
                Ok(Flow::Continue)
            }
            Input::Payload(text) => {
                self.console.display(text);
                self.server.send_to_all_clients(&message::server_line(text));
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle_command(&mut self, command: Command<ServerVerb>) -> Result<Flow, CommandError> {
        match command.verb {
            ServerVerb::Quit => return Ok(self.quit().await),
            ServerVerb::Stop => self.server.stop_listening().await,
            ServerVerb::Close => self.server.close().await,
            ServerVerb::SetPort => {
                if self.is_closed() {
                    let port = command.port_arg()?;
                    self.server.set_port(port);
                } else {
                    self.console.display(SERVER_NOT_CLOSED);
                }
            }
            ServerVerb::Start => {
                if self.server.is_listening() {
                    self.console.display(SERVER_NOT_STOPPED);
                } else if let Err(err) = self.server.listen().await {
                    warn!(port = self.server.port(), error = %err, "could not start listening");
                }
            }
            ServerVerb::GetPort => self.console.display(&self.server.port().to_string()),
        }
        Ok(Flow::Continue)
    }

    /// Closes the listener and every connection, then asks the driver to exit.
    pub async fn quit(&mut self) -> Flow {
        self.server.close().await;
        Flow::Terminate
    }
}

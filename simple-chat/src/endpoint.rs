//! Client role: one connection to the hub, the login handshake, and the
//! split of operator input into commands and chat.
//!
//! The endpoint is either disconnected or connected. Every time a connection
//! opens, `#login <id>` is queued before `open_connection` returns, so the hub
//! always sees the handshake first. Losing the connection from the far side is
//! fatal to the process; closing it locally is not.

use tracing::{debug, info};

use crate::{
    command::{self, ClientVerb, Command, CommandError, INVALID_COMMAND, Input},
    config::EndpointConfig,
    console::Console,
    message,
    shutdown::{Flow, Shutdown},
    transport::{
        TransportError,
        client::{Client, ClientHooks, ServerLink},
    },
};

pub const STILL_LOGGED_IN: &str = "Error, client is still logged in";
pub const SEND_FAILED: &str = "Could not send message to server.  Terminating client.";
pub const SERVER_SHUT_DOWN: &str = "The server has shut down";
pub const CONNECTION_CLOSED: &str = "Connection is closed";

/// Transport callbacks for the endpoint.
pub struct EndpointHooks<C: Console> {
    login_id: String,
    console: C,
    shutdown: Shutdown,
}

impl<C: Console> EndpointHooks<C> {
    pub fn console(&self) -> &C {
        &self.console
    }
}

impl<C: Console> ClientHooks for EndpointHooks<C> {
    fn handle_message_from_server(&self, message: &str) {
        self.console.display(message);
    }

    fn connection_established(&self, server: &ServerLink) {
        match server.send_to_server(message::login_payload(&self.login_id)) {
            Ok(()) => info!("{} has logged on.", self.login_id),
            Err(err) => debug!(error = %err, "handshake could not be queued"),
        }
    }

    fn connection_closed(&self) {
        self.console.display(CONNECTION_CLOSED);
    }

    fn connection_exception(&self, error: TransportError) {
        debug!(error = %error, "lost connection to server");
        self.console.display(SERVER_SHUT_DOWN);
        self.shutdown.trigger();
    }
}

pub struct SessionEndpoint<C: Console> {
    client: Client<EndpointHooks<C>>,
}

impl<C: Console> SessionEndpoint<C> {
    /// Creates a disconnected endpoint. `shutdown` is triggered if the hub
    /// goes away while connected.
    pub fn new(config: EndpointConfig, console: C, shutdown: Shutdown) -> Self {
        let EndpointConfig {
            host,
            port,
            login_id,
        } = config;
        let hooks = EndpointHooks {
            login_id,
            console,
            shutdown,
        };
        Self {
            client: Client::new(host, port, hooks),
        }
    }

    pub fn host(&self) -> &str {
        self.client.host()
    }

    pub fn port(&self) -> u16 {
        self.client.port()
    }

    pub fn console(&self) -> &C {
        self.client.hooks().console()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Connects and queues the handshake.
    pub async fn open_connection(&mut self) -> Result<(), TransportError> {
        self.client.open_connection().await
    }

    /// Handles one line typed at the endpoint console.
    pub async fn handle_message_from_client_ui(
        &mut self,
        line: &str,
    ) -> Result<Flow, CommandError> {
        match command::interpret::<ClientVerb>(line) {
            Input::Command(command) => self.handle_command(command).await,
            Input::Unknown(_) => {
                self.console().display(INVALID_COMMAND);
                Ok(Flow::Continue)
            }
            // Only a connection task that is already gone fails here; a write
            // error after queueing arrives later as `connection_exception`.
            Input::Payload(text) => match self.client.send_to_server(text) {
                Ok(()) => Ok(Flow::Continue),
                Err(err) => {
                    debug!(error = %err, "failed to forward chat");
                    self.console().display(SEND_FAILED);
                    Ok(self.quit().await)
                }
            },
        }
    }

    async fn handle_command(&mut self, command: Command<ClientVerb>) -> Result<Flow, CommandError> {
        match command.verb {
            ClientVerb::Quit => return Ok(self.quit().await),
            ClientVerb::Logoff => self.client.close_connection().await,
            ClientVerb::SetHost => {
                if self.is_connected() {
                    self.console().display(STILL_LOGGED_IN);
                } else {
                    let host = command.arg(0)?;
                    self.client.set_host(host);
                }
            }
            ClientVerb::SetPort => {
                if self.is_connected() {
                    self.console().display(STILL_LOGGED_IN);
                } else {
                    let port = command.port_arg()?;
                    self.client.set_port(port);
                }
            }
            ClientVerb::Login => {
                if self.is_connected() {
                    self.console().display(STILL_LOGGED_IN);
                } else if let Err(err) = self.client.open_connection().await {
                    debug!(host = self.host(), port = self.port(), error = %err, "login failed");
                }
            }
            ClientVerb::GetHost => self.console().display(self.client.host()),
            ClientVerb::GetPort => self.console().display(&self.client.port().to_string()),
        }
        Ok(Flow::Continue)
    }

    /// Closes the connection if open, then asks the driver to exit.
    pub async fn quit(&mut self) -> Flow {
        self.client.close_connection().await;
        Flow::Terminate
    }
}

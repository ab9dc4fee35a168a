use clap::{Args, Parser, Subcommand};

use crate::{
    config::{DEFAULT_BIND, DEFAULT_HOST, EndpointConfig, ListenerConfig, port_or_default},
    hub::RoutingPolicy,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat hub and read operator commands from stdin.
    Server(ServerArgs),
    /// Connect to a hub and chat from stdin.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Port to listen on. Falls back to 5555 when missing or not a number.
    pub port: Option<String>,

    /// Interface to bind.
    #[arg(long, default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Broadcast every line unchanged, without login handshakes.
    #[arg(long)]
    pub pass_through: bool,
}

impl ServerArgs {
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            host: self.bind.clone(),
            port: port_or_default(self.port.as_deref()),
        }
    }

    pub fn routing(&self) -> RoutingPolicy {
        if self.pass_through {
            RoutingPolicy::PassThrough
        } else {
            RoutingPolicy::IdentityPrefixed
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Identifier sent in the login handshake.
    pub login_id: String,

    /// Hub host name or address.
    #[arg(default_value = DEFAULT_HOST)]
    pub host: String,

    /// Hub port. Falls back to 5555 when missing or not a number.
    pub port: Option<String>,
}

impl ClientArgs {
    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig {
            host: self.host.clone(),
            port: port_or_default(self.port.as_deref()),
            login_id: self.login_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).expect("valid arguments").command
    }

    #[test]
    fn server_port_is_lenient() {
        let Command::Server(args) = parse(&["simple_chat", "server"]) else {
            panic!("expected server");
        };
        assert_eq!(args.listener_config().port, 5555);
        assert_eq!(args.listener_config().host, "0.0.0.0");
        assert_eq!(args.routing(), RoutingPolicy::IdentityPrefixed);

        let Command::Server(args) = parse(&["simple_chat", "server", "not-a-port"]) else {
            panic!("expected server");
        };
        assert_eq!(args.listener_config().port, 5555);

        let Command::Server(args) = parse(&[
            "simple_chat",
            "server",
            "6000",
            "--bind",
            "127.0.0.1",
            "--pass-through",
        ]) else {
            panic!("expected server");
        };
        assert_eq!(
            args.listener_config(),
            ListenerConfig {
                host: "127.0.0.1".into(),
                port: 6000
            }
        );
        assert_eq!(args.routing(), RoutingPolicy::PassThrough);
    }

    #[test]
    fn client_defaults() {
        let Command::Client(args) = parse(&["simple_chat", "client", "alice"]) else {
            panic!("expected client");
        };
        assert_eq!(
            args.endpoint_config(),
            EndpointConfig {
                host: "localhost".into(),
                port: 5555,
                login_id: "alice".into(),
            }
        );

        let Command::Client(args) = parse(&["simple_chat", "client", "bob", "10.0.0.2", "6000"])
        else {
            panic!("expected client");
        };
        assert_eq!(args.endpoint_config().host, "10.0.0.2");
        assert_eq!(args.endpoint_config().port, 6000);
    }

    #[test]
    fn client_requires_login_id() {
        assert!(Cli::try_parse_from(["simple_chat", "client"]).is_err());
    }
}

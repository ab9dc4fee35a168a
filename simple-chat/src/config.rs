/// Port used by both roles when none (or garbage) is given on the command line.
pub const DEFAULT_PORT: u16 = 5555;

pub const DEFAULT_HOST: &str = "localhost";

/// Interface the hub binds when no `--bind` is given.
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Where the hub listens. `port` may only change while the hub is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Where an endpoint connects and who it claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    pub login_id: String,
}

/// Lenient port parsing used by the command line: anything unusable means the default.
pub fn port_or_default(raw: Option<&str>) -> u16 {
    raw.and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

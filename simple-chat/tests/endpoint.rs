use std::time::Duration;

use anyhow::Result;
use simple_chat::{
    config::{EndpointConfig, ListenerConfig},
    console::RecordingConsole,
    endpoint::{CONNECTION_CLOSED, SERVER_SHUT_DOWN, SessionEndpoint},
    hub::{Hub, RoutingPolicy},
    shutdown::{Flow, Shutdown},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    time::{sleep, timeout},
};

const WAIT: Duration = Duration::from_secs(2);

fn endpoint(login_id: &str, port: u16) -> (SessionEndpoint<RecordingConsole>, Shutdown) {
    let shutdown = Shutdown::new();
    let config = EndpointConfig {
        host: "127.0.0.1".into(),
        port,
        login_id: login_id.into(),
    };
    (
        SessionEndpoint::new(config, RecordingConsole::new(), shutdown.clone()),
        shutdown,
    )
}

async fn wait_for_line(console: &RecordingConsole, expected: &str) -> Result<()> {
    timeout(WAIT, async {
        while !console.contains(expected) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("'{expected}' not displayed; saw {:?}", console.lines()))
}

async fn start_hub() -> Result<(Hub<RecordingConsole>, u16)> {
    let config = ListenerConfig {
        host: "127.0.0.1".into(),
        port: 0,
    };
    let mut hub = Hub::new(config, RoutingPolicy::IdentityPrefixed, RecordingConsole::new());
    hub.start().await?;
    let port = hub.local_addr().expect("listening").port();
    Ok((hub, port))
}

#[tokio::test]
async fn handshake_is_the_first_line_and_sent_once() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let (mut alice, _) = endpoint("alice", port);

    alice.open_connection().await?;
    alice.handle_message_from_client_ui("hello, world ").await?;
    alice.handle_message_from_client_ui("#getport").await?;
    alice.handle_message_from_client_ui("second").await?;

    let (stream, _) = listener.accept().await?;
    let mut lines = BufReader::new(stream).lines();
    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(timeout(WAIT, lines.next_line()).await??.expect("line"));
    }
    assert_eq!(received, vec!["#login alice", "hello, world ", "second"]);

    // Logging off and back in opens a new connection with its own handshake.
    alice.handle_message_from_client_ui("#logoff").await?;
    assert_eq!(timeout(WAIT, lines.next_line()).await??, None);
    alice.handle_message_from_client_ui("#login").await?;
    let (stream, _) = listener.accept().await?;
    let mut lines = BufReader::new(stream).lines();
    assert_eq!(
        timeout(WAIT, lines.next_line()).await??.as_deref(),
        Some("#login alice")
    );

    let _ = alice.quit().await;
    Ok(())
}

#[tokio::test]
async fn endpoints_chat_through_the_hub() -> Result<()> {
    let (mut hub, port) = start_hub().await?;
    let (mut alice, alice_shutdown) = endpoint("alice", port);
    let (mut bob, bob_shutdown) = endpoint("bob", port);

    alice.open_connection().await?;
    alice.handle_message_from_client_ui("hello").await?;
    wait_for_line(alice.console(), "alice> hello").await?;

    bob.open_connection().await?;
    bob.handle_message_from_client_ui("hi").await?;
    wait_for_line(alice.console(), "bob> hi").await?;
    wait_for_line(bob.console(), "bob> hi").await?;
    assert_eq!(alice.console().lines(), vec!["alice> hello", "bob> hi"]);
    assert_eq!(bob.console().lines(), vec!["bob> hi"]);

    hub.handle_message_from_server_ui("#close").await?;
    wait_for_line(alice.console(), SERVER_SHUT_DOWN).await?;
    wait_for_line(bob.console(), SERVER_SHUT_DOWN).await?;
    timeout(WAIT, alice_shutdown.wait()).await?;
    timeout(WAIT, bob_shutdown.wait()).await?;
    assert!(!alice.is_connected());
    assert!(!alice.console().contains(CONNECTION_CLOSED));

    Ok(())
}

#[tokio::test]
async fn logoff_is_graceful() -> Result<()> {
    let (mut hub, port) = start_hub().await?;
    let (mut alice, shutdown) = endpoint("alice", port);

    alice.open_connection().await?;
    let flow = alice.handle_message_from_client_ui("#logoff").await?;

    assert_eq!(flow, Flow::Continue);
    assert!(!alice.is_connected());
    assert_eq!(alice.console().lines(), vec![CONNECTION_CLOSED]);
    assert!(!shutdown.is_triggered());

    // Disconnected, so the endpoint can be pointed elsewhere now.
    alice.handle_message_from_client_ui("#setport 9999").await?;
    assert_eq!(alice.port(), 9999);

    let _ = hub.quit().await;
    Ok(())
}

#[tokio::test]
async fn login_while_connected_is_guarded_and_hub_quit_is_fatal() -> Result<()> {
    let (mut hub, port) = start_hub().await?;
    let (mut alice, shutdown) = endpoint("alice", port);

    alice.open_connection().await?;
    alice.handle_message_from_client_ui("#login again").await?;
    // Already connected, so `#login` is a local guard and never reaches the hub.
    assert!(alice.console().contains("Error, client is still logged in"));
    assert!(!shutdown.is_triggered());

    let _ = hub.quit().await;
    wait_for_line(alice.console(), SERVER_SHUT_DOWN).await?;
    assert!(shutdown.is_triggered());
    Ok(())
}

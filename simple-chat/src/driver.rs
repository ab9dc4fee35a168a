//! Process drivers: feed operator input into a role and decide when to exit.

use std::{
    io::{self, BufRead},
    thread,
};

use anyhow::{Context, Result};
use tokio::{select, sync::mpsc};
use tracing::{error, info, warn};

use crate::{
    cli::{ClientArgs, ServerArgs},
    console::StdoutConsole,
    endpoint::SessionEndpoint,
    hub::Hub,
    shutdown::Shutdown,
};

/// Reads stdin on a plain thread so a pending read never holds up process exit.
fn spawn_stdin_reader() -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        warn!(error = ?err, "failed to spawn console reader, input disabled");
    }
    rx
}

pub async fn run_server(args: ServerArgs) -> Result<()> {
    let mut hub = Hub::new(args.listener_config(), args.routing(), StdoutConsole);
    if let Err(err) = hub.start().await {
        error!(port = hub.port(), error = %err, "ERROR - Could not listen for clients!");
    }

    let mut input = spawn_stdin_reader();
    let mut input_open = true;

    loop {
        select! {
            line = input.recv(), if input_open => match line {
                Some(line) => {
                    let line = line.context("failed to read console input")?;
                    if hub.handle_message_from_server_ui(&line).await?.is_terminate() {
                        break;
                    }
                }
                None => {
                    // The hub keeps serving clients without a console.
                    info!("console input closed");
                    input_open = false;
                }
            },
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                let _ = hub.quit().await;
                break;
            }
        }
    }

    Ok(())
}

pub async fn run_client(args: ClientArgs) -> Result<()> {
    let shutdown = Shutdown::new();
    let mut endpoint = SessionEndpoint::new(args.endpoint_config(), StdoutConsole, shutdown.clone());
    endpoint
        .open_connection()
        .await
        .context("Can't setup connection! Terminating client.")?;

    let mut input = spawn_stdin_reader();

    loop {
        select! {
            _ = shutdown.wait() => break,
            line = input.recv() => match line {
                Some(line) => {
                    let line = line.context("failed to read console input")?;
                    if endpoint.handle_message_from_client_ui(&line).await?.is_terminate() {
                        break;
                    }
                }
                None => {
                    let _ = endpoint.quit().await;
                    break;
                }
            },
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                let _ = endpoint.quit().await;
                break;
            }
        }
    }

    Ok(())
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

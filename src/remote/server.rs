// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! TCP line server for remote controllers.
//!
//! Each connection sends one command per line and receives JSON messages, one
//! per line: the current state on connect, a `state_update` whenever the
//! published snapshot changed (checked every broadcast interval), and an
//! `error` reply for lines that do not parse.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::command::Command;
use super::snapshot::{ServerMessage, StateSnapshot};
use crate::sequencer::CommandSender;

/// Serialize a message as one JSON line
pub fn encode_line(message: &ServerMessage) -> String {
    let mut line = serde_json::to_string(message).unwrap_or_else(|e| {
        format!(r#"{{"type":"error","message":"serialization failed: {}"}}"#, e)
    });
    line.push('\n');
    line
}

fn state_line(snapshot: &StateSnapshot) -> String {
    encode_line(&ServerMessage::StateUpdate {
        data: snapshot.clone(),
    })
}

/// Accepts controller connections and relays their commands
pub struct RemoteServer {
    listener: TcpListener,
    commands: CommandSender,
    snapshots: watch::Receiver<Arc<StateSnapshot>>,
    broadcast_interval: Duration,
}

impl RemoteServer {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        commands: CommandSender,
        snapshots: watch::Receiver<Arc<StateSnapshot>>,
        broadcast_interval: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("Failed to bind remote control listener")?;
        Ok(Self {
            listener,
            commands,
            snapshots,
            broadcast_interval: broadcast_interval.max(Duration::from_millis(1)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Serve connections until `shutdown` completes
    pub async fn run<F: Future<Output = ()>>(self, shutdown: F) -> Result<()> {
        let (tx, _) = broadcast::channel::<Arc<str>>(64);
        let broadcaster = tokio::spawn(run_broadcaster(
            self.snapshots.clone(),
            tx.clone(),
            self.broadcast_interval,
        ));

        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "remote control listening");
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "controller connected");
                        let connection = Connection {
                            commands: self.commands.clone(),
                            snapshots: self.snapshots.clone(),
                            updates: tx.subscribe(),
                        };
                        tokio::spawn(async move {
                            if let Err(e) = connection.serve(stream).await {
                                debug!(%peer, "connection ended with error: {:#}", e);
                            }
                            info!(%peer, "controller disconnected");
                        });
                    }
                    Err(e) => warn!("accept failed: {}", e),
                },
            }
        }

        broadcaster.abort();
        info!("remote control stopped");
        Ok(())
    }
}

/// Poll the snapshot channel and fan changed states out to every connection
async fn run_broadcaster(
    mut snapshots: watch::Receiver<Arc<StateSnapshot>>,
    tx: broadcast::Sender<Arc<str>>,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        match snapshots.has_changed() {
            Ok(true) => {
                let line = state_line(&snapshots.borrow_and_update());
                // No receivers is fine
                let _ = tx.send(Arc::from(line));
            }
            Ok(false) => {}
            Err(_) => break,
        }
    }
}

struct Connection {
    commands: CommandSender,
    snapshots: watch::Receiver<Arc<StateSnapshot>>,
    updates: broadcast::Receiver<Arc<str>>,
}

impl Connection {
    async fn serve(self, stream: TcpStream) -> Result<()> {
        let Connection {
            commands,
            snapshots,
            mut updates,
        } = self;
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let initial = state_line(&snapshots.borrow());
        writer.write_all(initial.as_bytes()).await?;

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Some(reply) = handle_line(&commands, &line).await {
                            writer.write_all(reply.as_bytes()).await?;
                        }
                    }
                    None => break,
                },
                update = updates.recv() => match update {
                    Ok(line) => writer.write_all(line.as_bytes()).await?,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "controller lagging, skipped updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        Ok(())
    }
}

/// Parse and queue one command line. Returns an error reply, if any.
async fn handle_line(commands: &CommandSender, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            warn!(line, "rejected command: {}", e);
            return Some(encode_line(&ServerMessage::Error {
                message: e.to_string(),
            }));
        }
    };

    // Pushing blocks while the queue is full
    let commands = commands.clone();
    let pushed = tokio::task::spawn_blocking(move || commands.push(command)).await;
    match pushed {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(encode_line(&ServerMessage::Error {
            message: e.to_string(),
        })),
        Err(e) => Some(encode_line(&ServerMessage::Error {
            message: format!("command dropped: {}", e),
        })),
    }
}

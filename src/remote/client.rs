// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Remote controller client with automatic reconnection.
//!
//! [`ConnectionMachine`] is the pure reconnect state machine; [`RemoteClient`]
//! drives it over a real TCP connection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::snapshot::{ServerMessage, StateSnapshot};
use crate::sequencer::SequencerEvent;

/// Backoff settings for reconnecting
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Failed attempts in a row before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            multiplier: 1.5,
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `delay` before the next attempt
    Backoff { attempt: u32, delay: Duration },
    /// Out of attempts
    Failed,
}

/// Reconnect state machine, independent of any I/O
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempt: u32,
    next_delay: Duration,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let next_delay = policy.initial_delay;
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempt: 0,
            next_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Begin a connection attempt. Ignored once failed or connected.
    pub fn connect(&mut self) -> ConnectionState {
        if matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Backoff { .. }
        ) {
            self.state = ConnectionState::Connecting;
        }
        self.state
    }

    /// The attempt succeeded; attempts and delay start over
    pub fn connected(&mut self) -> ConnectionState {
        self.attempt = 0;
        self.next_delay = self.policy.initial_delay;
        self.state = ConnectionState::Connected;
        self.state
    }

    /// An attempt failed or an open connection was lost
    pub fn failed(&mut self) -> ConnectionState {
        if self.state == ConnectionState::Failed {
            return self.state;
        }
        self.attempt += 1;
        if self.attempt > self.policy.max_attempts {
            self.state = ConnectionState::Failed;
            return self.state;
        }

        let delay = self.next_delay.min(self.policy.max_delay);
        self.state = ConnectionState::Backoff {
            attempt: self.attempt,
            delay,
        };
        self.next_delay = delay.mul_f64(self.policy.multiplier).min(self.policy.max_delay);
        self.state
    }

    /// Back to a fresh, disconnected machine
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.next_delay = self.policy.initial_delay;
        self.state = ConnectionState::Disconnected;
    }
}

/// How a connected session ended
enum SessionEnd {
    /// Server went away
    Lost,
    /// Caller closed the command channel
    Closed,
}

/// Connects to a server, tracks its state and forwards commands
pub struct RemoteClient {
    addr: String,
    machine: ConnectionMachine,
    events: mpsc::Sender<SequencerEvent>,
    latest: Option<Arc<StateSnapshot>>,
    last_session: Option<Option<Uuid>>,
}

impl RemoteClient {
    pub fn new(
        addr: impl Into<String>,
        policy: ReconnectPolicy,
        events: mpsc::Sender<SequencerEvent>,
    ) -> Self {
        Self {
            addr: addr.into(),
            machine: ConnectionMachine::new(policy),
            events,
            latest: None,
            last_session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Latest state received from the server
    pub fn snapshot(&self) -> Option<Arc<StateSnapshot>> {
        self.latest.clone()
    }

    /// Run until `commands` closes or reconnection gives up.
    ///
    /// Each string in `commands` is sent as one command line.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<String>) -> Result<()> {
        loop {
            self.machine.connect();
            debug!(addr = %self.addr, "connecting");

            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    self.machine.connected();
                    info!(addr = %self.addr, "connected to sequencer");
                    match self.serve(stream, &mut commands).await {
                        SessionEnd::Closed => {
                            self.machine.reset();
                            return Ok(());
                        }
                        SessionEnd::Lost => info!(addr = %self.addr, "connection lost"),
                    }
                }
                Err(e) => warn!(addr = %self.addr, "connection failed: {}", e),
            }

            match self.machine.failed() {
                ConnectionState::Backoff { attempt, delay } => {
                    info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
                    if wait_backoff(delay, &mut commands).await.is_none() {
                        self.machine.reset();
                        return Ok(());
                    }
                }
                _ => {
                    return Err(anyhow!(
                        "gave up connecting to {} after {} attempts",
                        self.addr,
                        self.machine.policy().max_attempts
                    ))
                }
            }
        }
    }

    async fn serve(
        &mut self,
        stream: TcpStream,
        commands: &mut mpsc::Receiver<String>,
    ) -> SessionEnd {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_message(&line).await,
                    Ok(None) | Err(_) => return SessionEnd::Lost,
                },
                command = commands.recv() => match command {
                    Some(mut command) => {
                        command.push('\n');
                        if writer.write_all(command.as_bytes()).await.is_err() {
                            return SessionEnd::Lost;
                        }
                    }
                    None => return SessionEnd::Closed,
                },
            }
        }
    }

    async fn handle_message(&mut self, line: &str) {
        match serde_json::from_str::<ServerMessage>(line) {
            Ok(ServerMessage::StateUpdate { data }) => {
                let snapshot = Arc::new(data);
                let event = SequencerEvent::classify(self.last_session, Arc::clone(&snapshot));
                self.last_session = Some(snapshot.session_id());
                self.latest = Some(snapshot);
                if self.events.send(event).await.is_err() {
                    debug!("event receiver dropped");
                }
            }
            Ok(ServerMessage::Error { message }) => warn!("server rejected command: {}", message),
            Err(e) => warn!("unreadable server message: {}", e),
        }
    }
}

/// Sleep out one backoff delay.
///
/// Commands arriving meanwhile can't be delivered and are dropped; the
/// deadline stays fixed. Returns the number dropped, or `None` if the command
/// channel closed.
async fn wait_backoff(delay: Duration, commands: &mut mpsc::Receiver<String>) -> Option<usize> {
    let until = tokio::time::Instant::now() + delay;
    let mut dropped = 0;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(until) => return Some(dropped),
            command = commands.recv() => match command {
                Some(command) => {
                    dropped += 1;
                    warn!("not connected, dropping command '{}'", command.trim());
                }
                None => return None,
            },
        }
    }
}

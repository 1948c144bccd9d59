// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The scheduler thread.
//!
//! [`Sequencer::start`] moves an [`Engine`] onto a dedicated thread that ticks
//! at a fixed cadence. Other threads talk to it through a bounded command
//! queue and observe it through published snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::engine::Engine;
use crate::error::{Result, SequencerError};
use crate::remote::{Command, StateSnapshot};

/// Scheduler thread settings
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerConfig {
    /// Bound of the command queue; pushing blocks while it is full
    pub command_queue_capacity: usize,
    /// Commands applied per tick at most
    pub max_commands_per_tick: usize,
    /// How long `stop` waits for the thread to finish
    pub shutdown_timeout: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: 1024,
            max_commands_per_tick: 256,
            shutdown_timeout: Duration::from_millis(1000),
        }
    }
}

/// Notification sent to subscribers after each tick
#[derive(Debug, Clone)]
pub enum SequencerEvent {
    /// First snapshot this subscriber sees
    FirstSync(Arc<StateSnapshot>),
    /// The session was replaced since the previous snapshot
    NewSession(Arc<StateSnapshot>),
    StateUpdated(Arc<StateSnapshot>),
}

impl SequencerEvent {
    /// Classify a snapshot against the session the subscriber last saw.
    ///
    /// `previous` is `None` until the subscriber has received anything.
    pub fn classify(previous: Option<Option<Uuid>>, snapshot: Arc<StateSnapshot>) -> Self {
        match previous {
            None => SequencerEvent::FirstSync(snapshot),
            Some(id) if id != snapshot.session_id() => SequencerEvent::NewSession(snapshot),
            Some(_) => SequencerEvent::StateUpdated(snapshot),
        }
    }

    pub fn snapshot(&self) -> &Arc<StateSnapshot> {
        match self {
            SequencerEvent::FirstSync(s)
            | SequencerEvent::NewSession(s)
            | SequencerEvent::StateUpdated(s) => s,
        }
    }
}

/// Handle for submitting commands to the scheduler thread
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: SyncSender<Command>,
}

impl CommandSender {
    /// Queue a command, blocking while the queue is full
    pub fn push(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| SequencerError::Stopped)
    }

    /// Queue a command without blocking. Returns false if the queue is full.
    pub fn try_push(&self, command: Command) -> Result<bool> {
        match self.tx.try_send(command) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(SequencerError::Stopped),
        }
    }
}

struct Observer {
    tx: SyncSender<SequencerEvent>,
    last_session: Option<Option<Uuid>>,
}

type Observers = Arc<Mutex<Vec<Observer>>>;

/// A running scheduler thread
pub struct Sequencer {
    commands: CommandSender,
    snapshots: watch::Receiver<Arc<StateSnapshot>>,
    observers: Observers,
    shutdown: Arc<AtomicBool>,
    revoked: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl Sequencer {
    /// Spawn the scheduler thread and hand it the engine
    pub fn start(engine: Engine, config: SequencerConfig) -> anyhow::Result<Self> {
        let (command_tx, command_rx) = mpsc::sync_channel(config.command_queue_capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(engine.snapshot()));
        let (done_tx, done_rx) = mpsc::channel();
        let observers: Observers = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let revoked = engine.devices().revocation_handle();

        let cadence = Duration::from_secs_f64(engine.cadence_seconds());
        info!(
            cadence_us = cadence.as_micros() as u64,
            queue = config.command_queue_capacity,
            "starting scheduler"
        );

        let worker = Worker {
            engine,
            commands: command_rx,
            snapshots: snapshot_tx,
            observers: Arc::clone(&observers),
            shutdown: Arc::clone(&shutdown),
            max_commands_per_tick: config.max_commands_per_tick.max(1),
            cadence,
        };

        let handle = thread::Builder::new()
            .name("seqd-scheduler".to_string())
            .spawn(move || {
                worker.run();
                let _ = done_tx.send(());
            })
            .context("Failed to spawn scheduler thread")?;

        Ok(Self {
            commands: CommandSender { tx: command_tx },
            snapshots: snapshot_rx,
            observers,
            shutdown,
            revoked,
            done_rx,
            handle: Some(handle),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// Queue a command, blocking while the queue is full
    pub fn push(&self, command: Command) -> Result<()> {
        self.commands.push(command)
    }

    /// Most recently published snapshot
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Watch receiver that always holds the latest snapshot
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<StateSnapshot>> {
        self.snapshots.clone()
    }

    /// Receive an event per tick.
    ///
    /// Events are dropped for a subscriber whose queue is full.
    pub fn subscribe(&self, capacity: usize) -> Receiver<SequencerEvent> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Observer {
                tx,
                last_session: None,
            });
        }
        rx
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the scheduler and wait for it to release its devices.
    ///
    /// Returns false if the thread did not finish within the shutdown
    /// timeout; its ports are then force closed on its next tick.
    pub fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        self.shutdown.store(true, Ordering::Release);

        match self.done_rx.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    error!("scheduler thread panicked");
                }
                info!("scheduler stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "scheduler did not stop in time, force closing devices"
                );
                self.revoked.store(true, Ordering::Release);
                false
            }
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    engine: Engine,
    commands: Receiver<Command>,
    snapshots: watch::Sender<Arc<StateSnapshot>>,
    observers: Observers,
    shutdown: Arc<AtomicBool>,
    max_commands_per_tick: usize,
    cadence: Duration,
}

impl Worker {
    fn run(mut self) {
        let mut deadline = Instant::now() + self.cadence;

        while !self.shutdown.load(Ordering::Acquire) {
            self.drain_commands();
            self.engine.tick(Instant::now());
            self.publish(Arc::new(self.engine.snapshot()));

            let (next, overrun) = next_tick_deadline(deadline, Instant::now(), self.cadence);
            if overrun {
                debug!("scheduler tick overran its deadline");
                self.engine.record_overrun();
            }
            deadline = next;
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
        }

        self.engine.shutdown();
    }

    fn drain_commands(&mut self) {
        for _ in 0..self.max_commands_per_tick {
            match self.commands.try_recv() {
                Ok(command) => self.engine.handle(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn publish(&self, snapshot: Arc<StateSnapshot>) {
        self.snapshots.send_replace(Arc::clone(&snapshot));

        let Ok(mut observers) = self.observers.lock() else {
            return;
        };
        observers.retain_mut(|observer| {
            let event = SequencerEvent::classify(observer.last_session, Arc::clone(&snapshot));
            match observer.tx.try_send(event) {
                Ok(()) => {
                    observer.last_session = Some(snapshot.session_id());
                    true
                }
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }
}

/// Next absolute tick deadline after `deadline`.
///
/// When `now` is already past the following boundary the missed ticks are
/// skipped and the overrun flag is set.
pub fn next_tick_deadline(deadline: Instant, now: Instant, cadence: Duration) -> (Instant, bool) {
    let cadence = cadence.max(Duration::from_micros(1));
    let next = deadline + cadence;
    if next > now {
        return (next, false);
    }
    let behind = now.duration_since(deadline).as_nanos();
    let steps = (behind / cadence.as_nanos() + 1) as u32;
    (deadline + cadence * steps, true)
}

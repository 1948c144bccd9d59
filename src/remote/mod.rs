// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Remote control surface.
//!
//! Controllers send text commands and receive JSON state snapshots. Nothing in
//! here touches sequencing state directly; commands go through the scheduler's
//! queue.

pub mod client;
pub mod command;
pub mod server;
pub mod snapshot;

pub use client::{ConnectionMachine, ConnectionState, ReconnectPolicy, RemoteClient};
pub use command::{parse_bool, Command};
pub use server::{encode_line, RemoteServer};
pub use snapshot::{
    ClipSnapshot, DeviceSnapshot, HardwareDevicesSnapshot, MusicalContextSnapshot,
    SequencerStatus, ServerMessage, SessionSnapshot, StateSnapshot, TrackSnapshot,
};

// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! SEQD - real-time MIDI sequencing backend.
//!
//! A single scheduler thread advances the musical clock, plays clips on
//! hardware-routed tracks and publishes immutable state snapshots. Everything
//! else (the remote control server, config hot reload) talks to it through a
//! bounded command queue.

pub mod config;
pub mod error;
pub mod hardware;
pub mod midi;
pub mod remote;
pub mod sequencer;
pub mod timing;

pub use config::BackendConfig;
pub use error::{CommandError, SequencerError};
pub use hardware::{DeviceDefinition, DeviceDirection, HardwareDevice, HardwareDeviceManager};
pub use midi::{MidiBackend, MidiMessage, MidirBackend, VirtualBackend};
pub use remote::{Command, StateSnapshot};
pub use sequencer::{Clip, Engine, SequenceEvent, Sequencer, SequencerEvent, Session, Track};
pub use timing::MusicalContext;

// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Sequencer core for scheduling and playing MIDI events.
//!
//! This module provides the core sequencing infrastructure:
//! - Session grid of tracks and clips
//! - Looping clips with per-event chance
//! - Deferred note-offs keyed by beat position
//! - The engine and the scheduler thread that drives it

pub mod clip;
pub mod engine;
pub mod event;
pub mod pending;
pub mod runner;
pub mod session;
pub mod track;

pub use clip::{Clip, ClipState, NoteTrigger};
pub use engine::Engine;
pub use event::SequenceEvent;
pub use pending::{PendingNoteOff, PendingNoteOffs};
pub use runner::{next_tick_deadline, CommandSender, Sequencer, SequencerConfig, SequencerEvent};
pub use session::{NoopSessionStore, Session, SessionStore, MAX_SCENES, MAX_TRACKS};
pub use track::Track;

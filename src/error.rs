// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Error types shared across the sequencer.

use thiserror::Error;
use uuid::Uuid;

/// Contract violations reported to whoever issued the operation.
///
/// Returning one of these guarantees no state was changed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequencerError {
    #[error("no session is loaded")]
    NoSession,

    #[error("track index {index} out of range (session has {len} tracks)")]
    TrackOutOfRange { index: usize, len: usize },

    #[error("scene index {index} out of range (session has {len} scenes)")]
    SceneOutOfRange { index: usize, len: usize },

    #[error("invalid session size: {tracks} tracks x {scenes} scenes")]
    InvalidSessionSize { tracks: usize, scenes: usize },

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("event {0} not found")]
    EventNotFound(Uuid),

    #[error("unknown hardware device '{0}'")]
    UnknownDevice(String),

    #[error("a device named '{0}' already exists")]
    DuplicateDevice(String),

    #[error("sequencer is not running")]
    Stopped,

    #[error("transport is playing")]
    TransportPlaying,
}

/// Malformed remote commands.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown address '{0}'")]
    UnknownAddress(String),

    #[error("{address}: missing parameter '{name}'")]
    MissingParameter { address: String, name: &'static str },

    #[error("{address}: invalid value '{value}' for '{name}'")]
    InvalidParameter {
        address: String,
        name: &'static str,
        value: String,
    },
}

pub type Result<T> = std::result::Result<T, SequencerError>;

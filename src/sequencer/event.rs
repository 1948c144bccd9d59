// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Scheduled notes inside a clip.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SequencerError};

/// A note scheduled at a clip-local beat position.
///
/// Range checks happen at construction: pitch, velocity, start and duration
/// are rejected when out of range, channel and chance are clamped. The same
/// checks apply when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct SequenceEvent {
    id: Uuid,
    start_beats: f64,
    note: u8,
    velocity: u8,
    duration_beats: f64,
    /// MIDI channel (1-16)
    channel: u8,
    /// Trigger probability (0.0 - 1.0)
    chance: f64,
}

/// Unchecked serialized form of [`SequenceEvent`]
#[derive(Deserialize)]
struct EventRecord {
    id: Uuid,
    start_beats: f64,
    note: u8,
    velocity: u8,
    duration_beats: f64,
    channel: i64,
    chance: f64,
}

impl TryFrom<EventRecord> for SequenceEvent {
    type Error = SequencerError;

    fn try_from(record: EventRecord) -> Result<Self> {
        let mut event = SequenceEvent::new(
            record.start_beats,
            record.note,
            record.velocity,
            record.duration_beats,
        )?
        .with_channel(record.channel)
        .with_chance(record.chance);
        event.id = record.id;
        Ok(event)
    }
}

impl SequenceEvent {
    /// Create an event on channel 1 that always fires
    pub fn new(start_beats: f64, note: u8, velocity: u8, duration_beats: f64) -> Result<Self> {
        if !start_beats.is_finite() || start_beats < 0.0 {
            return Err(SequencerError::InvalidEvent(format!(
                "start {} must be a finite value >= 0",
                start_beats
            )));
        }
        if !duration_beats.is_finite() || duration_beats <= 0.0 {
            return Err(SequencerError::InvalidEvent(format!(
                "duration {} must be a finite value > 0",
                duration_beats
            )));
        }
        if note > 127 {
            return Err(SequencerError::InvalidEvent(format!("note {} exceeds 127", note)));
        }
        if velocity > 127 {
            return Err(SequencerError::InvalidEvent(format!(
                "velocity {} exceeds 127",
                velocity
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            start_beats,
            note,
            velocity,
            duration_beats,
            channel: 1,
            chance: 1.0,
        })
    }

    /// Set the MIDI channel, clamped to 1-16
    pub fn with_channel(mut self, channel: i64) -> Self {
        self.channel = channel.clamp(1, 16) as u8;
        self
    }

    /// Set the trigger probability, clamped to 0.0-1.0
    pub fn with_chance(mut self, chance: f64) -> Self {
        self.chance = if chance.is_nan() {
            0.0
        } else {
            chance.clamp(0.0, 1.0)
        };
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn start_beats(&self) -> f64 {
        self.start_beats
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn duration_beats(&self) -> f64 {
        self.duration_beats
    }

    pub fn end_beats(&self) -> f64 {
        self.start_beats + self.duration_beats
    }

    /// MIDI channel (1-16)
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Wire channel (0-15)
    pub fn midi_channel(&self) -> u8 {
        self.channel.saturating_sub(1)
    }

    pub fn chance(&self) -> f64 {
        self.chance
    }

    pub(crate) fn set_start_beats(&mut self, start_beats: f64) {
        self.start_beats = start_beats.max(0.0);
    }
}

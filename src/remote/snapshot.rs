// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Immutable state snapshots and the messages that carry them.
//!
//! The scheduler builds one [`StateSnapshot`] per tick after all processing
//! for that tick is done. Readers only ever see whole snapshots.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hardware::{DeviceDirection, HardwareDevice, HardwareDeviceManager};
use crate::sequencer::{Clip, SequenceEvent, Session, Track};
use crate::timing::MusicalContext;

/// Everything a remote controller needs to render the current state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub session: Option<SessionSnapshot>,
    pub musical_context: MusicalContextSnapshot,
    pub hardware_devices: HardwareDevicesSnapshot,
    pub status: SequencerStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub name: String,
    pub num_tracks: usize,
    pub num_scenes: usize,
    pub playing: bool,
    pub bpm: f64,
    pub meter: u32,
    pub metronome_on: bool,
    pub fixed_length_recording_bars: u32,
    pub record_automation_enabled: bool,
    pub fixed_velocity: u8,
    pub tracks: Vec<TrackSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: Uuid,
    pub name: String,
    pub output_device_name: Option<String>,
    pub input_monitoring: bool,
    pub dropped_messages: u64,
    pub clips: Vec<ClipSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSnapshot {
    pub id: Uuid,
    pub name: String,
    pub playing: bool,
    pub recording: bool,
    pub playhead_beats: f64,
    pub length_beats: f64,
    pub quantization_step: f64,
    pub wrap: bool,
    pub events: Vec<SequenceEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicalContextSnapshot {
    pub bpm: f64,
    pub meter: u32,
    pub metronome_on: bool,
    pub playing: bool,
    pub playhead_beats: f64,
    pub bar_count: u64,
    pub sample_rate: f64,
}

impl Default for MusicalContextSnapshot {
    fn default() -> Self {
        Self::from(&MusicalContext::default())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HardwareDevicesSnapshot {
    pub devices: Vec<DeviceSnapshot>,
    pub available_inputs: Vec<String>,
    pub available_outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: Uuid,
    pub name: String,
    pub short_name: String,
    pub direction: DeviceDirection,
    pub channel: u8,
    pub open: bool,
    pub available: bool,
}

/// Scheduler health, replacing ad-hoc global status flags
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SequencerStatus {
    pub ticks: u64,
    pub overruns: u64,
    pub commands_applied: u64,
    pub commands_rejected: u64,
    pub notes_sent: u64,
    pub dropped_messages: u64,
    pub last_error: Option<String>,
}

impl StateSnapshot {
    /// Capture the current state
    pub fn capture(
        context: &MusicalContext,
        session: Option<&Session>,
        devices: &HardwareDeviceManager,
        status: &SequencerStatus,
    ) -> Self {
        Self {
            session: session.map(|s| SessionSnapshot::capture(s, context)),
            musical_context: MusicalContextSnapshot::from(context),
            hardware_devices: HardwareDevicesSnapshot::from(devices),
            status: status.clone(),
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }
}

impl SessionSnapshot {
    fn capture(session: &Session, context: &MusicalContext) -> Self {
        Self {
            id: session.id(),
            name: session.name().to_string(),
            num_tracks: session.num_tracks(),
            num_scenes: session.num_scenes(),
            playing: context.is_playing(),
            bpm: context.bpm(),
            meter: context.meter(),
            metronome_on: context.metronome_on(),
            fixed_length_recording_bars: session.fixed_length_recording_bars(),
            record_automation_enabled: session.record_automation_enabled(),
            fixed_velocity: session.fixed_velocity(),
            tracks: session.tracks().iter().map(TrackSnapshot::from).collect(),
        }
    }
}

impl From<&Track> for TrackSnapshot {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id(),
            name: track.name().to_string(),
            output_device_name: track.output_device_name().map(str::to_string),
            input_monitoring: track.input_monitoring(),
            dropped_messages: track.dropped_messages(),
            clips: track.clips().iter().map(ClipSnapshot::from).collect(),
        }
    }
}

impl From<&Clip> for ClipSnapshot {
    fn from(clip: &Clip) -> Self {
        Self {
            id: clip.id(),
            name: clip.name().to_string(),
            playing: clip.is_playing(),
            recording: clip.is_recording(),
            playhead_beats: clip.playhead_beats(),
            length_beats: clip.length_beats(),
            quantization_step: clip.quantization_step(),
            wrap: clip.wrap(),
            events: clip.events().to_vec(),
        }
    }
}

impl From<&MusicalContext> for MusicalContextSnapshot {
    fn from(context: &MusicalContext) -> Self {
        Self {
            bpm: context.bpm(),
            meter: context.meter(),
            metronome_on: context.metronome_on(),
            playing: context.is_playing(),
            playhead_beats: context.playhead_beats(),
            bar_count: context.bar_count(),
            sample_rate: context.sample_rate(),
        }
    }
}

impl From<&HardwareDevice> for DeviceSnapshot {
    fn from(device: &HardwareDevice) -> Self {
        Self {
            id: device.id(),
            name: device.name().to_string(),
            short_name: device.short_name().to_string(),
            direction: device.direction(),
            channel: device.channel(),
            open: device.is_open(),
            available: device.is_available(),
        }
    }
}

impl From<&HardwareDeviceManager> for HardwareDevicesSnapshot {
    fn from(manager: &HardwareDeviceManager) -> Self {
        Self {
            devices: manager.devices().iter().map(DeviceSnapshot::from).collect(),
            available_inputs: manager.available_input_names(),
            available_outputs: manager.available_output_names(),
        }
    }
}

/// Messages sent from the server to remote controllers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StateUpdate { data: StateSnapshot },
    Error { message: String },
}

// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tracks: one clip slot per scene, routed to a hardware output.
//!
//! A track plays at most one clip at a time. Its output device is held by
//! name and resolved through the device manager on every send, so renames and
//! unplugged devices are picked up without rebinding.

use std::collections::HashMap;

use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use super::clip::Clip;
use super::event::SequenceEvent;
use super::pending::{PendingNoteOff, PendingNoteOffs};
use crate::error::{Result, SequencerError};
use crate::hardware::HardwareDeviceManager;
use crate::midi::MidiMessage;

/// A note held on an input device while a clip records
#[derive(Debug, Clone, Copy)]
struct HeldNote {
    clip_index: usize,
    /// Clip-local start
    start_beats: f64,
    /// Clock beat of the note-on
    started_at: f64,
    velocity: u8,
}

/// A sequencer track
#[derive(Debug)]
pub struct Track {
    id: Uuid,
    name: String,
    /// Clips, indexed by scene
    clips: Vec<Clip>,
    output_device_name: Option<String>,
    input_monitoring: bool,
    dropped_messages: u64,
    /// Keyed by (wire channel, note)
    held_notes: HashMap<(u8, u8), HeldNote>,
}

impl Track {
    /// Create track `index` (zero based) with one empty clip per scene
    pub fn new(index: usize, num_scenes: usize) -> Self {
        let name = format!("Track {}", index + 1);
        let clips = (0..num_scenes)
            .map(|i| Clip::new(format!("{} Clip {}", name, i + 1)))
            .collect();
        Self {
            id: Uuid::new_v4(),
            name,
            clips,
            output_device_name: None,
            input_monitoring: false,
            dropped_messages: 0,
            held_notes: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn num_clips(&self) -> usize {
        self.clips.len()
    }

    pub fn clip(&self, index: usize) -> Result<&Clip> {
        let len = self.clips.len();
        self.clips
            .get(index)
            .ok_or(SequencerError::SceneOutOfRange { index, len })
    }

    pub fn clip_mut(&mut self, index: usize) -> Result<&mut Clip> {
        let len = self.clips.len();
        self.clips
            .get_mut(index)
            .ok_or(SequencerError::SceneOutOfRange { index, len })
    }

    /// Index of the clip currently playing, if any
    pub fn playing_clip_index(&self) -> Option<usize> {
        self.clips.iter().position(|c| c.is_playing())
    }

    /// Play clip `index`, stopping whichever clip was playing
    pub fn play_clip(&mut self, index: usize) -> Result<()> {
        self.clip(index)?;
        for (i, clip) in self.clips.iter_mut().enumerate() {
            if i != index && clip.is_playing() {
                clip.stop();
            }
        }
        self.clips[index].play();
        Ok(())
    }

    pub fn stop_clip(&mut self, index: usize) -> Result<()> {
        self.clip_mut(index)?.stop();
        self.held_notes.retain(|_, held| held.clip_index != index);
        Ok(())
    }

    /// Play clip `index` if it is stopped, stop it otherwise
    pub fn toggle_clip(&mut self, index: usize) -> Result<()> {
        if self.clip(index)?.is_playing() {
            self.stop_clip(index)
        } else {
            self.play_clip(index)
        }
    }

    pub fn stop_all_clips(&mut self) {
        for clip in &mut self.clips {
            clip.stop();
        }
        self.held_notes.clear();
    }

    /// Start recording into clip `index`, which becomes the playing clip
    pub fn start_recording(&mut self, index: usize) -> Result<()> {
        if !self.clip(index)?.is_playing() {
            self.play_clip(index)?;
        }
        self.clips[index].start_recording();
        Ok(())
    }

    pub fn stop_recording(&mut self, index: usize) -> Result<()> {
        self.clip_mut(index)?.stop_recording();
        self.held_notes.retain(|_, held| held.clip_index != index);
        Ok(())
    }

    pub fn output_device_name(&self) -> Option<&str> {
        self.output_device_name.as_deref()
    }

    /// Bind the track to an output device by name or short name
    pub fn set_output_device_name(&mut self, name: Option<String>) {
        self.output_device_name = name;
    }

    pub fn input_monitoring(&self) -> bool {
        self.input_monitoring
    }

    pub fn set_input_monitoring(&mut self, enabled: bool) {
        self.input_monitoring = enabled;
        if !enabled {
            self.held_notes.clear();
        }
    }

    /// Messages dropped because the output device was missing or failed
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }

    /// Send a message to the bound output device.
    ///
    /// Never fails: an unbound, unknown or closed device drops the message and
    /// bumps the drop counter.
    pub fn send_midi_message(
        &mut self,
        devices: &mut HardwareDeviceManager,
        message: &MidiMessage,
    ) -> bool {
        let sent = match self.output_device_name.as_deref() {
            Some(name) => match devices.output_device_mut(name) {
                Some(device) => device.send_message(message),
                None => false,
            },
            None => false,
        };
        if !sent {
            self.dropped_messages += 1;
        }
        sent
    }

    /// Play the beat range `[start_beats, end_beats)` on the playing clip.
    ///
    /// Note-ons go out immediately; their note-offs are registered in
    /// `pending`. Returns the number of note-ons sent.
    pub fn process_slice<R: Rng + ?Sized>(
        &mut self,
        track_index: usize,
        start_beats: f64,
        end_beats: f64,
        rng: &mut R,
        devices: &mut HardwareDeviceManager,
        pending: &mut PendingNoteOffs,
    ) -> usize {
        let Some(index) = self.playing_clip_index() else {
            return 0;
        };

        let triggers = self.clips[index].process_slice(start_beats, end_beats, rng);
        let mut sent = 0;
        for trigger in triggers {
            let note_on = MidiMessage::note_on(trigger.channel, trigger.note, trigger.velocity);
            if self.send_midi_message(devices, &note_on) {
                sent += 1;
                pending.register(PendingNoteOff {
                    track_index,
                    channel: trigger.channel,
                    note: trigger.note,
                    due_beats: trigger.at_beats + trigger.duration_beats,
                });
            }
        }
        sent
    }

    /// Handle a message from an input device.
    ///
    /// With input monitoring on, the message is echoed to the output device
    /// and notes are captured into the playing clip while it records.
    /// `clock_beats` is the current absolute playhead.
    pub fn handle_input(
        &mut self,
        message: &MidiMessage,
        clock_beats: f64,
        devices: &mut HardwareDeviceManager,
    ) {
        if !self.input_monitoring {
            return;
        }
        self.send_midi_message(devices, message);

        match *message {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => {
                let Some(index) = self.playing_clip_index() else {
                    return;
                };
                let clip = &self.clips[index];
                if clip.is_recording() {
                    self.held_notes.insert(
                        (channel, note),
                        HeldNote {
                            clip_index: index,
                            start_beats: clip.playhead_beats(),
                            started_at: clock_beats,
                            velocity,
                        },
                    );
                }
            }
            MidiMessage::NoteOff { channel, note, .. } => {
                if let Some(held) = self.held_notes.remove(&(channel, note)) {
                    self.record_note(held, channel, note, clock_beats);
                }
            }
            _ => {}
        }
    }

    fn record_note(&mut self, held: HeldNote, channel: u8, note: u8, clock_beats: f64) {
        let Some(clip) = self.clips.get_mut(held.clip_index) else {
            return;
        };
        if !clip.is_recording() {
            return;
        }
        let duration = (clock_beats - held.started_at).max(clip.quantization_step());
        match SequenceEvent::new(held.start_beats, note, held.velocity, duration) {
            Ok(event) => {
                let event = event.with_channel(channel as i64 + 1);
                debug!(track = %self.name, note, start = held.start_beats, duration, "recorded note");
                clip.add_event(event);
            }
            Err(e) => debug!(track = %self.name, "discarded recorded note: {}", e),
        }
    }
}

// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Clips: looping containers of sequence events.
//!
//! A clip turns each processed beat range into note triggers. The range is
//! translated into clip-local coordinates and split at the loop point, so an
//! event near the end of the loop is evaluated against the right window on
//! both sides of the wrap.

use std::collections::HashMap;

use rand::Rng;
use uuid::Uuid;

use super::event::SequenceEvent;

/// Default clip length in beats
pub const DEFAULT_LENGTH_BEATS: f64 = 4.0;
/// Default quantization grid in beats
pub const DEFAULT_QUANTIZATION_STEP: f64 = 0.25;
/// Shortest accepted loop length in beats
pub const MIN_LENGTH_BEATS: f64 = 1e-6;

/// Clip playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipState {
    /// Clip is stopped
    Stopped,
    /// Clip is playing
    Playing,
}

/// A note-on produced by a clip during one slice
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTrigger {
    /// Wire channel (0-15)
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    /// Absolute clock beat of the window the note-on was emitted for
    pub at_beats: f64,
    pub duration_beats: f64,
}

/// A clip containing sequence events
#[derive(Debug, Clone)]
pub struct Clip {
    id: Uuid,
    name: String,
    state: ClipState,
    recording: bool,
    length_beats: f64,
    /// Current position in beats (clip local)
    playhead_beats: f64,
    quantization_step: f64,
    wrap: bool,
    events: Vec<SequenceEvent>,
    /// Number of completed loops since play()
    pass: i64,
    /// Loop pass in which each event last fired
    fired: HashMap<Uuid, i64>,
}

impl Clip {
    /// Create a new empty clip
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: ClipState::Stopped,
            recording: false,
            length_beats: DEFAULT_LENGTH_BEATS,
            playhead_beats: 0.0,
            quantization_step: DEFAULT_QUANTIZATION_STEP,
            wrap: true,
            events: Vec::new(),
            pass: 0,
            fired: HashMap::new(),
        }
    }

    /// Set length in beats (builder style)
    pub fn with_length(mut self, length_beats: f64) -> Self {
        self.set_length(length_beats);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ClipState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == ClipState::Playing
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn length_beats(&self) -> f64 {
        self.length_beats
    }

    /// Set the loop length. Values below `MIN_LENGTH_BEATS` are ignored.
    pub fn set_length(&mut self, length_beats: f64) {
        if !(length_beats >= MIN_LENGTH_BEATS && length_beats.is_finite()) {
            return;
        }
        self.length_beats = length_beats;
        if self.playhead_beats >= length_beats {
            self.playhead_beats %= length_beats;
        }
    }

    pub fn playhead_beats(&self) -> f64 {
        self.playhead_beats
    }

    pub fn quantization_step(&self) -> f64 {
        self.quantization_step
    }

    pub fn wrap(&self) -> bool {
        self.wrap
    }

    pub fn set_wrap(&mut self, wrap: bool) {
        self.wrap = wrap;
    }

    /// Start playback from the top
    pub fn play(&mut self) {
        self.state = ClipState::Playing;
        self.rewind();
    }

    /// Stop playback. Rewinds and ends any recording.
    pub fn stop(&mut self) {
        self.state = ClipState::Stopped;
        self.recording = false;
        self.rewind();
    }

    /// Start recording, starting playback first if needed
    pub fn start_recording(&mut self) {
        if !self.is_playing() {
            self.play();
        }
        self.recording = true;
    }

    /// Stop recording; playback continues
    pub fn stop_recording(&mut self) {
        self.recording = false;
    }

    fn rewind(&mut self) {
        self.playhead_beats = 0.0;
        self.pass = 0;
        self.fired.clear();
    }

    /// Add an event to the clip
    pub fn add_event(&mut self, event: SequenceEvent) {
        self.events.push(event);
    }

    /// Remove an event by id
    pub fn remove_event(&mut self, id: Uuid) -> Option<SequenceEvent> {
        let index = self.events.iter().position(|e| e.id() == id)?;
        self.fired.remove(&id);
        Some(self.events.swap_remove(index))
    }

    /// Remove all events
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.fired.clear();
    }

    pub fn events(&self) -> &[SequenceEvent] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Snap every event start to a grid of `step` beats. Steps <= 0 are ignored.
    pub fn quantize_events(&mut self, step: f64) {
        if !(step > 0.0 && step.is_finite()) {
            return;
        }
        self.quantization_step = step;
        for event in &mut self.events {
            let snapped = (event.start_beats() / step).round() * step;
            event.set_start_beats(snapped);
        }
    }

    /// Process the absolute beat range `[start_beats, end_beats)`.
    ///
    /// Returns the note-ons to emit. Advances the playhead by the range
    /// length, wrapping at the loop point or stopping when wrap is off.
    pub fn process_slice<R: Rng + ?Sized>(
        &mut self,
        start_beats: f64,
        end_beats: f64,
        rng: &mut R,
    ) -> Vec<NoteTrigger> {
        let mut triggers = Vec::new();
        if self.state != ClipState::Playing {
            return triggers;
        }

        let mut remaining = end_beats - start_beats;
        if !(remaining > 0.0 && remaining.is_finite()) {
            return triggers;
        }

        let mut cursor = self.playhead_beats;
        let mut absolute = start_beats;

        loop {
            let local_end = cursor + remaining;
            if local_end < self.length_beats {
                self.collect_window(cursor, local_end, absolute, &mut *rng, &mut triggers);
                self.playhead_beats = local_end;
                return triggers;
            }

            // The slice reaches the loop point
            self.collect_window(cursor, self.length_beats, absolute, &mut *rng, &mut triggers);
            if !self.wrap {
                self.stop();
                return triggers;
            }

            let room = self.length_beats - cursor;
            absolute += room;
            remaining -= room;
            cursor = 0.0;
            self.pass = self.pass.saturating_add(1);

            if remaining <= 0.0 {
                self.playhead_beats = 0.0;
                return triggers;
            }

            // Whole loops inside the slice play once, the rest are skipped
            let whole = (remaining / self.length_beats).floor();
            if whole >= 1.0 {
                self.collect_window(0.0, self.length_beats, absolute, &mut *rng, &mut triggers);
                let tail = remaining % self.length_beats;
                self.pass = self.pass.saturating_add(whole as i64);
                absolute += remaining - tail;
                remaining = tail;

                if remaining <= 0.0 {
                    self.playhead_beats = 0.0;
                    return triggers;
                }
            }
        }
    }

    /// Intersect every event with the clip-local window `[window_start, window_end)`
    fn collect_window<R: Rng + ?Sized>(
        &mut self,
        window_start: f64,
        window_end: f64,
        absolute_start: f64,
        rng: &mut R,
        triggers: &mut Vec<NoteTrigger>,
    ) {
        for event in &self.events {
            let start = event.start_beats();
            if start >= self.length_beats {
                continue;
            }
            let end = event.end_beats();

            // (segment start, segment end, loop pass that owns the segment)
            let mut segments = [(start, end, self.pass), (0.0, 0.0, -1)];
            if self.wrap && end > self.length_beats {
                segments[0].1 = self.length_beats;
                segments[1] = (0.0, end - self.length_beats, self.pass - 1);
            }

            for (seg_start, seg_end, owner) in segments {
                if owner < 0 || seg_end <= window_start || seg_start >= window_end {
                    continue;
                }
                if self.fired.get(&event.id()) == Some(&owner) {
                    break;
                }
                self.fired.insert(event.id(), owner);

                let roll: f64 = rng.gen();
                if event.chance() > 0.0 && roll <= event.chance() {
                    triggers.push(NoteTrigger {
                        channel: event.midi_channel(),
                        note: event.note(),
                        velocity: event.velocity(),
                        at_beats: absolute_start,
                        duration_beats: event.duration_beats(),
                    });
                }
                break;
            }
        }
    }
}

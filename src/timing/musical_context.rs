// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Musical clock.
//!
//! Tracks tempo, meter and the transport, and converts elapsed wall-clock time
//! into beat ranges. The playhead advances by measured elapsed time, not by a
//! fixed per-tick increment, so scheduling jitter never accumulates.

use std::time::Instant;

/// Default tempo in BPM
pub const DEFAULT_BPM: f64 = 120.0;
/// Default beats per bar
pub const DEFAULT_METER: u32 = 4;
/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Tempo, meter, transport and playhead
#[derive(Debug, Clone)]
pub struct MusicalContext {
    bpm: f64,
    meter: u32,
    playing: bool,
    metronome_on: bool,
    playhead_beats: f64,
    bar_count: u64,
    sample_rate: f64,
    last_update: Instant,
}

impl MusicalContext {
    /// Create a stopped context at the given sample rate
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate: if sample_rate > 0.0 {
                sample_rate
            } else {
                DEFAULT_SAMPLE_RATE
            },
            ..Self::default()
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set the tempo. Values <= 0 are ignored.
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm > 0.0 && bpm.is_finite() {
            self.bpm = bpm;
        }
    }

    pub fn meter(&self) -> u32 {
        self.meter
    }

    /// Set beats per bar. Values <= 0 are ignored.
    pub fn set_meter(&mut self, meter: i64) {
        if meter > 0 {
            self.meter = meter.min(u32::MAX as i64) as u32;
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Set the sample rate. Values <= 0 are ignored.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate > 0.0 && sample_rate.is_finite() {
            self.sample_rate = sample_rate;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Start or stop the transport
    pub fn set_playing(&mut self, playing: bool) {
        self.set_playing_at(playing, Instant::now());
    }

    /// Start or stop the transport with an explicit wall-clock reference.
    ///
    /// Starting resets the reference used for elapsed-time computation.
    pub fn set_playing_at(&mut self, playing: bool, now: Instant) {
        if playing && !self.playing {
            self.last_update = now;
        }
        self.playing = playing;
    }

    pub fn metronome_on(&self) -> bool {
        self.metronome_on
    }

    pub fn set_metronome(&mut self, on: bool) {
        self.metronome_on = on;
    }

    pub fn playhead_beats(&self) -> f64 {
        self.playhead_beats
    }

    /// Number of whole bars the playhead has passed
    pub fn bar_count(&self) -> u64 {
        self.bar_count
    }

    /// Move the playhead back to the start.
    ///
    /// Ignored while playing, where the playhead only moves forward.
    /// Returns whether the playhead was reset.
    pub fn reset_playhead(&mut self) -> bool {
        if self.playing {
            return false;
        }
        self.playhead_beats = 0.0;
        self.bar_count = 0;
        true
    }

    /// Beat range covered by this slice, measured against the wall clock
    pub fn current_slice_range(&mut self) -> (f64, f64) {
        self.current_slice_range_at(Instant::now())
    }

    /// Beat range covered by the slice ending at `now`.
    ///
    /// While stopped this returns `(p, p)` and changes nothing. While playing
    /// the playhead advances by the beats elapsed since the last call.
    pub fn current_slice_range_at(&mut self, now: Instant) -> (f64, f64) {
        let start = self.playhead_beats;
        if !self.playing {
            return (start, start);
        }

        let elapsed_seconds = now.saturating_duration_since(self.last_update).as_secs_f64();
        let end = start + elapsed_seconds * self.bpm / 60.0;

        self.playhead_beats = end;
        self.bar_count = (end / self.meter as f64).floor() as u64;
        self.last_update = now;

        (start, end)
    }

    /// Nominal length of one slice in beats, independent of the wall clock
    pub fn slice_length_beats(&self, samples_per_slice: u32) -> f64 {
        self.samples_to_beats(samples_per_slice as f64)
    }

    /// Convert beats to samples at the current tempo
    pub fn beats_to_samples(&self, beats: f64) -> f64 {
        beats * 60.0 / self.bpm * self.sample_rate
    }

    /// Convert samples to beats at the current tempo
    pub fn samples_to_beats(&self, samples: f64) -> f64 {
        samples / self.sample_rate * self.bpm / 60.0
    }

    /// First bar line strictly after the playhead
    pub fn next_quantized_bar_boundary(&self) -> f64 {
        let meter = self.meter as f64;
        ((self.playhead_beats / meter).floor() + 1.0) * meter
    }
}

impl Default for MusicalContext {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            meter: DEFAULT_METER,
            playing: false,
            metronome_on: false,
            playhead_beats: 0.0,
            bar_count: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            last_update: Instant::now(),
        }
    }
}

// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Sessions: a fixed grid of tracks by scenes.

use anyhow::Result as AnyResult;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use super::pending::PendingNoteOffs;
use super::track::Track;
use crate::error::{Result, SequencerError};
use crate::hardware::HardwareDeviceManager;

/// Largest number of tracks a session may have
pub const MAX_TRACKS: usize = 64;
/// Largest number of scenes a session may have
pub const MAX_SCENES: usize = 64;

/// A session: `num_tracks` tracks with `num_scenes` clip slots each
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    name: String,
    tracks: Vec<Track>,
    num_scenes: usize,
    /// Bars a new recording is limited to (0 = unlimited)
    fixed_length_recording_bars: u32,
    record_automation_enabled: bool,
    fixed_velocity: u8,
}

impl Session {
    /// Create a session. Both counts must be in 1..=64.
    pub fn new(name: impl Into<String>, num_tracks: usize, num_scenes: usize) -> Result<Self> {
        if !(1..=MAX_TRACKS).contains(&num_tracks) || !(1..=MAX_SCENES).contains(&num_scenes) {
            return Err(SequencerError::InvalidSessionSize {
                tracks: num_tracks,
                scenes: num_scenes,
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tracks: (0..num_tracks).map(|i| Track::new(i, num_scenes)).collect(),
            num_scenes,
            fixed_length_recording_bars: 0,
            record_automation_enabled: false,
            fixed_velocity: 100,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn num_scenes(&self) -> usize {
        self.num_scenes
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Result<&Track> {
        let len = self.tracks.len();
        self.tracks
            .get(index)
            .ok_or(SequencerError::TrackOutOfRange { index, len })
    }

    pub fn track_mut(&mut self, index: usize) -> Result<&mut Track> {
        let len = self.tracks.len();
        self.tracks
            .get_mut(index)
            .ok_or(SequencerError::TrackOutOfRange { index, len })
    }

    /// Play clip `scene` on every track
    pub fn play_scene(&mut self, scene: usize) -> Result<()> {
        if scene >= self.num_scenes {
            return Err(SequencerError::SceneOutOfRange {
                index: scene,
                len: self.num_scenes,
            });
        }
        for track in &mut self.tracks {
            track.play_clip(scene)?;
        }
        Ok(())
    }

    pub fn stop_all_clips(&mut self) {
        for track in &mut self.tracks {
            track.stop_all_clips();
        }
    }

    pub fn fixed_length_recording_bars(&self) -> u32 {
        self.fixed_length_recording_bars
    }

    /// Negative values count as 0 (unlimited)
    pub fn set_fixed_length_recording_bars(&mut self, bars: i64) {
        self.fixed_length_recording_bars = bars.clamp(0, u32::MAX as i64) as u32;
    }

    pub fn record_automation_enabled(&self) -> bool {
        self.record_automation_enabled
    }

    pub fn set_record_automation_enabled(&mut self, enabled: bool) {
        self.record_automation_enabled = enabled;
    }

    pub fn fixed_velocity(&self) -> u8 {
        self.fixed_velocity
    }

    /// Clamped to 0-127
    pub fn set_fixed_velocity(&mut self, velocity: i64) {
        self.fixed_velocity = velocity.clamp(0, 127) as u8;
    }

    /// Play the beat range on every track. Returns note-ons sent.
    pub fn process_slice<R: Rng + ?Sized>(
        &mut self,
        start_beats: f64,
        end_beats: f64,
        rng: &mut R,
        devices: &mut HardwareDeviceManager,
        pending: &mut PendingNoteOffs,
    ) -> usize {
        let mut sent = 0;
        for (i, track) in self.tracks.iter_mut().enumerate() {
            sent += track.process_slice(i, start_beats, end_beats, &mut *rng, devices, pending);
        }
        sent
    }
}

/// Where sessions are saved to and loaded from
pub trait SessionStore: Send {
    fn save(&mut self, session: &Session) -> AnyResult<()>;

    /// Load the stored session, if there is one
    fn load(&mut self) -> AnyResult<Option<Session>>;
}

/// Store that keeps nothing
#[derive(Debug, Default)]
pub struct NoopSessionStore;

impl SessionStore for NoopSessionStore {
    fn save(&mut self, session: &Session) -> AnyResult<()> {
        info!(session = %session.name(), "session save requested, no store configured");
        Ok(())
    }

    fn load(&mut self) -> AnyResult<Option<Session>> {
        info!("session load requested, no store configured");
        Ok(None)
    }
}

// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The single-writer sequencing state.
//!
//! The engine owns the musical clock, the device manager, the session and the
//! pending note-off queue. It is driven by exactly one thread (the scheduler)
//! and is fully deterministic when fed explicit instants, which is how the
//! tests drive it.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use super::pending::{PendingNoteOff, PendingNoteOffs};
use super::session::{NoopSessionStore, Session, SessionStore};
use crate::error::{Result, SequencerError};
use crate::hardware::HardwareDeviceManager;
use crate::midi::MidiMessage;
use crate::remote::{Command, SequencerStatus, StateSnapshot};
use crate::timing::MusicalContext;

/// Sequencing state plus everything needed to play it
pub struct Engine {
    context: MusicalContext,
    devices: HardwareDeviceManager,
    session: Option<Session>,
    pending: PendingNoteOffs,
    rng: StdRng,
    store: Box<dyn SessionStore>,
    status: SequencerStatus,
    samples_per_slice: u32,
    sessions_created: u64,
}

impl Engine {
    pub fn new(devices: HardwareDeviceManager, sample_rate: f64, samples_per_slice: u32) -> Self {
        Self {
            context: MusicalContext::new(sample_rate),
            devices,
            session: None,
            pending: PendingNoteOffs::new(),
            rng: StdRng::from_entropy(),
            store: Box::new(NoopSessionStore),
            status: SequencerStatus::default(),
            samples_per_slice: samples_per_slice.max(1),
            sessions_created: 0,
        }
    }

    /// Use a fixed RNG (builder style)
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Use a session store (builder style)
    pub fn with_store(mut self, store: Box<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn context(&self) -> &MusicalContext {
        &self.context
    }

    pub fn devices(&self) -> &HardwareDeviceManager {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut HardwareDeviceManager {
        &mut self.devices
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub fn status(&self) -> &SequencerStatus {
        &self.status
    }

    pub fn pending_note_offs(&self) -> usize {
        self.pending.len()
    }

    pub fn samples_per_slice(&self) -> u32 {
        self.samples_per_slice
    }

    /// Seconds between scheduler ticks
    pub fn cadence_seconds(&self) -> f64 {
        self.samples_per_slice as f64 / self.context.sample_rate()
    }

    /// Replace the session with an empty `num_tracks` x `num_scenes` grid.
    ///
    /// Sounding notes of the old session are released first.
    pub fn new_session(&mut self, num_tracks: usize, num_scenes: usize) -> Result<()> {
        let name = format!("Session {}", self.sessions_created + 1);
        let session = Session::new(name, num_tracks, num_scenes)?;
        self.replace_session(session);
        Ok(())
    }

    /// Install a prepared session in place of the current one
    pub fn replace_session(&mut self, session: Session) {
        self.flush_note_offs();
        info!(
            session = %session.name(),
            tracks = session.num_tracks(),
            scenes = session.num_scenes(),
            "session created"
        );
        self.sessions_created += 1;
        self.session = Some(session);
    }

    fn session_or_err(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(SequencerError::NoSession)
    }

    /// Apply a command, counting it as applied or rejected
    pub fn handle(&mut self, command: Command) {
        debug!(?command, "applying command");
        match self.apply(command) {
            Ok(()) => self.status.commands_applied += 1,
            Err(e) => {
                warn!("command rejected: {}", e);
                self.status.commands_rejected += 1;
                self.status.last_error = Some(e.to_string());
            }
        }
    }

    /// Apply a command. An error means nothing changed.
    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::NewSession {
                num_tracks,
                num_scenes,
            } => self.new_session(num_tracks, num_scenes)?,
            Command::SaveSession => {
                let session = self.session.as_ref().ok_or(SequencerError::NoSession)?;
                if let Err(e) = self.store.save(session) {
                    warn!("session save failed: {:#}", e);
                }
            }
            Command::LoadSession => match self.store.load() {
                Ok(Some(session)) => self.replace_session(session),
                Ok(None) => {}
                Err(e) => warn!("session load failed: {:#}", e),
            },

            Command::Play => self.context.set_playing(true),
            Command::Stop => self.stop_transport(),
            Command::PlayStop => {
                if self.context.is_playing() {
                    self.stop_transport();
                } else {
                    self.context.set_playing(true);
                }
            }
            Command::Rewind => {
                if self.context.is_playing() {
                    return Err(SequencerError::TransportPlaying);
                }
                self.flush_note_offs();
                self.context.reset_playhead();
            }
            Command::SetBpm(bpm) => self.context.set_bpm(bpm),
            Command::SetMeter(meter) => self.context.set_meter(meter),
            Command::SetFixedLengthRecordingBars(bars) => {
                self.session_or_err()?.set_fixed_length_recording_bars(bars)
            }
            Command::SetRecordAutomationEnabled(enabled) => {
                let session = self.session_or_err()?;
                let enabled = enabled.unwrap_or(!session.record_automation_enabled());
                session.set_record_automation_enabled(enabled);
            }
            Command::SetFixedVelocity(velocity) => {
                self.session_or_err()?.set_fixed_velocity(velocity)
            }
            Command::MetronomeOnOff => {
                let on = !self.context.metronome_on();
                self.context.set_metronome(on);
            }

            Command::PlayScene(scene) => self.session_or_err()?.play_scene(scene)?,

            Command::SetTrackOutputDevice { track, device } => {
                let track = self.session_or_err()?.track_mut(track)?;
                track.set_output_device_name(Some(device));
            }
            Command::SetTrackInputMonitoring { track, enabled } => {
                let track = self.session_or_err()?.track_mut(track)?;
                let enabled = enabled.unwrap_or(!track.input_monitoring());
                track.set_input_monitoring(enabled);
            }
            Command::StopTrackClips { track } => {
                self.session_or_err()?.track_mut(track)?.stop_all_clips()
            }

            Command::PlayClip { track, clip } => {
                self.session_or_err()?.track_mut(track)?.play_clip(clip)?
            }
            Command::StopClip { track, clip } => {
                self.session_or_err()?.track_mut(track)?.stop_clip(clip)?
            }
            Command::PlayStopClip { track, clip } => {
                self.session_or_err()?.track_mut(track)?.toggle_clip(clip)?
            }
            Command::ToggleClipRecording { track, clip } => {
                self.toggle_recording(track, clip)?
            }
            Command::ClearClip { track, clip } => self
                .session_or_err()?
                .track_mut(track)?
                .clip_mut(clip)?
                .clear_events(),
            Command::SetClipLength {
                track,
                clip,
                length,
            } => self
                .session_or_err()?
                .track_mut(track)?
                .clip_mut(clip)?
                .set_length(length),
            Command::QuantizeClip { track, clip, step } => self
                .session_or_err()?
                .track_mut(track)?
                .clip_mut(clip)?
                .quantize_events(step),
            Command::SetClipWrap { track, clip, wrap } => self
                .session_or_err()?
                .track_mut(track)?
                .clip_mut(clip)?
                .set_wrap(wrap),
            Command::AddClipEvent { track, clip, event } => self
                .session_or_err()?
                .track_mut(track)?
                .clip_mut(clip)?
                .add_event(event),
            Command::RemoveClipEvent { track, clip, id } => {
                self.session_or_err()?
                    .track_mut(track)?
                    .clip_mut(clip)?
                    .remove_event(id)
                    .ok_or(SequencerError::EventNotFound(id))?;
            }

            Command::SetDeviceChannel { device, channel } => self
                .devices
                .device_mut(&device)
                .ok_or(SequencerError::UnknownDevice(device.clone()))?
                .set_channel(channel),
            Command::SetDeviceCcValue { device, cc, value } => {
                self.devices
                    .device_mut(&device)
                    .ok_or(SequencerError::UnknownDevice(device.clone()))?
                    .set_cc_value(cc, value);
            }
            Command::SetDeviceEncoderValue {
                device,
                encoder,
                value,
            } => {
                self.devices
                    .device_mut(&device)
                    .ok_or(SequencerError::UnknownDevice(device.clone()))?
                    .set_encoder_value(encoder, value);
            }
            Command::SetDeviceControlChangeMapping { device, mapping } => self
                .devices
                .device_mut(&device)
                .ok_or(SequencerError::UnknownDevice(device.clone()))?
                .set_control_change_mapping(&mapping),
            Command::OpenDevice(device) => {
                self.devices.open_device(&device)?;
            }
            Command::CloseDevice(device) => self.devices.close_device(&device)?,
            Command::RescanDevices => {
                self.devices.scan_available_devices();
            }
            Command::ReloadDevices(definitions) => {
                self.devices.reload_definitions(definitions);
            }
        }
        Ok(())
    }

    fn toggle_recording(&mut self, track: usize, clip: usize) -> Result<()> {
        let meter = self.context.meter() as f64;
        let session = self.session_or_err()?;
        let bars = session.fixed_length_recording_bars();
        let track = session.track_mut(track)?;

        if track.clip(clip)?.is_recording() {
            return track.stop_recording(clip);
        }
        // Fixed-length recording sizes an empty clip before it starts
        if bars > 0 && track.clip(clip)?.event_count() == 0 {
            track.clip_mut(clip)?.set_length(bars as f64 * meter);
        }
        track.start_recording(clip)
    }

    fn stop_transport(&mut self) {
        self.context.set_playing(false);
        self.flush_note_offs();
    }

    /// Release every sounding note now
    pub fn flush_note_offs(&mut self) {
        let all = self.pending.drain_all();
        self.deliver(all);
    }

    fn deliver(&mut self, note_offs: Vec<PendingNoteOff>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        for off in note_offs {
            if let Ok(track) = session.track_mut(off.track_index) {
                let msg = MidiMessage::note_off(off.channel, off.note);
                track.send_midi_message(&mut self.devices, &msg);
            }
        }
    }

    /// Run one scheduler tick ending at `now`
    pub fn tick(&mut self, now: Instant) {
        self.status.ticks += 1;
        self.devices.enforce_revocation();
        self.route_inputs();
        let (start, end) = self.context.current_slice_range_at(now);
        self.process_range(start, end);
    }

    /// Play the absolute beat range `[start_beats, end_beats)`.
    ///
    /// Due note-offs go out before the clips run and again after, so notes
    /// shorter than a slice still get their note-off in the same slice.
    pub fn process_range(&mut self, start_beats: f64, end_beats: f64) {
        let due = self.pending.drain_due(end_beats);
        self.deliver(due);

        if end_beats > start_beats {
            if let Some(session) = self.session.as_mut() {
                let sent = session.process_slice(
                    start_beats,
                    end_beats,
                    &mut self.rng,
                    &mut self.devices,
                    &mut self.pending,
                );
                self.status.notes_sent += sent as u64;
            }
        }

        let due = self.pending.drain_due(end_beats);
        self.deliver(due);

        self.status.dropped_messages = self
            .session
            .as_ref()
            .map(|s| s.tracks().iter().map(|t| t.dropped_messages()).sum())
            .unwrap_or(0);
    }

    fn route_inputs(&mut self) {
        let received = self.devices.poll_inputs();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let clock = self.context.playhead_beats();
        for (_device, message) in received {
            for i in 0..session.num_tracks() {
                if let Ok(track) = session.track_mut(i) {
                    track.handle_input(&message, clock, &mut self.devices);
                }
            }
        }
    }

    /// Count a missed tick deadline
    pub fn record_overrun(&mut self) {
        self.status.overruns += 1;
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(
            &self.context,
            self.session.as_ref(),
            &self.devices,
            &self.status,
        )
    }

    /// Release notes and close every port
    pub fn shutdown(&mut self) {
        self.flush_note_offs();
        self.devices.close_all();
        info!("engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::VirtualBackend;
    use crate::sequencer::SequenceEvent;
    use std::time::Duration;

    fn engine() -> (VirtualBackend, Engine) {
        let backend = VirtualBackend::new().with_output("Synth").with_input("Keys");
        let mut devices = HardwareDeviceManager::new(Box::new(backend.clone()), Vec::new());
        devices.scan_available_devices();
        let engine = Engine::new(devices, 44100.0, 512).with_rng(StdRng::seed_from_u64(3));
        (backend, engine)
    }

    fn routed_engine() -> (VirtualBackend, Engine) {
        let (backend, mut engine) = engine();
        engine.apply(Command::NewSession { num_tracks: 2, num_scenes: 2 }).unwrap();
        engine
            .apply(Command::SetTrackOutputDevice {
                track: 0,
                device: "Out1".to_string(),
            })
            .unwrap();
        (backend, engine)
    }

    fn add_note(engine: &mut Engine, start: f64, note: u8, duration: f64) {
        let event = SequenceEvent::new(start, note, 100, duration).unwrap();
        engine
            .apply(Command::AddClipEvent { track: 0, clip: 0, event })
            .unwrap();
    }

    #[test]
    fn test_commands_without_session_are_rejected() {
        let (_backend, mut engine) = engine();
        assert_eq!(engine.apply(Command::PlayScene(0)), Err(SequencerError::NoSession));

        engine.handle(Command::PlayScene(0));
        assert_eq!(engine.status().commands_rejected, 1);
        assert!(engine.status().last_error.is_some());
    }

    #[test]
    fn test_transport_commands() {
        let (_backend, mut engine) = engine();
        engine.apply(Command::SetBpm(140.0)).unwrap();
        engine.apply(Command::SetBpm(-1.0)).unwrap();
        engine.apply(Command::SetMeter(3)).unwrap();
        engine.apply(Command::MetronomeOnOff).unwrap();
        engine.apply(Command::PlayStop).unwrap();

        let ctx = engine.context();
        assert_eq!(ctx.bpm(), 140.0);
        assert_eq!(ctx.meter(), 3);
        assert!(ctx.metronome_on());
        assert!(ctx.is_playing());

        engine.apply(Command::PlayStop).unwrap();
        assert!(!engine.context().is_playing());
    }

    #[test]
    fn test_invalid_session_size_keeps_old_session() {
        let (_backend, mut engine) = routed_engine();
        let id = engine.session().unwrap().id();
        assert!(engine
            .apply(Command::NewSession { num_tracks: 0, num_scenes: 4 })
            .is_err());
        assert_eq!(engine.session().unwrap().id(), id);
    }

    #[test]
    fn test_note_on_then_deferred_note_off() {
        let (backend, mut engine) = routed_engine();
        add_note(&mut engine, 0.0, 60, 0.5);
        engine.apply(Command::PlayClip { track: 0, clip: 0 }).unwrap();

        engine.process_range(0.0, 0.25);
        assert_eq!(backend.sent("Synth"), vec![vec![0x90, 60, 100]]);
        assert_eq!(engine.pending_note_offs(), 1);

        engine.process_range(0.25, 0.5);
        assert_eq!(
            backend.sent("Synth"),
            vec![vec![0x90, 60, 100], vec![0x80, 60, 0]]
        );
        assert_eq!(engine.pending_note_offs(), 0);
    }

    #[test]
    fn test_short_note_released_in_same_slice() {
        let (backend, mut engine) = routed_engine();
        add_note(&mut engine, 0.0, 62, 0.01);
        engine.apply(Command::PlayClip { track: 0, clip: 0 }).unwrap();

        engine.process_range(0.0, 0.25);
        assert_eq!(
            backend.sent_messages("Synth"),
            vec![MidiMessage::note_on(0, 62, 100), MidiMessage::note_off(0, 62)]
        );
    }

    #[test]
    fn test_stop_flushes_note_offs() {
        let (backend, mut engine) = routed_engine();
        add_note(&mut engine, 0.0, 64, 8.0);
        engine.apply(Command::PlayClip { track: 0, clip: 0 }).unwrap();
        engine.apply(Command::Play).unwrap();

        engine.process_range(0.0, 0.25);
        assert_eq!(engine.pending_note_offs(), 1);

        engine.apply(Command::Stop).unwrap();
        assert_eq!(engine.pending_note_offs(), 0);
        assert_eq!(backend.sent_messages("Synth").last(), Some(&MidiMessage::note_off(0, 64)));
    }

    #[test]
    fn test_new_session_flushes_note_offs() {
        let (backend, mut engine) = routed_engine();
        add_note(&mut engine, 0.0, 65, 8.0);
        engine.apply(Command::PlayClip { track: 0, clip: 0 }).unwrap();
        engine.process_range(0.0, 0.25);

        engine.apply(Command::NewSession { num_tracks: 1, num_scenes: 1 }).unwrap();
        assert_eq!(engine.pending_note_offs(), 0);
        assert_eq!(backend.sent_messages("Synth").len(), 2);
        assert_eq!(engine.session().unwrap().name(), "Session 2");
    }

    #[test]
    fn test_stopped_transport_emits_nothing() {
        let (backend, mut engine) = routed_engine();
        add_note(&mut engine, 0.0, 60, 0.5);
        engine.apply(Command::PlayClip { track: 0, clip: 0 }).unwrap();

        let now = Instant::now();
        engine.tick(now);
        engine.tick(now + Duration::from_millis(100));
        assert!(backend.sent("Synth").is_empty());
    }

    #[test]
    fn test_tick_advances_with_wall_clock() {
        let (backend, mut engine) = routed_engine();
        add_note(&mut engine, 0.5, 67, 0.25);
        engine.apply(Command::PlayClip { track: 0, clip: 0 }).unwrap();

        let t0 = Instant::now();
        engine.context.set_playing_at(true, t0);
        // 120 BPM: 250ms = half a beat, nothing yet
        engine.tick(t0 + Duration::from_millis(250));
        assert!(backend.sent("Synth").is_empty());

        engine.tick(t0 + Duration::from_millis(300));
        assert_eq!(backend.sent_messages("Synth"), vec![MidiMessage::note_on(0, 67, 100)]);
        assert_eq!(engine.status().ticks, 2);
        assert_eq!(engine.status().notes_sent, 1);
    }

    #[test]
    fn test_unknown_device_command_rejected() {
        let (_backend, mut engine) = engine();
        assert_eq!(
            engine.apply(Command::SetDeviceChannel {
                device: "Nope".to_string(),
                channel: 3
            }),
            Err(SequencerError::UnknownDevice("Nope".to_string()))
        );
    }

    #[test]
    fn test_device_commands() {
        let (backend, mut engine) = engine();
        engine
            .apply(Command::SetDeviceChannel {
                device: "Out1".to_string(),
                channel: 20,
            })
            .unwrap();
        engine
            .apply(Command::SetDeviceCcValue {
                device: "Output 1".to_string(),
                cc: 74,
                value: 64,
            })
            .unwrap();

        let device = engine.devices().device("Out1").unwrap();
        assert_eq!(device.channel(), 16);
        assert_eq!(device.get_current_cc_value(74), 64);
        assert_eq!(backend.sent("Synth"), vec![vec![0xBF, 74, 64]]);
    }

    #[test]
    fn test_fixed_length_recording() {
        let (_backend, mut engine) = routed_engine();
        engine.apply(Command::SetFixedLengthRecordingBars(2)).unwrap();
        engine
            .apply(Command::ToggleClipRecording { track: 1, clip: 1 })
            .unwrap();

        let clip = engine.session().unwrap().track(1).unwrap().clip(1).unwrap();
        assert!(clip.is_recording());
        assert_eq!(clip.length_beats(), 8.0);

        engine
            .apply(Command::ToggleClipRecording { track: 1, clip: 1 })
            .unwrap();
        let clip = engine.session().unwrap().track(1).unwrap().clip(1).unwrap();
        assert!(!clip.is_recording());
        assert!(clip.is_playing());
    }

    #[test]
    fn test_input_is_routed_to_monitoring_tracks() {
        let (backend, mut engine) = routed_engine();
        engine
            .apply(Command::SetTrackInputMonitoring {
                track: 0,
                enabled: None,
            })
            .unwrap();

        backend.inject("Keys", &[0x90, 48, 90]);
        engine.tick(Instant::now());
        assert_eq!(backend.sent_messages("Synth"), vec![MidiMessage::note_on(0, 48, 90)]);
    }

    #[test]
    fn test_remove_missing_event() {
        let (_backend, mut engine) = routed_engine();
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            engine.apply(Command::RemoveClipEvent { track: 0, clip: 0, id }),
            Err(SequencerError::EventNotFound(id))
        );
    }

    #[test]
    fn test_rewind_rejected_while_playing() {
        let (backend, mut engine) = routed_engine();
        add_note(&mut engine, 0.0, 60, 1.0);
        engine.apply(Command::PlayClip { track: 0, clip: 0 }).unwrap();

        let t0 = Instant::now();
        engine.context.set_playing_at(true, t0);
        engine.tick(t0 + Duration::from_millis(100));
        assert_eq!(engine.pending_note_offs(), 1);
        let playhead = engine.context().playhead_beats();

        assert_eq!(engine.apply(Command::Rewind), Err(SequencerError::TransportPlaying));
        assert_eq!(engine.context().playhead_beats(), playhead);
        assert_eq!(engine.pending_note_offs(), 1);

        // Stop releases the note, then rewind is allowed
        engine.apply(Command::Stop).unwrap();
        engine.apply(Command::Rewind).unwrap();
        assert_eq!(engine.context().playhead_beats(), 0.0);
        assert_eq!(engine.pending_note_offs(), 0);
        assert_eq!(
            backend.sent_messages("Synth"),
            vec![MidiMessage::note_on(0, 60, 100), MidiMessage::note_off(0, 60)]
        );
    }
}

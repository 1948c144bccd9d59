// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Integration tests for SEQD
//!
//! These tests verify that multiple components work together correctly,
//! using virtual MIDI ports in place of hardware.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use seqd::remote::{ReconnectPolicy, RemoteClient, RemoteServer, ServerMessage};
use seqd::sequencer::{SequencerConfig, SequencerEvent};
use seqd::{Command, Engine, HardwareDeviceManager, MidiMessage, Sequencer, VirtualBackend};

fn engine_with(backend: &VirtualBackend, seed: u64) -> Engine {
    let mut devices = HardwareDeviceManager::new(Box::new(backend.clone()), Vec::new());
    devices.scan_available_devices();
    Engine::new(devices, 44100.0, 512).with_rng(StdRng::seed_from_u64(seed))
}

fn apply_lines(engine: &mut Engine, lines: &[&str]) {
    for line in lines {
        let command = Command::parse(line).unwrap();
        engine.apply(command).unwrap();
    }
}

/// Feed the engine consecutive quarter-beat slices up to `beats`
fn run_beats(engine: &mut Engine, beats: f64) {
    let mut start = 0.0;
    while start < beats {
        engine.process_range(start, start + 0.25);
        start += 0.25;
    }
}

fn count(messages: &[MidiMessage], pred: impl Fn(&MidiMessage) -> bool) -> usize {
    messages.iter().filter(|m| pred(m)).count()
}

/// Text commands drive a clip loop end to end
#[test]
fn test_full_playback_pipeline() {
    let backend = VirtualBackend::new().with_output("Synth");
    let mut engine = engine_with(&backend, 1);

    apply_lines(
        &mut engine,
        &[
            "/settings/new 2 4",
            "/track/setOutputHardwareDevice 0 Out1",
            "/clip/addEvent 0 0 0.0 60 100 0.5",
            "/clip/addEvent 0 0 1.0 64 90 0.5 3",
            "/clip/addEvent 0 0 3.5 67 80 1.0",
            "/scene/play 0",
        ],
    );

    // Two passes of the four-beat loop
    run_beats(&mut engine, 8.0);
    engine.flush_note_offs();

    let sent = backend.sent_messages("Synth");
    assert_eq!(count(&sent, |m| matches!(m, MidiMessage::NoteOn { .. })), 6);
    assert_eq!(count(&sent, |m| matches!(m, MidiMessage::NoteOff { .. })), 6);
    assert_eq!(sent[0], MidiMessage::note_on(0, 60, 100));
    assert!(sent.contains(&MidiMessage::note_on(2, 64, 90)));
    assert_eq!(engine.pending_note_offs(), 0);
}

/// Every note-on is matched by a note-off on the same channel and note
#[test]
fn test_note_offs_balance_across_wrap() {
    let backend = VirtualBackend::new().with_output("Synth");
    let mut engine = engine_with(&backend, 2);

    apply_lines(
        &mut engine,
        &[
            "/settings/new 1 1",
            "/track/setOutputHardwareDevice 0 Out1",
            "/clip/setLength 0 0 2.0",
            "/clip/addEvent 0 0 1.75 48 100 0.75",
            "/clip/play 0 0",
        ],
    );

    run_beats(&mut engine, 6.0);
    engine.flush_note_offs();

    let sent = backend.sent_messages("Synth");
    let ons = count(&sent, |m| *m == MidiMessage::note_on(0, 48, 100));
    let offs = count(&sent, |m| *m == MidiMessage::note_off(0, 48));
    assert_eq!(ons, 3);
    assert_eq!(ons, offs);
}

/// Chance 0 never fires; chance 1 always does
#[test]
fn test_chance_extremes() {
    let backend = VirtualBackend::new().with_output("Synth");
    let mut engine = engine_with(&backend, 3);

    apply_lines(
        &mut engine,
        &[
            "/settings/new 1 1",
            "/track/setOutputHardwareDevice 0 Out1",
            "/clip/addEvent 0 0 0.0 36 100 0.25 1 0.0",
            "/clip/addEvent 0 0 2.0 38 100 0.25 1 1.0",
            "/clip/play 0 0",
        ],
    );
    run_beats(&mut engine, 16.0);

    let sent = backend.sent_messages("Synth");
    assert_eq!(count(&sent, |m| *m == MidiMessage::note_on(0, 36, 100)), 0);
    assert_eq!(count(&sent, |m| *m == MidiMessage::note_on(0, 38, 100)), 4);
}

/// Same seed, same performance
#[test]
fn test_seeded_runs_are_deterministic() {
    let run = |seed| {
        let backend = VirtualBackend::new().with_output("Synth");
        let mut engine = engine_with(&backend, seed);
        apply_lines(
            &mut engine,
            &[
                "/settings/new 1 1",
                "/track/setOutputHardwareDevice 0 Out1",
                "/clip/addEvent 0 0 0.0 42 100 0.25 10 0.5",
                "/clip/addEvent 0 0 1.0 42 100 0.25 10 0.5",
                "/clip/play 0 0",
            ],
        );
        run_beats(&mut engine, 32.0);
        backend.sent("Synth")
    };
    assert_eq!(run(7), run(7));
}

/// Unplugging a device drops messages without stopping playback
#[test]
fn test_device_disappears_mid_playback() {
    let backend = VirtualBackend::new().with_output("Synth");
    let mut engine = engine_with(&backend, 4);

    apply_lines(
        &mut engine,
        &[
            "/settings/new 1 1",
            "/track/setOutputHardwareDevice 0 Out1",
            "/clip/addEvent 0 0 0.0 60 100 0.5",
            "/clip/play 0 0",
        ],
    );
    run_beats(&mut engine, 4.0);
    assert_eq!(backend.sent("Synth").len(), 2);

    backend.remove_port("Synth");
    engine.apply(Command::RescanDevices).unwrap();
    assert!(!engine.devices().device("Out1").unwrap().is_available());

    run_beats(&mut engine, 4.0);
    let snapshot = engine.snapshot();
    assert!(snapshot.status.dropped_messages >= 1);
    assert_eq!(
        snapshot.session.unwrap().tracks[0].output_device_name.as_deref(),
        Some("Out1")
    );

    // Plugging it back in restores output
    backend.add_output("Synth");
    backend.clear_sent();
    engine.apply(Command::RescanDevices).unwrap();
    run_beats(&mut engine, 4.0);
    assert_eq!(backend.sent("Synth")[0], vec![0x90, 60, 100]);
}

/// Rejected commands leave state untouched and are counted
#[test]
fn test_rejected_commands() {
    let backend = VirtualBackend::new().with_output("Synth");
    let mut engine = engine_with(&backend, 5);
    apply_lines(&mut engine, &["/settings/new 2 2"]);

    for command in [
        Command::PlayScene(5),
        Command::PlayClip { track: 9, clip: 0 },
        Command::NewSession { num_tracks: 100, num_scenes: 1 },
        Command::CloseDevice("Nope".to_string()),
    ] {
        engine.handle(command);
    }

    let status = engine.status();
    assert_eq!(status.commands_applied, 0);
    assert_eq!(status.commands_rejected, 4);
    let session = engine.session().unwrap();
    assert_eq!(session.num_tracks(), 2);
    assert!(session.tracks().iter().all(|t| t.playing_clip_index().is_none()));
}

/// Raising the revocation flag closes every port on the next tick
#[test]
fn test_force_close_on_revocation() {
    let backend = VirtualBackend::new().with_output("Synth").with_input("Keys");
    let mut engine = engine_with(&backend, 6);
    assert!(engine.devices().devices().iter().all(|d| d.is_open()));

    engine.devices().revocation_handle().store(true, Ordering::Release);
    engine.tick(Instant::now());
    assert!(engine.devices().devices().iter().all(|d| !d.is_open()));
}

/// Recording captures monitored input into the playing clip
#[test]
fn test_record_from_input_device() {
    let backend = VirtualBackend::new().with_output("Synth").with_input("Keys");
    let mut engine = engine_with(&backend, 7);
    apply_lines(
        &mut engine,
        &[
            "/settings/new 1 1",
            "/track/setOutputHardwareDevice 0 Out1",
            "/track/setInputMonitoring 0 on",
            "/clip/recordOnOff 0 0",
        ],
    );

    backend.inject("Keys", &[0x90, 72, 110]);
    engine.tick(Instant::now());
    backend.inject("Keys", &[0x80, 72, 0]);
    engine.tick(Instant::now());

    let clip = engine.session().unwrap().track(0).unwrap().clip(0).unwrap();
    assert_eq!(clip.event_count(), 1);
    let event = &clip.events()[0];
    assert_eq!(event.note(), 72);
    assert_eq!(event.velocity(), 110);
    assert_eq!(event.channel(), 1);

    // Monitoring echoed both messages
    assert_eq!(
        backend.sent_messages("Synth"),
        vec![MidiMessage::note_on(0, 72, 110), MidiMessage::note_off(0, 72)]
    );
}

/// Snapshot JSON carries the documented top-level sections
#[test]
fn test_snapshot_wire_format() {
    let backend = VirtualBackend::new().with_output("Synth");
    let mut engine = engine_with(&backend, 8);
    apply_lines(&mut engine, &["/settings/new 3 2", "/transport/setBpm 128"]);

    let message = ServerMessage::StateUpdate {
        data: engine.snapshot(),
    };
    let json: serde_json::Value = serde_json::to_value(&message).unwrap();
    assert_eq!(json["type"], "state_update");
    assert_eq!(json["data"]["musical_context"]["bpm"], 128.0);
    assert_eq!(json["data"]["session"]["tracks"].as_array().unwrap().len(), 3);
    assert!(json["data"]["hardware_devices"]["devices"].is_array());
}

/// Scheduler thread, TCP server and client working together
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_round_trip() {
    let backend = VirtualBackend::new().with_output("Synth");
    let engine = engine_with(&backend, 9);
    let mut sequencer = Sequencer::start(engine, SequencerConfig::default()).unwrap();

    let server = RemoteServer::bind(
        "127.0.0.1:0",
        sequencer.commands(),
        sequencer.subscribe_snapshots(),
        Duration::from_millis(10),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    let (events_tx, mut events) = mpsc::channel(256);
    let (commands_tx, commands_rx) = mpsc::channel(16);
    let mut client = RemoteClient::new(addr.to_string(), ReconnectPolicy::default(), events_tx);
    let client_task = tokio::spawn(async move {
        let result = client.run(commands_rx).await;
        (result, client.snapshot())
    });

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, SequencerEvent::FirstSync(_)));
    assert!(first.snapshot().session.is_none());

    commands_tx.send("/settings/new 2 3".to_string()).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut new_session = None;
    while Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            Ok(Some(SequencerEvent::NewSession(snapshot))) => {
                new_session = Some(snapshot);
                break;
            }
            Ok(Some(_)) | Err(_) => continue,
            Ok(None) => break,
        }
    }
    let snapshot = new_session.unwrap();
    assert_eq!(snapshot.session.as_ref().unwrap().num_tracks, 2);

    drop(commands_tx);
    let (result, latest) = client_task.await.unwrap();
    assert!(result.is_ok());
    assert!(latest.is_some());

    let _ = stop_tx.send(());
    server_task.await.unwrap().unwrap();
    assert!(tokio::task::spawn_blocking(move || sequencer.stop())
        .await
        .unwrap());
}

/// Malformed command lines get an error reply, not a disconnect
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_error_reply() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let backend = VirtualBackend::new();
    let mut sequencer = Sequencer::start(engine_with(&backend, 10), SequencerConfig::default())
        .unwrap();
    let server = RemoteServer::bind(
        "127.0.0.1:0",
        sequencer.commands(),
        sequencer.subscribe_snapshots(),
        Duration::from_millis(10),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let first = lines.next_line().await.unwrap().unwrap();
    let first: ServerMessage = serde_json::from_str(&first).unwrap();
    assert!(matches!(first, ServerMessage::StateUpdate { .. }));

    writer.write_all(b"/no/such/thing 1\n").await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let line = lines.next_line().await.unwrap().unwrap();
            if let Ok(ServerMessage::Error { message }) = serde_json::from_str(&line) {
                return message;
            }
        }
    })
    .await
    .unwrap();
    assert!(reply.contains("/no/such/thing"));

    drop(writer);
    let _ = stop_tx.send(());
    server_task.await.unwrap().unwrap();
    assert!(tokio::task::spawn_blocking(move || sequencer.stop())
        .await
        .unwrap());
}

// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Performance benchmarks for SEQD
//!
//! Run with: cargo bench
//!
//! These benchmarks measure the work done on the scheduler thread each tick:
//! - Clip slice processing
//! - Pending note-off queue operations
//! - Snapshot building

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use seqd::sequencer::{PendingNoteOff, PendingNoteOffs};
use seqd::{Clip, Command, Engine, HardwareDeviceManager, SequenceEvent, VirtualBackend};

fn clip_with_events(count: usize) -> Clip {
    let mut clip = Clip::new("Bench").with_length(16.0);
    for i in 0..count {
        let start = (i as f64 * 16.0) / count as f64;
        let event = SequenceEvent::new(start, 36 + (i % 48) as u8, 100, 0.25)
            .expect("valid event")
            .with_chance(0.75);
        clip.add_event(event);
    }
    clip.play();
    clip
}

/// Benchmark one pass of a clip in 512-sample slices at 120 BPM
fn bench_clip_slices(c: &mut Criterion) {
    let mut group = c.benchmark_group("clip_process_slice");
    let slice = 512.0 / 44100.0 * 2.0;

    for size in [16, 128, 1024].iter() {
        group.bench_with_input(BenchmarkId::new("one_loop", size), size, |b, &size| {
            let mut rng = StdRng::seed_from_u64(1);
            b.iter_batched(
                || clip_with_events(size),
                |mut clip| {
                    let mut fired = 0;
                    let mut start = 0.0;
                    while start < 16.0 {
                        fired += clip.process_slice(start, start + slice, &mut rng).len();
                        start += slice;
                    }
                    black_box(fired)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

/// Benchmark the pending note-off queue (register then drain in slices)
fn bench_pending_note_offs(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_note_offs");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("register_drain", size), size, |b, &size| {
            b.iter(|| {
                let mut pending = PendingNoteOffs::new();
                for i in 0..size {
                    pending.register(PendingNoteOff {
                        track_index: i % 8,
                        channel: (i % 16) as u8,
                        note: (i % 128) as u8,
                        due_beats: ((i * 7919) % size) as f64 * 0.01,
                    });
                }
                let mut drained = 0;
                let mut end = 0.0;
                while !pending.is_empty() {
                    end += 0.25;
                    drained += pending.drain_due(end).len();
                }
                black_box(drained)
            })
        });
    }
    group.finish();
}

/// Benchmark building a full snapshot of a populated session
fn bench_snapshot(c: &mut Criterion) {
    let backend = VirtualBackend::new().with_output("Synth").with_input("Keys");
    let mut devices = HardwareDeviceManager::new(Box::new(backend), Vec::new());
    devices.scan_available_devices();
    let mut engine = Engine::new(devices, 44100.0, 512).with_rng(StdRng::seed_from_u64(2));

    engine
        .apply(Command::NewSession {
            num_tracks: 8,
            num_scenes: 8,
        })
        .expect("session");
    for track in 0..8 {
        for step in 0..16 {
            let event = SequenceEvent::new(step as f64 * 0.25, 60, 100, 0.25).expect("valid event");
            engine
                .apply(Command::AddClipEvent {
                    track,
                    clip: 0,
                    event,
                })
                .expect("event");
        }
    }

    c.bench_function("snapshot_8x8", |b| b.iter(|| black_box(engine.snapshot())));
    c.bench_function("snapshot_8x8_json", |b| {
        b.iter(|| black_box(serde_json::to_string(&engine.snapshot()).map(|s| s.len())))
    });
}

criterion_group!(
    benches,
    bench_clip_slices,
    bench_pending_note_offs,
    bench_snapshot
);
criterion_main!(benches);

// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Deferred note-off queue.
//!
//! Every note-on a clip emits registers the matching note-off here, due at an
//! absolute clock beat. The scheduler drains due entries each slice.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A note-off waiting for its due beat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingNoteOff {
    /// Track that emitted the note-on
    pub track_index: usize,
    /// Wire channel (0-15)
    pub channel: u8,
    pub note: u8,
    /// Absolute clock beat at which the note-off is delivered
    pub due_beats: f64,
}

struct Scheduled(PendingNoteOff);

// For BinaryHeap - we want the earliest due beat first
impl Eq for Scheduled {}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other.0.due_beats.total_cmp(&self.0.due_beats)
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending note-offs ordered by due beat
#[derive(Default)]
pub struct PendingNoteOffs {
    queue: BinaryHeap<Scheduled>,
}

impl PendingNoteOffs {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::with_capacity(256),
        }
    }

    pub fn register(&mut self, note_off: PendingNoteOff) {
        self.queue.push(Scheduled(note_off));
    }

    /// Remove and return every entry due at or before `end_beats`, earliest first
    pub fn drain_due(&mut self, end_beats: f64) -> Vec<PendingNoteOff> {
        let mut due = Vec::new();
        while let Some(next) = self.queue.peek() {
            if next.0.due_beats > end_beats {
                break;
            }
            if let Some(Scheduled(entry)) = self.queue.pop() {
                due.push(entry);
            }
        }
        due
    }

    /// Remove and return everything, earliest first
    pub fn drain_all(&mut self) -> Vec<PendingNoteOff> {
        let mut all = Vec::with_capacity(self.queue.len());
        while let Some(Scheduled(entry)) = self.queue.pop() {
            all.push(entry);
        }
        all
    }

    /// Due beat of the earliest entry
    pub fn next_due(&self) -> Option<f64> {
        self.queue.peek().map(|s| s.0.due_beats)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

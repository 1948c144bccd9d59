// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI I/O abstraction layer.
//!
//! Ports are reached through the [`MidiBackend`] trait so the sequencer can run
//! against system ports (`midir`) or the in-memory [`VirtualBackend`] used for
//! headless runs and tests.

pub mod message;
pub mod midir_backend;
pub mod virtual_backend;

use anyhow::Result;

pub use message::MidiMessage;
pub use midir_backend::{print_destinations, print_sources, MidirBackend};
pub use virtual_backend::VirtualBackend;

/// Trait for MIDI output implementations.
pub trait MidiOutput: Send {
    /// Send a MIDI message immediately.
    ///
    /// # Arguments
    /// * `message` - Raw MIDI bytes (e.g., `[0x90, 60, 127]` for Note On)
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err` if the message could not be sent
    fn send(&mut self, message: &[u8]) -> Result<()>;
}

/// Trait for MIDI input implementations.
///
/// Messages arrive on a backend thread and are buffered until the scheduler
/// drains them.
pub trait MidiInput: Send {
    /// Try to receive the next MIDI message (non-blocking)
    fn try_recv(&self) -> Option<MidiMessage>;

    /// Receive all pending MIDI messages
    fn recv_all(&self) -> Vec<MidiMessage> {
        let mut messages = Vec::new();
        while let Some(msg) = self.try_recv() {
            messages.push(msg);
        }
        messages
    }
}

/// Source of MIDI ports.
pub trait MidiBackend: Send {
    /// Names of the output ports currently present on the system
    fn output_names(&self) -> Result<Vec<String>>;

    /// Names of the input ports currently present on the system
    fn input_names(&self) -> Result<Vec<String>>;

    /// Open the output port with exactly this name
    fn open_output(&mut self, port_name: &str) -> Result<Box<dyn MidiOutput>>;

    /// Open the input port with exactly this name
    fn open_input(&mut self, port_name: &str) -> Result<Box<dyn MidiInput>>;
}

/// MIDI message constants
pub mod messages {
    // Channel Voice Messages (upper nibble, lower nibble is channel 0-15)
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_AFTERTOUCH: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_AFTERTOUCH: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;

    // System Real-Time Messages
    pub const TIMING_CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct ChannelInput {
        receiver: mpsc::Receiver<MidiMessage>,
    }

    impl MidiInput for ChannelInput {
        fn try_recv(&self) -> Option<MidiMessage> {
            self.receiver.try_recv().ok()
        }
    }

    #[test]
    fn test_recv_all_drains_in_order() {
        let (tx, rx) = mpsc::channel();
        let input = ChannelInput { receiver: rx };

        tx.send(MidiMessage::Start).unwrap();
        tx.send(MidiMessage::Stop).unwrap();

        assert_eq!(input.recv_all(), vec![MidiMessage::Start, MidiMessage::Stop]);
        assert!(input.recv_all().is_empty());
    }

    #[test]
    fn test_midi_message_constants() {
        assert_eq!(messages::NOTE_ON, 0x90);
        assert_eq!(messages::NOTE_OFF, 0x80);
        assert_eq!(messages::CONTROL_CHANGE, 0xB0);
        assert_eq!(messages::TIMING_CLOCK, 0xF8);
    }
}

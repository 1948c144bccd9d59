// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! In-memory MIDI ports.
//!
//! Used by `--virtual` runs and by tests: every byte sent to an output port is
//! recorded, input can be injected by hand, and open/send failures can be
//! switched on per port. Clones share the same state.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::{MidiBackend, MidiInput, MidiMessage, MidiOutput};

#[derive(Default)]
struct VirtualState {
    outputs: Vec<String>,
    inputs: Vec<String>,
    sent: HashMap<String, Vec<Vec<u8>>>,
    listeners: HashMap<String, Vec<Sender<MidiMessage>>>,
    failing_opens: HashSet<String>,
    failing_sends: HashSet<String>,
}

/// Shared in-memory MIDI backend
#[derive(Clone, Default)]
pub struct VirtualBackend {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output port (builder style)
    pub fn with_output(self, name: &str) -> Self {
        self.add_output(name);
        self
    }

    /// Add an input port (builder style)
    pub fn with_input(self, name: &str) -> Self {
        self.add_input(name);
        self
    }

    pub fn add_output(&self, name: &str) {
        if let Ok(mut state) = self.state.lock() {
            if !state.outputs.iter().any(|n| n == name) {
                state.outputs.push(name.to_string());
            }
        }
    }

    pub fn add_input(&self, name: &str) {
        if let Ok(mut state) = self.state.lock() {
            if !state.inputs.iter().any(|n| n == name) {
                state.inputs.push(name.to_string());
            }
        }
    }

    /// Unplug a port. Open outputs start failing, open inputs go quiet.
    pub fn remove_port(&self, name: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.outputs.retain(|n| n != name);
            state.inputs.retain(|n| n != name);
            state.listeners.remove(name);
        }
    }

    /// Raw bytes sent to an output port so far
    pub fn sent(&self, port: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.sent.get(port).cloned())
            .unwrap_or_default()
    }

    /// Messages sent to an output port so far, parsed
    pub fn sent_messages(&self, port: &str) -> Vec<MidiMessage> {
        self.sent(port)
            .iter()
            .filter_map(|bytes| MidiMessage::parse(bytes))
            .collect()
    }

    pub fn clear_sent(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.sent.clear();
        }
    }

    /// Deliver raw bytes to every open connection on an input port
    pub fn inject(&self, port: &str, data: &[u8]) {
        let Some(msg) = MidiMessage::parse(data) else {
            return;
        };
        if let Ok(mut state) = self.state.lock() {
            if let Some(listeners) = state.listeners.get_mut(port) {
                listeners.retain(|tx| tx.send(msg.clone()).is_ok());
            }
        }
    }

    /// Make opening `port` fail (or succeed again)
    pub fn fail_open(&self, port: &str, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            if fail {
                state.failing_opens.insert(port.to_string());
            } else {
                state.failing_opens.remove(port);
            }
        }
    }

    /// Make sends to `port` fail (or succeed again)
    pub fn fail_send(&self, port: &str, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            if fail {
                state.failing_sends.insert(port.to_string());
            } else {
                state.failing_sends.remove(port);
            }
        }
    }
}

impl MidiBackend for VirtualBackend {
    fn output_names(&self) -> Result<Vec<String>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("virtual MIDI state poisoned"))?;
        Ok(state.outputs.clone())
    }

    fn input_names(&self) -> Result<Vec<String>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("virtual MIDI state poisoned"))?;
        Ok(state.inputs.clone())
    }

    fn open_output(&mut self, port_name: &str) -> Result<Box<dyn MidiOutput>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("virtual MIDI state poisoned"))?;
        if !state.outputs.iter().any(|n| n == port_name) {
            return Err(anyhow!("MIDI output '{}' not found", port_name));
        }
        if state.failing_opens.contains(port_name) {
            return Err(anyhow!("MIDI output '{}' refused to open", port_name));
        }
        Ok(Box::new(VirtualOutput {
            port: port_name.to_string(),
            state: Arc::clone(&self.state),
        }))
    }

    fn open_input(&mut self, port_name: &str) -> Result<Box<dyn MidiInput>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("virtual MIDI state poisoned"))?;
        if !state.inputs.iter().any(|n| n == port_name) {
            return Err(anyhow!("MIDI input '{}' not found", port_name));
        }
        if state.failing_opens.contains(port_name) {
            return Err(anyhow!("MIDI input '{}' refused to open", port_name));
        }
        let (tx, rx): (Sender<MidiMessage>, Receiver<MidiMessage>) = mpsc::channel();
        state
            .listeners
            .entry(port_name.to_string())
            .or_default()
            .push(tx);
        Ok(Box::new(VirtualInput { receiver: rx }))
    }
}

struct VirtualOutput {
    port: String,
    state: Arc<Mutex<VirtualState>>,
}

impl MidiOutput for VirtualOutput {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("virtual MIDI state poisoned"))?;
        if !state.outputs.iter().any(|n| *n == self.port) {
            return Err(anyhow!("MIDI output '{}' disappeared", self.port));
        }
        if state.failing_sends.contains(&self.port) {
            return Err(anyhow!("Failed to send MIDI message to '{}'", self.port));
        }
        state
            .sent
            .entry(self.port.clone())
            .or_default()
            .push(message.to_vec());
        Ok(())
    }
}

struct VirtualInput {
    receiver: Receiver<MidiMessage>,
}

impl MidiInput for VirtualInput {
    fn try_recv(&self) -> Option<MidiMessage> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sent_bytes_are_recorded_per_port() {
        let mut backend = VirtualBackend::new().with_output("A").with_output("B");
        let mut a = backend.open_output("A").unwrap();

        a.send(&[0x90, 60, 100]).unwrap();

        assert_eq!(backend.sent("A"), vec![vec![0x90, 60, 100]]);
        assert!(backend.sent("B").is_empty());
        assert_eq!(
            backend.sent_messages("A"),
            vec![MidiMessage::note_on(0, 60, 100)]
        );
    }

    #[test]
    fn test_open_unknown_port_fails() {
        let mut backend = VirtualBackend::new();
        assert!(backend.open_output("missing").is_err());
        assert!(backend.open_input("missing").is_err());
    }

    #[test]
    fn test_failure_switches() {
        let mut backend = VirtualBackend::new().with_output("A");
        backend.fail_open("A", true);
        assert!(backend.open_output("A").is_err());

        backend.fail_open("A", false);
        let mut port = backend.open_output("A").unwrap();
        backend.fail_send("A", true);
        assert!(port.send(&[0xF8]).is_err());
    }

    #[test]
    fn test_removed_output_fails_to_send() {
        let mut backend = VirtualBackend::new().with_output("A");
        let mut port = backend.open_output("A").unwrap();
        backend.remove_port("A");
        assert!(port.send(&[0xF8]).is_err());
        assert!(backend.output_names().unwrap().is_empty());
    }

    #[test]
    fn test_injected_input_reaches_open_connection() {
        let mut backend = VirtualBackend::new().with_input("Keys");
        let input = backend.open_input("Keys").unwrap();

        backend.inject("Keys", &[0xB0, 1, 64]);

        assert_eq!(
            input.recv_all(),
            vec![MidiMessage::control_change(0, 1, 64)]
        );
    }
}

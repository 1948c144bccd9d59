// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! A single MIDI input or output device.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::midi::{MidiBackend, MidiInput, MidiMessage, MidiOutput};

/// Number of encoder slots in a control-change mapping
pub const ENCODER_SLOTS: usize = 128;

/// Which way MIDI flows through a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Input,
    Output,
}

impl fmt::Display for DeviceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceDirection::Input => write!(f, "input"),
            DeviceDirection::Output => write!(f, "output"),
        }
    }
}

/// Naming rule for discovered ports, usually from the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Case-insensitive substring of the system port name
    pub port: String,
    /// Display name
    pub name: String,
    /// Short name used for routing
    pub short_name: String,
    pub direction: DeviceDirection,
    /// MIDI channel (1-16)
    #[serde(default = "default_channel")]
    pub channel: u8,
}

fn default_channel() -> u8 {
    1
}

impl DeviceDefinition {
    /// Check whether this definition claims a system port
    pub fn matches(&self, port_name: &str, direction: DeviceDirection) -> bool {
        self.direction == direction
            && port_name.to_lowercase().contains(&self.port.to_lowercase())
    }
}

/// A hardware MIDI device bound to one system port
pub struct HardwareDevice {
    id: Uuid,
    name: String,
    short_name: String,
    port_name: String,
    direction: DeviceDirection,
    /// MIDI channel (1-16)
    channel: u8,
    cc_cache: HashMap<u8, u8>,
    encoder_to_cc: HashMap<usize, u8>,
    output: Option<Box<dyn MidiOutput>>,
    input: Option<Box<dyn MidiInput>>,
    /// Whether the port is currently present on the system
    available: bool,
    failures: u64,
}

impl HardwareDevice {
    /// Create a closed device for a system port
    pub fn new(
        name: impl Into<String>,
        short_name: impl Into<String>,
        port_name: impl Into<String>,
        direction: DeviceDirection,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            short_name: short_name.into(),
            port_name: port_name.into(),
            direction,
            channel: 1,
            cc_cache: HashMap::new(),
            encoder_to_cc: HashMap::new(),
            output: None,
            input: None,
            available: true,
            failures: 0,
        }
    }

    /// Set the MIDI channel (builder style)
    pub fn with_channel(mut self, channel: i64) -> Self {
        self.set_channel(channel);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn direction(&self) -> DeviceDirection {
        self.direction
    }

    /// Check a name against both the display name and the short name
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.short_name == name
    }

    pub(crate) fn rename(&mut self, name: String, short_name: String) {
        self.name = name;
        self.short_name = short_name;
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Set the MIDI channel, clamped to 1-16
    pub fn set_channel(&mut self, channel: i64) {
        self.channel = channel.clamp(1, 16) as u8;
    }

    pub fn is_open(&self) -> bool {
        self.output.is_some() || self.input.is_some()
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub(crate) fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Number of failed sends since creation
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Open the port. Idempotent; returns whether the device is open.
    ///
    /// Failure is logged and leaves the device closed.
    pub fn open(&mut self, backend: &mut dyn MidiBackend) -> bool {
        if self.is_open() {
            return true;
        }
        let result = match self.direction {
            DeviceDirection::Output => backend.open_output(&self.port_name).map(|port| {
                self.output = Some(port);
            }),
            DeviceDirection::Input => backend.open_input(&self.port_name).map(|port| {
                self.input = Some(port);
            }),
        };
        match result {
            Ok(()) => {
                info!(device = %self.short_name, port = %self.port_name, direction = %self.direction, "device opened");
                true
            }
            Err(e) => {
                warn!(device = %self.short_name, "could not open device: {:#}", e);
                false
            }
        }
    }

    /// Close the port. Idempotent.
    pub fn close(&mut self) {
        if self.is_open() {
            info!(device = %self.short_name, "device closed");
        }
        self.output = None;
        self.input = None;
    }

    /// Send a message on this device.
    ///
    /// Returns false when the device is not an open output. A failed send
    /// closes the device so later sends are dropped cheaply.
    pub fn send_message(&mut self, message: &MidiMessage) -> bool {
        let Some(port) = self.output.as_mut() else {
            return false;
        };
        match port.send(&message.to_bytes()) {
            Ok(()) => true,
            Err(e) => {
                self.failures += 1;
                warn!(device = %self.short_name, "send failed, closing device: {:#}", e);
                self.output = None;
                false
            }
        }
    }

    /// Drain pending input. Control changes update the CC cache.
    pub fn receive_messages(&mut self) -> Vec<MidiMessage> {
        let Some(port) = self.input.as_ref() else {
            return Vec::new();
        };
        let messages = port.recv_all();
        for msg in &messages {
            if let MidiMessage::ControlChange {
                controller, value, ..
            } = *msg
            {
                self.handle_control_change(controller, value);
            }
        }
        messages
    }

    /// Record a control change received from the device
    pub fn handle_control_change(&mut self, cc: u8, value: u8) {
        if cc <= 127 {
            self.cc_cache.insert(cc, value.min(127));
        }
    }

    /// Rebuild the encoder mapping.
    ///
    /// Entry `i` is the CC number for encoder `i`; -1 (or anything outside
    /// 0-127) leaves the encoder unmapped. Entries past 128 are ignored.
    pub fn set_control_change_mapping(&mut self, mapping: &[i32]) {
        self.encoder_to_cc = mapping
            .iter()
            .take(ENCODER_SLOTS)
            .enumerate()
            .filter(|(_, cc)| (0..=127).contains(*cc))
            .map(|(encoder, cc)| (encoder, *cc as u8))
            .collect();
    }

    /// CC number mapped to an encoder
    pub fn cc_for_encoder(&self, encoder: usize) -> Option<u8> {
        self.encoder_to_cc.get(&encoder).copied()
    }

    /// Last known value of a CC, 0 if never set
    pub fn get_current_cc_value(&self, cc: u8) -> u8 {
        self.cc_cache.get(&cc).copied().unwrap_or(0)
    }

    /// Set a CC value.
    ///
    /// CC numbers outside 0-127 are rejected; values are clamped to 0-127.
    /// Output devices also send the control change on their channel.
    pub fn set_cc_value(&mut self, cc: i64, value: i64) -> bool {
        if !(0..=127).contains(&cc) {
            warn!(device = %self.short_name, cc, "rejected CC number out of range");
            return false;
        }
        let cc = cc as u8;
        let value = value.clamp(0, 127) as u8;
        self.cc_cache.insert(cc, value);

        if self.direction == DeviceDirection::Output {
            let message = MidiMessage::control_change(self.channel - 1, cc, value);
            self.send_message(&message);
        }
        true
    }

    /// Set the CC mapped to an encoder. Unmapped encoders are ignored.
    pub fn set_encoder_value(&mut self, encoder: usize, value: i64) -> bool {
        match self.cc_for_encoder(encoder) {
            Some(cc) => self.set_cc_value(cc as i64, value),
            None => false,
        }
    }
}

impl fmt::Debug for HardwareDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareDevice")
            .field("name", &self.name)
            .field("short_name", &self.short_name)
            .field("port_name", &self.port_name)
            .field("direction", &self.direction)
            .field("channel", &self.channel)
            .field("open", &self.is_open())
            .field("available", &self.available)
            .finish()
    }
}

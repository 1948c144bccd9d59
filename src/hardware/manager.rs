// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Device discovery and lifecycle.
//!
//! The manager is the only owner of port handles. Devices are addressed by
//! display name or short name; short names are unique per direction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::device::{DeviceDefinition, DeviceDirection, HardwareDevice};
use crate::error::{Result, SequencerError};
use crate::midi::{MidiBackend, MidiMessage};

/// Owner of every hardware device and its port
pub struct HardwareDeviceManager {
    backend: Box<dyn MidiBackend>,
    devices: Vec<HardwareDevice>,
    definitions: Vec<DeviceDefinition>,
    /// Raised when ports must be force-closed (shutdown timeout)
    revoked: Arc<AtomicBool>,
}

impl HardwareDeviceManager {
    /// Create a manager with no devices. Call `scan_available_devices` to
    /// discover ports.
    pub fn new(backend: Box<dyn MidiBackend>, definitions: Vec<DeviceDefinition>) -> Self {
        Self {
            backend,
            devices: Vec::new(),
            definitions,
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn devices(&self) -> &[HardwareDevice] {
        &self.devices
    }

    pub fn definitions(&self) -> &[DeviceDefinition] {
        &self.definitions
    }

    /// Flag that force-closes every port once raised
    pub fn revocation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.revoked)
    }

    /// Close everything if the revocation flag was raised.
    ///
    /// Returns true when revoked.
    pub fn enforce_revocation(&mut self) -> bool {
        if !self.revoked.load(Ordering::Acquire) {
            return false;
        }
        if self.devices.iter().any(|d| d.is_open()) {
            warn!("device access revoked, closing all ports");
            self.close_all();
        }
        true
    }

    /// Enumerate system ports and sync the device list with them.
    ///
    /// New ports become devices (named by definitions, or `Output N`/`OutN`,
    /// `Input N`/`InN`) and are opened. Devices whose port vanished are closed
    /// and marked unavailable but kept so track bindings survive a replug.
    /// Returns the number of devices added.
    pub fn scan_available_devices(&mut self) -> usize {
        if self.enforce_revocation() {
            return 0;
        }

        let outputs = self.backend.output_names().unwrap_or_else(|e| {
            warn!("could not list MIDI outputs: {:#}", e);
            Vec::new()
        });
        let inputs = self.backend.input_names().unwrap_or_else(|e| {
            warn!("could not list MIDI inputs: {:#}", e);
            Vec::new()
        });

        let mut added = 0;
        for (direction, ports) in [
            (DeviceDirection::Output, outputs),
            (DeviceDirection::Input, inputs),
        ] {
            for device in self.devices.iter_mut().filter(|d| d.direction() == direction) {
                let present = ports.iter().any(|p| p == device.port_name());
                if !present && device.is_available() {
                    info!(device = device.short_name(), "port disappeared");
                    device.close();
                }
                device.set_available(present);
            }

            for port in &ports {
                let known = self
                    .devices
                    .iter()
                    .any(|d| d.direction() == direction && d.port_name() == port);
                if known {
                    continue;
                }
                let device = self.build_device(port, direction);
                info!(device = device.short_name(), port = %port, "discovered device");
                self.devices.push(device);
                added += 1;
            }
        }

        // (Re)open everything that is present
        let backend = self.backend.as_mut();
        for device in self.devices.iter_mut().filter(|d| d.is_available()) {
            device.open(backend);
        }

        added
    }

    fn build_device(&self, port: &str, direction: DeviceDirection) -> HardwareDevice {
        let (name, short_name, channel) = match self
            .definitions
            .iter()
            .find(|def| def.matches(port, direction))
        {
            Some(def) => (def.name.clone(), def.short_name.clone(), def.channel as i64),
            None => {
                let n = self
                    .devices
                    .iter()
                    .filter(|d| d.direction() == direction)
                    .count()
                    + 1;
                match direction {
                    DeviceDirection::Output => (format!("Output {}", n), format!("Out{}", n), 1),
                    DeviceDirection::Input => (format!("Input {}", n), format!("In{}", n), 1),
                }
            }
        };
        let short_name = self.unique_short_name(&short_name, direction, None);
        HardwareDevice::new(name, short_name, port, direction).with_channel(channel)
    }

    /// First free `wanted`, `wanted-2`, `wanted-3`... The device at `exclude`
    /// doesn't count, so renaming a device can keep its own name.
    fn unique_short_name(
        &self,
        wanted: &str,
        direction: DeviceDirection,
        exclude: Option<usize>,
    ) -> String {
        let taken = |candidate: &str| {
            self.devices.iter().enumerate().any(|(i, d)| {
                Some(i) != exclude && d.direction() == direction && d.short_name() == candidate
            })
        };
        if !taken(wanted) {
            return wanted.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{}-{}", wanted, suffix);
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Replace the naming definitions, rename matching devices and rescan
    pub fn reload_definitions(&mut self, definitions: Vec<DeviceDefinition>) -> usize {
        self.definitions = definitions;
        for i in 0..self.devices.len() {
            let direction = self.devices[i].direction();
            let found = self
                .definitions
                .iter()
                .find(|def| def.matches(self.devices[i].port_name(), direction))
                .cloned();
            if let Some(def) = found {
                let short_name = self.unique_short_name(&def.short_name, direction, Some(i));
                self.devices[i].rename(def.name, short_name);
                self.devices[i].set_channel(def.channel as i64);
            }
        }
        self.scan_available_devices()
    }

    /// Add a device. Short names must be unique per direction.
    pub fn add_device(&mut self, device: HardwareDevice) -> Result<()> {
        let clash = self.devices.iter().any(|d| {
            d.direction() == device.direction() && d.short_name() == device.short_name()
        });
        if clash {
            return Err(SequencerError::DuplicateDevice(device.short_name().to_string()));
        }
        self.devices.push(device);
        Ok(())
    }

    /// Remove a device by name or short name, closing it
    pub fn remove_device(&mut self, name: &str) -> Option<HardwareDevice> {
        let index = self.devices.iter().position(|d| d.answers_to(name))?;
        let mut device = self.devices.remove(index);
        device.close();
        Some(device)
    }

    /// Look up a device by display name or short name
    pub fn device(&self, name: &str) -> Option<&HardwareDevice> {
        self.devices.iter().find(|d| d.answers_to(name))
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut HardwareDevice> {
        self.devices.iter_mut().find(|d| d.answers_to(name))
    }

    /// Look up an output device by display name or short name
    pub fn output_device_mut(&mut self, name: &str) -> Option<&mut HardwareDevice> {
        if self.enforce_revocation() {
            return None;
        }
        self.devices
            .iter_mut()
            .find(|d| d.direction() == DeviceDirection::Output && d.answers_to(name))
    }

    /// Open a device by name. Returns whether it is open afterwards.
    pub fn open_device(&mut self, name: &str) -> Result<bool> {
        if self.enforce_revocation() {
            return Ok(false);
        }
        let backend = self.backend.as_mut();
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.answers_to(name))
            .ok_or_else(|| SequencerError::UnknownDevice(name.to_string()))?;
        Ok(device.open(backend))
    }

    pub fn close_device(&mut self, name: &str) -> Result<()> {
        let device = self
            .device_mut(name)
            .ok_or_else(|| SequencerError::UnknownDevice(name.to_string()))?;
        device.close();
        Ok(())
    }

    pub fn close_all(&mut self) {
        for device in &mut self.devices {
            device.close();
        }
    }

    /// Drain input from every open input device, tagged with its short name
    pub fn poll_inputs(&mut self) -> Vec<(String, MidiMessage)> {
        if self.enforce_revocation() {
            return Vec::new();
        }
        let mut received = Vec::new();
        for device in self
            .devices
            .iter_mut()
            .filter(|d| d.direction() == DeviceDirection::Input)
        {
            for msg in device.receive_messages() {
                received.push((device.short_name().to_string(), msg));
            }
        }
        received
    }

    /// Short names of present output devices
    pub fn available_output_names(&self) -> Vec<String> {
        self.available_names(DeviceDirection::Output)
    }

    /// Short names of present input devices
    pub fn available_input_names(&self) -> Vec<String> {
        self.available_names(DeviceDirection::Input)
    }

    fn available_names(&self, direction: DeviceDirection) -> Vec<String> {
        self.devices
            .iter()
            .filter(|d| d.direction() == direction && d.is_available())
            .map(|d| d.short_name().to_string())
            .collect()
    }
}

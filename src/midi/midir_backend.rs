// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! System MIDI ports through `midir`.
//!
//! Every open creates its own `midir` client, so a failed or vanished port
//! never takes the others down with it.

use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{anyhow, Result};
use midir::{Ignore, MidiInputConnection, MidiOutputConnection};
use tracing::debug;

use super::{MidiBackend, MidiInput, MidiMessage, MidiOutput};

/// Port access through the platform MIDI API.
pub struct MidirBackend {
    client_name: String,
}

impl MidirBackend {
    /// Create a backend whose ports show up under `client_name`.
    ///
    /// Fails early if the platform MIDI API cannot be initialized.
    pub fn new(client_name: impl Into<String>) -> Result<Self> {
        let client_name = client_name.into();
        midir::MidiOutput::new(&client_name)
            .map_err(|e| anyhow!("Failed to create MIDI client: {}", e))?;
        Ok(Self { client_name })
    }

    fn output_client(&self) -> Result<midir::MidiOutput> {
        midir::MidiOutput::new(&self.client_name)
            .map_err(|e| anyhow!("Failed to create MIDI output client: {}", e))
    }

    fn input_client(&self) -> Result<midir::MidiInput> {
        let mut input = midir::MidiInput::new(&self.client_name)
            .map_err(|e| anyhow!("Failed to create MIDI input client: {}", e))?;
        // We want clock and active sensing filtered, sysex too
        input.ignore(Ignore::All);
        Ok(input)
    }
}

impl MidiBackend for MidirBackend {
    fn output_names(&self) -> Result<Vec<String>> {
        let output = self.output_client()?;
        Ok(output
            .ports()
            .iter()
            .filter_map(|port| output.port_name(port).ok())
            .collect())
    }

    fn input_names(&self) -> Result<Vec<String>> {
        let input = self.input_client()?;
        Ok(input
            .ports()
            .iter()
            .filter_map(|port| input.port_name(port).ok())
            .collect())
    }

    fn open_output(&mut self, port_name: &str) -> Result<Box<dyn MidiOutput>> {
        let output = self.output_client()?;
        let port = output
            .ports()
            .into_iter()
            .find(|p| output.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| anyhow!("MIDI output '{}' not found", port_name))?;

        let connection = output
            .connect(&port, &format!("{} out", self.client_name))
            .map_err(|e| anyhow!("Failed to connect to '{}': {}", port_name, e))?;

        debug!(port = port_name, "opened MIDI output");
        Ok(Box::new(MidirOutput { connection }))
    }

    fn open_input(&mut self, port_name: &str) -> Result<Box<dyn MidiInput>> {
        let input = self.input_client()?;
        let port = input
            .ports()
            .into_iter()
            .find(|p| input.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| anyhow!("MIDI input '{}' not found", port_name))?;

        let (tx, rx): (Sender<MidiMessage>, Receiver<MidiMessage>) = mpsc::channel();

        let connection = input
            .connect(
                &port,
                &format!("{} in", self.client_name),
                move |_timestamp, data, _| {
                    if let Some(msg) = MidiMessage::parse(data) {
                        let _ = tx.send(msg);
                    }
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to '{}': {}", port_name, e))?;

        debug!(port = port_name, "opened MIDI input");
        Ok(Box::new(MidirInput {
            _connection: connection,
            receiver: rx,
        }))
    }
}

struct MidirOutput {
    connection: MidiOutputConnection,
}

impl MidiOutput for MidirOutput {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.connection
            .send(message)
            .map_err(|e| anyhow!("Failed to send MIDI message: {}", e))
    }
}

struct MidirInput {
    _connection: MidiInputConnection<()>,
    receiver: Receiver<MidiMessage>,
}

impl MidiInput for MidirInput {
    fn try_recv(&self) -> Option<MidiMessage> {
        self.receiver.try_recv().ok()
    }
}

/// Print all available MIDI destinations (outputs) to stdout
pub fn print_destinations(backend: &dyn MidiBackend) -> Result<()> {
    print_ports("destinations (outputs)", &backend.output_names()?);
    Ok(())
}

/// Print all available MIDI sources (inputs) to stdout
pub fn print_sources(backend: &dyn MidiBackend) -> Result<()> {
    print_ports("sources (inputs)", &backend.input_names()?);
    Ok(())
}

fn print_ports(kind: &str, names: &[String]) {
    if names.is_empty() {
        println!("No MIDI {} found.", kind);
    } else {
        println!("Available MIDI {}:", kind);
        for (i, name) in names.iter().enumerate() {
            println!("  {}: {}", i, name);
        }
    }
}

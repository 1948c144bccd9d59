// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Control commands and their text form.
//!
//! A command line is an address followed by whitespace-separated parameters,
//! e.g. `/transport/setBpm 140.0` or `/scene/play 2`. Tracks, scenes and clips
//! are addressed by zero-based index; devices by name or short name.

use std::str::SplitWhitespace;

use uuid::Uuid;

use crate::error::CommandError;
use crate::hardware::DeviceDefinition;
use crate::sequencer::SequenceEvent;

/// A state change requested from outside the scheduler thread
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `/settings/new <tracks> <scenes>`
    NewSession { num_tracks: usize, num_scenes: usize },
    /// `/settings/save`
    SaveSession,
    /// `/settings/load`
    LoadSession,

    /// `/transport/play`
    Play,
    /// `/transport/stop`
    Stop,
    /// `/transport/playStop`
    PlayStop,
    /// `/transport/rewind` (rejected while playing)
    Rewind,
    /// `/transport/setBpm <bpm>`
    SetBpm(f64),
    /// `/transport/setMeter <beats>`
    SetMeter(i64),
    /// `/transport/setFixedLengthRecordingBars <bars>`
    SetFixedLengthRecordingBars(i64),
    /// `/transport/setRecordAutomationEnabled [on|off]`, toggles without a value
    SetRecordAutomationEnabled(Option<bool>),
    /// `/transport/setFixedVelocity <velocity>`
    SetFixedVelocity(i64),
    /// `/metronome/onOff`
    MetronomeOnOff,

    /// `/scene/play <scene>`
    PlayScene(usize),

    /// `/track/setOutputHardwareDevice <track> <device name>`
    SetTrackOutputDevice { track: usize, device: String },
    /// `/track/setInputMonitoring <track> [on|off]`, toggles without a value
    SetTrackInputMonitoring { track: usize, enabled: Option<bool> },
    /// `/track/stopAllClips <track>`
    StopTrackClips { track: usize },

    /// `/clip/play <track> <clip>`
    PlayClip { track: usize, clip: usize },
    /// `/clip/stop <track> <clip>`
    StopClip { track: usize, clip: usize },
    /// `/clip/playStop <track> <clip>`
    PlayStopClip { track: usize, clip: usize },
    /// `/clip/recordOnOff <track> <clip>`
    ToggleClipRecording { track: usize, clip: usize },
    /// `/clip/clear <track> <clip>`
    ClearClip { track: usize, clip: usize },
    /// `/clip/setLength <track> <clip> <beats>`
    SetClipLength { track: usize, clip: usize, length: f64 },
    /// `/clip/quantize <track> <clip> <step>`
    QuantizeClip { track: usize, clip: usize, step: f64 },
    /// `/clip/setWrap <track> <clip> <on|off>`
    SetClipWrap { track: usize, clip: usize, wrap: bool },
    /// `/clip/addEvent <track> <clip> <start> <note> <velocity> <duration> [channel] [chance]`
    AddClipEvent {
        track: usize,
        clip: usize,
        event: SequenceEvent,
    },
    /// `/clip/removeEvent <track> <clip> <event id>`
    RemoveClipEvent { track: usize, clip: usize, id: Uuid },

    /// `/device/setChannel <device> <channel>`
    SetDeviceChannel { device: String, channel: i64 },
    /// `/device/setCcValue <device> <cc> <value>`
    SetDeviceCcValue { device: String, cc: i64, value: i64 },
    /// `/device/setEncoderValue <device> <encoder> <value>`
    SetDeviceEncoderValue {
        device: String,
        encoder: usize,
        value: i64,
    },
    /// `/device/setControlChangeMapping <device> <cc for encoder 0> ...`
    SetDeviceControlChangeMapping { device: String, mapping: Vec<i32> },
    /// `/device/open <device>`
    OpenDevice(String),
    /// `/device/close <device>`
    CloseDevice(String),
    /// `/device/rescan`
    RescanDevices,

    /// New device naming rules (config reload, no text form)
    ReloadDevices(Vec<DeviceDefinition>),
}

impl Command {
    /// Parse one command line
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut parts = line.split_whitespace();
        let address = parts.next().ok_or(CommandError::Empty)?;
        let mut p = Params { address, parts };

        let command = match address {
            "/settings/new" => Command::NewSession {
                num_tracks: p.parse("num_tracks")?,
                num_scenes: p.parse("num_scenes")?,
            },
            "/settings/save" => Command::SaveSession,
            "/settings/load" => Command::LoadSession,

            "/transport/play" => Command::Play,
            "/transport/stop" => Command::Stop,
            "/transport/playStop" => Command::PlayStop,
            "/transport/rewind" => Command::Rewind,
            "/transport/setBpm" => Command::SetBpm(p.parse("bpm")?),
            "/transport/setMeter" => Command::SetMeter(p.parse("meter")?),
            "/transport/setFixedLengthRecordingBars" => {
                Command::SetFixedLengthRecordingBars(p.parse("bars")?)
            }
            "/transport/setRecordAutomationEnabled" => {
                Command::SetRecordAutomationEnabled(p.optional_bool("enabled")?)
            }
            "/transport/setFixedVelocity" => Command::SetFixedVelocity(p.parse("velocity")?),
            "/metronome/onOff" => Command::MetronomeOnOff,

            "/scene/play" => Command::PlayScene(p.parse("scene")?),

            "/track/setOutputHardwareDevice" => Command::SetTrackOutputDevice {
                track: p.parse("track")?,
                device: p.rest("device")?,
            },
            "/track/setInputMonitoring" => Command::SetTrackInputMonitoring {
                track: p.parse("track")?,
                enabled: p.optional_bool("enabled")?,
            },
            "/track/stopAllClips" => Command::StopTrackClips {
                track: p.parse("track")?,
            },

            "/clip/play" => Command::PlayClip {
                track: p.parse("track")?,
                clip: p.parse("clip")?,
            },
            "/clip/stop" => Command::StopClip {
                track: p.parse("track")?,
                clip: p.parse("clip")?,
            },
            "/clip/playStop" => Command::PlayStopClip {
                track: p.parse("track")?,
                clip: p.parse("clip")?,
            },
            "/clip/recordOnOff" => Command::ToggleClipRecording {
                track: p.parse("track")?,
                clip: p.parse("clip")?,
            },
            "/clip/clear" => Command::ClearClip {
                track: p.parse("track")?,
                clip: p.parse("clip")?,
            },
            "/clip/setLength" => Command::SetClipLength {
                track: p.parse("track")?,
                clip: p.parse("clip")?,
                length: p.parse("length")?,
            },
            "/clip/quantize" => Command::QuantizeClip {
                track: p.parse("track")?,
                clip: p.parse("clip")?,
                step: p.parse("step")?,
            },
            "/clip/setWrap" => Command::SetClipWrap {
                track: p.parse("track")?,
                clip: p.parse("clip")?,
                wrap: p.required_bool("wrap")?,
            },
            "/clip/addEvent" => {
                let track = p.parse("track")?;
                let clip = p.parse("clip")?;
                let event = p.event()?;
                Command::AddClipEvent { track, clip, event }
            }
            "/clip/removeEvent" => Command::RemoveClipEvent {
                track: p.parse("track")?,
                clip: p.parse("clip")?,
                id: p.parse("id")?,
            },

            "/device/setChannel" => Command::SetDeviceChannel {
                device: p.word("device")?,
                channel: p.parse("channel")?,
            },
            "/device/setCcValue" => Command::SetDeviceCcValue {
                device: p.word("device")?,
                cc: p.parse("cc")?,
                value: p.parse("value")?,
            },
            "/device/setEncoderValue" => Command::SetDeviceEncoderValue {
                device: p.word("device")?,
                encoder: p.parse("encoder")?,
                value: p.parse("value")?,
            },
            "/device/setControlChangeMapping" => {
                let device = p.word("device")?;
                let mut mapping = Vec::new();
                while let Some(cc) = p.optional("mapping")? {
                    mapping.push(cc);
                }
                Command::SetDeviceControlChangeMapping { device, mapping }
            }
            "/device/open" => Command::OpenDevice(p.rest("device")?),
            "/device/close" => Command::CloseDevice(p.rest("device")?),
            "/device/rescan" => Command::RescanDevices,

            other => return Err(CommandError::UnknownAddress(other.to_string())),
        };
        Ok(command)
    }

    /// Whether applying this command replaces the session
    pub fn replaces_session(&self) -> bool {
        matches!(self, Command::NewSession { .. } | Command::LoadSession)
    }
}

/// Cursor over the parameters of one command line
struct Params<'a> {
    address: &'a str,
    parts: SplitWhitespace<'a>,
}

impl<'a> Params<'a> {
    fn invalid(&self, name: &'static str, value: &str) -> CommandError {
        CommandError::InvalidParameter {
            address: self.address.to_string(),
            name,
            value: value.to_string(),
        }
    }

    fn missing(&self, name: &'static str) -> CommandError {
        CommandError::MissingParameter {
            address: self.address.to_string(),
            name,
        }
    }

    fn word(&mut self, name: &'static str) -> Result<String, CommandError> {
        self.parts
            .next()
            .map(str::to_string)
            .ok_or_else(|| self.missing(name))
    }

    /// Everything left, rejoined with single spaces (names may contain spaces)
    fn rest(&mut self, name: &'static str) -> Result<String, CommandError> {
        let rest: Vec<&str> = self.parts.by_ref().collect();
        if rest.is_empty() {
            return Err(self.missing(name));
        }
        Ok(rest.join(" "))
    }

    fn parse<T: std::str::FromStr>(&mut self, name: &'static str) -> Result<T, CommandError> {
        match self.optional(name)? {
            Some(value) => Ok(value),
            None => Err(self.missing(name)),
        }
    }

    fn optional<T: std::str::FromStr>(
        &mut self,
        name: &'static str,
    ) -> Result<Option<T>, CommandError> {
        match self.parts.next() {
            Some(raw) => raw.parse().map(Some).map_err(|_| self.invalid(name, raw)),
            None => Ok(None),
        }
    }

    fn optional_bool(&mut self, name: &'static str) -> Result<Option<bool>, CommandError> {
        match self.parts.next() {
            Some(raw) => parse_bool(raw)
                .map(Some)
                .ok_or_else(|| self.invalid(name, raw)),
            None => Ok(None),
        }
    }

    fn required_bool(&mut self, name: &'static str) -> Result<bool, CommandError> {
        self.optional_bool(name)?.ok_or_else(|| self.missing(name))
    }

    fn event(&mut self) -> Result<SequenceEvent, CommandError> {
        let start: f64 = self.parse("start")?;
        let note: u8 = self.parse("note")?;
        let velocity: u8 = self.parse("velocity")?;
        let duration: f64 = self.parse("duration")?;
        let channel: Option<i64> = self.optional("channel")?;
        let chance: Option<f64> = self.optional("chance")?;

        let event = SequenceEvent::new(start, note, velocity, duration)
            .map_err(|e| self.invalid("event", &e.to_string()))?;
        Ok(event
            .with_channel(channel.unwrap_or(1))
            .with_chance(chance.unwrap_or(1.0)))
    }
}

/// Accepts 1/0, true/false, on/off and yes/no
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport() {
        assert_eq!(Command::parse("/transport/play"), Ok(Command::Play));
        assert_eq!(Command::parse("  /transport/stop  "), Ok(Command::Stop));
        assert_eq!(
            Command::parse("/transport/setBpm 140.0"),
            Ok(Command::SetBpm(140.0))
        );
        assert_eq!(
            Command::parse("/transport/setMeter 3"),
            Ok(Command::SetMeter(3))
        );
        assert_eq!(Command::parse("/metronome/onOff"), Ok(Command::MetronomeOnOff));
    }

    #[test]
    fn test_parse_session_and_scene() {
        assert_eq!(
            Command::parse("/settings/new 8 4"),
            Ok(Command::NewSession {
                num_tracks: 8,
                num_scenes: 4
            })
        );
        assert_eq!(Command::parse("/scene/play 2"), Ok(Command::PlayScene(2)));
        assert!(Command::parse("/settings/new 8 4").unwrap().replaces_session());
    }

    #[test]
    fn test_device_name_with_spaces() {
        assert_eq!(
            Command::parse("/track/setOutputHardwareDevice 1 Output 2"),
            Ok(Command::SetTrackOutputDevice {
                track: 1,
                device: "Output 2".to_string()
            })
        );
    }

    #[test]
    fn test_optional_toggles() {
        assert_eq!(
            Command::parse("/track/setInputMonitoring 0"),
            Ok(Command::SetTrackInputMonitoring {
                track: 0,
                enabled: None
            })
        );
        assert_eq!(
            Command::parse("/transport/setRecordAutomationEnabled on"),
            Ok(Command::SetRecordAutomationEnabled(Some(true)))
        );
    }

    #[test]
    fn test_parse_add_event() {
        let cmd = Command::parse("/clip/addEvent 0 1 0.5 60 100 0.25 10 0.5").unwrap();
        match cmd {
            Command::AddClipEvent { track, clip, event } => {
                assert_eq!((track, clip), (0, 1));
                assert_eq!(event.start_beats(), 0.5);
                assert_eq!(event.note(), 60);
                assert_eq!(event.channel(), 10);
                assert_eq!(event.chance(), 0.5);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Note 200 is a valid u8 but not a valid MIDI note
        assert!(matches!(
            Command::parse("/clip/addEvent 0 0 0 200 100 1"),
            Err(CommandError::InvalidParameter { name: "event", .. })
        ));
    }

    #[test]
    fn test_parse_mapping() {
        assert_eq!(
            Command::parse("/device/setControlChangeMapping Out1 71 -1 74"),
            Ok(Command::SetDeviceControlChangeMapping {
                device: "Out1".to_string(),
                mapping: vec![71, -1, 74]
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("   "), Err(CommandError::Empty));
        assert_eq!(
            Command::parse("/transport/fly"),
            Err(CommandError::UnknownAddress("/transport/fly".to_string()))
        );
        assert_eq!(
            Command::parse("/transport/setBpm"),
            Err(CommandError::MissingParameter {
                address: "/transport/setBpm".to_string(),
                name: "bpm"
            })
        );
        assert_eq!(
            Command::parse("/scene/play two"),
            Err(CommandError::InvalidParameter {
                address: "/scene/play".to_string(),
                name: "scene",
                value: "two".to_string()
            })
        );
        assert!(Command::parse("/scene/play -1").is_err());
    }
}

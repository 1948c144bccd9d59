// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{error, info, warn, Level};

use seqd::config::{BackendConfig, ConfigEvent, ConfigWatcher};
use seqd::midi::{print_destinations, print_sources};
use seqd::remote::RemoteServer;
use seqd::sequencer::{CommandSender, Engine, Sequencer};
use seqd::{
    Command, HardwareDeviceManager, MidiBackend, MidirBackend, SequencerError, Session,
    VirtualBackend,
};

const CLIENT_NAME: &str = "seqd";

fn print_usage() {
    println!("SEQD - Real-time MIDI sequencing backend");
    println!();
    println!("Usage: seqd [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --list-midi             List available MIDI destinations (outputs)");
    println!("  --list-sources          List available MIDI sources (inputs)");
    println!("  --config <FILE>         Load configuration (.yaml, .yml or .toml)");
    println!("  --virtual               Use in-memory MIDI ports instead of system ports");
    println!("  --no-remote             Don't start the remote control listener");
    println!("  --port <PORT>           Remote control port (default 9001)");
    println!("  --verbose               Debug logging");
    println!("  --help                  Show this help message");
}

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    virtual_ports: bool,
    no_remote: bool,
    port: Option<u16>,
    verbose: bool,
}

enum Mode {
    Run(Options),
    ListDestinations,
    ListSources,
    Help,
}

fn parse_args(args: &[String]) -> Result<Mode> {
    let mut options = Options::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--list-midi" => return Ok(Mode::ListDestinations),
            "--list-sources" => return Ok(Mode::ListSources),
            "--help" | "-h" => return Ok(Mode::Help),
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config = Some(PathBuf::from(path));
            }
            "--port" => {
                let port = iter
                    .next()
                    .ok_or_else(|| anyhow!("--port requires a port number"))?;
                let port = port
                    .parse()
                    .map_err(|_| anyhow!("Invalid port number: {}", port))?;
                options.port = Some(port);
            }
            "--virtual" => options.virtual_ports = true,
            "--no-remote" => options.no_remote = true,
            "--verbose" | "-v" => options.verbose = true,
            other => return Err(anyhow!("Unknown option: {}", other)),
        }
    }
    Ok(Mode::Run(options))
}

/// Forward device definition changes to the scheduler
fn spawn_config_reloader(watcher: ConfigWatcher, commands: CommandSender) {
    thread::spawn(move || {
        while let Some(event) = watcher.recv() {
            match event {
                ConfigEvent::Reloaded(config) => {
                    let command = Command::ReloadDevices(config.devices);
                    if let Err(SequencerError::Stopped) = commands.push(command) {
                        break;
                    }
                }
                ConfigEvent::Error(message) => warn!("ignoring config change: {}", message),
            }
        }
    });
}

async fn run(options: Options) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => BackendConfig::load(path)?,
        None => BackendConfig::default(),
    };
    if let Some(port) = options.port {
        config.remote.port = port;
    }
    if options.no_remote {
        config.remote.enabled = false;
    }

    let backend: Box<dyn MidiBackend> = if options.virtual_ports {
        info!("using virtual MIDI ports");
        Box::new(
            VirtualBackend::new()
                .with_output("Virtual Out")
                .with_input("Virtual In"),
        )
    } else {
        Box::new(MidirBackend::new(CLIENT_NAME)?)
    };

    let mut devices = HardwareDeviceManager::new(backend, config.devices.clone());
    let found = devices.scan_available_devices();
    info!(devices = found, "MIDI devices discovered");

    let mut engine = Engine::new(
        devices,
        config.audio.sample_rate,
        config.audio.samples_per_slice,
    );
    if let Some(session) = &config.session {
        let session = Session::new(session.name.clone(), session.num_tracks, session.num_scenes)?;
        engine.replace_session(session);
    }

    let mut sequencer = Sequencer::start(engine, config.sequencer_config())?;

    if let Some(path) = &options.config {
        match ConfigWatcher::new(path, None) {
            Ok(watcher) => spawn_config_reloader(watcher, sequencer.commands()),
            Err(e) => warn!("config hot reload disabled: {:#}", e),
        }
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {}", e);
        }
        info!("shutting down");
    };

    let served = if config.remote.enabled {
        let server = RemoteServer::bind(
            config.remote_addr(),
            sequencer.commands(),
            sequencer.subscribe_snapshots(),
            Duration::from_millis(config.remote.broadcast_interval_ms),
        )
        .await;
        match server {
            Ok(server) => server.run(shutdown).await,
            Err(e) => Err(e),
        }
    } else {
        shutdown.await;
        Ok(())
    };

    if !sequencer.stop() {
        warn!("scheduler was force stopped");
    }
    served
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let mode = match parse_args(&args) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    match mode {
        Mode::Help => print_usage(),
        Mode::ListDestinations => print_destinations(&MidirBackend::new(CLIENT_NAME)?)?,
        Mode::ListSources => print_sources(&MidirBackend::new(CLIENT_NAME)?)?,
        Mode::Run(options) => {
            let level = if options.verbose { Level::DEBUG } else { Level::INFO };
            tracing_subscriber::fmt().with_max_level(level).init();
            run(options).await?;
        }
    }

    Ok(())
}

//! Remote FX simulator
//!
//! Replays a scripted session against the in-memory host and prints every
//! LED, display and mapping change the controller produces.
//!
//! ## Usage
//!
//! ```text
//! remote-fx-sim <script.yaml> [--config <surface.yaml>]
//! ```
//!
//! Set RUST_LOG=debug for the controller's own logging.

use anyhow::Context;
use remote_fx::{
    midi, ControlMessage, DeviceGraph, FxController, MapEntry, MemoryHost, Outbound,
    SessionSpec, SurfaceConfig, TrackId,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Scripted session: the host layout plus the steps to replay
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Script {
    session: SessionSpec,
    #[serde(default)]
    steps: Vec<Step>,
}

/// One scripted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    /// Control change as the surface sends it
    Cc { code: u8, value: u8 },
    /// Press and release a button
    Press(u8),
    /// Note on
    Note(u8),
    /// Raw MIDI bytes
    Raw(Vec<u8>),
    /// Focus a device by name (as if clicked in the host)
    Focus(String),
    /// Select a track by ordinal
    SelectTrack(usize),
    /// Switch a device on or off
    SetActive { device: String, active: bool },
    /// Print the current direct mapping
    Mapping,
}

#[derive(Debug, thiserror::Error)]
enum SimError {
    #[error("no device named '{0}' in the session")]
    UnknownDevice(String),

    #[error("track {0} does not exist")]
    UnknownTrack(usize),

    #[error("raw MIDI step needs at least 3 bytes, got {0}")]
    ShortRaw(usize),
}

struct Simulator {
    host: MemoryHost,
    controller: FxController,
    channel: u8,
    violations: usize,
}

impl Simulator {
    fn new(session: &SessionSpec, config: SurfaceConfig) -> Self {
        let mut host = MemoryHost::from_spec(session);
        let channel = config.channel;
        let controller = FxController::new(config, &mut host);
        let mut sim = Self {
            host,
            controller,
            channel,
            violations: 0,
        };
        sim.flush();
        sim
    }

    fn run(&mut self, steps: &[Step]) -> Result<(), SimError> {
        for (index, step) in steps.iter().enumerate() {
            println!("── step {}: {:?}", index + 1, step);
            self.step(step)?;
            self.flush();
        }
        Ok(())
    }

    fn step(&mut self, step: &Step) -> Result<(), SimError> {
        let result = match step {
            Step::Cc { code, value } => self
                .controller
                .receive_cc(ControlMessage::new(*code, *value), &mut self.host),
            Step::Press(code) => self
                .controller
                .receive_cc(ControlMessage::new(*code, 127), &mut self.host)
                .and_then(|_| {
                    self.controller
                        .receive_cc(ControlMessage::new(*code, 0), &mut self.host)
                }),
            Step::Note(note) => self.controller.receive_note(*note, &mut self.host),
            Step::Raw(bytes) => {
                if bytes.len() < 3 {
                    return Err(SimError::ShortRaw(bytes.len()));
                }
                self.controller.receive_raw(bytes, &mut self.host)
            }
            Step::Focus(name) => {
                let device = self
                    .host
                    .find_device(name)
                    .ok_or_else(|| SimError::UnknownDevice(name.clone()))?;
                self.host.select_device(device);
                Ok(())
            }
            Step::SelectTrack(ordinal) => {
                let track = TrackId(*ordinal as u32);
                let name = self
                    .host
                    .track_name(track)
                    .ok_or(SimError::UnknownTrack(*ordinal))?;
                println!("   track: {}", name);
                self.host.select_track(track);
                Ok(())
            }
            Step::SetActive { device, active } => {
                let id = self
                    .host
                    .find_device(device)
                    .ok_or_else(|| SimError::UnknownDevice(device.clone()))?;
                self.host.set_device_active(id, *active);
                Ok(())
            }
            Step::Mapping => {
                self.print_mapping();
                Ok(())
            }
        };

        if let Err(violation) = result {
            self.violations += 1;
            log::warn!("Protocol violation: {}", violation);
        }
        Ok(())
    }

    /// Deliver host notifications and print queued output until both are quiet
    fn flush(&mut self) {
        loop {
            let notifications = self.host.take_notifications();
            for notification in notifications.iter().cloned() {
                self.controller.notify(notification, &mut self.host);
            }

            let outbound = self.controller.drain();
            if notifications.is_empty() && outbound.is_empty() {
                break;
            }
            for message in &outbound {
                self.print(message);
            }
        }
    }

    fn print(&mut self, message: &Outbound) {
        match message {
            Outbound::Cc { code, value } => {
                if let Some(bytes) = midi::encode(self.channel, message) {
                    log::debug!("MIDI out {:02X?}", bytes);
                }
                println!("   led {:>3} = {}", code, value);
            }
            Outbound::Display(lines) => {
                println!("   ┌{}┐", "─".repeat(lines.top.chars().count()));
                println!("   │{}│", lines.top);
                println!("   │{:<width$}│", lines.bottom, width = lines.top.chars().count());
                println!("   └{}┘", "─".repeat(lines.top.chars().count()));
            }
            Outbound::Message(text) => println!("   message: {}", text),
            Outbound::RebuildMapping => {
                let plan = self.controller.build_mapping(&self.host);
                println!(
                    "   mapping rebuilt: {} direct, {} forwarded",
                    plan.relative_count(),
                    plan.entries.len() - plan.relative_count()
                );
            }
        }
    }

    fn print_mapping(&mut self) {
        let plan = self.controller.build_mapping(&self.host);
        for entry in &plan.entries {
            if let MapEntry::Relative {
                code, parameter, ..
            } = entry
            {
                let name = self
                    .host
                    .parameter(*parameter)
                    .map(|p| p.name)
                    .unwrap_or_default();
                println!("   encoder {:>3} -> {}", code, name);
            }
        }
    }
}

fn load_script(path: &Path) -> anyhow::Result<Script> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {:?}", path))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse script {:?}", path))
}

fn parse_args(args: &[String]) -> anyhow::Result<(PathBuf, Option<PathBuf>)> {
    let mut script = None;
    let mut config = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            other => script = Some(PathBuf::from(other)),
        }
    }
    let script = script.context("usage: remote-fx-sim <script.yaml> [--config <surface.yaml>]")?;
    Ok((script, config))
}

fn main() -> anyhow::Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (script_path, config_path) = parse_args(&args)?;

    let config = match config_path {
        Some(path) => remote_fx::load_surface_config(&path),
        None => SurfaceConfig::default(),
    };
    let script = load_script(&script_path)?;
    log::info!(
        "Replaying {} steps from {:?}",
        script.steps.len(),
        script_path
    );

    let mut sim = Simulator::new(&script.session, config);
    sim.run(&script.steps)?;
    sim.controller.disconnect(&mut sim.host);

    println!();
    println!("{} steps, {} protocol violations", script.steps.len(), sim.violations);
    Ok(())
}

//! Parameter banking for 8-strip control surfaces
//!
//! This crate provides:
//! - Banked assignment of a device's parameters to 8 encoder strips
//!   (curated banks per device class, or 8 at a time)
//! - Device locking with per-device chosen banks
//! - A per-track snapshot palette on the upper button row
//! - Device and rack chain navigation from the lower button row
//! - LED, display and direct-mapping output for the host
//!
//! # Architecture
//!
//! ```text
//! surface ─► host mapping ─┬─► (encoders bound directly to parameters)
//!                          └─► FxController::receive_cc ─► EventRouter
//!                                                              │
//!                                  ParameterBankEngine ◄───────┘
//!                                         │
//!                       FeedbackEmitter ─► drain() ─► host / surface
//! ```
//!
//! Everything runs synchronously on the host's event thread. The host is
//! passed into every call as `&mut dyn Host` (or any [`Host`] type); the
//! controller keeps no reference to it between calls.

pub mod bank_policy;
pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod host;
pub mod memory;
pub mod midi;
pub mod midi_map;
pub mod normalize;
pub mod router;
pub mod snapshot;
pub mod strip;
pub mod types;

pub use bank_policy::{BankPolicy, BankTable, DeviceBanks};
pub use config::{
    default_surface_config_path, load_surface_config, save_surface_config, ControlLayout,
    SurfaceConfig, SurfacePolicy,
};
pub use engine::ParameterBankEngine;
pub use error::{LayoutError, ProtocolViolation, SnapshotKeyError};
pub use host::{DeviceGraph, Host, HostNotification, SessionControl, TrackStore};
pub use memory::{MemoryHost, SessionSpec};
pub use midi::RawEvent;
pub use midi_map::{MapEntry, MappingPlan};
pub use router::{Command, EventRouter};
pub use snapshot::SnapshotKey;
pub use types::{
    ControlMessage, DeviceId, DisplayLines, Outbound, PageDirection, ParameterId, TrackId,
};

use std::path::Path;

/// Surface controller
///
/// Glue between the host's MIDI forwarding and notifications, the router and
/// the engine. Outbound messages queue up until [`drain`](Self::drain).
pub struct FxController {
    config: SurfaceConfig,
    router: EventRouter,
    engine: ParameterBankEngine,
}

impl FxController {
    /// Create a controller and assign the host's focused device
    ///
    /// An invalid control layout is replaced by the default one.
    pub fn new<H: Host + ?Sized>(mut config: SurfaceConfig, host: &mut H) -> Self {
        if let Err(e) = config.layout.validate() {
            log::warn!("FX: Invalid layout ({}), using the default layout", e);
            config.layout = ControlLayout::default();
        }
        let router = EventRouter::new(config.layout.clone(), &config.policy);
        let mut engine = ParameterBankEngine::new(&config);

        let appointed = host.appointed_device();
        engine.change_assigned_device(appointed, host);
        engine.refresh_state(host);

        log::info!(
            "FX: Controller ready on channel {} ({} curated device classes)",
            config.channel,
            config.banks.len()
        );

        Self {
            config,
            router,
            engine,
        }
    }

    /// Create a controller from a config file (default location if `None`)
    pub fn from_config_path<H: Host + ?Sized>(config_path: Option<&Path>, host: &mut H) -> Self {
        let config_path = config_path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(default_surface_config_path);
        let config = load_surface_config(&config_path);
        Self::new(config, host)
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn engine(&self) -> &ParameterBankEngine {
        &self.engine
    }

    /// Handle a forwarded control change
    pub fn receive_cc<H: Host + ?Sized>(
        &mut self,
        message: ControlMessage,
        host: &mut H,
    ) -> Result<(), ProtocolViolation> {
        let command = self.router.route(message)?;
        self.execute(command, host)
    }

    /// Handle a forwarded note on
    pub fn receive_note<H: Host + ?Sized>(
        &mut self,
        note: u8,
        host: &mut H,
    ) -> Result<(), ProtocolViolation> {
        let command = self.router.route_note(note)?;
        self.execute(command, host)
    }

    /// Handle raw MIDI bytes
    ///
    /// Messages on other channels and message types the surface never sends
    /// are dropped.
    pub fn receive_raw<H: Host + ?Sized>(
        &mut self,
        data: &[u8],
        host: &mut H,
    ) -> Result<(), ProtocolViolation> {
        let Some(event) = RawEvent::parse(data) else {
            log::trace!("FX: Ignoring unparseable MIDI {:02X?}", data);
            return Ok(());
        };
        if event.channel() != self.config.channel {
            log::trace!("FX: Ignoring {:?} on foreign channel", event);
            return Ok(());
        }
        match event {
            RawEvent::ControlChange { cc, value, .. } => {
                self.receive_cc(ControlMessage::new(cc, value), host)
            }
            RawEvent::NoteOn { note, .. } => self.receive_note(note, host),
            RawEvent::NoteOff { .. } => Ok(()),
        }
    }

    fn execute<H: Host + ?Sized>(
        &mut self,
        command: Command,
        host: &mut H,
    ) -> Result<(), ProtocolViolation> {
        match command {
            Command::Nothing => {}
            Command::PageBank(direction) => {
                self.engine.page(direction, host);
            }
            Command::ToggleLock => self.engine.toggle_lock(host),
            Command::PreviousScene => previous_scene(host),
            Command::FireScene => host.fire_selected_scene(),
            Command::StopClips => host.stop_all_clips(),
            Command::Primary(strip) => {
                let outcome = self.engine.press_primary(strip, host);
                log::debug!("FX: Strip {} primary: {:?}", strip, outcome);
            }
            Command::Secondary(strip) => {
                self.engine.press_secondary(strip, host);
            }
            Command::Encoder(strip) => self.engine.encoder_moved(strip)?,
            Command::PaletteLock(held) => self.engine.set_palette_locked(held, host),
            Command::PageChain(direction) => {
                self.engine.page_chain(direction, host);
            }
        }
        Ok(())
    }

    /// Handle a host notification
    pub fn notify<H: Host + ?Sized>(&mut self, notification: HostNotification, host: &mut H) {
        log::trace!("FX: Notification {:?}", notification);
        match notification {
            HostNotification::SelectedTrackChanged => self.engine.reassign(host),
            HostNotification::AppointedDeviceChanged(device) => {
                self.engine.on_appointed_device_changed(device, host)
            }
            HostNotification::DeviceChanged { device, .. } => {
                if self.engine.assigned_device() == Some(device) {
                    self.engine.reassign(host);
                }
            }
            HostNotification::ChosenBankStored { device, bank } => {
                if self.engine.assigned_device() == Some(device) {
                    self.engine.restore_bank(bank, host);
                }
            }
        }
    }

    /// Build the direct mapping the host should install
    pub fn build_mapping<G: DeviceGraph + ?Sized>(&mut self, graph: &G) -> MappingPlan {
        self.engine.build_mapping(graph)
    }

    /// Re-send every LED and display output
    pub fn refresh_state<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.engine.refresh_state(host);
    }

    /// Surface went away: drop device subscriptions
    pub fn disconnect<H: Host + ?Sized>(&mut self, host: &mut H) {
        log::info!("FX: Disconnecting");
        self.engine.disconnect(host);
    }

    /// Take all queued outbound messages
    pub fn drain(&mut self) -> Vec<Outbound> {
        self.engine.take_outbound()
    }
}

/// Select the scene above the current one, clamped to the session
fn previous_scene<S: SessionControl + ?Sized>(session: &mut S) {
    let count = session.scene_count();
    if count == 0 {
        return;
    }
    let current = session.selected_scene().unwrap_or(0);
    session.select_scene(current.saturating_sub(1).min(count - 1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ContainerKind;
    use crate::memory::ParameterSpec;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn config() -> SurfaceConfig {
        let mut banks = BankTable::new();
        banks.insert(
            "Echo",
            DeviceBanks::new(&["Best1", "Best2"], &[&["Time", "Feedback"], &["Dry/Wet"]]),
        );
        SurfaceConfig {
            banks,
            ..SurfaceConfig::default()
        }
    }

    struct Rig {
        host: MemoryHost,
        ctrl: FxController,
        track: TrackId,
        echo: DeviceId,
        plugin: DeviceId,
    }

    impl Rig {
        fn new() -> Self {
            init_logging();
            let mut host = MemoryHost::new();
            let track = host.add_track("Audio");
            let echo = host.add_device(track, "Echo", "Echo");
            host.add_parameter(echo, ParameterSpec::toggle("Device On"));
            host.add_parameter(echo, ParameterSpec::new("Feedback", 0.2, 0.0, 1.0));
            host.add_parameter(echo, ParameterSpec::new("Time", 0.5, 0.0, 1.0));
            host.add_parameter(echo, ParameterSpec::new("Dry/Wet", 1.0, 0.0, 1.0));
            let plugin = host.add_device(track, "Plugin", "PluginDevice");
            host.add_numbered_parameters(plugin, 17);
            host.set_scene_count(4);

            let ctrl = FxController::new(config(), &mut host);
            Self {
                host,
                ctrl,
                track,
                echo,
                plugin,
            }
        }

        fn cc(&mut self, code: u8, value: u8) -> Result<(), ProtocolViolation> {
            let result = self.ctrl.receive_cc(ControlMessage::new(code, value), &mut self.host);
            self.pump();
            result
        }

        fn press(&mut self, code: u8) {
            self.cc(code, 127).unwrap();
            self.cc(code, 0).unwrap();
        }

        /// Deliver queued host notifications until the host is quiet
        fn pump(&mut self) {
            loop {
                let pending = self.host.take_notifications();
                if pending.is_empty() {
                    break;
                }
                for notification in pending {
                    self.ctrl.notify(notification, &mut self.host);
                }
            }
        }

        fn focus(&mut self, device: DeviceId) {
            self.host.select_device(device);
            self.pump();
        }

        fn messages(&mut self) -> Vec<String> {
            self.ctrl
                .drain()
                .into_iter()
                .filter_map(|o| match o {
                    Outbound::Message(m) => Some(m),
                    _ => None,
                })
                .collect()
        }

        fn param(&self, device: DeviceId, index: usize) -> ParameterId {
            self.host.device_parameters(device)[index]
        }
    }

    #[test]
    fn test_starts_with_placeholder() {
        let mut rig = Rig::new();
        let out = rig.ctrl.drain();
        assert!(out.iter().any(|o| matches!(
            o,
            Outbound::Display(lines) if lines.top == feedback::PLACEHOLDER
        )));
        assert!(out.contains(&Outbound::Cc { code: 80, value: 0 }));
        assert_eq!(rig.ctrl.engine().assigned_device(), None);
    }

    #[test]
    fn test_lower_button_selects_and_assigns_curated_device() {
        let mut rig = Rig::new();
        rig.ctrl.drain();

        rig.ctrl.receive_raw(&[0xB0, 40, 127], &mut rig.host).unwrap();
        rig.pump();
        assert_eq!(rig.ctrl.engine().assigned_device(), Some(rig.echo));
        // The bank name only shows after paging
        assert!(rig.messages().is_empty());

        let bound = rig.ctrl.engine().assigned_parameters();
        assert_eq!(bound[0], Some(rig.param(rig.echo, 2)));
        assert_eq!(bound[1], Some(rig.param(rig.echo, 1)));

        rig.press(88);
        assert_eq!(rig.ctrl.engine().bank(), 1);
        assert_eq!(rig.messages(), vec!["Echo Bank: Best2"]);
        assert_eq!(rig.ctrl.engine().assigned_parameters()[0], Some(rig.param(rig.echo, 3)));

        // Already on the last curated bank
        rig.press(88);
        assert_eq!(rig.ctrl.engine().bank(), 1);
    }

    #[test]
    fn test_focus_change_shows_no_bank_message() {
        let mut rig = Rig::new();
        rig.ctrl.drain();
        rig.focus(rig.plugin);
        assert_eq!(rig.ctrl.engine().assigned_device(), Some(rig.plugin));
        assert!(rig.messages().is_empty());

        // Locking doesn't announce the bank either
        rig.press(80);
        assert!(rig.messages().is_empty());
    }

    #[test]
    fn test_overflow_banks() {
        let mut rig = Rig::new();
        rig.focus(rig.plugin);
        rig.press(88);
        rig.press(88);
        rig.press(88);
        assert_eq!(rig.ctrl.engine().bank(), 2);
        assert_eq!(
            rig.ctrl.engine().assigned_parameters()[0],
            Some(rig.param(rig.plugin, 17))
        );
        rig.press(89);
        assert_eq!(rig.ctrl.engine().bank(), 1);
    }

    #[test]
    fn test_locked_paging_round_trips_through_host() {
        let mut rig = Rig::new();
        rig.focus(rig.plugin);
        rig.press(80);
        assert!(rig.ctrl.engine().is_locked());
        rig.ctrl.drain();

        rig.press(88);
        assert_eq!(rig.host.chosen_bank(rig.plugin, "remote-fx"), Some(1));
        assert_eq!(rig.ctrl.engine().bank(), 1);
        assert_eq!(rig.messages(), vec!["Plugin Bank: Bank 2"]);

        // Focus changes are ignored while locked
        rig.focus(rig.echo);
        assert_eq!(rig.ctrl.engine().assigned_device(), Some(rig.plugin));

        // Unlock follows focus again, lock again restores the stored bank
        rig.press(80);
        assert_eq!(rig.ctrl.engine().assigned_device(), Some(rig.echo));
        rig.focus(rig.plugin);
        rig.press(80);
        assert_eq!(rig.ctrl.engine().bank(), 1);
    }

    #[test]
    fn test_palette_save_and_recall() {
        let mut rig = Rig::new();
        rig.focus(rig.plugin);
        let p1 = rig.param(rig.plugin, 1);
        rig.host.set_parameter_value(p1, 0.25);

        rig.cc(79, 127).unwrap();
        rig.press(24);
        rig.cc(79, 0).unwrap();
        assert!(rig.host.get_data(rig.track, "1_0").is_some());

        rig.host.set_parameter_value(p1, 0.75);
        // Without the transport lock the button resets the parameter instead
        rig.press(24);
        assert_eq!(rig.host.value(p1), 0.0);

        rig.cc(79, 127).unwrap();
        rig.press(24);
        assert_eq!(rig.host.value(p1), 0.25);

        // Slot 2 is not reachable before slot 1 is filled
        rig.press(26);
        assert!(rig.host.get_data(rig.track, "1_2").is_none());
    }

    #[test]
    fn test_chain_member_palette_uses_rack_position() {
        let mut rig = Rig::new();
        let track = rig.track;
        for name in ["A", "B"] {
            rig.host.add_device(track, name, "Utility");
        }
        let rack = rig.host.add_rack(track, "Rack", "AudioEffectGroupDevice");
        let mut members = Vec::new();
        for name in ["Saturator", "Chorus"] {
            let chain = rig.host.add_chain(rack, ContainerKind::PlainChain);
            let device = rig.host.add_chain_device(chain, name, "Saturator");
            rig.host.add_numbered_parameters(device, 3);
            members.push(device);
        }

        rig.focus(members[0]);
        assert_eq!(rig.ctrl.engine().assigned_device_index(), Some(4));

        // Chain paging moves to the second chain and remembers it
        rig.press(90);
        assert_eq!(rig.host.appointed_device(), Some(members[1]));
        assert_eq!(rig.ctrl.engine().assigned_device(), Some(members[1]));

        rig.cc(79, 127).unwrap();
        rig.press(24);
        assert!(rig.host.get_data(track, "4_1_0").is_some());
        rig.cc(79, 0).unwrap();

        // The lower button re-enters the rack at the chain visited last
        rig.focus(rig.echo);
        rig.press(44);
        assert_eq!(rig.host.appointed_device(), Some(members[1]));
    }

    #[test]
    fn test_chain_paging_lights_chain_slot() {
        let mut rig = Rig::new();
        let rack = rig.host.add_rack(rig.track, "Rack", "AudioEffectGroupDevice");
        let mut members = Vec::new();
        for name in ["A", "B", "C"] {
            let chain = rig.host.add_chain(rack, ContainerKind::PlainChain);
            let device = rig.host.add_chain_device(chain, name, "Utility");
            rig.host.add_numbered_parameters(device, 2);
            members.push(device);
        }
        rig.focus(members[0]);
        rig.ctrl.drain();

        rig.press(90);
        assert_eq!(rig.ctrl.engine().assigned_device(), Some(members[1]));
        let out = rig.ctrl.drain();
        let last = |code: u8| {
            out.iter().rev().find_map(|o| match o {
                Outbound::Cc { code: c, value } if *c == code => Some(*value),
                _ => None,
            })
        };
        assert_eq!(last(25), Some(1));
        assert_eq!(last(24), Some(0));

        // The palette owns the upper row while the transport lock is held
        rig.cc(79, 127).unwrap();
        rig.ctrl.drain();
        rig.press(91);
        let out = rig.ctrl.drain();
        assert!(!out.contains(&Outbound::Cc { code: 24, value: 1 }));
    }

    #[test]
    fn test_invalid_layout_replaced_by_default() {
        let mut host = MemoryHost::new();
        let config = SurfaceConfig {
            layout: ControlLayout {
                upper_row_base: 125,
                ..ControlLayout::default()
            },
            ..SurfaceConfig::default()
        };
        let ctrl = FxController::new(config, &mut host);
        assert_eq!(ctrl.config().layout, ControlLayout::default());
    }

    #[test]
    fn test_scene_buttons() {
        let mut rig = Rig::new();
        rig.host.select_scene(2);
        rig.press(81);
        assert_eq!(rig.host.selected_scene(), Some(1));
        rig.press(83);
        rig.press(84);
        assert_eq!(rig.host.fired_scenes(), &[1]);
        assert_eq!(rig.host.stop_requests(), 1);

        rig.press(81);
        rig.press(81);
        assert_eq!(rig.host.selected_scene(), Some(0));
    }

    #[test]
    fn test_encoder_violation_after_mapping() {
        let mut rig = Rig::new();
        rig.focus(rig.echo);
        let plan = rig.ctrl.build_mapping(&rig.host);
        assert_eq!(plan.relative_count(), 2);

        assert_eq!(rig.cc(56, 1), Err(ProtocolViolation::EncoderBound { strip: 0 }));
        assert_eq!(rig.cc(60, 1), Ok(()));
        assert!(matches!(
            rig.cc(72, 127),
            Err(ProtocolViolation::Misrouted { .. })
        ));
    }

    #[test]
    fn test_foreign_channel_and_notes() {
        let mut rig = Rig::new();
        rig.ctrl.receive_raw(&[0xB1, 40, 127], &mut rig.host).unwrap();
        rig.pump();
        assert_eq!(rig.ctrl.engine().assigned_device(), None);

        assert_eq!(
            rig.ctrl.receive_raw(&[0x90, 60, 100], &mut rig.host),
            Err(ProtocolViolation::UnexpectedNote { note: 60 })
        );
        assert_eq!(rig.ctrl.receive_raw(&[0x80, 60, 0], &mut rig.host), Ok(()));
    }

    #[test]
    fn test_device_notifications_reassign() {
        let mut rig = Rig::new();
        rig.focus(rig.echo);
        rig.ctrl.drain();

        rig.host.set_device_active(rig.echo, false);
        rig.pump();
        let out = rig.ctrl.drain();
        assert!(out.contains(&Outbound::RebuildMapping));
        assert_eq!(rig.ctrl.build_mapping(&rig.host).relative_count(), 0);

        rig.host.clear_parameters(rig.echo);
        rig.pump();
        assert!(rig
            .ctrl
            .engine()
            .assigned_parameters()
            .iter()
            .all(|p| p.is_none()));
    }

    #[test]
    fn test_disconnect_releases_subscriptions() {
        let mut rig = Rig::new();
        rig.focus(rig.echo);
        assert_eq!(rig.host.subscription_count(), 2);
        rig.ctrl.disconnect(&mut rig.host);
        assert_eq!(rig.host.subscription_count(), 0);
    }

    #[test]
    fn test_works_through_dyn_host() {
        let mut rig = Rig::new();
        let host: &mut dyn Host = &mut rig.host;
        host.select_device(rig.echo);
        rig.ctrl
            .notify(HostNotification::AppointedDeviceChanged(Some(rig.echo)), host);
        assert_eq!(rig.ctrl.engine().assigned_device(), Some(rig.echo));
    }

    #[test]
    fn test_from_missing_config_path_uses_defaults() {
        let mut host = MemoryHost::new();
        let path = std::env::temp_dir().join("remote-fx-missing/surface.yaml");
        let ctrl = FxController::from_config_path(Some(&path), &mut host);
        assert_eq!(ctrl.config(), &SurfaceConfig::default());
    }
}

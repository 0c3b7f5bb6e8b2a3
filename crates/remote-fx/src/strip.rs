//! One of the 8 physical strips: encoder, upper button and lower button
//!
//! The encoder is normally bound directly by the host (see `midi_map`), so
//! the strip itself only implements the two button actions.

use crate::config::SurfacePolicy;
use crate::error::ProtocolViolation;
use crate::host::{Host, Placement};
use crate::normalize::next_step;
use crate::snapshot::{self, SnapshotKey};
use crate::types::{DeviceId, ParameterId, TrackId};

/// Engine state a strip action needs
#[derive(Debug, Clone, Copy)]
pub struct StripContext<'a> {
    pub track: Option<TrackId>,
    pub device: Option<DeviceId>,
    /// Effective ordinal of the assigned device on the selected track
    pub device_ordinal: Option<usize>,
    /// Upper row acts as the snapshot palette
    pub palette_locked: bool,
    pub policy: &'a SurfacePolicy,
}

/// What a primary (upper button) press did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimaryOutcome {
    /// Nothing bound, parameter disabled, or palette slot not reachable yet
    Ignored,
    /// Quantized parameter advanced to its next step
    Stepped { parameter: ParameterId, value: f32 },
    /// Continuous parameter reset to its default
    Reset { parameter: ParameterId, value: f32 },
    Loaded(SnapshotKey),
    Saved(SnapshotKey),
}

impl PrimaryOutcome {
    /// Palette actions change many parameters at once and need a full refresh
    pub fn needs_reassign(&self) -> bool {
        matches!(self, Self::Loaded(_) | Self::Saved(_))
    }
}

/// Per-strip binding state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlStrip {
    index: usize,
    assigned: Option<ParameterId>,
}

impl ControlStrip {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            assigned: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn assigned_parameter(&self) -> Option<ParameterId> {
        self.assigned
    }

    pub fn set_assigned_parameter(&mut self, parameter: Option<ParameterId>) {
        self.assigned = parameter;
    }

    /// Upper button pressed
    pub fn on_primary<H: Host + ?Sized>(&self, ctx: &StripContext<'_>, host: &mut H) -> PrimaryOutcome {
        if ctx.palette_locked {
            self.palette_action(ctx, host)
        } else {
            self.parameter_action(host)
        }
    }

    fn parameter_action<H: Host + ?Sized>(&self, host: &mut H) -> PrimaryOutcome {
        let Some(parameter) = self.assigned else {
            return PrimaryOutcome::Ignored;
        };
        let Some(info) = host.parameter(parameter) else {
            return PrimaryOutcome::Ignored;
        };
        if !info.enabled {
            return PrimaryOutcome::Ignored;
        }

        if info.quantized {
            let value = next_step(&info);
            host.set_parameter_value(parameter, value);
            PrimaryOutcome::Stepped { parameter, value }
        } else {
            host.set_parameter_value(parameter, info.default);
            PrimaryOutcome::Reset {
                parameter,
                value: info.default,
            }
        }
    }

    /// Slots fill left to right: load below the contiguous count, save at it,
    /// ignore above it
    fn palette_action<H: Host + ?Sized>(&self, ctx: &StripContext<'_>, host: &mut H) -> PrimaryOutcome {
        let (Some(track), Some(device), Some(ordinal)) = (ctx.track, ctx.device, ctx.device_ordinal) else {
            return PrimaryOutcome::Ignored;
        };

        let placement = Placement::resolve(&*host, device);
        let key = SnapshotKey::new(ordinal, placement.chain_ordinal(&*host), self.index);
        let filled = snapshot::contiguous_count(&*host, track, key);

        if self.index > filled {
            log::trace!("Snapshot: Slot {} not reachable ({} filled)", key, filled);
            return PrimaryOutcome::Ignored;
        }

        match snapshot::load(&*host, track, key) {
            Some(values) => {
                log::debug!("Snapshot: Loading {} ({} values)", key, values.len());
                snapshot::apply(host, device, &values);
                PrimaryOutcome::Loaded(key)
            }
            None if self.index == filled => {
                let values = snapshot::capture(&*host, device);
                log::debug!("Snapshot: Saving {} ({} values)", key, values.len());
                snapshot::save(host, track, key, &values);
                PrimaryOutcome::Saved(key)
            }
            None => PrimaryOutcome::Ignored,
        }
    }

    /// Lower button pressed: select the device at this strip's position
    ///
    /// Racks with enough chains are entered at the chain visited last.
    /// Returns the device that was selected.
    pub fn on_secondary<H: Host + ?Sized>(&self, ctx: &StripContext<'_>, host: &mut H) -> Option<DeviceId> {
        let track = ctx.track?;
        let mut device = *host.track_devices(track).get(self.index)?;

        if ctx.policy.navigate_chains && host.is_rack(device) {
            let chains = host.rack_chains(device);
            let threshold = ctx.policy.chain_threshold(&host.device_class(device));
            if chains.len() > threshold {
                let last = snapshot::last_chain(&*host, track, self.index);
                let entry = chains
                    .get(last)
                    .and_then(|chain| host.chain_devices(*chain).first().copied());
                match entry {
                    Some(first) => device = first,
                    None => log::debug!("FX: Remembered chain {} is empty, selecting rack", last),
                }
            }
        }

        host.select_device(device);
        Some(device)
    }

    /// Encoder moved while routed through software
    ///
    /// Only legal when the encoder is not bound directly by the host.
    pub fn on_encoder_moved(&self, direct_mapped: bool) -> Result<(), ProtocolViolation> {
        if direct_mapped && self.assigned.is_some() {
            return Err(ProtocolViolation::EncoderBound { strip: self.index });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ContainerKind, DeviceGraph, TrackStore};
    use crate::memory::{MemoryHost, ParameterSpec};

    struct Fixture {
        host: MemoryHost,
        track: TrackId,
        device: DeviceId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut host = MemoryHost::new();
            let track = host.add_track("Audio");
            let _eq = host.add_device(track, "EQ Eight", "Eq8");
            let device = host.add_device(track, "Echo", "Echo");
            host.add_parameter(device, ParameterSpec::toggle("Device On"));
            host.add_parameter(device, ParameterSpec::new("Time", 0.3, 0.0, 1.0).with_default(0.5));
            host.add_parameter(device, ParameterSpec::new("Mode", 2.0, 0.0, 3.0).quantized());
            Self { host, track, device }
        }

        fn ctx<'a>(&self, policy: &'a SurfacePolicy, palette_locked: bool) -> StripContext<'a> {
            StripContext {
                track: Some(self.track),
                device: Some(self.device),
                device_ordinal: Some(1),
                palette_locked,
                policy,
            }
        }

        fn param(&self, index: usize) -> ParameterId {
            self.host.device_parameters(self.device)[index]
        }

        fn press(&mut self, slot: usize) -> PrimaryOutcome {
            let policy = SurfacePolicy::default();
            let ctx = self.ctx(&policy, true);
            ControlStrip::new(slot).on_primary(&ctx, &mut self.host)
        }
    }

    #[test]
    fn test_primary_resets_continuous_parameter() {
        let mut fx = Fixture::new();
        let time = fx.param(1);
        let mut strip = ControlStrip::new(0);
        strip.set_assigned_parameter(Some(time));
        let policy = SurfacePolicy::default();
        let ctx = fx.ctx(&policy, false);

        let outcome = strip.on_primary(&ctx, &mut fx.host);
        assert_eq!(
            outcome,
            PrimaryOutcome::Reset {
                parameter: time,
                value: 0.5
            }
        );
        assert_eq!(fx.host.value(time), 0.5);
        assert!(!outcome.needs_reassign());
    }

    #[test]
    fn test_primary_steps_quantized_and_wraps() {
        let mut fx = Fixture::new();
        let mode = fx.param(2);
        let mut strip = ControlStrip::new(1);
        strip.set_assigned_parameter(Some(mode));
        let policy = SurfacePolicy::default();
        let ctx = fx.ctx(&policy, false);

        strip.on_primary(&ctx, &mut fx.host);
        assert_eq!(fx.host.value(mode), 3.0);
        strip.on_primary(&ctx, &mut fx.host);
        assert_eq!(fx.host.value(mode), 0.0);
    }

    #[test]
    fn test_primary_ignores_disabled_and_unbound() {
        let mut fx = Fixture::new();
        let time = fx.param(1);
        let policy = SurfacePolicy::default();
        let ctx = fx.ctx(&policy, false);

        let unbound = ControlStrip::new(2);
        assert_eq!(unbound.on_primary(&ctx, &mut fx.host), PrimaryOutcome::Ignored);

        fx.host.set_parameter_enabled(time, false);
        let mut strip = ControlStrip::new(0);
        strip.set_assigned_parameter(Some(time));
        assert_eq!(strip.on_primary(&ctx, &mut fx.host), PrimaryOutcome::Ignored);
        assert_eq!(fx.host.value(time), 0.3);
    }

    #[test]
    fn test_palette_save_then_load() {
        let mut fx = Fixture::new();
        let time = fx.param(1);

        assert_eq!(fx.press(0), PrimaryOutcome::Saved(SnapshotKey::new(1, None, 0)));

        fx.host.set_parameter_value(time, 0.9);
        assert_eq!(fx.press(0), PrimaryOutcome::Loaded(SnapshotKey::new(1, None, 0)));
        assert_eq!(fx.host.value(time), 0.3);
        assert_eq!(fx.host.value(fx.param(2)), 2.0);
    }

    #[test]
    fn test_palette_unreachable_slot_ignored() {
        let mut fx = Fixture::new();
        assert_eq!(fx.press(3), PrimaryOutcome::Ignored);
        assert!(fx.host.get_data(fx.track, "1_3").is_none());
    }

    #[test]
    fn test_palette_gap_is_filled_before_later_slots_load() {
        let mut fx = Fixture::new();
        snapshot::save(&mut fx.host, fx.track, SnapshotKey::new(1, None, 0), &[1.0, 0.1, 0.0]);
        snapshot::save(&mut fx.host, fx.track, SnapshotKey::new(1, None, 2), &[1.0, 0.2, 1.0]);

        // Slot 2 is beyond the contiguous count of 1
        assert_eq!(fx.press(2), PrimaryOutcome::Ignored);

        // Slot 1 fills the gap
        assert_eq!(fx.press(1), PrimaryOutcome::Saved(SnapshotKey::new(1, None, 1)));

        // Now slot 2 loads instead of saving
        assert_eq!(fx.press(2), PrimaryOutcome::Loaded(SnapshotKey::new(1, None, 2)));
        assert_eq!(fx.host.value(fx.param(1)), 0.2);
    }

    #[test]
    fn test_palette_apply_ignores_extra_values() {
        let mut fx = Fixture::new();
        snapshot::save(
            &mut fx.host,
            fx.track,
            SnapshotKey::new(1, None, 0),
            &[1.0, 0.7, 1.0, 99.0, 99.0],
        );
        assert!(fx.press(0).needs_reassign());
        assert_eq!(fx.host.value(fx.param(1)), 0.7);
        assert_eq!(fx.host.value(fx.param(2)), 1.0);
    }

    #[test]
    fn test_palette_without_device_ordinal_is_ignored() {
        let mut fx = Fixture::new();
        let policy = SurfacePolicy::default();
        let ctx = StripContext {
            device_ordinal: None,
            ..fx.ctx(&policy, true)
        };
        assert_eq!(ControlStrip::new(0).on_primary(&ctx, &mut fx.host), PrimaryOutcome::Ignored);
    }

    #[test]
    fn test_secondary_selects_device() {
        let mut fx = Fixture::new();
        let policy = SurfacePolicy::default();
        let ctx = fx.ctx(&policy, false);

        assert_eq!(ControlStrip::new(1).on_secondary(&ctx, &mut fx.host), Some(fx.device));
        assert_eq!(fx.host.appointed_device(), Some(fx.device));
        assert_eq!(ControlStrip::new(5).on_secondary(&ctx, &mut fx.host), None);
    }

    #[test]
    fn test_secondary_descends_into_remembered_chain() {
        let mut fx = Fixture::new();
        let rack = fx.host.add_rack(fx.track, "Rack", "AudioEffectGroupDevice");
        let chain_a = fx.host.add_chain(rack, ContainerKind::PlainChain);
        let chain_b = fx.host.add_chain(rack, ContainerKind::PlainChain);
        let _a = fx.host.add_chain_device(chain_a, "Saturator", "Saturator");
        let b = fx.host.add_chain_device(chain_b, "Chorus", "Chorus2");
        snapshot::remember_chain(&mut fx.host, fx.track, 2, 1);

        let policy = SurfacePolicy::default();
        let ctx = fx.ctx(&policy, false);
        assert_eq!(ControlStrip::new(2).on_secondary(&ctx, &mut fx.host), Some(b));

        let flat = SurfacePolicy {
            navigate_chains: false,
            ..SurfacePolicy::default()
        };
        let ctx = fx.ctx(&flat, false);
        assert_eq!(ControlStrip::new(2).on_secondary(&ctx, &mut fx.host), Some(rack));
    }

    #[test]
    fn test_secondary_threshold_for_single_chain_racks() {
        let mut fx = Fixture::new();
        let audio_rack = fx.host.add_rack(fx.track, "Rack", "AudioEffectGroupDevice");
        let chain = fx.host.add_chain(audio_rack, ContainerKind::PlainChain);
        fx.host.add_chain_device(chain, "Saturator", "Saturator");
        let midi_rack = fx.host.add_rack(fx.track, "Midi Rack", "MidiEffectGroupDevice");
        let midi_chain = fx.host.add_chain(midi_rack, ContainerKind::PlainChain);
        let arp = fx.host.add_chain_device(midi_chain, "Arpeggiator", "MidiArpeggiator");

        let policy = SurfacePolicy::default();
        let ctx = fx.ctx(&policy, false);
        // One chain is not enough for an audio rack...
        assert_eq!(ControlStrip::new(2).on_secondary(&ctx, &mut fx.host), Some(audio_rack));
        // ...but any chain will do for a MIDI effect rack
        assert_eq!(ControlStrip::new(3).on_secondary(&ctx, &mut fx.host), Some(arp));
    }

    #[test]
    fn test_encoder_exclusivity() {
        let mut strip = ControlStrip::new(4);
        assert!(strip.on_encoder_moved(true).is_ok());
        strip.set_assigned_parameter(Some(ParameterId(9)));
        assert!(strip.on_encoder_moved(false).is_ok());
        assert_eq!(
            strip.on_encoder_moved(true),
            Err(ProtocolViolation::EncoderBound { strip: 4 })
        );
    }
}

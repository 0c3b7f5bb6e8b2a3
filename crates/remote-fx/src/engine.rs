//! Parameter bank engine
//!
//! Owns the assignment state (assigned device, bank, both locks) and derives
//! strip bindings, LEDs and display text from the host on every
//! reassignment. Nothing from the host is cached between calls; the engine
//! re-reads the device graph each time.
//!
//! # Reassignment pass
//!
//! ```text
//! selected track ─► effective device ordinal ─► lower row LEDs
//!                                            ─► upper row LEDs (palette)
//! assigned device ─► bank policy ─► strips ─► display + bank message
//!                                         ─► paging / chain LEDs
//!                                         ─► mapping rebuild request
//! ```

use crate::bank_policy::BankPolicy;
use crate::config::{ControlLayout, SurfaceConfig, SurfacePolicy};
use crate::error::ProtocolViolation;
use crate::feedback::{ChainPosition, FeedbackEmitter};
use crate::host::{
    ContainerKind, DeviceEvent, DeviceGraph, Host, ParameterInfo, Placement, SubscriptionToken,
};
use crate::midi_map::{self, MappingPlan};
use crate::normalize::format_value;
use crate::snapshot::{self, SnapshotKey};
use crate::strip::{ControlStrip, PrimaryOutcome, StripContext};
use crate::types::{DeviceId, Outbound, PageDirection, ParameterId, TrackId, NUM_STRIPS};

/// Which end of its range a chain's first parameter is driven to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Min,
    Max,
}

/// Banked parameter assignment for the 8 strips
pub struct ParameterBankEngine {
    policy: BankPolicy,
    surface: SurfacePolicy,
    layout: ControlLayout,
    channel: u8,
    binding_id: String,
    feedback: FeedbackEmitter,
    strips: [ControlStrip; NUM_STRIPS],
    /// Strips bound directly by the last mapping rebuild
    direct_mapped: [bool; NUM_STRIPS],

    selected_track: Option<TrackId>,
    selected_track_index: Option<usize>,
    assigned_device: Option<DeviceId>,
    assigned_device_index: Option<usize>,
    bank: usize,
    /// Binding lock: assignment ignores focus changes
    locked: bool,
    /// Transport lock held: upper row acts as the snapshot palette
    palette_locked: bool,
    /// Report the bank name on the next reassignment
    show_bank: bool,
    subscriptions: Vec<SubscriptionToken>,
}

impl ParameterBankEngine {
    pub fn new(config: &SurfaceConfig) -> Self {
        Self {
            policy: BankPolicy::new(config.banks.clone(), config.policy.walk_all_parameters),
            surface: config.policy.clone(),
            layout: config.layout.clone(),
            channel: config.channel,
            binding_id: config.binding_id.clone(),
            feedback: FeedbackEmitter::new(config.layout.clone(), config.policy.led_rings),
            strips: std::array::from_fn(ControlStrip::new),
            direct_mapped: [false; NUM_STRIPS],
            selected_track: None,
            selected_track_index: None,
            assigned_device: None,
            assigned_device_index: None,
            bank: 0,
            locked: false,
            palette_locked: false,
            show_bank: false,
            subscriptions: Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn assigned_device(&self) -> Option<DeviceId> {
        self.assigned_device
    }

    pub fn assigned_device_index(&self) -> Option<usize> {
        self.assigned_device_index
    }

    pub fn selected_track(&self) -> Option<TrackId> {
        self.selected_track
    }

    pub fn selected_track_index(&self) -> Option<usize> {
        self.selected_track_index
    }

    pub fn bank(&self) -> usize {
        self.bank
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_palette_locked(&self) -> bool {
        self.palette_locked
    }

    /// Parameter bound to each strip
    pub fn assigned_parameters(&self) -> [Option<ParameterId>; NUM_STRIPS] {
        std::array::from_fn(|i| self.strips[i].assigned_parameter())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Take all queued outbound messages
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        self.feedback.take()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Assignment
    // ─────────────────────────────────────────────────────────────────────

    /// Switch to another device (or none)
    ///
    /// Resets the bank, moves the device subscriptions and drops any pending
    /// bank message. Does not reassign; callers do that once they are done.
    pub fn change_assigned_device<H: Host + ?Sized>(&mut self, device: Option<DeviceId>, host: &mut H) {
        if device == self.assigned_device {
            return;
        }

        self.bank = 0;
        for token in self.subscriptions.drain(..) {
            host.unsubscribe(token);
        }
        self.show_bank = false;
        self.assigned_device = device;

        match device {
            Some(device) => {
                self.subscriptions
                    .push(host.subscribe(device, DeviceEvent::ParametersChanged));
                self.subscriptions
                    .push(host.subscribe(device, DeviceEvent::ActivityChanged));
                log::info!("FX: Assigned device '{}'", host.device_name(device));
            }
            None => log::info!("FX: No device assigned"),
        }
    }

    /// Recompute strip bindings and every LED and display output
    pub fn reassign<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.selected_track = host.selected_track();
        if let Some(track) = self.selected_track {
            match host.tracks().iter().position(|t| *t == track) {
                Some(index) => self.selected_track_index = Some(index),
                None => log::warn!("FX: Selected track {:?} not in session, keeping index", track),
            }
        }

        let devices = self
            .selected_track
            .map(|t| host.track_devices(t))
            .unwrap_or_default();
        let placement = self.assigned_device.map(|d| Placement::resolve(&*host, d));

        // Chain members count as their rack
        self.assigned_device_index = placement
            .and_then(|p| devices.iter().position(|d| *d == p.effective_device()));

        if self.surface.lower_row_devices {
            self.feedback.device_row(
                devices.len(),
                self.assigned_device_index,
                self.surface.lower_row_show_all,
            );
        }

        let filled = if self.palette_locked {
            Some(self.filled_slots(&*host))
        } else {
            None
        };
        self.feedback.palette_row(filled);

        let (mut page_down, mut page_up) = (false, false);
        match self.assigned_device {
            Some(device) => {
                let class = host.device_class(device);
                let parameters: Vec<(ParameterId, ParameterInfo)> = host
                    .device_parameters(device)
                    .into_iter()
                    .filter_map(|p| host.parameter(p).map(|info| (p, info)))
                    .collect();
                let assigned = self.policy.assign(&class, self.bank, &parameters);

                let mut cells = Vec::with_capacity(NUM_STRIPS);
                for (strip, parameter) in self.strips.iter_mut().zip(assigned) {
                    strip.set_assigned_parameter(parameter);
                    let cell = parameter
                        .and_then(|p| parameters.iter().find(|(id, _)| *id == p))
                        .map(|(_, info)| (info.name.clone(), format_value(info)))
                        .unwrap_or_default();
                    cells.push(cell);
                }

                if self.surface.gate_on_device_active && !host.device_is_active(device) {
                    self.feedback.clear_rings();
                }

                page_down = self.bank > 0;
                page_up = self.bank.saturating_add(1) < self.policy.bank_count(&class, parameters.len());

                if self.show_bank {
                    self.show_bank = false;
                    if let Some(label) = self.policy.bank_label(&class, self.bank) {
                        self.feedback
                            .message(format!("{} Bank: {}", host.device_name(device), label));
                    }
                }
                self.feedback.display(&cells);
            }
            None => {
                for strip in &mut self.strips {
                    strip.set_assigned_parameter(None);
                }
                self.feedback.placeholder();
            }
        }

        self.feedback.request_rebuild();
        self.feedback.paging(page_down, page_up);
        if self.surface.chain_paging {
            let position = chain_position(&*host, placement);
            self.feedback.chain_paging(position);
        }
    }

    /// Filled palette slots for the assigned device (0 when unavailable)
    fn filled_slots<H: Host + ?Sized>(&self, host: &H) -> usize {
        match self.palette_key(host) {
            Some((track, key)) => snapshot::contiguous_count(host, track, key),
            None => 0,
        }
    }

    fn palette_key<H: Host + ?Sized>(&self, host: &H) -> Option<(TrackId, SnapshotKey)> {
        let track = self.selected_track?;
        let ordinal = self.assigned_device_index?;
        let device = self.assigned_device?;
        let chain = Placement::resolve(host, device).chain_ordinal(host);
        Some((track, SnapshotKey::new(ordinal, chain, 0)))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Paging
    // ─────────────────────────────────────────────────────────────────────

    /// Move one bank up or down
    ///
    /// While locked the choice is stored with the host instead and comes
    /// back through [`restore_bank`](Self::restore_bank). Returns whether the
    /// bank changed.
    pub fn page<H: Host + ?Sized>(&mut self, direction: PageDirection, host: &mut H) -> bool {
        let Some(device) = self.assigned_device else {
            return false;
        };
        let class = host.device_class(device);
        let count = host.device_parameters(device).len();
        let bank = self.policy.page(&class, count, self.bank, direction);
        if bank == self.bank {
            return false;
        }

        self.show_bank = true;
        if self.locked {
            log::debug!("FX: Storing chosen bank {} for locked device", bank);
            host.store_chosen_bank(device, &self.binding_id, bank);
        } else {
            self.bank = bank;
            self.reassign(host);
        }
        true
    }

    pub fn page_up<H: Host + ?Sized>(&mut self, host: &mut H) -> bool {
        self.page(PageDirection::Up, host)
    }

    pub fn page_down<H: Host + ?Sized>(&mut self, host: &mut H) -> bool {
        self.page(PageDirection::Down, host)
    }

    /// Apply a stored bank choice; honored only while locked
    pub fn restore_bank<H: Host + ?Sized>(&mut self, bank: usize, host: &mut H) {
        if !self.locked {
            return;
        }
        self.bank = bank;
        self.reassign(host);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Locks
    // ─────────────────────────────────────────────────────────────────────

    /// Pin the assignment to `device`
    pub fn lock<H: Host + ?Sized>(&mut self, device: DeviceId, host: &mut H) {
        self.locked = true;
        self.change_assigned_device(Some(device), host);
        self.feedback.lock_indicator(true);
        self.reassign(host);
    }

    /// Release the lock, if it is held on `device`
    pub fn unlock<H: Host + ?Sized>(&mut self, device: DeviceId, host: &mut H) {
        if self.assigned_device != Some(device) {
            return;
        }
        self.locked = false;
        self.feedback.lock_indicator(false);
        if host.appointed_device() != self.assigned_device {
            self.reassign(host);
        }
    }

    /// Upper select button: lock onto the focused device, or release and
    /// follow focus again
    pub fn toggle_lock<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.locked {
            self.locked = false;
            self.feedback.lock_indicator(false);
            let appointed = host.appointed_device();
            if appointed != self.assigned_device {
                self.change_assigned_device(appointed, host);
                self.reassign(host);
            }
            log::info!("FX: Unlocked");
            return;
        }

        let Some(device) = host.appointed_device().or(self.assigned_device) else {
            log::debug!("FX: Nothing to lock to");
            return;
        };
        self.lock(device, host);
        if let Some(bank) = host.chosen_bank(device, &self.binding_id) {
            self.restore_bank(bank, host);
        }
        log::info!("FX: Locked to '{}'", host.device_name(device));
    }

    /// Host focus moved; followed only while unlocked
    pub fn on_appointed_device_changed<H: Host + ?Sized>(&mut self, device: Option<DeviceId>, host: &mut H) {
        if self.locked {
            return;
        }
        self.change_assigned_device(device, host);
        self.feedback.lock_indicator(false);
        self.reassign(host);
        self.light_chain_slot(host);
    }

    /// Light the upper-row LED of the selected chain when the assigned device
    /// sits in a multi-chain rack and the palette is not showing
    fn light_chain_slot<H: Host + ?Sized>(&mut self, host: &H) {
        if !self.surface.chain_paging || self.palette_locked {
            return;
        }
        let placement = self.assigned_device.map(|d| Placement::resolve(host, d));
        if let ChainPosition::Within { index, .. } = chain_position(host, placement) {
            self.feedback.palette_slot(index);
        }
    }

    /// Transport lock button held or released
    pub fn set_palette_locked<H: Host + ?Sized>(&mut self, held: bool, host: &mut H) {
        self.palette_locked = held;
        self.reassign(host);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Strip events
    // ─────────────────────────────────────────────────────────────────────

    fn strip_context(&self) -> StripContext<'_> {
        StripContext {
            track: self.selected_track,
            device: self.assigned_device,
            device_ordinal: self.assigned_device_index,
            palette_locked: self.palette_locked,
            policy: &self.surface,
        }
    }

    /// Upper button of `strip` pressed
    pub fn press_primary<H: Host + ?Sized>(&mut self, strip: usize, host: &mut H) -> PrimaryOutcome {
        let outcome = match self.strips.get(strip) {
            Some(s) => s.on_primary(&self.strip_context(), host),
            None => PrimaryOutcome::Ignored,
        };
        if outcome.needs_reassign() {
            self.reassign(host);
        }
        outcome
    }

    /// Lower button of `strip` pressed
    pub fn press_secondary<H: Host + ?Sized>(&mut self, strip: usize, host: &mut H) -> Option<DeviceId> {
        let selected = self
            .strips
            .get(strip)
            .and_then(|s| s.on_secondary(&self.strip_context(), host));
        if selected.is_some() {
            self.feedback.device_slot(strip);
        }
        selected
    }

    /// Encoder of `strip` reached software
    pub fn encoder_moved(&self, strip: usize) -> Result<(), ProtocolViolation> {
        match self.strips.get(strip) {
            Some(s) => s.on_encoder_moved(self.direct_mapped[strip]),
            None => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chain paging
    // ─────────────────────────────────────────────────────────────────────

    /// Step to the neighbouring chain of the rack holding the assigned device
    ///
    /// Plain chains are soloed as they are entered and their first device's
    /// first parameter is switched on, all others off. Returns whether the
    /// selection moved.
    pub fn page_chain<H: Host + ?Sized>(&mut self, direction: PageDirection, host: &mut H) -> bool {
        if !self.surface.chain_paging {
            return false;
        }
        let Some(device) = self.assigned_device else {
            return false;
        };
        let placement = Placement::resolve(&*host, device);
        let Some(rack) = placement.rack else {
            return false;
        };
        let chains = host.rack_chains(rack);
        if chains.len() <= 1 {
            return false;
        }
        let Some(current) = host
            .selected_chain(rack)
            .and_then(|c| chains.iter().position(|x| *x == c))
        else {
            return false;
        };
        let target = match direction {
            PageDirection::Down if current > 0 => current - 1,
            PageDirection::Up if current + 1 < chains.len() => current + 1,
            _ => return false,
        };
        let Some(target_device) = host.chain_devices(chains[target]).first().copied() else {
            log::debug!("FX: Chain {} is empty", target);
            return false;
        };

        if placement.container == ContainerKind::PlainChain
            && self.surface.solos_chains(&host.device_class(rack))
        {
            for chain in &chains {
                if let Some(first) = host.chain_devices(*chain).first().copied() {
                    drive_first_parameter(host, first, Extreme::Min);
                }
                host.set_chain_solo(*chain, false);
            }
            drive_first_parameter(host, target_device, Extreme::Max);
            host.set_chain_solo(chains[target], true);
        }

        log::debug!("FX: Chain {} of {}", target + 1, chains.len());
        host.select_device(target_device);
        self.reassign(host);

        if let (Some(track), Some(ordinal)) = (self.selected_track, self.assigned_device_index) {
            snapshot::remember_chain(host, track, ordinal, target);
        }
        if !self.palette_locked {
            self.feedback.palette_slot(target);
        }
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mapping
    // ─────────────────────────────────────────────────────────────────────

    /// Build the direct mapping for the current bindings
    pub fn build_mapping<G: DeviceGraph + ?Sized>(&mut self, graph: &G) -> MappingPlan {
        let plan = midi_map::build(
            graph,
            &self.strips,
            self.assigned_device,
            &self.layout,
            &self.surface,
            self.channel,
        );
        self.direct_mapped = plan.direct;
        plan
    }

    /// Release all device subscriptions
    pub fn disconnect<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.change_assigned_device(None, host);
        self.direct_mapped = [false; NUM_STRIPS];
    }

    /// Re-send the lock LED and every reassignment output
    pub fn refresh_state<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.feedback.lock_indicator(self.locked);
        self.reassign(host);
    }
}

fn drive_first_parameter<G: DeviceGraph + ?Sized>(graph: &mut G, device: DeviceId, extreme: Extreme) {
    let Some(parameter) = graph.device_parameters(device).first().copied() else {
        return;
    };
    if let Some(info) = graph.parameter(parameter) {
        let value = match extreme {
            Extreme::Min => info.min,
            Extreme::Max => info.max,
        };
        graph.set_parameter_value(parameter, value);
    }
}

fn chain_position<G: DeviceGraph + ?Sized>(graph: &G, placement: Option<Placement>) -> ChainPosition {
    let Some(rack) = placement.and_then(|p| p.rack) else {
        return ChainPosition::Outside;
    };
    let chains = graph.rack_chains(rack);
    if chains.len() <= 1 {
        return ChainPosition::Single;
    }
    match graph
        .selected_chain(rack)
        .and_then(|c| chains.iter().position(|x| *x == c))
    {
        Some(index) => ChainPosition::Within {
            index,
            count: chains.len(),
        },
        None => ChainPosition::Single,
    }
}

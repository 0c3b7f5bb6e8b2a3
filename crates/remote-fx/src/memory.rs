//! In-memory host
//!
//! Arena-backed implementation of every collaborator trait. Used by the
//! simulator and the test suites. Sessions can be built programmatically or
//! loaded from YAML:
//!
//! ```yaml
//! scenes: 8
//! tracks:
//!   - name: Bass
//!     devices:
//!       - name: Auto Filter
//!         class: AutoFilter
//!         parameters:
//!           - { name: Device On, value: 1.0, quantized: true }
//!           - { name: Frequency, value: 0.4 }
//!       - name: Rack
//!         class: AudioEffectGroupDevice
//!         chains:
//!           - devices: [{ name: Saturator, class: Saturator }]
//! ```

use crate::host::{
    ContainerKind, DeviceEvent, DeviceGraph, HostNotification, ParameterInfo, SessionControl,
    SubscriptionToken, TrackStore,
};
use crate::types::{ChainId, DeviceId, ParameterId, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Parameter definition for building sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub value: f32,
    #[serde(default)]
    pub min: f32,
    #[serde(default = "default_max")]
    pub max: f32,
    /// Falls back to the initial value
    #[serde(default)]
    pub default: Option<f32>,
    #[serde(default)]
    pub quantized: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

impl ParameterSpec {
    pub fn new(name: &str, value: f32, min: f32, max: f32) -> Self {
        Self {
            name: name.to_string(),
            value,
            min,
            max,
            default: None,
            quantized: false,
            enabled: true,
        }
    }

    /// On/off parameter, switched on
    pub fn toggle(name: &str) -> Self {
        Self::new(name, 1.0, 0.0, 1.0).quantized()
    }

    pub fn with_default(mut self, default: f32) -> Self {
        self.default = Some(default);
        self
    }

    pub fn quantized(mut self) -> Self {
        self.quantized = true;
        self
    }

    fn info(&self) -> ParameterInfo {
        ParameterInfo {
            name: self.name.clone(),
            value: self.value,
            min: self.min,
            max: self.max,
            default: self.default.unwrap_or(self.value),
            quantized: self.quantized,
            enabled: self.enabled,
        }
    }
}

/// Device definition; a device with chains (or `rack: true`) is a rack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    pub class: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub rack: bool,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub chains: Vec<ChainSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
    /// Drum pad chain instead of a plain rack chain
    #[serde(default)]
    pub drum: bool,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSpec {
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

/// Whole session layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSpec {
    #[serde(default)]
    pub scenes: usize,
    #[serde(default)]
    pub tracks: Vec<TrackSpec>,
}

#[derive(Debug, Clone, Copy)]
enum Parent {
    Track(TrackId),
    Chain(ChainId),
}

#[derive(Debug, Clone)]
struct TrackNode {
    name: String,
    devices: Vec<DeviceId>,
    data: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct DeviceNode {
    name: String,
    class: String,
    active: bool,
    rack: bool,
    parameters: Vec<ParameterId>,
    chains: Vec<ChainId>,
    selected_chain: Option<ChainId>,
    container: ContainerKind,
    parent: Option<ChainId>,
    chosen_banks: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
struct ChainNode {
    rack: DeviceId,
    kind: ContainerKind,
    devices: Vec<DeviceId>,
    solo: bool,
}

/// Host state held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    tracks: Vec<TrackNode>,
    devices: Vec<DeviceNode>,
    chains: Vec<ChainNode>,
    parameters: Vec<ParameterInfo>,
    selected_track: Option<TrackId>,
    appointed: Option<DeviceId>,
    scene_count: usize,
    selected_scene: Option<usize>,
    fired_scenes: Vec<usize>,
    stop_requests: usize,
    subscriptions: HashMap<SubscriptionToken, (DeviceId, DeviceEvent)>,
    next_token: u64,
    notifications: VecDeque<HostNotification>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a host from a session description
    ///
    /// The first track is selected and nothing is appointed.
    pub fn from_spec(spec: &SessionSpec) -> Self {
        let mut host = Self::new();
        host.set_scene_count(spec.scenes);
        for track_spec in &spec.tracks {
            let track = host.add_track(&track_spec.name);
            for device_spec in &track_spec.devices {
                host.build_device(Parent::Track(track), device_spec);
            }
        }
        host.notifications.clear();
        host
    }

    fn build_device(&mut self, parent: Parent, spec: &DeviceSpec) -> DeviceId {
        let rack = spec.rack || !spec.chains.is_empty();
        let device = match parent {
            Parent::Track(track) if rack => self.add_rack(track, &spec.name, &spec.class),
            Parent::Track(track) => self.add_device(track, &spec.name, &spec.class),
            Parent::Chain(chain) => {
                let id = self.add_chain_device(chain, &spec.name, &spec.class);
                self.devices[id.0 as usize].rack = rack;
                id
            }
        };
        self.devices[device.0 as usize].active = spec.active;
        for parameter in &spec.parameters {
            self.add_parameter(device, parameter.clone());
        }
        for chain_spec in &spec.chains {
            let kind = if chain_spec.drum {
                ContainerKind::DrumChain
            } else {
                ContainerKind::PlainChain
            };
            let chain = self.add_chain(device, kind);
            for member in &chain_spec.devices {
                self.build_device(Parent::Chain(chain), member);
            }
        }
        device
    }

    /// Add a track; the first one added becomes the selected track
    pub fn add_track(&mut self, name: &str) -> TrackId {
        let id = TrackId(self.tracks.len() as u32);
        self.tracks.push(TrackNode {
            name: name.to_string(),
            devices: Vec::new(),
            data: HashMap::new(),
        });
        if self.selected_track.is_none() {
            self.selected_track = Some(id);
        }
        id
    }

    fn push_device(
        &mut self,
        name: &str,
        class: &str,
        rack: bool,
        container: ContainerKind,
        parent: Option<ChainId>,
    ) -> DeviceId {
        let id = DeviceId(self.devices.len() as u32);
        self.devices.push(DeviceNode {
            name: name.to_string(),
            class: class.to_string(),
            active: true,
            rack,
            parameters: Vec::new(),
            chains: Vec::new(),
            selected_chain: None,
            container,
            parent,
            chosen_banks: HashMap::new(),
        });
        id
    }

    /// Append a plain device to a track
    pub fn add_device(&mut self, track: TrackId, name: &str, class: &str) -> DeviceId {
        let id = self.push_device(name, class, false, ContainerKind::None, None);
        self.tracks[track.0 as usize].devices.push(id);
        id
    }

    /// Append a rack device (no chains yet) to a track
    pub fn add_rack(&mut self, track: TrackId, name: &str, class: &str) -> DeviceId {
        let id = self.push_device(name, class, true, ContainerKind::None, None);
        self.tracks[track.0 as usize].devices.push(id);
        id
    }

    /// Add a chain to a rack; the first chain becomes the selected one
    pub fn add_chain(&mut self, rack: DeviceId, kind: ContainerKind) -> ChainId {
        let id = ChainId(self.chains.len() as u32);
        self.chains.push(ChainNode {
            rack,
            kind,
            devices: Vec::new(),
            solo: false,
        });
        let node = &mut self.devices[rack.0 as usize];
        node.rack = true;
        node.chains.push(id);
        if node.selected_chain.is_none() {
            node.selected_chain = Some(id);
        }
        id
    }

    /// Append a device to a chain
    pub fn add_chain_device(&mut self, chain: ChainId, name: &str, class: &str) -> DeviceId {
        let kind = self.chains[chain.0 as usize].kind;
        let id = self.push_device(name, class, false, kind, Some(chain));
        self.chains[chain.0 as usize].devices.push(id);
        id
    }

    pub fn add_parameter(&mut self, device: DeviceId, spec: ParameterSpec) -> ParameterId {
        let id = ParameterId(self.parameters.len() as u32);
        self.parameters.push(spec.info());
        self.devices[device.0 as usize].parameters.push(id);
        id
    }

    /// Add the on/off toggle plus `count` continuous parameters named P1..Pn
    pub fn add_numbered_parameters(&mut self, device: DeviceId, count: usize) -> Vec<ParameterId> {
        let mut ids = vec![self.add_parameter(device, ParameterSpec::toggle("Device On"))];
        for n in 1..=count {
            ids.push(self.add_parameter(device, ParameterSpec::new(&format!("P{}", n), 0.0, 0.0, 1.0)));
        }
        ids
    }

    /// Current value of a parameter (NaN for unknown ids)
    pub fn value(&self, parameter: ParameterId) -> f32 {
        self.parameters
            .get(parameter.0 as usize)
            .map(|p| p.value)
            .unwrap_or(f32::NAN)
    }

    pub fn set_parameter_enabled(&mut self, parameter: ParameterId, enabled: bool) {
        if let Some(p) = self.parameters.get_mut(parameter.0 as usize) {
            p.enabled = enabled;
        }
    }

    /// Switch a device on or off and notify subscribers
    pub fn set_device_active(&mut self, device: DeviceId, active: bool) {
        if let Some(node) = self.devices.get_mut(device.0 as usize) {
            node.active = active;
            self.notify_device(device, DeviceEvent::ActivityChanged);
        }
    }

    /// Drop a device's parameters and notify subscribers
    pub fn clear_parameters(&mut self, device: DeviceId) {
        if let Some(node) = self.devices.get_mut(device.0 as usize) {
            node.parameters.clear();
            self.notify_device(device, DeviceEvent::ParametersChanged);
        }
    }

    fn notify_device(&mut self, device: DeviceId, event: DeviceEvent) {
        let subscribed = self
            .subscriptions
            .values()
            .any(|(d, e)| *d == device && *e == event);
        if subscribed {
            self.notifications
                .push_back(HostNotification::DeviceChanged { device, event });
        }
    }

    pub fn select_track(&mut self, track: TrackId) {
        if self.selected_track != Some(track) {
            self.selected_track = Some(track);
            self.notifications
                .push_back(HostNotification::SelectedTrackChanged);
        }
    }

    pub fn select_chain(&mut self, rack: DeviceId, chain: ChainId) {
        if let Some(node) = self.devices.get_mut(rack.0 as usize) {
            node.selected_chain = Some(chain);
        }
    }

    pub fn chain_solo(&self, chain: ChainId) -> bool {
        self.chains
            .get(chain.0 as usize)
            .is_some_and(|c| c.solo)
    }

    pub fn track_name(&self, track: TrackId) -> Option<&str> {
        self.tracks.get(track.0 as usize).map(|t| t.name.as_str())
    }

    /// Device at `ordinal` on the track at `track_ordinal`
    pub fn device_at(&self, track_ordinal: usize, ordinal: usize) -> Option<DeviceId> {
        self.tracks
            .get(track_ordinal)
            .and_then(|t| t.devices.get(ordinal).copied())
    }

    /// Find a device anywhere in the session by name
    pub fn find_device(&self, name: &str) -> Option<DeviceId> {
        self.devices
            .iter()
            .position(|d| d.name == name)
            .map(|i| DeviceId(i as u32))
    }

    pub fn set_scene_count(&mut self, count: usize) {
        self.scene_count = count;
        self.selected_scene = if count > 0 { Some(0) } else { None };
    }

    pub fn fired_scenes(&self) -> &[usize] {
        &self.fired_scenes
    }

    pub fn stop_requests(&self) -> usize {
        self.stop_requests
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Drain queued notifications in the order they were raised
    pub fn take_notifications(&mut self) -> Vec<HostNotification> {
        self.notifications.drain(..).collect()
    }
}

impl DeviceGraph for MemoryHost {
    fn tracks(&self) -> Vec<TrackId> {
        (0..self.tracks.len()).map(|i| TrackId(i as u32)).collect()
    }

    fn selected_track(&self) -> Option<TrackId> {
        self.selected_track
    }

    fn track_devices(&self, track: TrackId) -> Vec<DeviceId> {
        self.tracks
            .get(track.0 as usize)
            .map(|t| t.devices.clone())
            .unwrap_or_default()
    }

    fn device_name(&self, device: DeviceId) -> String {
        self.devices
            .get(device.0 as usize)
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }

    fn device_class(&self, device: DeviceId) -> String {
        self.devices
            .get(device.0 as usize)
            .map(|d| d.class.clone())
            .unwrap_or_default()
    }

    fn device_is_active(&self, device: DeviceId) -> bool {
        self.devices
            .get(device.0 as usize)
            .is_some_and(|d| d.active)
    }

    fn device_parameters(&self, device: DeviceId) -> Vec<ParameterId> {
        self.devices
            .get(device.0 as usize)
            .map(|d| d.parameters.clone())
            .unwrap_or_default()
    }

    fn is_rack(&self, device: DeviceId) -> bool {
        self.devices
            .get(device.0 as usize)
            .is_some_and(|d| d.rack)
    }

    fn container(&self, device: DeviceId) -> ContainerKind {
        self.devices
            .get(device.0 as usize)
            .map(|d| d.container)
            .unwrap_or_default()
    }

    fn parent_chain(&self, device: DeviceId) -> Option<ChainId> {
        self.devices.get(device.0 as usize).and_then(|d| d.parent)
    }

    fn chain_rack(&self, chain: ChainId) -> Option<DeviceId> {
        self.chains.get(chain.0 as usize).map(|c| c.rack)
    }

    fn rack_chains(&self, rack: DeviceId) -> Vec<ChainId> {
        self.devices
            .get(rack.0 as usize)
            .map(|d| d.chains.clone())
            .unwrap_or_default()
    }

    fn chain_devices(&self, chain: ChainId) -> Vec<DeviceId> {
        self.chains
            .get(chain.0 as usize)
            .map(|c| c.devices.clone())
            .unwrap_or_default()
    }

    fn selected_chain(&self, rack: DeviceId) -> Option<ChainId> {
        self.devices
            .get(rack.0 as usize)
            .and_then(|d| d.selected_chain)
    }

    fn set_chain_solo(&mut self, chain: ChainId, solo: bool) {
        if let Some(node) = self.chains.get_mut(chain.0 as usize) {
            node.solo = solo;
        }
    }

    fn parameter(&self, parameter: ParameterId) -> Option<ParameterInfo> {
        self.parameters.get(parameter.0 as usize).cloned()
    }

    fn set_parameter_value(&mut self, parameter: ParameterId, value: f32) {
        if let Some(p) = self.parameters.get_mut(parameter.0 as usize) {
            p.value = value.clamp(p.min, p.max);
        }
    }

    fn appointed_device(&self) -> Option<DeviceId> {
        self.appointed
    }

    /// Selecting a chain member also selects its chain in the rack view
    fn select_device(&mut self, device: DeviceId) {
        if self.appointed == Some(device) {
            return;
        }
        if let Some(chain) = self.parent_chain(device) {
            if let Some(rack) = self.chain_rack(chain) {
                self.select_chain(rack, chain);
            }
        }
        self.appointed = Some(device);
        self.notifications
            .push_back(HostNotification::AppointedDeviceChanged(Some(device)));
    }

    fn store_chosen_bank(&mut self, device: DeviceId, binding: &str, bank: usize) {
        if let Some(node) = self.devices.get_mut(device.0 as usize) {
            node.chosen_banks.insert(binding.to_string(), bank);
            self.notifications
                .push_back(HostNotification::ChosenBankStored { device, bank });
        }
    }

    fn chosen_bank(&self, device: DeviceId, binding: &str) -> Option<usize> {
        self.devices
            .get(device.0 as usize)
            .and_then(|d| d.chosen_banks.get(binding).copied())
    }

    fn subscribe(&mut self, device: DeviceId, event: DeviceEvent) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token);
        self.next_token += 1;
        self.subscriptions.insert(token, (device, event));
        token
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) {
        self.subscriptions.remove(&token);
    }
}

impl SessionControl for MemoryHost {
    fn scene_count(&self) -> usize {
        self.scene_count
    }

    fn selected_scene(&self) -> Option<usize> {
        self.selected_scene
    }

    fn select_scene(&mut self, scene: usize) {
        if scene < self.scene_count {
            self.selected_scene = Some(scene);
        }
    }

    fn fire_selected_scene(&mut self) {
        if let Some(scene) = self.selected_scene {
            self.fired_scenes.push(scene);
        }
    }

    fn stop_all_clips(&mut self) {
        self.stop_requests += 1;
    }
}

impl TrackStore for MemoryHost {
    fn get_data(&self, track: TrackId, key: &str) -> Option<String> {
        self.tracks
            .get(track.0 as usize)
            .and_then(|t| t.data.get(key).cloned())
    }

    fn set_data(&mut self, track: TrackId, key: &str, value: String) {
        if let Some(node) = self.tracks.get_mut(track.0 as usize) {
            node.data.insert(key.to_string(), value);
        }
    }
}

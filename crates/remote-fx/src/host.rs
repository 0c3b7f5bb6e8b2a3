//! Collaborator interfaces to the host environment
//!
//! The core never owns the device graph, the per-track data store or the
//! session transport. It reads and writes them through these traits on every
//! call and caches nothing beyond a single reassignment pass.
//!
//! ```text
//! Track ──► Device ──► Parameter
//!             │
//!             └─► Chain ──► Device ──► ...   (rack devices only)
//! ```

use crate::types::{ChainId, DeviceId, ParameterId, TrackId};
use serde::{Deserialize, Serialize};

/// Kind of container a device lives in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Directly on a track
    #[default]
    None,
    /// Inside an instrument / audio / MIDI effect rack chain
    PlainChain,
    /// Inside a drum rack pad chain
    DrumChain,
}

impl ContainerKind {
    /// Check if the device sits inside any kind of rack chain
    pub fn is_chain(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Snapshot of a parameter's state at the moment it was read
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub name: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub quantized: bool,
    pub enabled: bool,
}

impl ParameterInfo {
    /// Check if the range is symmetric around zero (pan-style)
    pub fn is_bipolar(&self) -> bool {
        self.min == -self.max
    }
}

/// Device notifications the engine subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceEvent {
    /// The device's parameter list changed
    ParametersChanged,
    /// The device was switched on or off
    ActivityChanged,
}

/// Handle returned by [`DeviceGraph::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub u64);

/// Notification delivered synchronously from the host into the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostNotification {
    /// The user selected a different track
    SelectedTrackChanged,
    /// The host's focused device changed
    AppointedDeviceChanged(Option<DeviceId>),
    /// A subscribed device changed
    DeviceChanged { device: DeviceId, event: DeviceEvent },
    /// A chosen bank was stored for a device and should be restored
    ChosenBankStored { device: DeviceId, bank: usize },
}

/// Read/write view of the host's track, device and parameter model
pub trait DeviceGraph {
    /// All tracks in session order
    fn tracks(&self) -> Vec<TrackId>;

    /// Currently selected track
    fn selected_track(&self) -> Option<TrackId>;

    /// Top-level devices of a track in chain order
    fn track_devices(&self, track: TrackId) -> Vec<DeviceId>;

    fn device_name(&self, device: DeviceId) -> String;

    /// Class tag used to look up curated banks (e.g. "AutoFilter")
    fn device_class(&self, device: DeviceId) -> String;

    fn device_is_active(&self, device: DeviceId) -> bool;

    /// Parameters in host order; index 0 is the device on/off toggle
    fn device_parameters(&self, device: DeviceId) -> Vec<ParameterId>;

    /// Check if the device is a rack (has chains, possibly zero)
    fn is_rack(&self, device: DeviceId) -> bool;

    /// Kind of container the device lives in
    fn container(&self, device: DeviceId) -> ContainerKind;

    /// Chain the device lives in, if any
    fn parent_chain(&self, device: DeviceId) -> Option<ChainId>;

    /// Rack device owning a chain
    fn chain_rack(&self, chain: ChainId) -> Option<DeviceId>;

    fn rack_chains(&self, rack: DeviceId) -> Vec<ChainId>;

    fn chain_devices(&self, chain: ChainId) -> Vec<DeviceId>;

    /// Chain currently selected in the rack's view
    fn selected_chain(&self, rack: DeviceId) -> Option<ChainId>;

    fn set_chain_solo(&mut self, chain: ChainId, solo: bool);

    fn parameter(&self, parameter: ParameterId) -> Option<ParameterInfo>;

    fn set_parameter_value(&mut self, parameter: ParameterId, value: f32);

    /// The device the host considers focused
    fn appointed_device(&self) -> Option<DeviceId>;

    /// Focus a device (the host answers with an appointed-device notification)
    fn select_device(&mut self, device: DeviceId);

    /// Remember a bank choice for a device under a binding identity
    fn store_chosen_bank(&mut self, device: DeviceId, binding: &str, bank: usize);

    fn chosen_bank(&self, device: DeviceId, binding: &str) -> Option<usize>;

    fn subscribe(&mut self, device: DeviceId, event: DeviceEvent) -> SubscriptionToken;

    fn unsubscribe(&mut self, token: SubscriptionToken);
}

/// Scene-level session actions reachable from the select row
pub trait SessionControl {
    fn scene_count(&self) -> usize;

    fn selected_scene(&self) -> Option<usize>;

    fn select_scene(&mut self, scene: usize);

    fn fire_selected_scene(&mut self);

    fn stop_all_clips(&mut self);
}

/// Per-track key/value store (values are serialized strings)
pub trait TrackStore {
    fn get_data(&self, track: TrackId, key: &str) -> Option<String>;

    fn set_data(&mut self, track: TrackId, key: &str, value: String);
}

/// Everything the controller needs from the host
pub trait Host: DeviceGraph + SessionControl + TrackStore {}

impl<T: DeviceGraph + SessionControl + TrackStore + ?Sized> Host for T {}

/// Where a device sits in the hierarchy, resolved once per call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub device: DeviceId,
    pub container: ContainerKind,
    /// Chain holding the device (chain containers only)
    pub chain: Option<ChainId>,
    /// Rack owning that chain (chain containers only)
    pub rack: Option<DeviceId>,
}

impl Placement {
    pub fn resolve<G: DeviceGraph + ?Sized>(graph: &G, device: DeviceId) -> Self {
        let container = graph.container(device);
        let (chain, rack) = if container.is_chain() {
            let chain = graph.parent_chain(device);
            let rack = chain.and_then(|c| graph.chain_rack(c));
            (chain, rack)
        } else {
            (None, None)
        };
        Self {
            device,
            container,
            chain,
            rack,
        }
    }

    /// The device as seen from the track: the owning rack for chain members
    pub fn effective_device(&self) -> DeviceId {
        self.rack.unwrap_or(self.device)
    }

    /// Ordinal of the device's chain among its rack's chains
    pub fn chain_ordinal<G: DeviceGraph + ?Sized>(&self, graph: &G) -> Option<usize> {
        let chain = self.chain?;
        let rack = self.rack?;
        graph.rack_chains(rack).iter().position(|c| *c == chain)
    }
}

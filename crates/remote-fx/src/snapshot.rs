//! Snapshot palette storage
//!
//! Whole parameter vectors are saved into the selected track's data store,
//! keyed by the device position on the track, the chain ordinal inside its
//! rack (when the device lives in a chain) and the palette slot.
//!
//! Keys are structured values everywhere in the core and only become strings
//! at the storage boundary:
//!
//! ```text
//! SnapshotKey { device: 3, chain: None,    slot: 1 }  ──► "3_1"
//! SnapshotKey { device: 4, chain: Some(0), slot: 5 }  ──► "4_0_5"
//! ```
//!
//! The same store also remembers which chain was last visited inside a rack,
//! under the bare device ordinal (`"4"`).

use crate::error::SnapshotKeyError;
use crate::host::{DeviceGraph, TrackStore};
use crate::types::{DeviceId, TrackId, NUM_STRIPS};
use std::fmt;
use std::str::FromStr;

/// Address of one palette slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    /// Ordinal of the device (or its owning rack) on the track
    pub device: usize,
    /// Ordinal of the chain inside the rack, for chain members
    pub chain: Option<usize>,
    /// Palette slot (0-7)
    pub slot: usize,
}

impl SnapshotKey {
    pub fn new(device: usize, chain: Option<usize>, slot: usize) -> Self {
        Self {
            device,
            chain,
            slot,
        }
    }

    /// Same device and chain, different slot
    pub fn with_slot(self, slot: usize) -> Self {
        Self { slot, ..self }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chain {
            Some(chain) => write!(f, "{}_{}_{}", self.device, chain, self.slot),
            None => write!(f, "{}_{}", self.device, self.slot),
        }
    }
}

impl FromStr for SnapshotKey {
    type Err = SnapshotKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split('_')
            .map(|p| p.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SnapshotKeyError(s.to_string()))?;
        match parts.as_slice() {
            [device, slot] => Ok(Self::new(*device, None, *slot)),
            [device, chain, slot] => Ok(Self::new(*device, Some(*chain), *slot)),
            _ => Err(SnapshotKeyError(s.to_string())),
        }
    }
}

/// Load a stored value vector
///
/// Missing, empty and unparseable entries all read as "no snapshot".
pub fn load<S: TrackStore + ?Sized>(store: &S, track: TrackId, key: SnapshotKey) -> Option<Vec<f32>> {
    let raw = store.get_data(track, &key.to_string())?;
    match serde_json::from_str::<Vec<f32>>(&raw) {
        Ok(values) if values.is_empty() => None,
        Ok(values) => Some(values),
        Err(e) => {
            log::warn!("Snapshot: Ignoring unreadable entry '{}': {}", key, e);
            None
        }
    }
}

/// Store a value vector
pub fn save<S: TrackStore + ?Sized>(store: &mut S, track: TrackId, key: SnapshotKey, values: &[f32]) {
    match serde_json::to_string(values) {
        Ok(raw) => store.set_data(track, &key.to_string(), raw),
        Err(e) => log::warn!("Snapshot: Failed to serialize '{}': {}", key, e),
    }
}

/// Number of filled slots counted from slot 0 up to the first empty one
///
/// A gap hides every slot after it until the gap is refilled.
pub fn contiguous_count<S: TrackStore + ?Sized>(store: &S, track: TrackId, key: SnapshotKey) -> usize {
    (0..NUM_STRIPS)
        .take_while(|slot| load(store, track, key.with_slot(*slot)).is_some())
        .count()
}

/// Current values of every parameter of a device, in host order
pub fn capture<G: DeviceGraph + ?Sized>(graph: &G, device: DeviceId) -> Vec<f32> {
    graph
        .device_parameters(device)
        .into_iter()
        .filter_map(|p| graph.parameter(p).map(|info| info.value))
        .collect()
}

/// Write a stored vector back positionally; the shorter side wins
pub fn apply<G: DeviceGraph + ?Sized>(graph: &mut G, device: DeviceId, values: &[f32]) {
    for (parameter, value) in graph.device_parameters(device).into_iter().zip(values) {
        graph.set_parameter_value(parameter, *value);
    }
}

/// Chain last visited inside the rack at `device_ordinal` (defaults to 0)
pub fn last_chain<S: TrackStore + ?Sized>(store: &S, track: TrackId, device_ordinal: usize) -> usize {
    store
        .get_data(track, &device_ordinal.to_string())
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0)
}

pub fn remember_chain<S: TrackStore + ?Sized>(store: &mut S, track: TrackId, device_ordinal: usize, chain: usize) {
    store.set_data(track, &device_ordinal.to_string(), chain.to_string());
}

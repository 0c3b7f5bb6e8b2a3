//! Core value types shared by the engine, router and feedback layers
//!
//! Identifiers are opaque handles issued by the host. The core compares them
//! for identity only and never interprets their numeric value.

use serde::{Deserialize, Serialize};

/// Number of physical strips (encoder + upper button + lower button)
pub const NUM_STRIPS: usize = 8;

/// CC value sent by a button when pressed
pub const VALUE_PRESSED: u8 = 127;

/// CC value sent by a button when released
pub const VALUE_RELEASED: u8 = 0;

/// Track handle issued by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

/// Device handle issued by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

/// Chain (container inside a rack device) handle issued by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u32);

/// Parameter handle issued by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterId(pub u32);

/// Inbound control-change message from the surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlMessage {
    /// Control code (CC number)
    pub code: u8,
    /// Raw value (0-127)
    pub value: u8,
}

impl ControlMessage {
    pub fn new(code: u8, value: u8) -> Self {
        Self { code, value }
    }

    /// Check if this is a button press (value 127)
    pub fn is_press(&self) -> bool {
        self.value == VALUE_PRESSED
    }
}

/// Direction of a paging button
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageDirection {
    Up,
    Down,
}

/// Two text lines for the display collaborator
///
/// The surface shows 8 cells of 9 characters per line, one cell per strip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayLines {
    pub top: String,
    pub bottom: String,
}

/// Outbound message produced by the core
///
/// Drained by the transport after each handler returns.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    /// Button LED / ring state on the surface channel
    Cc { code: u8, value: u8 },
    /// Parameter names and values for the left display
    Display(DisplayLines),
    /// Transient status message (bank names and similar)
    Message(String),
    /// The direct parameter-to-control mapping must be rebuilt
    RebuildMapping,
}

//! Parameter banking policy
//!
//! Decides which 8 parameters of a device are bound to the strips for a given
//! bank index. Two modes:
//!
//! - **Curated**: the device class has a table entry listing parameter names
//!   per bank. Strips are bound by name lookup.
//! - **Overflow**: all parameters except index 0 (the device on/off toggle)
//!   are walked 8 at a time.
//!
//! ```text
//! parameters: [On, p1, p2, ... p17]
//! overflow:    bank 0 = p1..p8 │ bank 1 = p9..p16 │ bank 2 = p17
//! ```

use crate::host::ParameterInfo;
use crate::types::{PageDirection, ParameterId, NUM_STRIPS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label shown for curated classes without bank names
pub const BEST_OF_LABEL: &str = "Best of Parameters";

/// Curated banks of one device class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceBanks {
    /// Human-readable bank names (may be empty)
    #[serde(default)]
    pub bank_names: Vec<String>,
    /// Up to 8 parameter names per bank; empty names leave a strip unbound
    pub bank_parameters: Vec<Vec<String>>,
}

impl DeviceBanks {
    pub fn new(bank_names: &[&str], bank_parameters: &[&[&str]]) -> Self {
        Self {
            bank_names: bank_names.iter().map(|s| s.to_string()).collect(),
            bank_parameters: bank_parameters
                .iter()
                .map(|bank| bank.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }
}

/// Device class → curated banks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BankTable {
    devices: BTreeMap<String, DeviceBanks>,
}

impl BankTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table shipped with the default configuration
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert(
            "AutoFilter",
            DeviceBanks::new(
                &["Filter", "Modulation"],
                &[
                    &[
                        "Filter Type",
                        "Frequency",
                        "Resonance",
                        "Env. Amount",
                        "Env. Attack",
                        "Env. Release",
                        "LFO Amount",
                        "LFO Frequency",
                    ],
                    &[
                        "LFO Waveform",
                        "LFO Phase",
                        "LFO Offset",
                        "LFO Sync",
                        "LFO Sync Rate",
                        "LFO Stereo Mode",
                        "LFO Spin",
                        "Env. Modulation",
                    ],
                ],
            ),
        );
        table.insert(
            "Compressor2",
            DeviceBanks::new(
                &[],
                &[&[
                    "Threshold",
                    "Ratio",
                    "Attack",
                    "Release",
                    "Output Gain",
                    "Knee",
                    "Dry/Wet",
                    "Model",
                ]],
            ),
        );
        table.insert(
            "Reverb",
            DeviceBanks::new(
                &["Reverb", "Reflections"],
                &[
                    &[
                        "Predelay",
                        "Room Size",
                        "Decay Time",
                        "Diffusion",
                        "Stereo Image",
                        "Freeze On",
                        "Dry/Wet",
                        "Density",
                    ],
                    &[
                        "ER Spin On",
                        "ER Spin Rate",
                        "ER Spin Amount",
                        "ER Shape",
                        "Reflect Level",
                        "Diffuse Level",
                        "In LowCut On",
                        "In HighCut On",
                    ],
                ],
            ),
        );
        table
    }

    pub fn insert(&mut self, class: &str, banks: DeviceBanks) {
        self.devices.insert(class.to_string(), banks);
    }

    pub fn get(&self, class: &str) -> Option<&DeviceBanks> {
        self.devices.get(class)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// How a device class is banked
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BankMode<'a> {
    Curated(&'a DeviceBanks),
    Overflow,
}

/// Banking policy over an injected bank table
#[derive(Debug, Clone)]
pub struct BankPolicy {
    table: BankTable,
    /// Force overflow mode for every class
    walk_all: bool,
}

impl BankPolicy {
    pub fn new(table: BankTable, walk_all: bool) -> Self {
        Self { table, walk_all }
    }

    pub fn mode(&self, class: &str) -> BankMode<'_> {
        if self.walk_all {
            return BankMode::Overflow;
        }
        match self.table.get(class) {
            Some(banks) => BankMode::Curated(banks),
            None => BankMode::Overflow,
        }
    }

    /// Number of banks for a device
    ///
    /// `parameter_count` is the full parameter list length, including the
    /// reserved parameter 0.
    pub fn bank_count(&self, class: &str, parameter_count: usize) -> usize {
        match self.mode(class) {
            BankMode::Curated(banks) => banks.bank_parameters.len(),
            BankMode::Overflow => parameter_count.saturating_sub(1).div_ceil(NUM_STRIPS),
        }
    }

    /// Bank index after pressing a paging button, clamped to the valid range
    pub fn page(&self, class: &str, parameter_count: usize, bank: usize, direction: PageDirection) -> usize {
        let count = self.bank_count(class, parameter_count);
        if count == 0 {
            return bank;
        }
        match direction {
            PageDirection::Up => bank.saturating_add(1).min(count - 1),
            PageDirection::Down => bank.saturating_sub(1),
        }
    }

    /// Parameters bound to each strip for `bank`
    pub fn assign(
        &self,
        class: &str,
        bank: usize,
        parameters: &[(ParameterId, ParameterInfo)],
    ) -> [Option<ParameterId>; NUM_STRIPS] {
        let mut assigned = [None; NUM_STRIPS];
        match self.mode(class) {
            BankMode::Curated(banks) => {
                let Some(names) = banks.bank_parameters.get(bank) else {
                    return assigned;
                };
                for (slot, name) in assigned.iter_mut().zip(names.iter()) {
                    if name.is_empty() {
                        continue;
                    }
                    *slot = parameters
                        .iter()
                        .find(|(_, info)| &info.name == name)
                        .map(|(id, _)| *id);
                }
            }
            BankMode::Overflow => {
                let visible = parameters.get(1..).unwrap_or(&[]);
                let base = bank.saturating_mul(NUM_STRIPS);
                for (ordinal, slot) in assigned.iter_mut().enumerate() {
                    *slot = visible.get(base.saturating_add(ordinal)).map(|(id, _)| *id);
                }
            }
        }
        assigned
    }

    /// Human-readable label of a bank, if one can be given
    pub fn bank_label(&self, class: &str, bank: usize) -> Option<String> {
        match self.mode(class) {
            BankMode::Curated(banks) if banks.bank_names.is_empty() => {
                Some(BEST_OF_LABEL.to_string())
            }
            BankMode::Curated(banks) => banks.bank_names.get(bank).cloned(),
            BankMode::Overflow => Some(format!("Bank {}", bank.saturating_add(1))),
        }
    }
}

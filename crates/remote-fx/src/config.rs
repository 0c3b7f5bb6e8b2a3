//! Surface configuration schema and loader
//!
//! Configuration is stored as YAML. Default location:
//! `<config dir>/remote-fx/surface.yaml` (e.g. ~/.config/remote-fx/surface.yaml)

use crate::bank_policy::BankTable;
use crate::error::LayoutError;
use crate::types::NUM_STRIPS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Root surface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// MIDI channel the surface talks on (0-15)
    pub channel: u8,

    /// Identity under which per-device chosen banks are stored while locked
    pub binding_id: String,

    /// Control code layout
    pub layout: ControlLayout,

    /// Behavior switches
    pub policy: SurfacePolicy,

    /// Curated parameter banks per device class
    pub banks: BankTable,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            binding_id: "remote-fx".to_string(),
            layout: ControlLayout::default(),
            policy: SurfacePolicy::default(),
            banks: BankTable::builtin(),
        }
    }
}

/// Control codes of the surface
///
/// Rows are 8 contiguous codes starting at their base. Defaults follow the
/// Remote SL factory template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLayout {
    /// Parameter bank paging buttons next to the left display
    pub display_page_up: u8,
    pub display_page_down: u8,

    /// Row select buttons
    pub select_upper_row: u8,
    pub select_encoder_row: u8,
    pub select_lower_row: u8,
    pub select_poti_row: u8,
    pub select_drum_pad_row: u8,

    /// Upper button row (strip primary actions)
    pub upper_row_base: u8,
    /// Lower button row (strip secondary actions)
    pub lower_row_base: u8,
    /// Encoder row (relative encoders)
    pub encoder_row_base: u8,
    /// Poti row (always left to the host)
    pub poti_row_base: u8,

    /// Output: encoder ring value
    pub encoder_feedback_base: u8,
    /// Output: encoder ring display mode
    pub encoder_ring_mode_base: u8,

    /// Transport section codes (the lock code is one of them)
    pub transport: Vec<u8>,
    pub transport_lock: u8,

    /// Device (chain) paging buttons next to the right display
    pub device_page_up: u8,
    pub device_page_down: u8,

    /// Drum pad notes (always left to the host)
    pub drum_pad_notes: Vec<u8>,

    /// Notes forwarded to software on every mapping rebuild
    pub forwarded_notes: Vec<u8>,
}

impl Default for ControlLayout {
    fn default() -> Self {
        Self {
            display_page_up: 88,
            display_page_down: 89,
            select_upper_row: 80,
            select_encoder_row: 81,
            select_lower_row: 82,
            select_poti_row: 83,
            select_drum_pad_row: 84,
            upper_row_base: 24,
            lower_row_base: 40,
            encoder_row_base: 56,
            poti_row_base: 8,
            encoder_feedback_base: 112,
            encoder_ring_mode_base: 120,
            transport: (72..=79).collect(),
            transport_lock: 79,
            device_page_up: 90,
            device_page_down: 91,
            drum_pad_notes: (36..=43).collect(),
            forwarded_notes: Vec::new(),
        }
    }
}

impl ControlLayout {
    /// Code of a strip's control in a row
    ///
    /// Saturates at 255 for rows that do not fit; [`validate`](Self::validate)
    /// rejects those layouts.
    pub fn row_code(base: u8, strip: usize) -> u8 {
        base.saturating_add(u8::try_from(strip).unwrap_or(u8::MAX))
    }

    /// Offset of `code` within the row starting at `base`
    pub fn row_offset(base: u8, code: u8) -> Option<usize> {
        if code >= base && ((code - base) as usize) < NUM_STRIPS {
            Some((code - base) as usize)
        } else {
            None
        }
    }

    /// Check that every inbound code belongs to exactly one category
    pub fn validate(&self) -> Result<(), LayoutError> {
        let rows = [
            ("upper button row", self.upper_row_base),
            ("lower button row", self.lower_row_base),
            ("encoder row", self.encoder_row_base),
            ("poti row", self.poti_row_base),
            ("encoder feedback", self.encoder_feedback_base),
            ("encoder ring mode", self.encoder_ring_mode_base),
        ];
        for (row, base) in rows {
            if base as usize + NUM_STRIPS > 128 {
                return Err(LayoutError::RowOutOfRange { row, base });
            }
        }

        if !self.transport.contains(&self.transport_lock) {
            return Err(LayoutError::MissingLock {
                code: self.transport_lock,
            });
        }

        let mut claimed: HashMap<u8, &'static str> = HashMap::new();
        let mut claim = |code: u8, name: &'static str| -> Result<(), LayoutError> {
            match claimed.insert(code, name) {
                Some(first) => Err(LayoutError::Overlap {
                    code,
                    first,
                    second: name,
                }),
                None => Ok(()),
            }
        };

        claim(self.display_page_up, "display paging")?;
        claim(self.display_page_down, "display paging")?;
        for code in [
            self.select_upper_row,
            self.select_encoder_row,
            self.select_lower_row,
            self.select_poti_row,
            self.select_drum_pad_row,
        ] {
            claim(code, "select row")?;
        }
        for strip in 0..NUM_STRIPS {
            claim(Self::row_code(self.upper_row_base, strip), "upper button row")?;
            claim(Self::row_code(self.lower_row_base, strip), "lower button row")?;
            claim(Self::row_code(self.encoder_row_base, strip), "encoder row")?;
            claim(Self::row_code(self.poti_row_base, strip), "poti row")?;
        }
        for &code in &self.transport {
            claim(code, "transport")?;
        }
        claim(self.device_page_up, "device paging")?;
        claim(self.device_page_down, "device paging")?;
        Ok(())
    }
}

/// Behavior switches of the surface script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfacePolicy {
    /// Route the lower button row to the strips (device selection)
    /// instead of leaving it to the host
    pub lower_row_devices: bool,

    /// Light a lower-row LED for every existing device rather than only
    /// the assigned one
    pub lower_row_show_all: bool,

    /// Lower-row selection of a rack descends into its remembered chain
    pub navigate_chains: bool,

    /// Ignore curated banks and walk all parameters 8 at a time
    pub walk_all_parameters: bool,

    /// Drop direct encoder bindings while the assigned device is switched off
    pub gate_on_device_active: bool,

    /// Surface has encoder LED rings and paging LEDs (MkII)
    pub led_rings: bool,

    /// Device paging buttons step through the chains of the assigned rack
    pub chain_paging: bool,

    /// Rack classes that descend into chains even with a single chain
    pub any_match_racks: Vec<String>,

    /// Rack classes whose chains are not soloed while chain paging
    pub solo_exempt_racks: Vec<String>,
}

impl Default for SurfacePolicy {
    fn default() -> Self {
        Self {
            lower_row_devices: true,
            lower_row_show_all: false,
            navigate_chains: true,
            walk_all_parameters: false,
            gate_on_device_active: true,
            led_rings: true,
            chain_paging: true,
            any_match_racks: vec!["MidiEffectGroupDevice".to_string()],
            solo_exempt_racks: vec!["MidiEffectGroupDevice".to_string()],
        }
    }
}

impl SurfacePolicy {
    /// Number of chains a rack must exceed before selection descends into it
    pub fn chain_threshold(&self, rack_class: &str) -> usize {
        if self.any_match_racks.iter().any(|c| c == rack_class) {
            0
        } else {
            1
        }
    }

    pub fn solos_chains(&self, rack_class: &str) -> bool {
        !self.solo_exempt_racks.iter().any(|c| c == rack_class)
    }
}

/// Get the default surface config file path
pub fn default_surface_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remote-fx")
        .join("surface.yaml")
}

/// Load surface configuration from a YAML file
///
/// Missing file, unreadable file, invalid YAML and invalid layouts all fall
/// back to the default configuration.
pub fn load_surface_config(path: &Path) -> SurfaceConfig {
    log::info!("load_surface_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_surface_config: Config file doesn't exist, using defaults");
        return SurfaceConfig::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("load_surface_config: Failed to read config file: {}", e);
            return SurfaceConfig::default();
        }
    };

    match serde_yaml::from_str::<SurfaceConfig>(&contents) {
        Ok(config) => {
            if let Err(e) = config.layout.validate() {
                log::warn!("load_surface_config: Invalid layout: {}", e);
                return SurfaceConfig::default();
            }
            log::info!(
                "load_surface_config: Loaded config (channel {}, {} curated device classes)",
                config.channel,
                config.banks.len()
            );
            config
        }
        Err(e) => {
            log::warn!("load_surface_config: Failed to parse config: {}", e);
            SurfaceConfig::default()
        }
    }
}

/// Save surface configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_surface_config(config: &SurfaceConfig, path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    log::info!("save_surface_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml =
        serde_yaml::to_string(config).context("Failed to serialize surface config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write surface config file: {:?}", path))?;

    Ok(())
}

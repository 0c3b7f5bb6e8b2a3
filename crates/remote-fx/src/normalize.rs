//! Value shaping between host parameters and the surface
//!
//! - Encoder rings show 128 host output levels collapsed into 11 LEDs
//! - Ring display mode follows the parameter's shape (pan / stepped / fill)
//! - Quantized parameters step through their values on button presses

use crate::host::ParameterInfo;

/// Number of output levels the host feeds back for a mapped encoder
pub const FEEDBACK_LEVELS: usize = 128;

/// Encoder ring display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingMode {
    /// Ring dark
    Off,
    /// Single stepped dot (quantized parameters)
    Stepped,
    /// Bar growing from the left (unipolar parameters)
    Fill,
    /// Bar growing from the center (bipolar parameters)
    Pan,
}

impl RingMode {
    /// Value sent on the ring mode output code
    pub fn midi_value(&self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Stepped => 1,
            Self::Fill => 2,
            Self::Pan => 3,
        }
    }

    /// Ring mode for a parameter; bipolar wins over quantized
    pub fn for_parameter(info: &ParameterInfo) -> Self {
        if info.is_bipolar() {
            Self::Pan
        } else if info.quantized {
            Self::Stepped
        } else {
            Self::Fill
        }
    }
}

/// Output value table for encoder ring feedback
///
/// Maps host level `i` (0-127) to ring LED count `1.5 + i / 127 * 10`,
/// truncated (1..=11).
pub fn ring_feedback_map() -> [u8; FEEDBACK_LEVELS] {
    let mut map = [0u8; FEEDBACK_LEVELS];
    for (index, slot) in map.iter_mut().enumerate() {
        *slot = (1.5 + index as f32 / 127.0 * 10.0) as u8;
    }
    map
}

/// Next discrete value of a quantized parameter, wrapping to min past max
pub fn next_step(info: &ParameterInfo) -> f32 {
    if info.value + 1.0 > info.max {
        info.min
    } else {
        info.value + 1.0
    }
}

/// Short value text for the display
pub fn format_value(info: &ParameterInfo) -> String {
    if info.quantized {
        format!("{}", info.value.round() as i64)
    } else {
        format!("{:.2}", info.value)
    }
}

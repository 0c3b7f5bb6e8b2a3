//! Outbound feedback
//!
//! Derives LED and display state from the engine after every reassignment and
//! queues it as [`Outbound`] messages. The transport drains the queue after
//! each handler returns.

use crate::config::ControlLayout;
use crate::types::{DisplayLines, Outbound, NUM_STRIPS, VALUE_PRESSED, VALUE_RELEASED};

/// Text shown when no device is assigned
pub const PLACEHOLDER: &str = "Please select a Device in Live to edit it...";

/// Characters per display cell (one cell per strip)
pub const CELL_WIDTH: usize = 9;

/// Where the assigned device sits relative to a rack, for chain paging LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPosition {
    /// Not inside a chain
    Outside,
    /// Inside a rack with a single chain (LEDs left untouched)
    Single,
    /// Inside chain `index` of a rack with `count` chains
    Within { index: usize, count: usize },
}

/// Lay out 8 (name, value) cells on two fixed-width lines
pub fn format_display(cells: &[(String, String)]) -> DisplayLines {
    let mut lines = DisplayLines::default();
    for ordinal in 0..NUM_STRIPS {
        let (name, value) = cells
            .get(ordinal)
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .unwrap_or(("", ""));
        lines.top.push_str(&cell(name));
        lines.bottom.push_str(&cell(value));
    }
    lines
}

fn cell(text: &str) -> String {
    let clipped: String = text.chars().take(CELL_WIDTH - 1).collect();
    format!("{:<width$}", clipped, width = CELL_WIDTH)
}

/// Queues LED, display and mapping-rebuild messages
#[derive(Debug, Clone)]
pub struct FeedbackEmitter {
    layout: ControlLayout,
    /// Ring, paging and chain LEDs exist only on LED-ring surfaces
    led_rings: bool,
    outbox: Vec<Outbound>,
}

impl FeedbackEmitter {
    pub fn new(layout: ControlLayout, led_rings: bool) -> Self {
        Self {
            layout,
            led_rings,
            outbox: Vec::new(),
        }
    }

    fn cc(&mut self, code: u8, value: u8) {
        self.outbox.push(Outbound::Cc { code, value });
    }

    /// Upper select button LED mirrors the binding lock
    pub fn lock_indicator(&mut self, locked: bool) {
        let value = if locked { VALUE_PRESSED } else { VALUE_RELEASED };
        self.cc(self.layout.select_upper_row, value);
    }

    /// Lower row LEDs: every existing device, or only the assigned one
    pub fn device_row(&mut self, device_count: usize, assigned: Option<usize>, show_all: bool) {
        for strip in 0..NUM_STRIPS {
            let lit = if show_all {
                strip < device_count
            } else {
                strip < device_count && assigned == Some(strip)
            };
            let code = ControlLayout::row_code(self.layout.lower_row_base, strip);
            self.cc(code, lit as u8);
        }
    }

    /// Light a single lower-row LED (device chosen with a secondary press)
    pub fn device_slot(&mut self, strip: usize) {
        self.cc(ControlLayout::row_code(self.layout.lower_row_base, strip), 1);
    }

    /// Upper row LEDs: filled palette slots while the palette is held
    pub fn palette_row(&mut self, filled: Option<usize>) {
        for strip in 0..NUM_STRIPS {
            let lit = filled.is_some_and(|count| strip < count);
            let code = ControlLayout::row_code(self.layout.upper_row_base, strip);
            self.cc(code, lit as u8);
        }
    }

    /// Light a single upper-row LED (chain reached by chain paging)
    pub fn palette_slot(&mut self, strip: usize) {
        if strip >= NUM_STRIPS {
            return;
        }
        self.cc(ControlLayout::row_code(self.layout.upper_row_base, strip), 1);
    }

    /// Zero ring mode and ring value outputs for every strip
    pub fn clear_rings(&mut self) {
        if !self.led_rings {
            return;
        }
        for strip in 0..NUM_STRIPS {
            self.clear_ring(strip);
        }
    }

    pub fn clear_ring(&mut self, strip: usize) {
        if !self.led_rings {
            return;
        }
        self.cc(ControlLayout::row_code(self.layout.encoder_ring_mode_base, strip), 0);
        self.cc(ControlLayout::row_code(self.layout.encoder_feedback_base, strip), 0);
    }

    /// Bank paging LEDs
    pub fn paging(&mut self, down_enabled: bool, up_enabled: bool) {
        if !self.led_rings {
            return;
        }
        let value = |enabled: bool| if enabled { VALUE_PRESSED } else { VALUE_RELEASED };
        self.cc(self.layout.display_page_down, value(down_enabled));
        self.cc(self.layout.display_page_up, value(up_enabled));
    }

    /// Chain paging LEDs plus the lower select indicator
    pub fn chain_paging(&mut self, position: ChainPosition) {
        if !self.led_rings {
            return;
        }
        match position {
            ChainPosition::Single => {}
            ChainPosition::Outside => {
                self.cc(self.layout.device_page_up, VALUE_RELEASED);
                self.cc(self.layout.device_page_down, VALUE_RELEASED);
                self.cc(self.layout.select_lower_row, 0);
            }
            ChainPosition::Within { index, count } => {
                let up = if index + 1 < count { VALUE_PRESSED } else { VALUE_RELEASED };
                let down = if index > 0 { VALUE_PRESSED } else { VALUE_RELEASED };
                self.cc(self.layout.device_page_up, up);
                self.cc(self.layout.device_page_down, down);
                self.cc(self.layout.select_lower_row, 1);
            }
        }
    }

    pub fn display(&mut self, cells: &[(String, String)]) {
        self.outbox.push(Outbound::Display(format_display(cells)));
    }

    pub fn placeholder(&mut self) {
        self.outbox.push(Outbound::Display(DisplayLines {
            top: PLACEHOLDER.to_string(),
            bottom: String::new(),
        }));
    }

    pub fn message(&mut self, text: String) {
        log::debug!("FX: {}", text);
        self.outbox.push(Outbound::Message(text));
    }

    pub fn request_rebuild(&mut self) {
        self.outbox.push(Outbound::RebuildMapping);
    }

    /// Take all queued messages
    pub fn take(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter() -> FeedbackEmitter {
        FeedbackEmitter::new(ControlLayout::default(), true)
    }

    fn ccs(out: &[Outbound]) -> Vec<(u8, u8)> {
        out.iter()
            .filter_map(|o| match o {
                Outbound::Cc { code, value } => Some((*code, *value)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_format_display() {
        let cells = vec![
            ("Frequency Long".to_string(), "0.50".to_string()),
            ("Q".to_string(), "1".to_string()),
        ];
        let lines = format_display(&cells);
        assert_eq!(lines.top.len(), CELL_WIDTH * NUM_STRIPS);
        assert!(lines.top.starts_with("Frequenc Q        "));
        assert!(lines.bottom.starts_with("0.50     1        "));
    }

    #[test]
    fn test_device_row_only_assigned() {
        let mut fb = emitter();
        fb.device_row(3, Some(1), false);
        let out = ccs(&fb.take());
        assert_eq!(out.len(), NUM_STRIPS);
        assert_eq!(out[0], (40, 0));
        assert_eq!(out[1], (41, 1));
        assert_eq!(out[2], (42, 0));
    }

    #[test]
    fn test_device_row_show_all() {
        let mut fb = emitter();
        fb.device_row(3, None, true);
        let lit: Vec<u8> = ccs(&fb.take()).iter().map(|(_, v)| *v).collect();
        assert_eq!(lit, vec![1, 1, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_palette_row() {
        let mut fb = emitter();
        fb.palette_row(Some(2));
        let lit: Vec<u8> = ccs(&fb.take()).iter().map(|(_, v)| *v).collect();
        assert_eq!(lit, vec![1, 1, 0, 0, 0, 0, 0, 0]);

        fb.palette_row(None);
        assert!(ccs(&fb.take()).iter().all(|(_, v)| *v == 0));
    }

    #[test]
    fn test_palette_slot_ignores_chains_past_the_row() {
        let mut fb = emitter();
        fb.palette_slot(7);
        fb.palette_slot(9);
        assert_eq!(ccs(&fb.take()), vec![(31, 1)]);
    }

    #[test]
    fn test_chain_paging_leds() {
        let mut fb = emitter();
        fb.chain_paging(ChainPosition::Within { index: 0, count: 3 });
        assert_eq!(ccs(&fb.take()), vec![(90, 127), (91, 0), (82, 1)]);

        fb.chain_paging(ChainPosition::Single);
        assert!(fb.take().is_empty());

        fb.chain_paging(ChainPosition::Outside);
        assert_eq!(ccs(&fb.take()), vec![(90, 0), (91, 0), (82, 0)]);
    }

    #[test]
    fn test_plain_surface_skips_ring_leds() {
        let mut fb = FeedbackEmitter::new(ControlLayout::default(), false);
        fb.paging(true, true);
        fb.clear_rings();
        fb.chain_paging(ChainPosition::Outside);
        assert!(fb.take().is_empty());
    }
}

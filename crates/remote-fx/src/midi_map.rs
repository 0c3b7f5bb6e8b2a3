//! Direct control mapping
//!
//! Builds the table the host installs on every rebuild request. Encoders with
//! a bound parameter are mapped directly (relative, signed-bit) so they never
//! pass through software; everything the router handles is forwarded.
//!
//! ```text
//! encoder 56 ──► Relative(parameter 12) ──► ring value 112
//! upper   24 ──► Forward ──► EventRouter
//! poti     8     (not listed: host default)
//! ```

use crate::config::{ControlLayout, SurfacePolicy};
use crate::host::DeviceGraph;
use crate::normalize::{ring_feedback_map, RingMode, FEEDBACK_LEVELS};
use crate::strip::ControlStrip;
use crate::types::{DeviceId, ParameterId, NUM_STRIPS};

/// Output rule attached to a direct encoder binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRule {
    pub channel: u8,
    /// Output code receiving the ring value
    pub code: u8,
    /// Host level (0-127) to output value
    pub value_map: [u8; FEEDBACK_LEVELS],
    pub delay_ms: u32,
}

/// One row of the mapping table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEntry {
    /// Host binds the encoder to the parameter (relative, signed-bit)
    Relative {
        channel: u8,
        code: u8,
        parameter: ParameterId,
        feedback: Option<FeedbackRule>,
    },
    /// Control change delivered to the router
    ForwardCc { channel: u8, code: u8 },
    /// Note delivered to the router
    ForwardNote { channel: u8, note: u8 },
}

/// Everything installed by one rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingPlan {
    pub entries: Vec<MapEntry>,
    /// Ring mode and ring value outputs sent while building
    pub leds: Vec<(u8, u8)>,
    /// Parameters whose current value the host should push to their rings
    pub send_feedback: Vec<ParameterId>,
    /// Strips whose encoder is bound directly
    pub direct: [bool; NUM_STRIPS],
}

impl MappingPlan {
    pub fn relative_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, MapEntry::Relative { .. }))
            .count()
    }

    /// Check if a control change is forwarded to software
    pub fn forwards_cc(&self, code: u8) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e, MapEntry::ForwardCc { code: c, .. } if *c == code))
    }

    /// Parameter bound to an encoder code, if any
    pub fn bound_parameter(&self, code: u8) -> Option<ParameterId> {
        self.entries.iter().find_map(|e| match e {
            MapEntry::Relative {
                code: c, parameter, ..
            } if *c == code => Some(*parameter),
            _ => None,
        })
    }
}

/// Codes the router handles
///
/// The lower row only when it selects devices; otherwise it is left to the
/// host.
pub fn software_ccs(layout: &ControlLayout, policy: &SurfacePolicy) -> Vec<u8> {
    let mut codes = vec![layout.display_page_up, layout.display_page_down];
    codes.extend([
        layout.select_upper_row,
        layout.select_encoder_row,
        layout.select_lower_row,
        layout.select_poti_row,
        layout.select_drum_pad_row,
    ]);
    codes.extend((0..NUM_STRIPS).map(|s| ControlLayout::row_code(layout.upper_row_base, s)));
    if policy.lower_row_devices {
        codes.extend((0..NUM_STRIPS).map(|s| ControlLayout::row_code(layout.lower_row_base, s)));
    }
    codes.extend([layout.device_page_up, layout.device_page_down]);
    codes.extend(layout.transport.iter().copied());
    codes
}

/// Build the mapping for the current strip bindings
pub fn build<G: DeviceGraph + ?Sized>(
    graph: &G,
    strips: &[ControlStrip],
    device: Option<DeviceId>,
    layout: &ControlLayout,
    policy: &SurfacePolicy,
    channel: u8,
) -> MappingPlan {
    let mut plan = MappingPlan::default();

    // Switched-off devices keep their encoders in software
    let gated = policy.gate_on_device_active && device.is_some_and(|d| !graph.device_is_active(d));

    for strip in strips.iter().take(NUM_STRIPS) {
        let index = strip.index();
        let code = ControlLayout::row_code(layout.encoder_row_base, index);
        let ring_code = ControlLayout::row_code(layout.encoder_ring_mode_base, index);
        let value_code = ControlLayout::row_code(layout.encoder_feedback_base, index);

        let bound = strip
            .assigned_parameter()
            .and_then(|p| graph.parameter(p).map(|info| (p, info)));

        match bound {
            Some((parameter, info)) if !gated => {
                let feedback = if policy.led_rings {
                    plan.leds
                        .push((ring_code, RingMode::for_parameter(&info).midi_value()));
                    plan.send_feedback.push(parameter);
                    Some(FeedbackRule {
                        channel,
                        code: value_code,
                        value_map: ring_feedback_map(),
                        delay_ms: 0,
                    })
                } else {
                    None
                };
                plan.entries.push(MapEntry::Relative {
                    channel,
                    code,
                    parameter,
                    feedback,
                });
                plan.direct[index] = true;
            }
            Some(_) => {
                plan.entries.push(MapEntry::ForwardCc { channel, code });
            }
            None => {
                if policy.led_rings {
                    plan.leds.push((ring_code, RingMode::Off.midi_value()));
                    plan.leds.push((value_code, 0));
                }
                plan.entries.push(MapEntry::ForwardCc { channel, code });
            }
        }
    }

    for code in software_ccs(layout, policy) {
        plan.entries.push(MapEntry::ForwardCc { channel, code });
    }
    for &note in &layout.forwarded_notes {
        plan.entries.push(MapEntry::ForwardNote { channel, note });
    }

    log::debug!(
        "FX: Mapping rebuilt ({} direct, {} forwarded)",
        plan.relative_count(),
        plan.entries.len() - plan.relative_count()
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryHost, ParameterSpec};

    fn setup() -> (MemoryHost, DeviceId, Vec<ControlStrip>) {
        let mut host = MemoryHost::new();
        let track = host.add_track("Audio");
        let device = host.add_device(track, "Utility", "StereoGain");
        host.add_parameter(device, ParameterSpec::toggle("Device On"));
        let pan = host.add_parameter(device, ParameterSpec::new("Pan", 0.0, -1.0, 1.0));
        let width = host.add_parameter(device, ParameterSpec::new("Width", 1.0, 0.0, 4.0));
        let mode = host.add_parameter(device, ParameterSpec::new("Mode", 0.0, 0.0, 2.0).quantized());

        let mut strips: Vec<ControlStrip> = (0..NUM_STRIPS).map(ControlStrip::new).collect();
        strips[0].set_assigned_parameter(Some(pan));
        strips[1].set_assigned_parameter(Some(width));
        strips[2].set_assigned_parameter(Some(mode));
        (host, device, strips)
    }

    #[test]
    fn test_bound_encoders_map_directly() {
        let (host, device, strips) = setup();
        let layout = ControlLayout::default();
        let policy = SurfacePolicy::default();
        let plan = build(&host, &strips, Some(device), &layout, &policy, 0);

        assert_eq!(plan.relative_count(), 3);
        assert_eq!(plan.direct, [true, true, true, false, false, false, false, false]);
        assert_eq!(plan.bound_parameter(56), strips[0].assigned_parameter());
        assert!(plan.forwards_cc(59));
        assert!(!plan.forwards_cc(56));

        // Pan, fill and stepped rings, then the unbound strips switched off
        assert_eq!(&plan.leds[..3], &[(120, 3), (121, 2), (122, 1)]);
        assert!(plan.leds[3..].iter().all(|(_, v)| *v == 0));
        assert_eq!(plan.send_feedback.len(), 3);

        match &plan.entries[0] {
            MapEntry::Relative {
                feedback: Some(rule),
                ..
            } => {
                assert_eq!(rule.code, 112);
                assert_eq!(rule.value_map[127], 11);
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_router_controls_are_forwarded() {
        let (host, device, strips) = setup();
        let layout = ControlLayout::default();
        let policy = SurfacePolicy::default();
        let plan = build(&host, &strips, Some(device), &layout, &policy, 3);

        for code in [88, 89, 80, 84, 24, 31, 40, 47, 90, 91, 72, 79] {
            assert!(plan.forwards_cc(code), "code {} not forwarded", code);
        }
        // Poti row stays with the host
        assert!(!plan.forwards_cc(8));
        assert!(plan
            .entries
            .iter()
            .all(|e| !matches!(e, MapEntry::ForwardCc { channel, .. } if *channel != 3)));
    }

    #[test]
    fn test_lower_row_left_to_host_when_not_selecting_devices() {
        let (host, device, strips) = setup();
        let policy = SurfacePolicy {
            lower_row_devices: false,
            ..SurfacePolicy::default()
        };
        let plan = build(&host, &strips, Some(device), &ControlLayout::default(), &policy, 0);
        assert!(!plan.forwards_cc(40));
        assert!(plan.forwards_cc(24));
    }

    #[test]
    fn test_inactive_device_gates_direct_binding() {
        let (mut host, device, strips) = setup();
        host.set_device_active(device, false);
        let layout = ControlLayout::default();

        let plan = build(&host, &strips, Some(device), &layout, &SurfacePolicy::default(), 0);
        assert_eq!(plan.relative_count(), 0);
        assert!(plan.forwards_cc(56));
        assert_eq!(plan.direct, [false; NUM_STRIPS]);

        let ungated = SurfacePolicy {
            gate_on_device_active: false,
            ..SurfacePolicy::default()
        };
        let plan = build(&host, &strips, Some(device), &layout, &ungated, 0);
        assert_eq!(plan.relative_count(), 3);
    }

    #[test]
    fn test_plain_surface_has_no_ring_output() {
        let (host, device, strips) = setup();
        let policy = SurfacePolicy {
            led_rings: false,
            ..SurfacePolicy::default()
        };
        let plan = build(&host, &strips, Some(device), &ControlLayout::default(), &policy, 0);
        assert!(plan.leds.is_empty());
        assert!(plan.send_feedback.is_empty());
        assert!(plan
            .entries
            .iter()
            .all(|e| !matches!(e, MapEntry::Relative { feedback: Some(_), .. })));
    }

    #[test]
    fn test_forwarded_notes() {
        let (host, device, strips) = setup();
        let layout = ControlLayout {
            forwarded_notes: vec![60, 61],
            ..ControlLayout::default()
        };
        let plan = build(&host, &strips, Some(device), &layout, &SurfacePolicy::default(), 0);
        let notes: Vec<u8> = plan
            .entries
            .iter()
            .filter_map(|e| match e {
                MapEntry::ForwardNote { note, .. } => Some(*note),
                _ => None,
            })
            .collect();
        assert_eq!(notes, vec![60, 61]);
    }
}

//! Raw MIDI byte codec
//!
//! Parses the 3-byte channel messages the surface sends and encodes LED
//! output. Display text goes to the display collaborator, not over MIDI.

use crate::types::Outbound;

/// Status nibble of a control change
pub const CC_STATUS: u8 = 0xB0;

/// Raw MIDI event (before routing)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl RawEvent {
    /// Parse raw MIDI bytes into an event
    ///
    /// - Note Off: 0x8n nn vv
    /// - Note On: 0x9n nn vv (velocity 0 is a Note Off)
    /// - Control Change: 0xBn cc vv
    pub fn parse(data: &[u8]) -> Option<Self> {
        let [status, first, second, ..] = *data else {
            return None;
        };
        let channel = status & 0x0F;

        match status & 0xF0 {
            0x80 => Some(Self::NoteOff {
                channel,
                note: first,
                velocity: second,
            }),
            0x90 if second == 0 => Some(Self::NoteOff {
                channel,
                note: first,
                velocity: 0,
            }),
            0x90 => Some(Self::NoteOn {
                channel,
                note: first,
                velocity: second,
            }),
            CC_STATUS => Some(Self::ControlChange {
                channel,
                cc: first,
                value: second,
            }),
            _ => None, // Pitch bend, aftertouch, SysEx...
        }
    }

    pub fn channel(&self) -> u8 {
        match self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControlChange { channel, .. } => *channel,
        }
    }
}

pub fn cc_status_byte(channel: u8) -> u8 {
    CC_STATUS | (channel & 0x0F)
}

pub fn encode_cc(channel: u8, code: u8, value: u8) -> [u8; 3] {
    [cc_status_byte(channel), code & 0x7F, value & 0x7F]
}

/// Encode an outbound message, if it travels over MIDI
pub fn encode(channel: u8, message: &Outbound) -> Option<[u8; 3]> {
    match message {
        Outbound::Cc { code, value } => Some(encode_cc(channel, *code, *value)),
        _ => None,
    }
}

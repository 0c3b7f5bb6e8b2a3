//! Inbound event routing
//!
//! Classifies every forwarded control change by code range and turns it into
//! a [`Command`] for the controller. Buttons act on the press edge (value
//! 127) only; the transport lock is level-tracked instead.

use crate::config::{ControlLayout, SurfacePolicy};
use crate::error::ProtocolViolation;
use crate::types::{ControlMessage, PageDirection};

/// Row select button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectButton {
    UpperRow,
    EncoderRow,
    LowerRow,
    PotiRow,
    DrumPadRow,
}

/// Category of an inbound code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    BankPage(PageDirection),
    Select(SelectButton),
    UpperButton(usize),
    LowerButton(usize),
    Encoder(usize),
    Poti(usize),
    TransportLock,
    Transport(u8),
    DevicePage(PageDirection),
}

/// What the controller should do with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Release edges and buttons without a local action
    Nothing,
    PageBank(PageDirection),
    ToggleLock,
    PreviousScene,
    FireScene,
    StopClips,
    Primary(usize),
    Secondary(usize),
    Encoder(usize),
    PaletteLock(bool),
    PageChain(PageDirection),
}

/// Code range classifier
#[derive(Debug, Clone)]
pub struct EventRouter {
    layout: ControlLayout,
    lower_row_devices: bool,
}

impl EventRouter {
    pub fn new(layout: ControlLayout, policy: &SurfacePolicy) -> Self {
        Self {
            layout,
            lower_row_devices: policy.lower_row_devices,
        }
    }

    /// Find the category of a control code
    pub fn classify(&self, code: u8) -> Result<Route, ProtocolViolation> {
        let l = &self.layout;

        if code == l.display_page_up {
            return Ok(Route::BankPage(PageDirection::Up));
        }
        if code == l.display_page_down {
            return Ok(Route::BankPage(PageDirection::Down));
        }
        if code == l.device_page_up {
            return Ok(Route::DevicePage(PageDirection::Up));
        }
        if code == l.device_page_down {
            return Ok(Route::DevicePage(PageDirection::Down));
        }

        let select = [
            (l.select_upper_row, SelectButton::UpperRow),
            (l.select_encoder_row, SelectButton::EncoderRow),
            (l.select_lower_row, SelectButton::LowerRow),
            (l.select_poti_row, SelectButton::PotiRow),
            (l.select_drum_pad_row, SelectButton::DrumPadRow),
        ];
        if let Some((_, button)) = select.iter().find(|(c, _)| *c == code) {
            return Ok(Route::Select(*button));
        }

        if let Some(strip) = ControlLayout::row_offset(l.upper_row_base, code) {
            return Ok(Route::UpperButton(strip));
        }
        if let Some(strip) = ControlLayout::row_offset(l.lower_row_base, code) {
            return Ok(Route::LowerButton(strip));
        }
        if let Some(strip) = ControlLayout::row_offset(l.encoder_row_base, code) {
            return Ok(Route::Encoder(strip));
        }
        if let Some(strip) = ControlLayout::row_offset(l.poti_row_base, code) {
            return Ok(Route::Poti(strip));
        }

        if code == l.transport_lock {
            return Ok(Route::TransportLock);
        }
        if l.transport.contains(&code) {
            return Ok(Route::Transport(code));
        }

        Err(ProtocolViolation::UnknownCode { code })
    }

    /// Route a control change
    pub fn route(&self, message: ControlMessage) -> Result<Command, ProtocolViolation> {
        let route = self.classify(message.code)?;
        let pressed = message.is_press();

        let command = match route {
            Route::BankPage(direction) if pressed => Command::PageBank(direction),
            Route::DevicePage(direction) if pressed => Command::PageChain(direction),
            Route::Select(button) if pressed => match button {
                SelectButton::UpperRow => Command::ToggleLock,
                SelectButton::EncoderRow => Command::PreviousScene,
                SelectButton::PotiRow => Command::FireScene,
                SelectButton::DrumPadRow => Command::StopClips,
                // Its LED shows chain membership; no local action
                SelectButton::LowerRow => Command::Nothing,
            },
            Route::UpperButton(strip) if pressed => Command::Primary(strip),
            Route::LowerButton(_) if !self.lower_row_devices => {
                return Err(ProtocolViolation::Misrouted {
                    code: message.code,
                    row: "lower button row",
                });
            }
            Route::LowerButton(strip) if pressed => Command::Secondary(strip),
            Route::Encoder(strip) => Command::Encoder(strip),
            Route::TransportLock => Command::PaletteLock(message.value != 0),
            Route::Transport(code) => {
                return Err(ProtocolViolation::Misrouted {
                    code,
                    row: "transport",
                });
            }
            Route::Poti(_) => {
                return Err(ProtocolViolation::Misrouted {
                    code: message.code,
                    row: "poti row",
                });
            }
            _ => Command::Nothing,
        };

        log::trace!("Router: {:?} -> {:?}", message, command);
        Ok(command)
    }

    /// Route a note
    ///
    /// Drum pads are left to the host and no other notes are handled, so any
    /// note reaching the router is a violation.
    pub fn route_note(&self, note: u8) -> Result<Command, ProtocolViolation> {
        if self.layout.drum_pad_notes.contains(&note) {
            return Err(ProtocolViolation::Misrouted {
                code: note,
                row: "drum pads",
            });
        }
        if self.layout.forwarded_notes.contains(&note) {
            log::trace!("Router: Forwarded note {} has no action", note);
            return Ok(Command::Nothing);
        }
        Err(ProtocolViolation::UnexpectedNote { note })
    }
}

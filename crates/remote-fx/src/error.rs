//! Error types
//!
//! Protocol violations indicate a mismatch between the surface layout and the
//! mapping the host was asked to build. They are returned as values so callers
//! can log-and-continue while tests assert on them.

/// An inbound message the core must never see
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("unknown control code {code}")]
    UnknownCode { code: u8 },

    #[error("control code {code} ({row}) should be handled by the host, not routed here")]
    Misrouted { code: u8, row: &'static str },

    #[error("unexpected note {note}")]
    UnexpectedNote { note: u8 },

    #[error("encoder {strip} reached software while its parameter is mapped directly")]
    EncoderBound { strip: usize },
}

/// Validation failure of a control layout
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("control code {code} is claimed by both {first} and {second}")]
    Overlap {
        code: u8,
        first: &'static str,
        second: &'static str,
    },

    #[error("{row} starting at {base} runs past control code 127")]
    RowOutOfRange { row: &'static str, base: u8 },

    #[error("transport codes must include the lock code {code}")]
    MissingLock { code: u8 },
}

/// Malformed snapshot key string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed snapshot key '{0}'")]
pub struct SnapshotKeyError(pub String);

//! Error taxonomy shared by every layer of the driver.

use core::fmt;

/// Errors returned by the public API.
///
/// Wire-level failures observed by the framing engine (framing errors,
/// overflows, collisions) are not modeled here — they travel out of
/// [`crate::port::Port::receive`] attached to the returned event, since a
/// caller may still want the partial buffer alongside the failure tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmxError {
    /// An argument was out of range or otherwise invalid.
    InvalidArg,
    /// The port (or a parameter) is not in a state that permits this operation.
    InvalidState,
    /// The parameter heap or parameter table has no room left.
    NoMem,
    /// No response arrived within the allotted window.
    Timeout,
    /// A received packet's checksum did not match its payload.
    InvalidCrc,
    /// A received RDM response was structurally invalid or unexpected
    /// (including a responder emitting `ACK_OVERFLOW`, which this stack
    /// never requests and therefore never accepts).
    InvalidResponse,
    /// More data arrived than the destination buffer could hold.
    DataOverflow,
    /// A DMX slot was received with a framing error.
    ImproperSlot,
    /// An RS-485 bus clash was observed (expected during discovery).
    DataCollision,
    /// A packet's declared length did not fit its actual framing.
    PacketSize,
}

impl fmt::Display for DmxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg => f.write_str("invalid argument"),
            Self::InvalidState => f.write_str("invalid port or parameter state"),
            Self::NoMem => f.write_str("parameter heap or table exhausted"),
            Self::Timeout => f.write_str("operation timed out"),
            Self::InvalidCrc => f.write_str("checksum mismatch"),
            Self::InvalidResponse => f.write_str("invalid or unexpected RDM response"),
            Self::DataOverflow => f.write_str("data overflow"),
            Self::ImproperSlot => f.write_str("improperly framed slot"),
            Self::DataCollision => f.write_str("bus collision"),
            Self::PacketSize => f.write_str("packet size mismatch"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DmxError {}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, DmxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_all_variants() {
        assert_eq!(format!("{}", DmxError::InvalidArg), "invalid argument");
        assert_eq!(
            format!("{}", DmxError::InvalidState),
            "invalid port or parameter state"
        );
        assert_eq!(
            format!("{}", DmxError::NoMem),
            "parameter heap or table exhausted"
        );
        assert_eq!(format!("{}", DmxError::Timeout), "operation timed out");
        assert_eq!(format!("{}", DmxError::InvalidCrc), "checksum mismatch");
        assert_eq!(
            format!("{}", DmxError::InvalidResponse),
            "invalid or unexpected RDM response"
        );
        assert_eq!(format!("{}", DmxError::DataOverflow), "data overflow");
        assert_eq!(
            format!("{}", DmxError::ImproperSlot),
            "improperly framed slot"
        );
        assert_eq!(format!("{}", DmxError::DataCollision), "bus collision");
        assert_eq!(
            format!("{}", DmxError::PacketSize),
            "packet size mismatch"
        );
    }

    #[test]
    fn error_equality() {
        assert_eq!(DmxError::Timeout, DmxError::Timeout);
        assert_ne!(DmxError::Timeout, DmxError::InvalidArg);
    }
}

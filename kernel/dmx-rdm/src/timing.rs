//! DMX/RDM timing windows (ANSI E1.11 / E1.20), and the clamps the framing
//! engine applies to caller-requested values.

/// Minimum legal BREAK duration, in microseconds.
pub const BREAK_MIN_US: u32 = 92;
/// Maximum legal BREAK duration, in microseconds.
pub const BREAK_MAX_US: u32 = 1_000_000;
/// Minimum legal Mark-After-Break duration, in microseconds.
pub const MAB_MIN_US: u32 = 12;
/// Maximum legal Mark-After-Break duration, in microseconds.
pub const MAB_MAX_US: u32 = 1_000_000;
/// Lower bound of the legal baud-rate window.
pub const BAUD_MIN: u32 = 245_000;
/// Upper bound of the legal baud-rate window.
pub const BAUD_MAX: u32 = 255_000;
/// Nominal DMX512 baud rate.
pub const BAUD_NOMINAL: u32 = 250_000;

/// Maximum time an RDM responder may take to begin replying to a
/// non-broadcast request, in microseconds.
pub const RESPONDER_TIMEOUT_US: u64 = 2_800;
/// Guard time the controller allows for a broadcast request before
/// considering the bus idle again, in microseconds (MAB plus slack).
pub const BROADCAST_GUARD_US: u64 = 176 + 3_000;
/// One unit of an `ACK_TIMER` deferral, in microseconds.
pub const ACK_TIMER_UNIT_US: u64 = 100_000;
/// Maximum time the controller waits for a non-broadcast RDM response
/// before giving up, in microseconds (E1.20 `Responder Packet Spacing` plus
/// slack for the controller's own scheduling jitter).
pub const CONTROLLER_TIMEOUT_US: u32 = 23_000;

/// Clamps a requested BREAK length into the legal window.
#[must_use]
pub fn clamp_break_us(requested: u32) -> u32 {
    requested.clamp(BREAK_MIN_US, BREAK_MAX_US)
}

/// Clamps a requested Mark-After-Break length into the legal window.
#[must_use]
pub fn clamp_mab_us(requested: u32) -> u32 {
    requested.clamp(MAB_MIN_US, MAB_MAX_US)
}

/// Clamps a requested baud rate into the legal window.
#[must_use]
pub fn clamp_baud(requested: u32) -> u32 {
    requested.clamp(BAUD_MIN, BAUD_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_clamps_below_and_above_window() {
        assert_eq!(clamp_break_us(50), BREAK_MIN_US);
        assert_eq!(clamp_break_us(91), BREAK_MIN_US);
        assert_eq!(clamp_break_us(92), 92);
        assert_eq!(clamp_break_us(176), 176);
        assert_eq!(clamp_break_us(2_000_000), BREAK_MAX_US);
    }

    #[test]
    fn baud_clamps_to_nearest_bound() {
        assert_eq!(clamp_baud(0), BAUD_MIN);
        assert_eq!(clamp_baud(244_999), BAUD_MIN);
        assert_eq!(clamp_baud(245_000), BAUD_MIN);
        assert_eq!(clamp_baud(BAUD_NOMINAL), BAUD_NOMINAL);
        assert_eq!(clamp_baud(255_000), BAUD_MAX);
        assert_eq!(clamp_baud(255_001), BAUD_MAX);
    }
}

//! Per-port state flags mutated under the port's [`IrqSpinLock`](dmx_core::spinlock::IrqSpinLock).

use bitflags::bitflags;

bitflags! {
    /// State bits describing what a port's framing engine is doing right now.
    ///
    /// Invariant: whenever `ENABLED` is set, exactly one of `IDLE` / `SENDING`
    /// is also set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortFlags: u16 {
        /// The port has been installed and its ISR is live.
        const ENABLED    = 1 << 0;
        /// No transmit is in progress; the engine is only listening.
        const IDLE       = 1 << 1;
        /// A BREAK/MAB/data sequence is currently being transmitted.
        const SENDING    = 1 << 2;
        /// The most recent transmit completed (`TX_DONE` observed).
        const SENT_LAST  = 1 << 3;
        /// The line is currently being held low to generate a BREAK.
        const IN_BREAK   = 1 << 4;
        /// The Mark-After-Break window is in progress.
        const IN_MAB     = 1 << 5;
        /// A complete (or terminally failed) packet is waiting to be read.
        const HAS_DATA   = 1 << 6;
    }
}

impl Default for PortFlags {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_and_sending_are_mutually_exclusive_bits() {
        let flags = PortFlags::ENABLED | PortFlags::IDLE;
        assert!(flags.contains(PortFlags::IDLE));
        assert!(!flags.contains(PortFlags::SENDING));
    }

    #[test]
    fn default_is_empty() {
        assert_eq!(PortFlags::default(), PortFlags::empty());
    }
}

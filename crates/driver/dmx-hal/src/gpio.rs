//! GPIO edge-sense abstraction used by the diagnostic sniffer.
//!
//! Out of scope for the core driver: the sniffer that consumes edge events
//! is an external collaborator. This trait only describes the minimal
//! surface the core needs in order to arm/disarm edge capture on the line
//! shared with the UART RX pin.

/// A single GPIO line configured for edge interrupts, used to time BREAK
/// and Mark-After-Break widths independently of the UART's own framing
/// detection.
pub trait GpioEdgeSense {
    /// Enables edge-triggered interrupts (both rising and falling) on the line.
    fn enable(&mut self);

    /// Disables edge-triggered interrupts on the line.
    fn disable(&mut self);
}

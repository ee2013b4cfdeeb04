//! UART hardware abstraction.

use bitflags::bitflags;

bitflags! {
    /// Interrupt lines the framing engine reacts to.
    ///
    /// These correspond to the named UART IRQ lines in the framing engine's
    /// receive/transmit state machines, not to raw register bits — a given
    /// HAL implementation maps them onto whatever its silicon actually
    /// exposes (e.g. `RX_FRAMING_ERR` might be synthesized from a line
    /// status register read performed inside the ISR).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UartIrqMask: u32 {
        /// A BREAK condition was detected on the line.
        const RX_BREAK        = 1 << 0;
        /// One or more bytes are available in the RX FIFO.
        const RX_DATA         = 1 << 1;
        /// RX FIFO has held data without a new byte for the configured timeout.
        const RX_TIMEOUT      = 1 << 2;
        /// A framing error (stop bit violation) was detected.
        const RX_FRAMING_ERR  = 1 << 3;
        /// The RX FIFO overflowed.
        const RX_OVERFLOW     = 1 << 4;
        /// An RS-485 bus clash was detected (expected during discovery).
        const RX_CLASH        = 1 << 5;
        /// The TX FIFO has room for more bytes.
        const TX_DATA         = 1 << 6;
        /// The last byte has left the transmit shift register.
        const TX_DONE         = 1 << 7;
    }
}

/// Abstraction over a single UART peripheral.
///
/// One instance is owned per port. All methods are expected to be callable
/// from interrupt context; implementations must not block.
pub trait UartHal {
    /// Programs the UART's baud-rate divisor for the given rate in bits/sec.
    ///
    /// The caller (the framing engine) has already clamped `baud` into the
    /// DMX-legal window; this method just programs the hardware.
    fn set_baud(&mut self, baud: u32);

    /// Asserts or releases the RTS line (bus direction for half-duplex RS-485
    /// transceivers: asserted = drive/transmit, released = listen/receive).
    fn set_rts(&mut self, asserted: bool);

    /// Inverts the TX line polarity.
    ///
    /// Used by the BREAK-generation step on UARTs that cannot natively hold
    /// TX low for an arbitrary duration: the driver inverts TX, which idles
    /// the line low, programs a timer for `break_len`, then de-inverts.
    fn invert_tx(&mut self, inverted: bool);

    /// Reads the instantaneous level of the RX line (`true` = high/mark).
    fn rx_level(&self) -> bool;

    /// Clears the receive FIFO and any associated error latches.
    fn reset_rx_fifo(&mut self);

    /// Clears the transmit FIFO.
    fn reset_tx_fifo(&mut self);

    /// Writes as many bytes from `data` into the TX FIFO as fit, returning
    /// the count actually written.
    fn write_fifo(&mut self, data: &[u8]) -> usize;

    /// Drains up to `out.len()` bytes from the RX FIFO into `out`, returning
    /// the count actually read.
    fn read_fifo(&mut self, out: &mut [u8]) -> usize;

    /// Enables the given interrupt lines (additive).
    fn enable_irqs(&mut self, mask: UartIrqMask);

    /// Disables the given interrupt lines.
    fn disable_irqs(&mut self, mask: UartIrqMask);

    /// Acknowledges (clears) the given pending interrupt lines.
    fn clear_irqs(&mut self, mask: UartIrqMask);

    /// Returns the set of interrupt lines currently pending.
    fn pending_irqs(&self) -> UartIrqMask;
}

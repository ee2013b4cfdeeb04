//! The line-level framing engine: the receive and transmit state machines
//! that turn UART/timer/GPIO interrupts into complete DMX/RDM packets (and
//! back).
//!
//! Everything in this module is interrupt-safe: no allocation, no
//! unbounded loops, and the only locking primitive touched is
//! [`IrqSpinLock`](dmx_core::spinlock::IrqSpinLock). The actual dispatch
//! from a platform's real interrupt vector into [`Engine::on_uart_irq`] /
//! [`Engine::on_timer_irq`] is out of scope for this crate.

use dmx_core::spinlock::{IrqSpinLock, IrqSpinLockGuard};
use dmx_core::wakeup::WakeToken;
use dmx_hal::{GpioEdgeSense, TimerHal, UartHal, UartIrqMask};

use crate::buffer::MAX_FRAME;
use crate::classifier::{classify, PacketKind};
use crate::error::DmxError;
use crate::flags::PortFlags;
use crate::timing;

/// Sentinel `head` value meaning "waiting for the next BREAK".
pub const HEAD_IDLE: i32 = -1;

/// State shared between task context and interrupt context, guarded by one
/// [`IrqSpinLock`] per port. Kept small and branch-free to read/write so
/// critical sections stay bounded.
pub struct SharedState {
    /// Current engine flags (see [`PortFlags`]).
    pub flags: PortFlags,
    /// Bytes received/transmitted so far in the current packet, or
    /// [`HEAD_IDLE`] while waiting for a BREAK.
    pub head: i32,
    /// Expected outgoing byte count for the frame currently being sent.
    pub tx_size: u16,
    /// Rolling estimate of the incoming non-RDM frame's length.
    pub rx_size: u16,
    /// Timestamp (microseconds) of the most recently processed slot.
    pub last_slot_ts: u64,
    /// RDM transaction number, incremented on every request we send.
    pub tn: u8,
    /// Set once a packet completes (successfully or not); cleared when a
    /// reader consumes it.
    pub pending_error: Option<DmxError>,
    /// Packet kind recognized for the pending packet, if any.
    pub pending_kind: Option<PacketKind>,
    /// Raw bytes of the packet currently being received or transmitted.
    pub buffer: [u8; MAX_FRAME],
}

impl SharedState {
    const fn new() -> Self {
        Self {
            flags: PortFlags::empty(),
            head: HEAD_IDLE,
            tx_size: 0,
            rx_size: 0,
            last_slot_ts: 0,
            tn: 0,
            pending_error: None,
            pending_kind: None,
            buffer: [0u8; MAX_FRAME],
        }
    }
}

/// Which timer step the transmit sequencer is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxStep {
    Break,
    Mab,
    AwaitingResponse,
}

/// The framing engine for one port.
pub struct Engine<U, T, G, C> {
    uart: U,
    timer: T,
    gpio: G,
    clock: C,
    state: IrqSpinLock<SharedState>,
    wake: WakeToken,
    break_len_us: u32,
    mab_len_us: u32,
    tx_step: IrqSpinLock<Option<TxStep>>,
}

impl<U, T, G, C> Engine<U, T, G, C>
where
    U: UartHal,
    T: TimerHal,
    G: GpioEdgeSense,
    C: dmx_core::wakeup::Clock,
{
    /// Creates a new, disabled engine wrapping the given peripherals.
    pub fn new(uart: U, timer: T, gpio: G, clock: C) -> Self {
        Self {
            uart,
            timer,
            gpio,
            clock,
            state: IrqSpinLock::new(SharedState::new()),
            wake: WakeToken::new(),
            break_len_us: timing::BREAK_MIN_US * 2,
            mab_len_us: timing::MAB_MIN_US,
            tx_step: IrqSpinLock::new(None),
        }
    }

    /// Programs this engine's BREAK length, clamped to the legal window.
    /// Returns the applied value.
    pub fn set_break_len_us(&mut self, requested: u32) -> u32 {
        self.break_len_us = timing::clamp_break_us(requested);
        self.break_len_us
    }

    /// Programs this engine's Mark-After-Break length, clamped to the
    /// legal window. Returns the applied value.
    pub fn set_mab_len_us(&mut self, requested: u32) -> u32 {
        self.mab_len_us = timing::clamp_mab_us(requested);
        self.mab_len_us
    }

    /// Programs the baud rate, clamped to the legal window. Returns the
    /// applied value.
    pub fn set_baud(&mut self, requested: u32) -> u32 {
        let applied = timing::clamp_baud(requested);
        self.uart.set_baud(applied);
        applied
    }

    /// Enables the engine: arms RX interrupts and marks the port idle,
    /// waiting for the next BREAK.
    pub fn enable(&mut self) {
        let mut s = self.state.lock();
        s.flags = PortFlags::ENABLED | PortFlags::IDLE;
        s.head = HEAD_IDLE;
        drop(s);
        self.uart.reset_rx_fifo();
        self.uart.clear_irqs(UartIrqMask::all());
        self.uart.enable_irqs(
            UartIrqMask::RX_BREAK
                | UartIrqMask::RX_DATA
                | UartIrqMask::RX_TIMEOUT
                | UartIrqMask::RX_FRAMING_ERR
                | UartIrqMask::RX_OVERFLOW
                | UartIrqMask::RX_CLASH,
        );
    }

    /// Disables the engine: masks RX interrupts. Any in-flight transmit is
    /// left to complete; the buffer and `head` are untouched until the next
    /// [`enable`](Self::enable).
    pub fn disable(&mut self) {
        self.uart.disable_irqs(UartIrqMask::all());
        let mut s = self.state.lock();
        s.flags.remove(PortFlags::ENABLED);
    }

    /// Arms a send of `tx_size` bytes already written into the shared
    /// buffer via [`write_tx_buffer`](Self::write_tx_buffer), and kicks off
    /// BREAK generation.
    ///
    /// Turning the bus around for an RDM response is a separate step: the
    /// port facade calls [`arm_response_window`](Self::arm_response_window)
    /// after the send completes, once it knows whether one is expected.
    pub fn begin_send(&mut self, tx_size: u16) {
        {
            let mut s = self.state.lock();
            s.tx_size = tx_size;
            s.head = 0;
            s.flags.remove(PortFlags::IDLE);
            s.flags.insert(PortFlags::SENDING | PortFlags::IN_BREAK);
        }
        *self.tx_step.lock() = Some(TxStep::Break);
        self.uart.disable_irqs(UartIrqMask::TX_DATA | UartIrqMask::TX_DONE);
        self.uart.set_rts(true);
        self.uart.invert_tx(true);
        self.timer.set_alarm_us(self.break_len_us);
        self.timer.start();
    }

    /// Writes into the shared transmit buffer ahead of [`begin_send`](Self::begin_send).
    pub fn write_tx_buffer(&mut self, data: &[u8]) {
        let mut s = self.state.lock();
        let n = data.len().min(MAX_FRAME);
        s.buffer[..n].copy_from_slice(&data[..n]);
    }

    /// Copies the current receive buffer contents out (up to `head` bytes,
    /// or the whole buffer if `head` is negative, which should not happen
    /// for a caller that checked `HAS_DATA` first).
    pub fn read_rx_buffer(&self, out: &mut [u8]) -> usize {
        let s = self.state.lock();
        let len = s.head.max(0) as usize;
        let n = len.min(out.len());
        out[..n].copy_from_slice(&s.buffer[..n]);
        n
    }

    /// Returns a locked view of the shared state, for callers (the port
    /// facade) that need to inspect flags/timestamps atomically with other
    /// work.
    pub fn lock_state(&self) -> IrqSpinLockGuard<'_, SharedState> {
        self.state.lock()
    }

    /// The wakeup token the task side arms before blocking in
    /// `send`/`receive`.
    #[must_use]
    pub fn wake_token(&self) -> &WakeToken {
        &self.wake
    }

    /// A reference to the engine's monotonic clock.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    // -- UART ISR -----------------------------------------------------

    /// Entry point for the UART interrupt vector. Must be called with
    /// interrupts already masked appropriately by the platform trampoline
    /// (this function does not mask interrupts itself beyond what
    /// [`IrqSpinLock`] provides for its own critical section).
    pub fn on_uart_irq(&mut self) {
        let pending = self.uart.pending_irqs();
        if pending.is_empty() {
            return;
        }
        self.uart.clear_irqs(pending);

        if pending.contains(UartIrqMask::RX_BREAK) {
            self.handle_rx_break();
        }
        if pending.contains(UartIrqMask::RX_DATA) || pending.contains(UartIrqMask::RX_TIMEOUT) {
            self.handle_rx_data();
        }
        if pending.contains(UartIrqMask::RX_FRAMING_ERR) {
            self.handle_rx_data();
            self.complete_rx(Some(DmxError::ImproperSlot));
        }
        if pending.contains(UartIrqMask::RX_OVERFLOW) {
            self.complete_rx(Some(DmxError::DataOverflow));
        }
        if pending.contains(UartIrqMask::RX_CLASH) {
            self.complete_rx(Some(DmxError::DataCollision));
        }
        if pending.contains(UartIrqMask::TX_DATA) {
            self.handle_tx_data();
        }
        if pending.contains(UartIrqMask::TX_DONE) {
            self.handle_tx_done();
        }
    }

    fn handle_rx_break(&mut self) {
        let mut s = self.state.lock();
        if s.head > 0 {
            // A BREAK arriving mid-packet updates the rolling DMX-length
            // estimate for next time, per the framing engine's contract.
            s.rx_size = s.head as u16;
        }
        s.head = 0;
        s.flags.insert(PortFlags::IN_BREAK);
        s.flags.remove(PortFlags::HAS_DATA);
        s.pending_error = None;
        s.pending_kind = None;
    }

    fn handle_rx_data(&mut self) {
        let mut s = self.state.lock();
        if s.head < 0 {
            // Bytes before the first BREAK are not part of a frame.
            return;
        }
        s.flags.remove(PortFlags::IN_BREAK);
        let head = s.head as usize;
        if head >= MAX_FRAME {
            drop(s);
            self.complete_rx(Some(DmxError::DataOverflow));
            return;
        }
        let n = self.uart.read_fifo(&mut s.buffer[head..]);
        s.head += n as i32;
        s.last_slot_ts = self.clock.now_micros();

        let rx_size_hint = s.rx_size as usize;
        let classification = classify(&s.buffer, s.head as usize, rx_size_hint);
        if classification.complete {
            s.pending_error = classification.error;
            s.pending_kind = Some(classification.kind);
            drop(s);
            self.finish_packet();
        }
    }

    fn complete_rx(&mut self, error: Option<DmxError>) {
        let mut s = self.state.lock();
        s.pending_error = error;
        drop(s);
        self.finish_packet();
    }

    fn finish_packet(&mut self) {
        let mut s = self.state.lock();
        s.flags.insert(PortFlags::HAS_DATA);
        s.flags.remove(PortFlags::IN_BREAK | PortFlags::IN_MAB);
        drop(s);
        self.wake.signal();
    }

    // -- Timer / TX ISR -------------------------------------------------

    /// Entry point for the hardware timer interrupt that sequences
    /// BREAK → MAB → data transmission.
    pub fn on_timer_irq(&mut self) {
        let step = *self.tx_step.lock();
        match step {
            Some(TxStep::Break) => {
                self.uart.invert_tx(false);
                let mut s = self.state.lock();
                s.flags.remove(PortFlags::IN_BREAK);
                s.flags.insert(PortFlags::IN_MAB);
                drop(s);
                *self.tx_step.lock() = Some(TxStep::Mab);
                self.timer.set_alarm_us(self.mab_len_us);
            },
            Some(TxStep::Mab) => {
                let mut s = self.state.lock();
                s.flags.remove(PortFlags::IN_MAB);
                let head = s.head.max(0) as usize;
                let tx_size = s.tx_size as usize;
                let written = self.uart.write_fifo(&s.buffer[head..tx_size.min(MAX_FRAME)]);
                s.head = (head + written) as i32;
                drop(s);
                self.uart.enable_irqs(UartIrqMask::TX_DATA);
                self.timer.pause();
            },
            Some(TxStep::AwaitingResponse) => {
                // Receive timeout while turned around for an RDM response.
                self.complete_rx(Some(DmxError::Timeout));
                *self.tx_step.lock() = None;
            },
            None => {},
        }
    }

    fn handle_tx_data(&mut self) {
        let mut s = self.state.lock();
        let head = s.head.max(0) as usize;
        let tx_size = s.tx_size as usize;
        if head >= tx_size {
            self.uart.disable_irqs(UartIrqMask::TX_DATA);
            self.uart.enable_irqs(UartIrqMask::TX_DONE);
            return;
        }
        let written = self.uart.write_fifo(&s.buffer[head..tx_size]);
        s.head = (head + written) as i32;
        if s.head as usize >= tx_size {
            self.uart.disable_irqs(UartIrqMask::TX_DATA);
            self.uart.enable_irqs(UartIrqMask::TX_DONE);
        }
    }

    fn handle_tx_done(&mut self) {
        self.uart.disable_irqs(UartIrqMask::TX_DONE);
        let mut s = self.state.lock();
        s.last_slot_ts = self.clock.now_micros();
        s.flags.remove(PortFlags::SENDING);
        s.flags.insert(PortFlags::SENT_LAST);
        drop(s);

        let awaiting_response = matches!(*self.tx_step.lock(), Some(TxStep::AwaitingResponse));
        if awaiting_response {
            return;
        }

        // Turn the bus around if a response is still expected; the port
        // facade decides whether to arm this by calling
        // `arm_response_window` right after `send` returns, before any
        // other caller can race it.
        let mut s = self.state.lock();
        s.flags.insert(PortFlags::IDLE);
        drop(s);
        self.uart.set_rts(false);
        self.wake.signal();
    }

    /// Called by the port facade immediately after a non-broadcast RDM
    /// request finishes transmitting, to turn the bus around and arm the
    /// receive-timeout window for the response.
    pub fn arm_response_window(&mut self, is_discovery_response_expected: bool) {
        let mut s = self.state.lock();
        s.head = if is_discovery_response_expected { 0 } else { HEAD_IDLE };
        s.flags.remove(PortFlags::SENT_LAST);
        drop(s);
        self.uart.set_rts(false);
        self.uart.reset_rx_fifo();
        self.uart.clear_irqs(UartIrqMask::all());
        self.uart.enable_irqs(
            UartIrqMask::RX_BREAK
                | UartIrqMask::RX_DATA
                | UartIrqMask::RX_TIMEOUT
                | UartIrqMask::RX_FRAMING_ERR
                | UartIrqMask::RX_OVERFLOW
                | UartIrqMask::RX_CLASH,
        );
        *self.tx_step.lock() = Some(TxStep::AwaitingResponse);
        self.timer.set_alarm_us(timing::RESPONDER_TIMEOUT_US as u32);
        self.timer.start();
    }

    /// Cancels a pending response window (called once the response has
    /// actually arrived, so a late timer IRQ is a no-op).
    pub fn cancel_response_window(&mut self) {
        self.timer.pause();
        *self.tx_step.lock() = None;
    }
}

impl<U, T, G, C> Engine<U, T, G, C> {
    /// Test-only escape hatch into the raw UART peripheral, for host tests
    /// (in this module and in `port`'s) that need to push bytes or raise
    /// IRQ lines directly rather than through a real transceiver.
    #[cfg(test)]
    pub(crate) fn uart_for_test(&mut self) -> &mut U {
        &mut self.uart
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmx_hal::mock::{MockClock, MockGpio, MockTimer, MockUart};

    fn new_engine() -> Engine<MockUart, MockTimer, MockGpio, MockClock> {
        Engine::new(MockUart::new(), MockTimer::new(), MockGpio::new(), MockClock::new())
    }

    #[test]
    fn enable_sets_idle_and_enabled() {
        let mut e = new_engine();
        e.enable();
        let s = e.lock_state();
        assert!(s.flags.contains(PortFlags::ENABLED | PortFlags::IDLE));
        assert_eq!(s.head, HEAD_IDLE);
    }

    #[test]
    fn break_len_clamps_into_window() {
        let mut e = new_engine();
        assert_eq!(e.set_break_len_us(10), timing::BREAK_MIN_US);
        assert_eq!(e.set_break_len_us(176), 176);
    }

    #[test]
    fn receiving_a_full_dmx_frame_signals_wake() {
        let mut e = new_engine();
        e.enable();
        {
            let mut s = e.lock_state();
            s.rx_size = 3;
        }
        e.uart.push_rx(&[0x00, 0x01, 0x02]);
        e.uart.raise(UartIrqMask::RX_BREAK);
        e.on_uart_irq();
        e.uart.raise(UartIrqMask::RX_DATA);
        e.on_uart_irq();

        assert!(e.wake.poll());
        let s = e.lock_state();
        assert!(s.flags.contains(PortFlags::HAS_DATA));
        assert_eq!(s.head, 3);
    }

    #[test]
    fn overflow_completes_packet_with_error() {
        let mut e = new_engine();
        e.enable();
        e.uart.raise(UartIrqMask::RX_BREAK);
        e.on_uart_irq();
        e.uart.raise(UartIrqMask::RX_OVERFLOW);
        e.on_uart_irq();
        assert!(e.wake.poll());
        let s = e.lock_state();
        assert_eq!(s.pending_error, Some(DmxError::DataOverflow));
    }

    #[test]
    fn framing_error_completes_packet_with_improper_slot() {
        let mut e = new_engine();
        e.enable();
        e.uart.push_rx(&[0x00, 0x01]);
        e.uart.raise(UartIrqMask::RX_BREAK);
        e.on_uart_irq();
        e.uart.raise(UartIrqMask::RX_FRAMING_ERR);
        e.on_uart_irq();

        assert!(e.wake.poll());
        {
            let s = e.lock_state();
            assert!(s.flags.contains(PortFlags::HAS_DATA));
            assert_eq!(s.pending_error, Some(DmxError::ImproperSlot));
            assert_eq!(s.head, 2);
        }

        // The next clean frame is received normally, unaffected by the
        // earlier error.
        e.uart.push_rx(&[0x00, 0x01, 0x02]);
        e.uart.raise(UartIrqMask::RX_BREAK);
        e.on_uart_irq();
        e.uart.raise(UartIrqMask::RX_DATA);
        e.on_uart_irq();

        let s = e.lock_state();
        assert_eq!(s.pending_error, None);
        assert_eq!(s.head, 3);
    }

    #[test]
    fn send_sequences_break_then_mab_then_data() {
        let mut e = new_engine();
        e.enable();
        e.write_tx_buffer(&[0x00, 1, 2, 3]);
        e.begin_send(4);
        assert!(e.uart.rts_asserted());
        e.on_timer_irq(); // BREAK elapses
        assert_eq!(e.timer.armed_us(), timing::MAB_MIN_US);
        e.on_timer_irq(); // MAB elapses, pushes FIFO
        assert_eq!(e.uart.tx_log(), &[0x00, 1, 2, 3]);
    }
}

//! Fake peripherals used by `dmx-rdm`'s host test suite.
//!
//! These are not meant to model real timing — they let a test drive the
//! framing engine's state machine byte-by-byte and IRQ-by-IRQ without any
//! hardware.

extern crate std;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::vec::Vec;

use crate::gpio::GpioEdgeSense;
use crate::timer::TimerHal;
use crate::uart::{UartHal, UartIrqMask};
use crate::Clock;

/// A software UART: bytes pushed with [`MockUart::push_rx`] are drained by
/// [`UartHal::read_fifo`]; bytes written via [`UartHal::write_fifo`] land in
/// [`MockUart::tx_log`].
#[derive(Default)]
pub struct MockUart {
    rx_fifo: VecDeque<u8>,
    tx_log: Vec<u8>,
    enabled_irqs: UartIrqMask,
    pending_irqs: UartIrqMask,
    baud: u32,
    rts_asserted: bool,
    tx_inverted: bool,
    rx_level: bool,
}

impl MockUart {
    /// Creates an idle mock UART.
    pub fn new() -> Self {
        Self {
            enabled_irqs: UartIrqMask::empty(),
            pending_irqs: UartIrqMask::empty(),
            rx_level: true,
            ..Default::default()
        }
    }

    /// Queues bytes as if they had arrived on the wire.
    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.rx_fifo.extend(bytes.iter().copied());
    }

    /// Marks the given lines as pending, for the test to then feed to the
    /// engine's ISR entry point.
    pub fn raise(&mut self, mask: UartIrqMask) {
        self.pending_irqs |= mask;
    }

    /// Returns everything written so far via [`UartHal::write_fifo`].
    pub fn tx_log(&self) -> &[u8] {
        &self.tx_log
    }

    /// Clears the transmit log (used between test phases).
    pub fn clear_tx_log(&mut self) {
        self.tx_log.clear();
    }

    /// Returns the last baud rate programmed via [`UartHal::set_baud`].
    pub fn programmed_baud(&self) -> u32 {
        self.baud
    }

    /// Returns whether [`UartHal::set_rts`] last asserted the line.
    pub fn rts_asserted(&self) -> bool {
        self.rts_asserted
    }
}

impl UartHal for MockUart {
    fn set_baud(&mut self, baud: u32) {
        self.baud = baud;
    }

    fn set_rts(&mut self, asserted: bool) {
        self.rts_asserted = asserted;
    }

    fn invert_tx(&mut self, inverted: bool) {
        self.tx_inverted = inverted;
        self.rx_level = !inverted;
    }

    fn rx_level(&self) -> bool {
        self.rx_level
    }

    fn reset_rx_fifo(&mut self) {
        self.rx_fifo.clear();
    }

    fn reset_tx_fifo(&mut self) {
        self.tx_log.clear();
    }

    fn write_fifo(&mut self, data: &[u8]) -> usize {
        self.tx_log.extend_from_slice(data);
        data.len()
    }

    fn read_fifo(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        while n < out.len() {
            match self.rx_fifo.pop_front() {
                Some(b) => {
                    out[n] = b;
                    n += 1;
                },
                None => break,
            }
        }
        n
    }

    fn enable_irqs(&mut self, mask: UartIrqMask) {
        self.enabled_irqs |= mask;
    }

    fn disable_irqs(&mut self, mask: UartIrqMask) {
        self.enabled_irqs &= !mask;
    }

    fn clear_irqs(&mut self, mask: UartIrqMask) {
        self.pending_irqs &= !mask;
    }

    fn pending_irqs(&self) -> UartIrqMask {
        self.pending_irqs & self.enabled_irqs
    }
}

/// A software one-shot timer: [`MockTimer::fire`] is how a test simulates
/// the alarm elapsing.
#[derive(Default)]
pub struct MockTimer {
    alarm_us: u32,
    running: bool,
}

impl MockTimer {
    /// Creates a stopped timer with no alarm armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last value passed to [`TimerHal::set_alarm_us`].
    pub fn armed_us(&self) -> u32 {
        self.alarm_us
    }

    /// Returns whether [`TimerHal::start`] was called more recently than
    /// [`TimerHal::pause`].
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl TimerHal for MockTimer {
    fn set_alarm_us(&mut self, delay_us: u32) {
        self.alarm_us = delay_us;
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn pause(&mut self) {
        self.running = false;
    }
}

/// A software GPIO edge-sense line.
#[derive(Default)]
pub struct MockGpio {
    enabled: bool,
}

impl MockGpio {
    /// Creates a disabled edge-sense line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether [`GpioEdgeSense::enable`] is currently in effect.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl GpioEdgeSense for MockGpio {
    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }
}

/// A manually-advanced monotonic clock for deterministic timeout tests.
pub struct MockClock(AtomicU64);

impl MockClock {
    /// Creates a clock starting at time zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Advances the clock by `us` microseconds.
    pub fn advance(&self, us: u64) {
        self.0.fetch_add(us, Ordering::Relaxed);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now_micros(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

//! [EXPANSION] Diagnostic BREAK / Mark-After-Break width recorder.
//!
//! Out of scope for the core framing engine (`SPEC_FULL.md` §1: "a
//! diagnostic sniffer that records BREAK and MAB widths for third-party
//! traffic" is an external collaborator), this listens to the same GPIO
//! edge-sense line the engine arms for its own framing detection, purely
//! for observability — it never feeds back into `framing::Engine` and
//! never blocks whatever calls [`Sniffer::on_gpio_edge`].

use planck_noalloc::ringbuf::RingBuf;

use dmx_core::wakeup::Clock;

/// Capacity of the width queue (one more slot than usable, per
/// [`RingBuf`]'s full-at-`SIZE-1` convention, landing on 32 usable
/// entries).
pub const CAPACITY: usize = 33;

/// One observed BREAK/MAB pair, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeWidths {
    /// Measured BREAK (line-low) duration.
    pub break_us: u32,
    /// Measured Mark-After-Break (line-high) duration following it.
    pub mab_us: u32,
}

enum EdgeState {
    /// Waiting for the falling edge that starts a BREAK.
    WaitBreak,
    /// In BREAK; recorded the timestamp the falling edge landed.
    InBreak { started_at: u64 },
    /// In MAB; recorded the BREAK width and the timestamp MAB started.
    InMab { break_us: u32, started_at: u64 },
}

/// Records BREAK/MAB widths off raw GPIO edge timestamps.
///
/// Disabled by default (mirrors [`dmx_hal::GpioEdgeSense::disable`]'s
/// default-off posture) so a platform that never arms the diagnostic line
/// pays no cost beyond the empty queue.
pub struct Sniffer<C> {
    clock: C,
    state: EdgeState,
    widths: RingBuf<EdgeWidths, CAPACITY>,
    enabled: bool,
}

impl<C: Clock> Sniffer<C> {
    /// Creates a disabled sniffer with an empty queue.
    pub fn new(clock: C) -> Self {
        Self { clock, state: EdgeState::WaitBreak, widths: RingBuf::new(), enabled: false }
    }

    /// Enables or disables edge recording. Disabling resets the in-progress
    /// edge state machine so a later re-enable starts clean; the queue of
    /// already-recorded widths is left untouched.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.state = EdgeState::WaitBreak;
    }

    /// Whether recording is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Feeds one GPIO edge event. `rising` is `true` for a low-to-high
    /// transition. A no-op while disabled.
    ///
    /// Out-of-order edges (e.g. recording was just enabled mid-BREAK)
    /// resynchronize silently: this call simply waits for the next falling
    /// edge to start counting again, rather than reporting a bogus width.
    pub fn on_gpio_edge(&mut self, rising: bool) {
        if !self.enabled {
            return;
        }
        let now = self.clock.now_micros();
        let previous = core::mem::replace(&mut self.state, EdgeState::WaitBreak);
        let (next, completed) = match (previous, rising) {
            (EdgeState::WaitBreak, false) => (EdgeState::InBreak { started_at: now }, None),
            (EdgeState::InBreak { started_at }, true) => {
                (EdgeState::InMab { break_us: (now - started_at) as u32, started_at: now }, None)
            },
            (EdgeState::InMab { break_us, started_at }, false) => {
                let widths = EdgeWidths { break_us, mab_us: (now - started_at) as u32 };
                (EdgeState::InBreak { started_at: now }, Some(widths))
            },
            _ => (EdgeState::WaitBreak, None),
        };
        self.state = next;
        if let Some(widths) = completed {
            self.push_overwriting(widths);
        }
    }

    fn push_overwriting(&mut self, widths: EdgeWidths) {
        if self.widths.try_push(widths).is_err() {
            let _ = self.widths.pop();
            let _ = self.widths.try_push(widths);
        }
    }

    /// Pops the oldest recorded width pair, if any.
    pub fn pop(&mut self) -> Option<EdgeWidths> {
        self.widths.pop()
    }

    /// Number of width pairs currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.widths.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }
}

#[cfg(test)]
impl<C> Sniffer<C> {
    fn clock_for_test(&self) -> &C {
        &self.clock
    }
}

//! Hardware timer abstraction.
//!
//! The framing engine uses one timer per port to sequence BREAK / MAB /
//! receive-timeout windows. The timer fires a single interrupt per armed
//! alarm; the engine re-programs it for each step.

/// Abstraction over a single one-shot hardware timer/alarm.
pub trait TimerHal {
    /// Arms the timer to fire once after `delay_us` microseconds.
    ///
    /// Does not implicitly start the timer — call [`start`](Self::start)
    /// afterwards. Re-arming a running timer restarts its countdown.
    fn set_alarm_us(&mut self, delay_us: u32);

    /// Starts (or resumes) counting down toward the armed alarm.
    fn start(&mut self);

    /// Pauses the timer without clearing the armed alarm value.
    fn pause(&mut self);
}

//! Leveled logging facade for the driver.
//!
//! Mirrors the host kernel's `kprint!`/`klog!` idiom: a platform registers a
//! sink once at boot via [`set_log_fn`]; until then, every call is silently
//! discarded. This keeps the crate usable on a bare target with no logger
//! wired up yet, and trivially testable on a host that never registers one.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Driver log severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Something failed in a way the caller cannot recover from.
    Error = 0,
    /// Unexpected condition handled without losing correctness.
    Warn = 1,
    /// High-level progress (install/delete, discovery summary).
    Info = 2,
    /// Per-packet diagnostic detail.
    Debug = 3,
    /// Per-byte / per-interrupt detail.
    Trace = 4,
}

/// Signature of the global leveled log sink.
pub type LogFn = fn(LogLevel, fmt::Arguments<'_>);

fn null_log(_level: LogLevel, _args: fmt::Arguments<'_>) {}

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(null_log as *mut ());

/// Registers the platform's log sink.
///
/// May be called more than once (e.g. once for an early bring-up console,
/// again once the full logger is online).
pub fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

fn load_log_fn() -> LogFn {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: only `set_log_fn` ever stores into `LOG_FN`, and only with a
    // valid `LogFn` pointer (or the initial `null_log`).
    unsafe { core::mem::transmute(ptr) }
}

#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    load_log_fn()(level, args);
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! dlog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs at [`LogLevel::Error`].
#[macro_export]
macro_rules! derror {
    ($($arg:tt)*) => { $crate::dlog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs at [`LogLevel::Warn`].
#[macro_export]
macro_rules! dwarn {
    ($($arg:tt)*) => { $crate::dlog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs at [`LogLevel::Info`].
#[macro_export]
macro_rules! dinfo {
    ($($arg:tt)*) => { $crate::dlog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs at [`LogLevel::Debug`].
#[macro_export]
macro_rules! ddebug {
    ($($arg:tt)*) => { $crate::dlog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs at [`LogLevel::Trace`].
#[macro_export]
macro_rules! dtrace {
    ($($arg:tt)*) => { $crate::dlog!($crate::log::LogLevel::Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU8, Ordering as O};

    static LAST_LEVEL: AtomicU8 = AtomicU8::new(0xFF);

    fn capture(level: LogLevel, _args: fmt::Arguments<'_>) {
        LAST_LEVEL.store(level as u8, O::SeqCst);
    }

    #[test]
    fn unregistered_sink_discards_silently() {
        // Just proves the macro compiles and doesn't panic with the default sink.
        dinfo!("install port {}", 0);
    }

    #[test]
    fn registered_sink_receives_level() {
        set_log_fn(capture);
        dwarn!("clamped baud to {}", 245_000);
        assert_eq!(LAST_LEVEL.load(O::SeqCst), LogLevel::Warn as u8);
        set_log_fn(null_log);
    }
}

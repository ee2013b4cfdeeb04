//! Hardware abstraction traits consumed by the dmx-rdm driver.
//!
//! These traits are the seam between the portable framing engine and the
//! concrete UART/GPIO/hardware-timer peripherals of a given microcontroller.
//! Implementations are out of scope for this crate — it only defines the
//! contract. A host test build uses the `mock` module's fake peripherals.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

pub mod gpio;
pub mod timer;
pub mod uart;

#[cfg(any(test, feature = "std"))]
pub mod mock;

pub use dmx_core::wakeup::Clock;
pub use gpio::GpioEdgeSense;
pub use timer::TimerHal;
pub use uart::{UartHal, UartIrqMask};

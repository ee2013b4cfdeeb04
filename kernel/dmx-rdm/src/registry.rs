//! Process-wide port driver table and binding-UID derivation.
//!
//! Mirrors the source driver's array of port pointers: something (an ISR
//! trampoline, on a real target) is handed a bare port number and needs to
//! recover the installed driver from it. [`Registry`] models that table as
//! a fixed-size array of slots, each claimed exclusively by its own
//! [`AtomicBool`] rather than by a single lock guarding the whole table, so
//! that installing port 3 never contends with installing port 0.
//!
//! This module also derives the single RDM device UID every port on the
//! process shares (see `SPEC_FULL.md` §5, "Process-wide state"): the first
//! successful [`Registry::install`] call wins the derivation race and
//! becomes the *binding port*.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dmx_core::cell::RacyCell;

use crate::error::{DmxError, Result};
use crate::uid::Uid;

const UID_NOT_DERIVED: u64 = u64::MAX;

/// A fixed-size table of `N` port slots, indexed by port number.
///
/// `P` is the concrete port type the platform instantiates (typically one
/// monomorphization of [`crate::port::Port`] per board). Entries are
/// `&'static P` because ports are expected to live for the process's
/// lifetime, matching how the HAL peripherals they wrap are owned.
pub struct Registry<P: 'static, const N: usize> {
    occupied: [AtomicBool; N],
    slots: [RacyCell<Option<&'static P>>; N],
    binding_uid: AtomicU64,
}

impl<P: 'static, const N: usize> Registry<P, N> {
    const UNOCCUPIED: AtomicBool = AtomicBool::new(false);
    const EMPTY_SLOT: RacyCell<Option<&'static P>> = RacyCell::new(None);

    /// Creates an empty registry with no binding UID derived yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            occupied: [Self::UNOCCUPIED; N],
            slots: [Self::EMPTY_SLOT; N],
            binding_uid: AtomicU64::new(UID_NOT_DERIVED),
        }
    }

    /// Claims `index` for `port`.
    ///
    /// Fails with [`DmxError::InvalidArg`] if `index` is out of range, or
    /// [`DmxError::InvalidState`] if that slot is already occupied.
    pub fn install(&self, index: usize, port: &'static P) -> Result<()> {
        let slot = self.occupied.get(index).ok_or(DmxError::InvalidArg)?;
        if slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(DmxError::InvalidState);
        }
        // SAFETY: the compare-exchange above just made us the sole owner
        // of this slot; no other caller can be writing to it concurrently,
        // and `delete` clears `occupied` only after it has finished
        // clearing the slot itself.
        unsafe { *self.slots[index].get() = Some(port) };
        Ok(())
    }

    /// Frees `index`, if occupied. A no-op on an already-free or
    /// out-of-range index.
    pub fn delete(&self, index: usize) {
        let Some(slot) = self.occupied.get(index) else {
            return;
        };
        if let Some(cell) = self.slots.get(index) {
            // SAFETY: clearing the pointer before releasing `occupied`
            // ensures a racing `install` never observes a stale entry.
            unsafe { *cell.get() = None };
        }
        slot.store(false, Ordering::Release);
    }

    /// Returns the port installed at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'static P> {
        let cell = self.slots.get(index)?;
        // SAFETY: `install`/`delete` only ever store a fully-formed
        // `Option<&'static P>`; reading it outside of those calls races
        // only with another read, which is sound.
        unsafe { *cell.get() }
    }

    /// Whether `index` currently names an installed port.
    #[must_use]
    pub fn is_installed(&self, index: usize) -> bool {
        self.occupied.get(index).is_some_and(|o| o.load(Ordering::Acquire))
    }

    /// Returns the process-wide binding UID, deriving it from `mac` on the
    /// first call. Every later call (regardless of `mac`) returns the same
    /// value, matching "the first port to install becomes the binding
    /// port."
    pub fn binding_uid(&self, manufacturer_id: u16, mac: [u8; 6]) -> Uid {
        let derived = derive_device_id(mac);
        let candidate = Uid::new(manufacturer_id, derived).as_u64();
        match self.binding_uid.compare_exchange(
            UID_NOT_DERIVED,
            candidate,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Uid::from_u64(candidate),
            Err(existing) => Uid::from_u64(existing),
        }
    }
}

impl<P: 'static, const N: usize> Default for Registry<P, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds a 6-byte MAC address down to the 32-bit RDM device-ID field.
///
/// The top two MAC bytes (typically the vendor OUI half, low-entropy
/// across a single manufacturer's production run) are XORed into the
/// bottom two bytes of the 32-bit device ID rather than discarded, so a
/// batch of boards sharing an OUI still gets a spread of device IDs.
fn derive_device_id(mac: [u8; 6]) -> u32 {
    let hi = u16::from_be_bytes([mac[0], mac[1]]);
    let lo = u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]]);
    lo ^ u32::from(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_then_get_round_trips() {
        static PORT: u32 = 7;
        let reg: Registry<u32, 4> = Registry::new();
        reg.install(1, &PORT).unwrap();
        assert_eq!(reg.get(1), Some(&7));
        assert!(reg.is_installed(1));
        assert!(!reg.is_installed(0));
    }

    #[test]
    fn install_twice_without_delete_fails() {
        static A: u32 = 1;
        static B: u32 = 2;
        let reg: Registry<u32, 2> = Registry::new();
        reg.install(0, &A).unwrap();
        assert_eq!(reg.install(0, &B).unwrap_err(), DmxError::InvalidState);
    }

    #[test]
    fn delete_frees_the_slot_for_reinstall() {
        static A: u32 = 1;
        static B: u32 = 2;
        let reg: Registry<u32, 2> = Registry::new();
        reg.install(0, &A).unwrap();
        reg.delete(0);
        assert_eq!(reg.get(0), None);
        reg.install(0, &B).unwrap();
        assert_eq!(reg.get(0), Some(&2));
    }

    #[test]
    fn out_of_range_index_is_invalid_arg() {
        static A: u32 = 1;
        let reg: Registry<u32, 2> = Registry::new();
        assert_eq!(reg.install(5, &A).unwrap_err(), DmxError::InvalidArg);
    }

    #[test]
    fn binding_uid_is_stable_across_calls() {
        let reg: Registry<u32, 2> = Registry::new();
        let first = reg.binding_uid(0x05E0, [0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let second = reg.binding_uid(0x05E0, [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(first, second);
    }
}

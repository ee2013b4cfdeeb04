//! Interrupt-disabling spinlock for state shared with an ISR.
//!
//! [`IrqSpinLock`] is the only primitive the framing engine is allowed to
//! take from inside an interrupt handler. Acquiring it disables interrupts
//! on the current core for the lifetime of the guard, so critical sections
//! must be constant-time: no loops, no allocation, no calls into a HAL that
//! might block.
//!
//! The actual "disable/restore interrupts" operation is platform-specific
//! and lives outside this crate's scope; it is wired up once at boot via
//! [`set_irq_control`].

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// Platform hook: disable interrupts on the current core, returning an
/// opaque token describing whether they were previously enabled.
pub type DisableFn = fn() -> usize;
/// Platform hook: restore the interrupt state described by a token
/// previously returned from [`DisableFn`].
pub type RestoreFn = fn(usize);

fn default_disable() -> usize {
    0
}
fn default_restore(_state: usize) {}

static DISABLE_FN: AtomicPtr<()> = AtomicPtr::new(default_disable as *mut ());
static RESTORE_FN: AtomicPtr<()> = AtomicPtr::new(default_restore as *mut ());

/// Registers the platform's interrupt disable/restore hooks.
///
/// Must be called once during early boot, before any port is installed.
/// Until called, `IrqSpinLock` degrades to a plain spinlock (suitable for
/// host unit tests, where there are no interrupts to disable).
///
/// # Safety
///
/// `disable` must genuinely mask interrupts on the current core and
/// `restore` must undo exactly what the paired `disable` call did.
pub unsafe fn set_irq_control(disable: DisableFn, restore: RestoreFn) {
    DISABLE_FN.store(disable as *mut (), Ordering::Release);
    RESTORE_FN.store(restore as *mut (), Ordering::Release);
}

fn disable_irqs() -> usize {
    let f: DisableFn = unsafe { core::mem::transmute(DISABLE_FN.load(Ordering::Acquire)) };
    f()
}

fn restore_irqs(state: usize) {
    let f: RestoreFn = unsafe { core::mem::transmute(RESTORE_FN.load(Ordering::Acquire)) };
    f(state)
}

/// A spinlock that additionally disables interrupts while held.
///
/// Const-constructable for use in `static` port state.
pub struct IrqSpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: exclusive access to `T` is guaranteed by the atomic `locked` flag.
unsafe impl<T: Send> Send for IrqSpinLock<T> {}
// SAFETY: same as above.
unsafe impl<T: Send> Sync for IrqSpinLock<T> {}

impl<T> IrqSpinLock<T> {
    /// Creates a new unlocked lock wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, disabling interrupts on the current core.
    ///
    /// Returns a guard that restores the prior interrupt state and unlocks
    /// when dropped. Never blocks on a waiter queue: this lock is meant to
    /// be held only for a handful of instructions, so any contention
    /// resolves by spinning.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let irq_state = disable_irqs();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        IrqSpinLockGuard {
            lock: self,
            irq_state,
        }
    }
}

/// RAII guard returned by [`IrqSpinLock::lock`].
pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    irq_state: usize,
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard guarantees exclusive access while it exists.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard guarantees exclusive access while it exists.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        restore_irqs(self.irq_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_allows_mutation() {
        let lock = IrqSpinLock::new(0u32);
        *lock.lock() += 1;
        *lock.lock() += 1;
        assert_eq!(*lock.lock(), 2);
    }

    #[test]
    fn guard_releases_on_drop() {
        let lock = IrqSpinLock::new(());
        {
            let _g = lock.lock();
        }
        // If the lock were still held this would deadlock the test (spin forever),
        // so simply acquiring it again is the assertion.
        let _g = lock.lock();
    }
}

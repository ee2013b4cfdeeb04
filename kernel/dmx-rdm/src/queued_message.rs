//! Bounded FIFO of PIDs whose value changed since it was last reported to a
//! controller, consumed by `QUEUED_MESSAGE` GETs and reflected in every
//! response's `message_count` field.

use planck_noalloc::ringbuf::RingBuf;

/// Default capacity (one more slot than usable, per [`RingBuf`]'s
/// full-at-`SIZE-1` convention, to land on the documented 64-entry queue).
pub const CAPACITY: usize = 65;

/// The queued-message ring.
pub struct QueuedMessages {
    ring: RingBuf<u16, CAPACITY>,
}

impl QueuedMessages {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self { ring: RingBuf::new() }
    }

    /// Enqueues `pid` if it is not already present. Returns `false` if the
    /// queue was full and the PID could not be added.
    pub fn enqueue(&mut self, pid: u16) -> bool {
        if self.contains(pid) {
            return true;
        }
        self.ring.try_push(pid).is_ok()
    }

    /// Returns `true` if `pid` is currently queued.
    #[must_use]
    pub fn contains(&self, pid: u16) -> bool {
        // `RingBuf` has no iterator; walk via repeated pop/push into a scratch
        // copy. Cheap: queue depth is bounded by `CAPACITY`.
        let mut scratch = self.ring;
        let mut found = false;
        while let Some(p) = scratch.pop() {
            if p == pid {
                found = true;
            }
        }
        found
    }

    /// Pops the oldest queued PID, if any.
    pub fn pop(&mut self) -> Option<u16> {
        self.ring.pop()
    }

    /// Number of PIDs currently queued, saturated to `u8::MAX` for the
    /// wire's `message_count` field.
    #[must_use]
    pub fn message_count(&self) -> u8 {
        self.ring.len().min(u8::MAX as usize) as u8
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl Default for QueuedMessages {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_is_idempotent() {
        let mut q = QueuedMessages::new();
        assert!(q.enqueue(0x00F0));
        assert!(q.enqueue(0x00F0));
        assert_eq!(q.message_count(), 1);
    }

    #[test]
    fn pops_in_fifo_order() {
        let mut q = QueuedMessages::new();
        q.enqueue(1);
        q.enqueue(2);
        q.enqueue(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn empty_queue_reports_zero_count() {
        let q = QueuedMessages::new();
        assert!(q.is_empty());
        assert_eq!(q.message_count(), 0);
    }
}

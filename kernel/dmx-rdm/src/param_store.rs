//! Bounded-allocation RDM parameter table.
//!
//! Storage is a bump allocator over a fixed-size byte slab: parameters never
//! free their storage, because a parameter's lifetime is the port's
//! lifetime. A free list would only add failure modes no caller needs.

use bitflags::bitflags;
use heapless::Vec;

use crate::error::{DmxError, Result};

/// Default parameter heap size, large enough for the always-required PIDs
/// plus a modest set of manufacturer-specific ones.
pub const DEFAULT_HEAP_SIZE: usize = 1024;

/// Default parameter table capacity (9 required + 25 optional, per the RDM
/// responder budget this stack targets).
pub const DEFAULT_TABLE_CAPACITY: usize = 34;

/// Range reserved for manufacturer-specific PIDs.
pub const MANUFACTURER_PID_RANGE: core::ops::RangeInclusive<u16> = 0x8000..=0xFFDF;

bitflags! {
    /// Which RDM command classes a parameter responds to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandClasses: u8 {
        /// `DISCOVERY_COMMAND`.
        const DISC = 1 << 0;
        /// `GET_COMMAND`.
        const GET = 1 << 1;
        /// `SET_COMMAND`.
        const SET = 1 << 2;
    }
}

/// Static schema for one registered parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamDef {
    /// Command classes this PID accepts.
    pub command_classes: CommandClasses,
    /// RDM data-type code (informational; carried through to
    /// `PARAMETER_DESCRIPTION` responses).
    pub data_type: u8,
    /// Declared maximum PDL for a SET to this PID (&le; 231).
    pub pdl_size: u8,
    /// Bytes reserved for this parameter's value in the heap. Must be
    /// &ge; `pdl_size`; larger than `pdl_size` when the stored
    /// representation differs from the wire representation (e.g. a
    /// personality index stored as `u16` but always sent as one byte).
    pub alloc_size: u16,
    /// Manufacturer-specific PIDs (`0x8000..=0xFFDF`) carry a description
    /// surfaced via `PARAMETER_DESCRIPTION`; standard PIDs leave this empty.
    pub description: &'static str,
    /// Persist this parameter's value across reboots.
    pub non_volatile: bool,
}

#[derive(Debug, Clone, Copy)]
enum ParamKind {
    Stored { offset: usize },
    Alias { offset: usize },
    Deterministic,
}

#[derive(Debug, Clone, Copy)]
struct ParamEntry {
    pid: u16,
    def: ParamDef,
    kind: ParamKind,
}

/// A port's parameter table and backing heap.
///
/// `HEAP` and `CAP` are fixed at compile time (see [`DEFAULT_HEAP_SIZE`] /
/// [`DEFAULT_TABLE_CAPACITY`]) since this crate never allocates.
pub struct ParamStore<const HEAP: usize = DEFAULT_HEAP_SIZE, const CAP: usize = DEFAULT_TABLE_CAPACITY> {
    heap: [u8; HEAP],
    heap_used: usize,
    entries: Vec<ParamEntry, CAP>,
}

impl<const HEAP: usize, const CAP: usize> ParamStore<HEAP, CAP> {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heap: [0u8; HEAP],
            heap_used: 0,
            entries: Vec::new(),
        }
    }

    fn find(&self, pid: u16) -> Option<usize> {
        self.entries.iter().position(|e| e.pid == pid)
    }

    /// Returns `true` if `pid` is registered.
    #[must_use]
    pub fn exists(&self, pid: u16) -> bool {
        self.find(pid).is_some()
    }

    /// Registers a new parameter with its own backing storage, seeded from
    /// `init_value` (zero-padded or truncated to `def.alloc_size`).
    pub fn add_new(&mut self, pid: u16, def: ParamDef, init_value: &[u8]) -> Result<()> {
        if self.exists(pid) {
            return Err(DmxError::InvalidState);
        }
        let size = def.alloc_size as usize;
        if self.heap_used + size > HEAP {
            return Err(DmxError::NoMem);
        }
        let offset = self.heap_used;
        let n = init_value.len().min(size);
        self.heap[offset..offset + n].copy_from_slice(&init_value[..n]);
        for b in &mut self.heap[offset + n..offset + size] {
            *b = 0;
        }
        self.heap_used += size;
        self.entries
            .push(ParamEntry { pid, def, kind: ParamKind::Stored { offset } })
            .map_err(|_| DmxError::NoMem)
    }

    /// Registers `pid` as an alias into `base_pid`'s storage at a byte
    /// `offset`, reusing the base parameter's backing bytes without a new
    /// heap allocation.
    pub fn add_alias(&mut self, pid: u16, def: ParamDef, base_pid: u16, offset: usize) -> Result<()> {
        if self.exists(pid) {
            return Err(DmxError::InvalidState);
        }
        let base = self.find(base_pid).ok_or(DmxError::InvalidArg)?;
        let base_offset = match self.entries[base].kind {
            ParamKind::Stored { offset } | ParamKind::Alias { offset } => offset,
            ParamKind::Deterministic => return Err(DmxError::InvalidArg),
        };
        let abs_offset = base_offset + offset;
        if abs_offset + def.alloc_size as usize > self.heap_used {
            return Err(DmxError::InvalidArg);
        }
        self.entries
            .push(ParamEntry { pid, def, kind: ParamKind::Alias { offset: abs_offset } })
            .map_err(|_| DmxError::NoMem)
    }

    /// Registers `pid` with no backing storage; its value is computed
    /// entirely by the responder's dispatch logic (see
    /// [`crate::responder`]).
    pub fn add_deterministic(&mut self, pid: u16, def: ParamDef) -> Result<()> {
        if self.exists(pid) {
            return Err(DmxError::InvalidState);
        }
        self.entries
            .push(ParamEntry { pid, def, kind: ParamKind::Deterministic })
            .map_err(|_| DmxError::NoMem)
    }

    /// Reads the current raw bytes backing `pid`.
    ///
    /// Returns `None` for a deterministic PID — its value has no storage
    /// and must be computed by the caller.
    #[must_use]
    pub fn get(&self, pid: u16) -> Option<&[u8]> {
        let idx = self.find(pid)?;
        let entry = &self.entries[idx];
        match entry.kind {
            ParamKind::Stored { offset } | ParamKind::Alias { offset } => {
                Some(&self.heap[offset..offset + entry.def.alloc_size as usize])
            },
            ParamKind::Deterministic => None,
        }
    }

    /// Overwrites `pid`'s backing bytes, truncating to `alloc_size`.
    /// Returns the number of bytes written.
    pub fn set(&mut self, pid: u16, data: &[u8]) -> Result<usize> {
        let idx = self.find(pid).ok_or(DmxError::InvalidArg)?;
        let entry = self.entries[idx];
        let offset = match entry.kind {
            ParamKind::Stored { offset } | ParamKind::Alias { offset } => offset,
            ParamKind::Deterministic => return Err(DmxError::InvalidState),
        };
        let size = entry.def.alloc_size as usize;
        let n = data.len().min(size);
        self.heap[offset..offset + n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    /// Like [`set`](Self::set), and additionally enqueues `pid` on
    /// `queue` if it is not already present.
    pub fn set_and_queue(
        &mut self,
        pid: u16,
        data: &[u8],
        queue: &mut crate::queued_message::QueuedMessages,
    ) -> Result<usize> {
        let n = self.set(pid, data)?;
        queue.enqueue(pid);
        Ok(n)
    }

    /// Copies up to `out.len()` registered PIDs, in insertion order, into
    /// `out`. Returns the total number of registered PIDs (which may
    /// exceed `out.len()`).
    pub fn list(&self, out: &mut [u16]) -> usize {
        for (slot, entry) in out.iter_mut().zip(self.entries.iter()) {
            *slot = entry.pid;
        }
        self.entries.len()
    }

    /// Returns the schema registered for `pid`.
    #[must_use]
    pub fn get_schema(&self, pid: u16) -> Option<&ParamDef> {
        self.find(pid).map(|idx| &self.entries[idx].def)
    }

    /// Returns the manufacturer-specific description for `pid`, or `None`
    /// if `pid` is outside [`MANUFACTURER_PID_RANGE`] or unregistered.
    #[must_use]
    pub fn get_description(&self, pid: u16) -> Option<&str> {
        if !MANUFACTURER_PID_RANGE.contains(&pid) {
            return None;
        }
        self.get_schema(pid).map(|def| def.description)
    }

    /// Returns `true` if `pid` is a deterministic parameter.
    #[must_use]
    pub fn is_deterministic(&self, pid: u16) -> bool {
        matches!(self.find(pid).map(|idx| self.entries[idx].kind), Some(ParamKind::Deterministic))
    }

    /// Total registered parameter count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no parameters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<const HEAP: usize, const CAP: usize> Default for ParamStore<HEAP, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

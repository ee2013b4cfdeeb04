//! ANSI E1.20 binary-search discovery: finds every responder's UID on a
//! bus without any of them needing to be addressed individually first.

use heapless::Vec;

use crate::controller::{Bus, Controller, RdmOutcome};
use crate::error::Result;
use crate::pdu::command_class;
use crate::pids;
use crate::uid::Uid;
use crate::{ddebug, dinfo, dwarn};

/// Maximum nesting depth of the discovery interval stack (48-bit address
/// space bisected down to a single UID takes at most 48 splits, plus the
/// root).
const MAX_STACK_DEPTH: usize = 49;
/// How many times a leaf or branch request is retried before giving up on
/// that interval.
const MAX_RETRIES: u8 = 3;

/// Counters accumulated during a discovery run, for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    /// Number of responders found and muted.
    pub devices_found: u32,
    /// Total RDM frames sent during the run (branches, mutes, the initial
    /// un-mute-all).
    pub frames_sent: u32,
    /// Number of `DISC_UNIQUE_BRANCH` attempts that came back as a
    /// collision (multiple responders in range).
    pub collisions_observed: u32,
}

enum BranchOutcome {
    Empty,
    Found(Uid),
    Collision,
}

/// Runs a full discovery pass, invoking `callback` once per UID found (in
/// the order discovered, not sorted), and returns the run's statistics.
///
/// Every found device is left muted on the bus, so a second call will not
/// re-discover already-known devices unless they are first un-muted.
pub fn discover<B: Bus>(controller: &mut Controller<B>, mut callback: impl FnMut(Uid)) -> Result<DiscoveryStats> {
    let mut stats = DiscoveryStats::default();

    controller.rdm_request(Uid::BROADCAST_ALL, command_class::DISCOVERY, pids::DISC_UN_MUTE, &[], &mut [])?;
    stats.frames_sent += 1;

    let mut stack: Vec<(u64, u64), MAX_STACK_DEPTH> = Vec::new();
    let root_hi = Uid::BROADCAST_ALL.as_u64() - 1;
    let _ = stack.push((0, root_hi));

    while let Some((lo, hi)) = stack.pop() {
        if lo == hi {
            stats.frames_sent += mute_then_report(controller, Uid::from_u64(lo), &mut callback, &mut stats);
            continue;
        }

        match branch_with_retries(controller, Uid::from_u64(lo), Uid::from_u64(hi), &mut stats) {
            BranchOutcome::Empty => {},
            BranchOutcome::Collision => {
                stats.collisions_observed += 1;
                let mid = lo + (hi - lo) / 2;
                if stack.push((mid + 1, hi)).is_err() || stack.push((lo, mid)).is_err() {
                    dwarn!("discovery stack overflow, dropping interval");
                }
            },
            BranchOutcome::Found(uid) => {
                stats.frames_sent += mute_then_report(controller, uid, &mut callback, &mut stats);
                // Quick-find: more devices can sit in the same range once
                // the first is muted off it.
                loop {
                    stats.frames_sent += 1;
                    match controller.discover_unique_branch(Uid::from_u64(lo), Uid::from_u64(hi)) {
                        Ok(Some(found)) => {
                            stats.frames_sent += mute_then_report(controller, found, &mut callback, &mut stats);
                        },
                        Ok(None) => break,
                        Err(_) => {
                            stats.collisions_observed += 1;
                            let mid = lo + (hi - lo) / 2;
                            if stack.push((mid + 1, hi)).is_err() || stack.push((lo, mid)).is_err() {
                                dwarn!("discovery stack overflow, dropping interval");
                            }
                            break;
                        },
                    }
                }
            },
        }
    }

    dinfo!("discovery complete: {} device(s) found", stats.devices_found);
    Ok(stats)
}

fn branch_with_retries<B: Bus>(controller: &mut Controller<B>, lower: Uid, upper: Uid, stats: &mut DiscoveryStats) -> BranchOutcome {
    for _ in 0..MAX_RETRIES {
        stats.frames_sent += 1;
        match controller.discover_unique_branch(lower, upper) {
            Ok(Some(uid)) => return BranchOutcome::Found(uid),
            Ok(None) => continue,
            Err(_) => return BranchOutcome::Collision,
        }
    }
    BranchOutcome::Empty
}

fn mute_then_report<B: Bus>(controller: &mut Controller<B>, uid: Uid, callback: &mut impl FnMut(Uid), stats: &mut DiscoveryStats) -> u32 {
    let mut frames = 0u32;
    let mut muted = false;
    for _ in 0..MAX_RETRIES {
        frames += 1;
        if matches!(
            controller.rdm_request(uid, command_class::DISCOVERY, pids::DISC_MUTE, &[], &mut []),
            Ok(RdmOutcome::Ack(_))
        ) {
            muted = true;
            break;
        }
    }
    if !muted {
        frames += 1;
        let flipped = uid.byte_reversed();
        if matches!(
            controller.rdm_request(flipped, command_class::DISCOVERY, pids::DISC_MUTE, &[], &mut []),
            Ok(RdmOutcome::Ack(_))
        ) {
            muted = true;
        }
    }
    if !muted {
        dwarn!("could not mute {} after discovery, reporting anyway", uid);
    }
    ddebug!("discovered {}", uid);
    stats.devices_found += 1;
    callback(uid);
    frames
}

//! DMX512 / RDM (ANSI E1.20) line-level framing, classification, and
//! responder/controller stack.
//!
//! The crate is organized bottom-up:
//!
//! - [`error`], [`log`] — shared error taxonomy and the leveled logging
//!   facade every other module calls through.
//! - [`uid`], [`pdu`], [`buffer`], [`classifier`], [`timing`] — wire-format
//!   primitives with no hardware dependency, usable standalone.
//! - [`framing`] — the interrupt-driven line-level engine built on top of
//!   `dmx_hal`'s peripheral traits and `dmx_core`'s synchronization
//!   primitives.
//! - [`param_store`], [`personality`], [`queued_message`], [`format`],
//!   [`pids`], [`responder`] — the device-side RDM parameter table and
//!   request dispatch.
//! - [`controller`], [`discovery`] — the bus-master side: single RDM
//!   transactions and full binary-search discovery.
//! - [`port`] — the per-port façade tying framing, responder and
//!   controller together behind one lock.
//! - [`registry`] — the process-wide port table and binding-UID derivation.
//! - [`nvs`] — the non-volatile parameter persistence seam.
//! - [`sniffer`] — the optional BREAK/MAB width diagnostic recorder.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod buffer;
pub mod classifier;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod flags;
pub mod format;
pub mod framing;
pub mod log;
pub mod nvs;
pub mod param_store;
pub mod pdu;
pub mod personality;
pub mod pids;
pub mod port;
pub mod queued_message;
pub mod registry;
pub mod responder;
pub mod sniffer;
pub mod timing;
pub mod uid;

pub use error::{DmxError, Result};
pub use log::{set_log_fn, LogFn, LogLevel};
pub use port::Port;
pub use uid::Uid;

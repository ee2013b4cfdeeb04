//! Per-port driver façade: the public API surface a task calls into.
//!
//! Ties the interrupt-driven [`Engine`] to a [`Responder`] (device-side
//! dispatch) and to [`Controller`]/[`discovery::discover`] (bus-master
//! side) behind one [`RecursiveMutex`], so composite operations like
//! `discover_with_callback` can call `rdm_request`, which calls `send`,
//! without deadlocking against themselves.

use dmx_core::mutex::{RecursiveMutex, RecursiveMutexGuard};
use dmx_core::wakeup::Clock;
use dmx_hal::{GpioEdgeSense, TimerHal, UartHal};

use crate::buffer::MAX_FRAME;
use crate::classifier::PacketKind;
use crate::controller::{Bus, Controller, RdmOutcome};
use crate::discovery::{self, DiscoveryStats};
use crate::error::{DmxError, Result};
use crate::flags::PortFlags;
use crate::framing::{Engine, HEAD_IDLE};
use crate::pdu::{HEADER_LEN, MAX_PDL};
use crate::pdu::RdmHeader;
use crate::responder::{Responder, ResponderConfig};
use crate::timing;
use crate::uid::Uid;
use crate::{dinfo, dwarn};

/// State guarded by the port's recursive mutex.
struct PortInner<U, T, G, C> {
    engine: Engine<U, T, G, C>,
    responder: Option<Responder>,
    uid: Option<Uid>,
    controller_tn: u8,
    port_number: u8,
}

/// A single DMX/RDM port, combining the framing engine with device (
/// [`Responder`]) and/or bus-master ([`Controller`]) roles.
///
/// Generic over the same HAL traits as [`Engine`]; a host test build
/// instantiates this with `dmx_hal::mock`'s fakes.
pub struct Port<U, T, G, C> {
    inner: RecursiveMutex<PortInner<U, T, G, C>>,
}

impl<U, T, G, C> Port<U, T, G, C>
where
    U: UartHal,
    T: TimerHal,
    G: GpioEdgeSense,
    C: Clock,
{
    /// Creates a new, disabled port wrapping the given peripherals.
    pub fn new(uart: U, timer: T, gpio: G, clock: C, port_number: u8) -> Self {
        Self {
            inner: RecursiveMutex::new(PortInner {
                engine: Engine::new(uart, timer, gpio, clock),
                responder: None,
                uid: None,
                controller_tn: 0,
                port_number,
            }),
        }
    }

    /// Installs an RDM responder bound to `uid` and enables the engine.
    ///
    /// Fails with [`DmxError::InvalidState`] if a responder is already
    /// installed; callers must [`delete`](Self::delete) first.
    pub fn install_responder(&self, uid: Uid, config: ResponderConfig<'_>) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.responder.is_some() {
            return Err(DmxError::InvalidState);
        }
        let responder = Responder::install(uid, config)?;
        guard.responder = Some(responder);
        guard.uid = Some(uid);
        guard.controller_tn = 0;
        guard.engine.enable();
        dinfo!("port {} installed as responder uid={}", guard.port_number, uid);
        Ok(())
    }

    /// Installs this port as a bus-master under `uid`, with no responder
    /// role. Enables the engine so `receive`/`rdm_request` can listen.
    pub fn install_controller(&self, uid: Uid) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.uid.is_some() {
            return Err(DmxError::InvalidState);
        }
        guard.uid = Some(uid);
        guard.controller_tn = 0;
        guard.engine.enable();
        dinfo!("port {} installed as controller uid={}", guard.port_number, uid);
        Ok(())
    }

    /// Tears the port down: disables the engine and drops any responder
    /// state. A subsequent `install_responder`/`install_controller` starts
    /// from a clean slate (the caller is responsible for re-seeding
    /// non-volatile parameters via [`crate::nvs`]).
    pub fn delete(&self) {
        let mut guard = self.inner.lock();
        guard.engine.disable();
        guard.responder = None;
        guard.uid = None;
        guard.controller_tn = 0;
    }

    /// Disables the engine without forgetting installed state, so a later
    /// `enable` resumes where it left off (used to interleave with flash
    /// writes that stall the ISR).
    pub fn disable(&self) {
        self.inner.lock().engine.disable();
    }

    /// Re-enables a previously `disable`d, still-installed port.
    pub fn enable(&self) {
        self.inner.lock().engine.enable();
    }

    /// This port's RDM UID, if installed.
    #[must_use]
    pub fn uid(&self) -> Option<Uid> {
        self.inner.lock().uid
    }

    /// Sends a plain DMX512 frame (`data[0]` is the start code, up to 512
    /// slots following). Fails with [`DmxError::InvalidState`] if the
    /// engine is mid-transmit.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > 513 {
            return Err(DmxError::InvalidArg);
        }
        let mut guard = self.inner.lock();
        let engine = &mut guard.engine;
        if !engine.lock_state().flags.contains(PortFlags::IDLE) {
            return Err(DmxError::InvalidState);
        }
        engine.write_tx_buffer(data);
        engine.wake_token().arm();
        engine.begin_send(data.len() as u16);
        if !engine.wake_token().wait_timeout(engine.clock(), timing::CONTROLLER_TIMEOUT_US as u64) {
            return Err(DmxError::Timeout);
        }
        Ok(())
    }

    /// Blocks for up to `timeout_us` waiting for any packet (DMX or RDM)
    /// to arrive, returning its length and classification.
    pub fn receive(&self, out: &mut [u8], timeout_us: u32) -> Result<(usize, PacketKind)> {
        let mut guard = self.inner.lock();
        let engine = &mut guard.engine;
        engine.wake_token().arm();
        if !engine.wake_token().wait_timeout(engine.clock(), timeout_us as u64) {
            return Err(DmxError::Timeout);
        }
        let (kind, error) = {
            let s = engine.lock_state();
            (s.pending_kind, s.pending_error)
        };
        let n = engine.read_rx_buffer(out);
        {
            let mut s = engine.lock_state();
            s.flags.remove(PortFlags::HAS_DATA);
            s.head = HEAD_IDLE;
        }
        if let Some(err) = error {
            return Err(err);
        }
        Ok((n, kind.ok_or(DmxError::Timeout)?))
    }

    /// Issues a single RDM request and waits for its response, honouring
    /// one `ACK_TIMER` deferral.
    pub fn rdm_request(&self, dest: Uid, command_class: u8, pid: u16, payload: &[u8], out: &mut [u8]) -> Result<RdmOutcome> {
        let mut controller = self.controller()?;
        let result = controller.rdm_request(dest, command_class, pid, payload, out);
        self.save_tn(controller.tn());
        result
    }

    /// Runs a full binary-search discovery pass, invoking `callback` once
    /// per UID found.
    pub fn discover_with_callback(&self, callback: impl FnMut(Uid)) -> Result<DiscoveryStats> {
        let mut controller = self.controller()?;
        let result = discovery::discover(&mut controller, callback);
        self.save_tn(controller.tn());
        result
    }

    /// If `HAS_DATA` is set and the pending packet is an RDM request
    /// addressed to this port's responder, dispatches it and sends the
    /// response (if any). Returns `true` if a packet was consumed (whether
    /// or not it was ours to answer), `false` if nothing was pending.
    ///
    /// Only meaningful on a port installed via
    /// [`install_responder`](Self::install_responder); a controller-only
    /// port should call [`receive`](Self::receive) instead.
    pub fn poll_incoming(&self) -> Result<bool> {
        let mut guard = self.inner.lock();
        let PortInner { engine, responder, port_number, .. } = &mut *guard;
        let Some(responder) = responder.as_mut() else {
            return Ok(false);
        };

        let (has_data, kind, error) = {
            let s = engine.lock_state();
            (s.flags.contains(PortFlags::HAS_DATA), s.pending_kind, s.pending_error)
        };
        if !has_data {
            return Ok(false);
        }

        let mut raw = [0u8; MAX_FRAME];
        let n = engine.read_rx_buffer(&mut raw);
        {
            let mut s = engine.lock_state();
            s.flags.remove(PortFlags::HAS_DATA);
            s.head = HEAD_IDLE;
        }

        if let Some(err) = error {
            dwarn!("port {} rx error: {}", port_number, err);
            return Err(err);
        }
        if kind != Some(PacketKind::Rdm) {
            return Ok(false);
        }

        let (header, payload) = RdmHeader::parse(&raw[..n])?;
        let addressed = header.destination == responder.uid()
            || header.destination == responder.uid().manufacturer_broadcast()
            || header.destination == Uid::BROADCAST_ALL;
        if !addressed {
            return Ok(false);
        }

        let mut response = [0u8; HEADER_LEN + MAX_PDL + 2];
        if let Some(resp_len) = responder.dispatch(&header, payload, &mut response)? {
            // Arms the transmit sequencer and returns immediately; the
            // caller observes completion on a later `poll_incoming` (or,
            // on target, the TX_DONE IRQ finishes it in the background).
            engine.write_tx_buffer(&response[..resp_len]);
            engine.begin_send(resp_len as u16);
        }
        Ok(true)
    }

    fn controller(&self) -> Result<Controller<PortBus<'_, U, T, G, C>>> {
        let guard = self.inner.lock();
        let uid = guard.uid.ok_or(DmxError::InvalidState)?;
        let tn = guard.controller_tn;
        Ok(Controller::new_with_tn(PortBus { guard }, uid, tn))
    }

    fn save_tn(&self, tn: u8) {
        self.inner.lock().controller_tn = tn;
    }
}

/// Adapts a locked [`Port`] into [`Bus`], for [`Controller`] and
/// [`discovery::discover`] to drive.
struct PortBus<'a, U, T, G, C> {
    guard: RecursiveMutexGuard<'a, PortInner<U, T, G, C>>,
}

impl<U, T, G, C> Bus for PortBus<'_, U, T, G, C>
where
    U: UartHal,
    T: TimerHal,
    G: GpioEdgeSense,
    C: Clock,
{
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let engine = &mut self.guard.engine;
        engine.write_tx_buffer(frame);
        engine.wake_token().arm();
        engine.begin_send(frame.len() as u16);
        if !engine.wake_token().wait_timeout(engine.clock(), timing::CONTROLLER_TIMEOUT_US as u64) {
            return Err(DmxError::Timeout);
        }
        Ok(())
    }

    fn receive(&mut self, out: &mut [u8], timeout_us: u32) -> Result<(usize, PacketKind)> {
        let engine = &mut self.guard.engine;
        engine.wake_token().arm();
        // A discovery response carries no BREAK, so the window is armed
        // to accept data immediately; an ordinary response's own BREAK
        // re-synchronizes `head` harmlessly before its payload arrives.
        engine.arm_response_window(true);
        if !engine.wake_token().wait_timeout(engine.clock(), timeout_us as u64) {
            engine.cancel_response_window();
            return Err(DmxError::Timeout);
        }
        let (kind, error) = {
            let s = engine.lock_state();
            (s.pending_kind, s.pending_error)
        };
        let n = engine.read_rx_buffer(out);
        {
            let mut s = engine.lock_state();
            s.flags.remove(PortFlags::HAS_DATA);
            s.head = HEAD_IDLE;
        }
        if let Some(err) = error {
            return Err(err);
        }
        Ok((n, kind.ok_or(DmxError::Timeout)?))
    }

    fn delay_us(&mut self, us: u32) {
        let clock = self.guard.engine.clock();
        let deadline = clock.now_micros().saturating_add(us as u64);
        while clock.now_micros() < deadline {
            core::hint::spin_loop();
        }
    }
}

//! Synchronous RDM controller primitives: `send`/`receive`/`rdm_request`.
//!
//! The controller is generic over a [`Bus`] so it can be driven by the real
//! [`crate::framing::Engine`] on target or by a scripted fake in tests,
//! without either side knowing about the other.

use crate::classifier::PacketKind;
use crate::error::{DmxError, Result};
use crate::pdu::{command_class, response_type, RdmHeader};
use crate::timing::{ACK_TIMER_UNIT_US, BROADCAST_GUARD_US, CONTROLLER_TIMEOUT_US};
use crate::uid::Uid;
use crate::{ddebug, dtrace, dwarn};

/// A full-duplex, half-duplex-turnaround transport the controller drives.
///
/// Implementations own bus turnaround (RTS), BREAK/MAB timing, and wake-up
/// on packet completion; the controller only sees bytes in and bytes (plus
/// a classification) out.
pub trait Bus {
    /// Sends a fully serialized frame (start code included) and blocks
    /// until it has gone out on the wire.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Blocks until a packet completes or `timeout_us` elapses.
    ///
    /// On timeout returns `Err(DmxError::Timeout)`; on success returns the
    /// received byte count and how the classifier tagged the packet.
    fn receive(&mut self, out: &mut [u8], timeout_us: u32) -> Result<(usize, PacketKind)>;

    /// Blocks the calling context for approximately `us` microseconds,
    /// without touching the bus (used for `ACK_TIMER` deferrals and the
    /// broadcast guard time).
    fn delay_us(&mut self, us: u32);
}

/// Outcome of a single (non-discovery) RDM request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdmOutcome {
    /// `ACK`, with `usize` response payload bytes written into the
    /// caller's `out` buffer.
    Ack(usize),
    /// `NACK_REASON`.
    Nack(u16),
    /// The request was a broadcast; no response is expected.
    NoResponse,
}

/// A controller bound to one UID, driving one [`Bus`].
pub struct Controller<B: Bus> {
    bus: B,
    uid: Uid,
    tn: u8,
}

impl<B: Bus> Controller<B> {
    /// Creates a controller that will present `uid` as the source of every
    /// request it issues.
    pub fn new(bus: B, uid: Uid) -> Self {
        Self { bus, uid, tn: 0 }
    }

    /// Creates a controller resuming from a previously observed `tn`, so a
    /// caller that reconstructs a `Controller` across calls (the port
    /// facade does, since its `Bus` borrows the port lock per-call) keeps
    /// transaction numbers monotonic instead of restarting at zero.
    pub(crate) fn new_with_tn(bus: B, uid: Uid, tn: u8) -> Self {
        Self { bus, uid, tn }
    }

    /// The current transaction number counter, for a caller that needs to
    /// persist it across `Controller` instances (see [`new_with_tn`](Self::new_with_tn)).
    #[must_use]
    pub(crate) fn tn(&self) -> u8 {
        self.tn
    }

    /// The UID this controller presents as the request source.
    #[must_use]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    fn next_tn(&mut self) -> u8 {
        let tn = self.tn;
        self.tn = self.tn.wrapping_add(1);
        tn
    }

    /// Sends a plain DMX512 frame (`data[0]` is the start code).
    pub fn send_dmx(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > 513 {
            return Err(DmxError::InvalidArg);
        }
        self.bus.send(data)
    }

    /// Blocks for up to `timeout_us` waiting for any packet (DMX or RDM)
    /// to arrive, returning its length and classification.
    pub fn receive(&mut self, out: &mut [u8], timeout_us: u32) -> Result<(usize, PacketKind)> {
        self.bus.receive(out, timeout_us)
    }

    /// Issues a GET/SET/DISC_MUTE/DISC_UN_MUTE request to `dest` and waits
    /// for its response, honoring a single `ACK_TIMER` deferral.
    ///
    /// `command_class` must be one of [`command_class::GET`],
    /// [`command_class::SET`], or [`command_class::DISCOVERY`] (for
    /// `DISC_MUTE`/`DISC_UN_MUTE` — `DISC_UNIQUE_BRANCH` is handled by
    /// [`crate::discovery`] directly, since its reply is Manchester-coded
    /// rather than a normal RDM PDU).
    pub fn rdm_request(&mut self, dest: Uid, command_class: u8, pid: u16, payload: &[u8], out: &mut [u8]) -> Result<RdmOutcome> {
        self.request_inner(dest, command_class, pid, payload, out, true)
    }

    fn request_inner(
        &mut self,
        dest: Uid,
        command_class: u8,
        pid: u16,
        payload: &[u8],
        out: &mut [u8],
        allow_deferral: bool,
    ) -> Result<RdmOutcome> {
        let broadcast = dest.is_broadcast();
        let tn = self.next_tn();
        let header = RdmHeader {
            destination: dest,
            source: self.uid,
            tn,
            port_or_response: 0,
            message_count: 0,
            sub_device: 0,
            command_class,
            pid,
            pdl: payload.len() as u8,
        };
        let mut frame = [0u8; crate::pdu::HEADER_LEN + crate::pdu::MAX_PDL + 2];
        let n = header.encode(payload, &mut frame)?;
        dtrace!("rdm_request tn={} dest={} pid={:#06x}", tn, dest, pid);
        self.bus.send(&frame[..n])?;

        if broadcast {
            self.bus.delay_us(BROADCAST_GUARD_US as u32);
            return Ok(RdmOutcome::NoResponse);
        }

        let mut resp_buf = [0u8; crate::pdu::HEADER_LEN + crate::pdu::MAX_PDL + 2];
        let (resp_len, kind) = self.bus.receive(&mut resp_buf, CONTROLLER_TIMEOUT_US)?;
        if kind != PacketKind::Rdm {
            return Err(DmxError::InvalidResponse);
        }
        let (resp_header, resp_payload) = RdmHeader::parse(&resp_buf[..resp_len])?;
        if resp_header.destination != self.uid || resp_header.source != dest || resp_header.tn != tn {
            return Err(DmxError::InvalidResponse);
        }

        match resp_header.port_or_response {
            response_type::ACK => {
                let n = resp_payload.len().min(out.len());
                out[..n].copy_from_slice(&resp_payload[..n]);
                Ok(RdmOutcome::Ack(n))
            },
            response_type::NACK_REASON => {
                if resp_payload.len() < 2 {
                    return Err(DmxError::InvalidResponse);
                }
                Ok(RdmOutcome::Nack(u16::from_be_bytes([resp_payload[0], resp_payload[1]])))
            },
            response_type::ACK_TIMER => {
                if !allow_deferral || resp_payload.len() < 2 {
                    return Err(DmxError::Timeout);
                }
                let units = u16::from_be_bytes([resp_payload[0], resp_payload[1]]);
                ddebug!("ACK_TIMER {} units, re-polling pid={:#06x}", units, pid);
                self.bus.delay_us((units as u64 * ACK_TIMER_UNIT_US).min(u32::MAX as u64) as u32);
                self.request_inner(dest, command_class, pid, payload, out, false)
            },
            response_type::ACK_OVERFLOW => {
                dwarn!("unexpected ACK_OVERFLOW from {} pid={:#06x}", dest, pid);
                Err(DmxError::InvalidResponse)
            },
            _ => Err(DmxError::InvalidResponse),
        }
    }

    /// Sends a broadcast `DISC_UNIQUE_BRANCH(lower, upper)` and waits for a
    /// Manchester-coded discovery response.
    ///
    /// Returns `Ok(Some(uid))` for exactly one clean response, `Ok(None)`
    /// on timeout (nothing in range), or `Err` when a response arrived but
    /// failed to decode — the caller treats that as a multi-responder
    /// collision.
    pub fn discover_unique_branch(&mut self, lower: Uid, upper: Uid) -> Result<Option<Uid>> {
        let header = RdmHeader {
            destination: Uid::BROADCAST_ALL,
            source: self.uid,
            tn: self.next_tn(),
            port_or_response: 0,
            message_count: 0,
            sub_device: 0,
            command_class: command_class::DISCOVERY,
            pid: crate::pids::DISC_UNIQUE_BRANCH,
            pdl: 12,
        };
        let mut payload = [0u8; 12];
        payload[0..6].copy_from_slice(&lower.to_bytes());
        payload[6..12].copy_from_slice(&upper.to_bytes());
        let mut frame = [0u8; crate::pdu::HEADER_LEN + 12 + 2];
        let n = header.encode(&payload, &mut frame)?;
        self.bus.send(&frame[..n])?;

        let mut resp_buf = [0u8; 24];
        match self.bus.receive(&mut resp_buf, CONTROLLER_TIMEOUT_US) {
            Err(DmxError::Timeout) => Ok(None),
            Err(e) => Err(e),
            Ok((resp_len, PacketKind::RdmDiscoveryResponse)) => {
                match crate::buffer::decode_discovery_response(&resp_buf[..resp_len]) {
                    Some((uid, _)) => Ok(Some(uid)),
                    None => Err(DmxError::InvalidCrc),
                }
            },
            Ok(_) => Err(DmxError::InvalidResponse),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use heapless::Vec as HVec;

    /// A scripted [`Bus`] for unit tests: queues raw response frames to
    /// hand back on the next `receive`, and records every `send`.
    pub(crate) struct MockBus {
        pub(crate) sent: HVec<HVec<u8, 300>, 16>,
        pub(crate) responses: HVec<(HVec<u8, 300>, PacketKind), 16>,
        pub(crate) delays_us: HVec<u32, 16>,
        last_sent_tn: u8,
    }

    impl MockBus {
        pub(crate) fn new() -> Self {
            Self { sent: HVec::new(), responses: HVec::new(), delays_us: HVec::new(), last_sent_tn: 0 }
        }

        pub(crate) fn queue_response(&mut self, frame: &[u8], kind: PacketKind) {
            let _ = self.responses.push((HVec::from_slice(frame).unwrap(), kind));
        }
    }

    impl Bus for MockBus {
        fn send(&mut self, frame: &[u8]) -> Result<()> {
            if frame.len() > 16 && frame[0] == crate::buffer::RDM_SC {
                self.last_sent_tn = frame[15];
            }
            let _ = self.sent.push(HVec::from_slice(frame).unwrap());
            Ok(())
        }

        fn receive(&mut self, out: &mut [u8], _timeout_us: u32) -> Result<(usize, PacketKind)> {
            if self.responses.is_empty() {
                return Err(DmxError::Timeout);
            }
            let (mut frame, kind) = self.responses.remove(0);
            // A real responder echoes the request's transaction number; the
            // fixture frames are built without knowing it in advance, so
            // patch it in here instead of threading it through every test.
            if kind == PacketKind::Rdm && frame.len() > 16 {
                frame[15] = self.last_sent_tn;
                let body_len = frame[2] as usize;
                let checksum = crate::buffer::rdm_checksum(&frame[..body_len]);
                frame[body_len..body_len + 2].copy_from_slice(&checksum.to_be_bytes());
            }
            out[..frame.len()].copy_from_slice(&frame);
            Ok((frame.len(), kind))
        }

        fn delay_us(&mut self, us: u32) {
            let _ = self.delays_us.push(us);
        }
    }

    fn ack_frame(dest: Uid, src: Uid, tn: u8, pid: u16, payload: &[u8]) -> HVec<u8, 300> {
        let header = RdmHeader {
            destination: dest,
            source: src,
            tn,
            port_or_response: response_type::ACK,
            message_count: 0,
            sub_device: 0,
            command_class: command_class::GET_RESPONSE,
            pid,
            pdl: payload.len() as u8,
        };
        let mut buf = [0u8; 300];
        let n = header.encode(payload, &mut buf).unwrap();
        HVec::from_slice(&buf[..n]).unwrap()
    }

    #[test]
    fn get_request_returns_ack_payload() {
        let controller_uid = Uid::new(0x05E0, 1);
        let device_uid = Uid::new(0x05E0, 2);
        let mut bus = MockBus::new();
        let frame = ack_frame(controller_uid, device_uid, 0, 0x0060, &[1, 2, 3]);
        bus.queue_response(&frame, PacketKind::Rdm);
        let mut controller = Controller::new(bus, controller_uid);
        let mut out = [0u8; 32];
        let outcome = controller.rdm_request(device_uid, command_class::GET, 0x0060, &[], &mut out).unwrap();
        assert_eq!(outcome, RdmOutcome::Ack(3));
        assert_eq!(&out[..3], &[1, 2, 3]);
    }

    #[test]
    fn broadcast_request_skips_receive_and_delays_guard_time() {
        let controller_uid = Uid::new(0x05E0, 1);
        let bus = MockBus::new();
        let mut controller = Controller::new(bus, controller_uid);
        let mut out = [0u8; 32];
        let outcome = controller.rdm_request(Uid::BROADCAST_ALL, command_class::SET, 0x1000, &[1], &mut out).unwrap();
        assert_eq!(outcome, RdmOutcome::NoResponse);
        assert_eq!(controller.bus.sent.len(), 1);
        assert_eq!(controller.bus.delays_us.len(), 1);
    }

    #[test]
    fn ack_timer_defers_then_repolls_once() {
        let controller_uid = Uid::new(0x05E0, 1);
        let device_uid = Uid::new(0x05E0, 2);
        let mut bus = MockBus::new();
        let header = RdmHeader {
            destination: controller_uid,
            source: device_uid,
            tn: 0,
            port_or_response: response_type::ACK_TIMER,
            message_count: 0,
            sub_device: 0,
            command_class: command_class::GET_RESPONSE,
            pid: 0x1000,
            pdl: 2,
        };
        let mut buf = [0u8; 300];
        let n = header.encode(&5u16.to_be_bytes(), &mut buf).unwrap();
        bus.queue_response(&buf[..n], PacketKind::Rdm);
        let ack = ack_frame(controller_uid, device_uid, 1, 0x1000, &[1]);
        bus.queue_response(&ack, PacketKind::Rdm);
        let mut controller = Controller::new(bus, controller_uid);
        let mut out = [0u8; 32];
        let outcome = controller.rdm_request(device_uid, command_class::GET, 0x1000, &[], &mut out).unwrap();
        assert_eq!(outcome, RdmOutcome::Ack(1));
        assert_eq!(controller.bus.delays_us, [500_000]);
    }

    #[test]
    fn second_ack_timer_deferral_is_rejected() {
        let controller_uid = Uid::new(0x05E0, 1);
        let device_uid = Uid::new(0x05E0, 2);
        let mut bus = MockBus::new();
        for tn in 0..2u8 {
            let header = RdmHeader {
                destination: controller_uid,
                source: device_uid,
                tn,
                port_or_response: response_type::ACK_TIMER,
                message_count: 0,
                sub_device: 0,
                command_class: command_class::GET_RESPONSE,
                pid: 0x1000,
                pdl: 2,
            };
            let mut buf = [0u8; 300];
            let n = header.encode(&1u16.to_be_bytes(), &mut buf).unwrap();
            bus.queue_response(&buf[..n], PacketKind::Rdm);
        }
        let mut controller = Controller::new(bus, controller_uid);
        let mut out = [0u8; 32];
        assert_eq!(
            controller.rdm_request(device_uid, command_class::GET, 0x1000, &[], &mut out).unwrap_err(),
            DmxError::Timeout
        );
    }

    #[test]
    fn nack_is_surfaced_verbatim() {
        let controller_uid = Uid::new(0x05E0, 1);
        let device_uid = Uid::new(0x05E0, 2);
        let mut bus = MockBus::new();
        let header = RdmHeader {
            destination: controller_uid,
            source: device_uid,
            tn: 0,
            port_or_response: response_type::NACK_REASON,
            message_count: 0,
            sub_device: 0,
            command_class: command_class::GET_RESPONSE,
            pid: 0x0060,
            pdl: 2,
        };
        let mut buf = [0u8; 300];
        let n = header.encode(&0u16.to_be_bytes(), &mut buf).unwrap();
        bus.queue_response(&buf[..n], PacketKind::Rdm);
        let mut controller = Controller::new(bus, controller_uid);
        let mut out = [0u8; 32];
        let outcome = controller.rdm_request(device_uid, command_class::GET, 0x0060, &[], &mut out).unwrap();
        assert_eq!(outcome, RdmOutcome::Nack(0));
    }

    #[test]
    fn transaction_number_increases_monotonically_per_controller() {
        let controller_uid = Uid::new(0x05E0, 1);
        let device_uid = Uid::new(0x05E0, 2);
        let bus = MockBus::new();
        let mut controller = Controller::new(bus, controller_uid);
        let mut out = [0u8; 8];
        // Both requests time out (nothing queued); only the sent frame's
        // own `tn` byte matters here.
        let _ = controller.rdm_request(device_uid, command_class::GET, 0x0060, &[], &mut out);
        let _ = controller.rdm_request(device_uid, command_class::GET, 0x0060, &[], &mut out);
        assert_eq!(controller.bus.sent.len(), 2);
        assert_eq!(controller.bus.sent[0][15], 0);
        assert_eq!(controller.bus.sent[1][15], 1);
    }

    #[test]
    fn timeout_surfaces_as_timeout_error() {
        let controller_uid = Uid::new(0x05E0, 1);
        let device_uid = Uid::new(0x05E0, 2);
        let bus = MockBus::new();
        let mut controller = Controller::new(bus, controller_uid);
        let mut out = [0u8; 32];
        assert_eq!(
            controller.rdm_request(device_uid, command_class::GET, 0x0060, &[], &mut out).unwrap_err(),
            DmxError::Timeout
        );
    }
}

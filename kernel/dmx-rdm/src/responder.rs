//! RDM responder: per-port parameter table, request dispatch, and response
//! assembly.

use heapless::{String, Vec};

use crate::error::{DmxError, Result};
use crate::format::{Format, Value};
use crate::nvs;
use crate::param_store::{CommandClasses, ParamDef, ParamStore};
use crate::pdu::{command_class, nack_reason, response_type, RdmHeader};
use crate::personality::Personality;
use crate::pids;
use crate::queued_message::QueuedMessages;
use crate::uid::Uid;
use crate::{ddebug, dinfo, dtrace};

const LABEL_MAX: usize = 32;
const PERSONALITY_MAX: usize = 16;
/// Sentinel `DMX_START_ADDRESS` meaning "not yet assigned" (a footprint-0
/// device never assigns one).
pub const START_ADDRESS_NONE: u16 = 0xFFFF;

/// Install-time configuration for a responder.
pub struct ResponderConfig<'a> {
    /// ESTA/manufacturer model ID.
    pub model_id: u16,
    /// RDM product category code.
    pub product_category: u16,
    /// Manufacturer-assigned software version.
    pub software_version_id: u32,
    /// Human-readable software version string.
    pub software_version_label: &'a str,
    /// The personalities this device supports, in order (1-indexed on the
    /// wire). Must be non-empty.
    pub personalities: &'a [Personality],
}

/// What a PID handler decided to send back, payload already written into
/// the caller's scratch buffer.
enum Outcome {
    /// `ACK`, with `usize` payload bytes already in the scratch buffer.
    Ack(usize),
    /// `ACK_TIMER`, deferral in 100&nbsp;ms units.
    AckTimer(u16),
    /// `NACK_REASON`.
    Nack(u16),
    /// The request was a broadcast (or a muted `DISC_UNIQUE_BRANCH`): no
    /// reply is sent.
    NoReply,
}

/// Per-port RDM responder state.
pub struct Responder {
    uid: Uid,
    muted: bool,
    model_id: u16,
    product_category: u16,
    software_version_id: u32,
    software_version_label: String<LABEL_MAX>,
    personalities: Vec<Personality, PERSONALITY_MAX>,
    current_personality: u8,
    dmx_start_address: u16,
    device_label: String<LABEL_MAX>,
    identify: bool,
    store: ParamStore,
    queue: QueuedMessages,
}

impl Responder {
    /// Installs a responder bound to `uid` with the given configuration.
    ///
    /// Registers the always-required PIDs (§3); `DMX_START_ADDRESS` is
    /// only registered when the first personality's footprint is nonzero.
    pub fn install(uid: Uid, config: ResponderConfig<'_>) -> Result<Self> {
        if config.personalities.is_empty() {
            return Err(DmxError::InvalidArg);
        }
        let mut personalities = Vec::new();
        for p in config.personalities {
            personalities.push(p.clone()).map_err(|_| DmxError::NoMem)?;
        }
        let footprint = personalities[0].footprint();
        let mut label = String::new();
        let _ = label.push_str(config.software_version_label);

        let mut responder = Self {
            uid,
            muted: false,
            model_id: config.model_id,
            product_category: config.product_category,
            software_version_id: config.software_version_id,
            software_version_label: label,
            personalities,
            current_personality: 1,
            dmx_start_address: if footprint > 0 { 1 } else { START_ADDRESS_NONE },
            device_label: String::new(),
            identify: false,
            store: ParamStore::new(),
            queue: QueuedMessages::new(),
        };
        responder.register_required_pids()?;
        responder.seed_from_nvs();
        dinfo!("responder installed, uid={}", uid);
        Ok(responder)
    }

    /// Overwrites the four persisted fields with whatever a registered
    /// [`nvs::NvsStore`] last saw for them, if anything. Called once at
    /// install; a footprint-0 device never had `DMX_START_ADDRESS`
    /// registered, so its persisted value (if any, from a prior
    /// personality) is intentionally left unapplied.
    fn seed_from_nvs(&mut self) {
        if self.dmx_start_address != START_ADDRESS_NONE {
            if let Some(data) = nvs::load(pids::DMX_START_ADDRESS) {
                if data.len() == 2 {
                    self.dmx_start_address = u16::from_be_bytes([data[0], data[1]]);
                }
            }
        }
        if let Some(data) = nvs::load(pids::DMX_PERSONALITY) {
            if let [index] = *data {
                if index != 0 && index as usize <= self.personalities.len() {
                    self.current_personality = index;
                }
            }
        }
        if let Some(data) = nvs::load(pids::DEVICE_LABEL) {
            if let Ok(label) = core::str::from_utf8(data) {
                let _ = self.device_label.push_str(label);
            }
        }
        if let Some(&[flag]) = nvs::load(pids::IDENTIFY_DEVICE) {
            self.identify = flag != 0;
        }
    }

    fn register_required_pids(&mut self) -> Result<()> {
        let passthrough = ParamDef {
            command_classes: CommandClasses::GET,
            data_type: 0,
            pdl_size: 0,
            alloc_size: 0,
            description: "",
            non_volatile: false,
        };
        // These PIDs are handled entirely by the special cases in
        // `handle_pid`; registering them here only makes them visible to
        // `exists`/`SUPPORTED_PARAMETERS` bookkeeping.
        for &pid in pids::ALWAYS_REQUIRED {
            if pid == pids::DMX_START_ADDRESS && self.dmx_start_address == START_ADDRESS_NONE {
                continue;
            }
            self.store.add_deterministic(pid, passthrough)?;
        }
        Ok(())
    }

    /// The UID this responder answers to.
    #[must_use]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// Whether this responder is currently muted (discovery has asked it
    /// to stay silent on future `DISC_UNIQUE_BRANCH`es).
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Registers a manufacturer-specific parameter with its own storage.
    pub fn add_parameter(&mut self, pid: u16, def: ParamDef, init_value: &[u8]) -> Result<()> {
        self.store.add_new(pid, def, init_value)
    }

    /// Dispatches a parsed request addressed to this responder (the caller
    /// has already checked the destination UID matches us, our
    /// manufacturer broadcast, or the universal broadcast).
    ///
    /// Returns `Some(len)` with the response written into `out`, or `None`
    /// if no reply should be sent.
    pub fn dispatch(&mut self, header: &RdmHeader, payload: &[u8], out: &mut [u8]) -> Result<Option<usize>> {
        let broadcast = header.destination.is_broadcast();
        let mut scratch = [0u8; crate::pdu::MAX_PDL];

        if header.pid == pids::DISC_UNIQUE_BRANCH {
            return Ok(self.handle_disc_unique_branch(payload, out));
        }
        if header.command_class == command_class::DISCOVERY
            && (header.pid == pids::DISC_MUTE || header.pid == pids::DISC_UN_MUTE)
        {
            return self.handle_mute(header, header.pid == pids::DISC_MUTE, out).map(Some);
        }

        let outcome = if header.sub_device != 0 {
            Outcome::Nack(nack_reason::SUB_DEVICE_OUT_OF_RANGE)
        } else if !self.store.exists(header.pid) && !is_well_known(header.pid) {
            Outcome::Nack(nack_reason::UNKNOWN_PID)
        } else {
            match self.check_command_class(header) {
                Some(nack) => Outcome::Nack(nack),
                None => self.handle_pid(header, payload, &mut scratch)?,
            }
        };

        self.finish(header, broadcast, outcome, &scratch, out)
    }

    fn check_command_class(&self, header: &RdmHeader) -> Option<u16> {
        let cc_bit = match header.command_class {
            command_class::GET => CommandClasses::GET,
            command_class::SET => CommandClasses::SET,
            _ => return Some(nack_reason::UNSUPPORTED_COMMAND_CLASS),
        };
        if let Some(def) = self.store.get_schema(header.pid) {
            if !def.command_classes.contains(cc_bit) {
                return Some(nack_reason::UNSUPPORTED_COMMAND_CLASS);
            }
        }
        None
    }

    fn finish(
        &mut self,
        header: &RdmHeader,
        broadcast: bool,
        outcome: Outcome,
        scratch: &[u8],
        out: &mut [u8],
    ) -> Result<Option<usize>> {
        if broadcast {
            return Ok(None);
        }
        let mut payload_buf = [0u8; crate::pdu::MAX_PDL];
        let (response_type_byte, payload_len) = match outcome {
            Outcome::Ack(len) => {
                let len = len.min(crate::pdu::MAX_PDL);
                payload_buf[..len].copy_from_slice(&scratch[..len]);
                (response_type::ACK, len)
            },
            Outcome::AckTimer(centiseconds) => {
                payload_buf[0..2].copy_from_slice(&centiseconds.to_be_bytes());
                (response_type::ACK_TIMER, 2)
            },
            Outcome::Nack(reason) => {
                payload_buf[0..2].copy_from_slice(&reason.to_be_bytes());
                dtrace!("NACK pid={:#06x} reason={:#06x}", header.pid, reason);
                (response_type::NACK_REASON, 2)
            },
            Outcome::NoReply => return Ok(None),
        };
        let response_cc = if header.command_class == command_class::GET {
            command_class::GET_RESPONSE
        } else {
            command_class::SET_RESPONSE
        };
        let response_header = RdmHeader {
            destination: header.source,
            source: self.uid,
            tn: header.tn,
            port_or_response: response_type_byte,
            message_count: self.queue.message_count(),
            sub_device: 0,
            command_class: response_cc,
            pid: header.pid,
            pdl: payload_len as u8,
        };
        let n = response_header.encode(&payload_buf[..payload_len], out)?;
        Ok(Some(n))
    }

    fn handle_disc_unique_branch(&mut self, payload: &[u8], out: &mut [u8]) -> Option<usize> {
        if self.muted || payload.len() < 12 {
            return None;
        }
        let mut lo = [0u8; 6];
        lo.copy_from_slice(&payload[0..6]);
        let mut hi = [0u8; 6];
        hi.copy_from_slice(&payload[6..12]);
        let lower = Uid::from_bytes(lo);
        let upper = Uid::from_bytes(hi);
        if self.uid < lower || self.uid > upper {
            return None;
        }
        let encoded = crate::buffer::encode_discovery_response(self.uid, 7);
        let n = encoded.len();
        out[..n].copy_from_slice(&encoded);
        Some(n)
    }

    fn handle_mute(&mut self, header: &RdmHeader, mute: bool, out: &mut [u8]) -> Result<usize> {
        let addressed = header.destination == self.uid || header.destination.is_broadcast();
        if !addressed {
            return Ok(0);
        }
        self.muted = mute;
        ddebug!("responder mute={}", mute);
        if header.destination.is_broadcast() {
            return Ok(0);
        }
        let response_header = RdmHeader {
            destination: header.source,
            source: self.uid,
            tn: header.tn,
            port_or_response: response_type::ACK,
            message_count: self.queue.message_count(),
            sub_device: 0,
            command_class: command_class::DISCOVERY_RESPONSE,
            pid: header.pid,
            pdl: 2,
        };
        response_header.encode(&[0, 0], out)
    }

    fn handle_pid(&mut self, header: &RdmHeader, payload: &[u8], buf: &mut [u8]) -> Result<Outcome> {
        match header.pid {
            pids::DEVICE_INFO if header.command_class == command_class::GET => {
                let n = self.encode_device_info(buf)?;
                Ok(Outcome::Ack(n))
            },
            pids::SOFTWARE_VERSION_LABEL if header.command_class == command_class::GET => {
                let bytes = self.software_version_label.as_bytes();
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(Outcome::Ack(bytes.len()))
            },
            pids::IDENTIFY_DEVICE if header.command_class == command_class::GET => {
                buf[0] = u8::from(self.identify);
                Ok(Outcome::Ack(1))
            },
            pids::IDENTIFY_DEVICE if header.command_class == command_class::SET => {
                if payload.is_empty() {
                    return Ok(Outcome::Nack(nack_reason::FORMAT_ERROR));
                }
                self.identify = payload[0] != 0;
                nvs::store(pids::IDENTIFY_DEVICE, &[u8::from(self.identify)]);
                self.queue.enqueue(header.pid);
                Ok(Outcome::Ack(0))
            },
            pids::DEVICE_LABEL if header.command_class == command_class::GET => {
                let bytes = self.device_label.as_bytes();
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(Outcome::Ack(bytes.len()))
            },
            pids::DEVICE_LABEL if header.command_class == command_class::SET => {
                self.device_label.clear();
                let n = payload.len().min(LABEL_MAX);
                let s = core::str::from_utf8(&payload[..n]).unwrap_or("");
                let _ = self.device_label.push_str(s);
                nvs::store(pids::DEVICE_LABEL, self.device_label.as_bytes());
                self.queue.enqueue(header.pid);
                Ok(Outcome::Ack(0))
            },
            pids::DMX_START_ADDRESS if header.command_class == command_class::GET => {
                buf[0..2].copy_from_slice(&self.dmx_start_address.to_be_bytes());
                Ok(Outcome::Ack(2))
            },
            pids::DMX_START_ADDRESS if header.command_class == command_class::SET => {
                if self.dmx_start_address == START_ADDRESS_NONE {
                    return Ok(Outcome::Nack(nack_reason::UNSUPPORTED_COMMAND_CLASS));
                }
                if payload.len() < 2 {
                    return Ok(Outcome::Nack(nack_reason::FORMAT_ERROR));
                }
                let addr = u16::from_be_bytes([payload[0], payload[1]]);
                let footprint = self.personalities[self.current_personality as usize - 1].footprint();
                if addr == 0 || addr as u32 + footprint as u32 - 1 > 512 {
                    return Ok(Outcome::Nack(nack_reason::DATA_OUT_OF_RANGE));
                }
                self.dmx_start_address = addr;
                nvs::store(pids::DMX_START_ADDRESS, &addr.to_be_bytes());
                self.queue.enqueue(header.pid);
                Ok(Outcome::Ack(0))
            },
            pids::DMX_PERSONALITY if header.command_class == command_class::GET => {
                buf[0] = self.current_personality;
                buf[1] = self.personalities.len() as u8;
                Ok(Outcome::Ack(2))
            },
            pids::DMX_PERSONALITY if header.command_class == command_class::SET => {
                if payload.is_empty() {
                    return Ok(Outcome::Nack(nack_reason::FORMAT_ERROR));
                }
                let index = payload[0];
                if index == 0 || index as usize > self.personalities.len() {
                    return Ok(Outcome::Nack(nack_reason::DATA_OUT_OF_RANGE));
                }
                self.current_personality = index;
                nvs::store(pids::DMX_PERSONALITY, &[index]);
                self.queue.enqueue(header.pid);
                Ok(Outcome::Ack(0))
            },
            pids::DMX_PERSONALITY_DESCRIPTION if header.command_class == command_class::GET => {
                if payload.is_empty() {
                    return Ok(Outcome::Nack(nack_reason::FORMAT_ERROR));
                }
                let index = payload[0];
                let Some(p) = self.personalities.get(index.wrapping_sub(1) as usize) else {
                    return Ok(Outcome::Nack(nack_reason::DATA_OUT_OF_RANGE));
                };
                buf[0] = index;
                buf[1..3].copy_from_slice(&p.footprint().to_be_bytes());
                let desc = p.description().as_bytes();
                let n = desc.len().min(32);
                buf[3..3 + n].copy_from_slice(&desc[..n]);
                Ok(Outcome::Ack(3 + n))
            },
            pids::QUEUED_MESSAGE if header.command_class == command_class::GET => Ok(self.handle_queued_message(buf)),
            pids::SUPPORTED_PARAMETERS if header.command_class == command_class::GET => {
                let mut pids_buf = [0u16; 64];
                let total = self.store.list(&mut pids_buf);
                let mut n = 0usize;
                for &pid in pids_buf.iter().take(total) {
                    if pids::ALWAYS_REQUIRED.contains(&pid) {
                        continue;
                    }
                    if n + 2 > crate::pdu::MAX_PDL {
                        break;
                    }
                    buf[n..n + 2].copy_from_slice(&pid.to_be_bytes());
                    n += 2;
                }
                Ok(Outcome::Ack(n))
            },
            pids::PARAMETER_DESCRIPTION if header.command_class == command_class::GET => {
                if payload.len() < 2 {
                    return Ok(Outcome::Nack(nack_reason::FORMAT_ERROR));
                }
                let pid = u16::from_be_bytes([payload[0], payload[1]]);
                let Some(desc) = self.store.get_description(pid) else {
                    return Ok(Outcome::Nack(nack_reason::DATA_OUT_OF_RANGE));
                };
                buf[0..2].copy_from_slice(&pid.to_be_bytes());
                let bytes = desc.as_bytes();
                let n = bytes.len().min(32);
                buf[2..2 + n].copy_from_slice(&bytes[..n]);
                Ok(Outcome::Ack(2 + n))
            },
            pid => self.handle_generic(pid, header.command_class, payload, buf),
        }
    }

    fn handle_queued_message(&mut self, buf: &mut [u8]) -> Outcome {
        match self.queue.pop() {
            // A minimal responder doesn't replay the original parameter's
            // payload here — the controller is expected to re-GET the PID
            // it cares about after seeing a nonzero message count. We ACK
            // with an empty status-message list per §4.4.
            Some(_pid) => Outcome::Ack(0),
            None => {
                buf[0..2].copy_from_slice(&0u16.to_be_bytes());
                Outcome::Ack(2)
            },
        }
    }

    fn handle_generic(&mut self, pid: u16, cc: u8, payload: &[u8], buf: &mut [u8]) -> Result<Outcome> {
        if self.store.is_deterministic(pid) {
            return Ok(Outcome::Nack(nack_reason::UNSUPPORTED_COMMAND_CLASS));
        }
        match cc {
            command_class::GET => {
                let Some(data) = self.store.get(pid) else {
                    return Ok(Outcome::Nack(nack_reason::UNKNOWN_PID));
                };
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(Outcome::Ack(n))
            },
            command_class::SET => {
                self.store.set_and_queue(pid, payload, &mut self.queue)?;
                Ok(Outcome::Ack(0))
            },
            _ => Ok(Outcome::Nack(nack_reason::UNSUPPORTED_COMMAND_CLASS)),
        }
    }

    fn encode_device_info(&self, buf: &mut [u8]) -> Result<usize> {
        let footprint = self.personalities[self.current_personality as usize - 1].footprint();
        let fmt = Format::parse("wwwdwbbwwb$")?;
        let values = [
            Value::Word(0x0100),
            Value::Word(self.model_id),
            Value::Word(self.product_category),
            Value::Dword(self.software_version_id),
            Value::Word(footprint),
            Value::Byte(self.current_personality),
            Value::Byte(self.personalities.len() as u8),
            Value::Word(self.dmx_start_address),
            Value::Word(0), // sub_device_count
            Value::Byte(0), // sensor_count
        ];
        fmt.encode(&values, buf)
    }
}

fn is_well_known(pid: u16) -> bool {
    pid == pids::DISC_UNIQUE_BRANCH || pid == pids::DISC_MUTE || pid == pids::DISC_UN_MUTE
}

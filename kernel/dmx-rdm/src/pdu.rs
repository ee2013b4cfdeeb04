//! RDM PDU (header) parsing and assembly shared by the responder and the
//! controller.

use crate::buffer::{rdm_checksum, RDM_SC, RDM_SUB_SC};
use crate::error::{DmxError, Result};
use crate::uid::Uid;

/// Command-class byte values.
#[allow(missing_docs)]
pub mod command_class {
    pub const DISCOVERY: u8 = 0x10;
    pub const DISCOVERY_RESPONSE: u8 = 0x11;
    pub const GET: u8 = 0x20;
    pub const GET_RESPONSE: u8 = 0x21;
    pub const SET: u8 = 0x30;
    pub const SET_RESPONSE: u8 = 0x31;
}

/// Response-type byte values (occupies the same wire position a request
/// uses for `port_id`).
#[allow(missing_docs)]
pub mod response_type {
    pub const ACK: u8 = 0x00;
    pub const ACK_TIMER: u8 = 0x01;
    pub const NACK_REASON: u8 = 0x02;
    pub const ACK_OVERFLOW: u8 = 0x03;
}

/// Standard NACK reason codes.
#[allow(missing_docs)]
pub mod nack_reason {
    pub const UNKNOWN_PID: u16 = 0x0000;
    pub const FORMAT_ERROR: u16 = 0x0001;
    pub const HARDWARE_FAULT: u16 = 0x0002;
    pub const PROXY_REJECT: u16 = 0x0003;
    pub const WRITE_PROTECT: u16 = 0x0004;
    pub const UNSUPPORTED_COMMAND_CLASS: u16 = 0x0005;
    pub const DATA_OUT_OF_RANGE: u16 = 0x0006;
    pub const BUFFER_FULL: u16 = 0x0007;
    pub const PACKET_SIZE_UNSUPPORTED: u16 = 0x0008;
    pub const SUB_DEVICE_OUT_OF_RANGE: u16 = 0x0009;
    pub const PROXY_BUFFER_FULL: u16 = 0x000A;
}

/// Fixed header size: start-code through the PDL byte, inclusive.
pub const HEADER_LEN: usize = 24;
/// Maximum parameter data length a single RDM PDU may carry.
pub const MAX_PDL: usize = 231;

/// A parsed RDM request or response header, with its PDL payload left in
/// place in the source buffer (borrowed, not copied).
#[derive(Debug, Clone, Copy)]
pub struct RdmHeader {
    /// Destination UID.
    pub destination: Uid,
    /// Source UID.
    pub source: Uid,
    /// Transaction number.
    pub tn: u8,
    /// Port ID (on a request) or response type (on a response).
    pub port_or_response: u8,
    /// Number of queued messages the responder still holds.
    pub message_count: u8,
    /// Target sub-device (0 = root).
    pub sub_device: u16,
    /// Command class (see [`command_class`]).
    pub command_class: u8,
    /// Parameter ID.
    pub pid: u16,
    /// Declared parameter data length.
    pub pdl: u8,
}

impl RdmHeader {
    /// Parses a header (and validates the checksum over the whole packet)
    /// from `data`, returning the header and the PDL payload slice.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < HEADER_LEN + 2 {
            return Err(DmxError::PacketSize);
        }
        if data[0] != RDM_SC || data[1] != RDM_SUB_SC {
            return Err(DmxError::InvalidArg);
        }
        let message_length = data[2] as usize;
        let total_len = message_length + 2;
        if data.len() < total_len {
            return Err(DmxError::PacketSize);
        }
        let body = &data[..message_length];
        let checksum_bytes = &data[message_length..total_len];
        let expected = u16::from_be_bytes([checksum_bytes[0], checksum_bytes[1]]);
        if rdm_checksum(body) != expected {
            return Err(DmxError::InvalidCrc);
        }

        let mut dest = [0u8; 6];
        dest.copy_from_slice(&data[3..9]);
        let mut src = [0u8; 6];
        src.copy_from_slice(&data[9..15]);
        let pdl = data[23];
        let pdl = pdl as usize;
        if HEADER_LEN + pdl > message_length {
            return Err(DmxError::PacketSize);
        }
        let header = Self {
            destination: Uid::from_bytes(dest),
            source: Uid::from_bytes(src),
            tn: data[15],
            port_or_response: data[16],
            message_count: data[17],
            sub_device: u16::from_be_bytes([data[18], data[19]]),
            command_class: data[20],
            pid: u16::from_be_bytes([data[21], data[22]]),
            pdl: data[23],
        };
        Ok((header, &data[HEADER_LEN..HEADER_LEN + pdl]))
    }

    /// Serializes this header plus `payload` plus trailing checksum into
    /// `out`, returning the total packet length.
    pub fn encode(&self, payload: &[u8], out: &mut [u8]) -> Result<usize> {
        if self.pdl as usize != payload.len() {
            return Err(DmxError::InvalidArg);
        }
        let total = HEADER_LEN + payload.len() + 2;
        if out.len() < total || payload.len() > MAX_PDL {
            return Err(DmxError::DataOverflow);
        }
        out[0] = RDM_SC;
        out[1] = RDM_SUB_SC;
        out[2] = (HEADER_LEN + payload.len()) as u8;
        out[3..9].copy_from_slice(&self.destination.to_bytes());
        out[9..15].copy_from_slice(&self.source.to_bytes());
        out[15] = self.tn;
        out[16] = self.port_or_response;
        out[17] = self.message_count;
        out[18..20].copy_from_slice(&self.sub_device.to_be_bytes());
        out[20] = self.command_class;
        out[21..23].copy_from_slice(&self.pid.to_be_bytes());
        out[23] = payload.len() as u8;
        out[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
        let checksum = rdm_checksum(&out[..HEADER_LEN + payload.len()]);
        out[HEADER_LEN + payload.len()..total].copy_from_slice(&checksum.to_be_bytes());
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> RdmHeader {
        RdmHeader {
            destination: Uid::new(0x05E0, 1),
            source: Uid::new(0x05E0, 2),
            tn: 7,
            port_or_response: 1,
            message_count: 0,
            sub_device: 0,
            command_class: command_class::GET,
            pid: 0x0060,
            pdl: 0,
        }
    }

    #[test]
    fn encode_then_parse_round_trips() {
        let header = sample_header();
        let mut buf = [0u8; 64];
        let n = header.encode(&[1, 2, 3], &mut buf).unwrap();
        let (parsed, payload) = RdmHeader::parse(&buf[..n]).unwrap();
        assert_eq!(parsed.destination, header.destination);
        assert_eq!(parsed.source, header.source);
        assert_eq!(parsed.pid, header.pid);
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn rejects_bad_checksum() {
        let header = sample_header();
        let mut buf = [0u8; 64];
        let n = header.encode(&[], &mut buf).unwrap();
        buf[n - 1] ^= 0xFF;
        assert_eq!(RdmHeader::parse(&buf[..n]).unwrap_err(), DmxError::InvalidCrc);
    }

    #[test]
    fn rejects_wrong_start_code() {
        let header = sample_header();
        let mut buf = [0u8; 64];
        let n = header.encode(&[], &mut buf).unwrap();
        buf[0] = 0x00;
        assert_eq!(RdmHeader::parse(&buf[..n]).unwrap_err(), DmxError::InvalidArg);
    }

    #[test]
    fn payload_over_max_pdl_is_rejected() {
        let header = sample_header();
        let payload = [0u8; 232];
        let mut buf = [0u8; 300];
        assert_eq!(header.encode(&payload, &mut buf).unwrap_err(), DmxError::DataOverflow);
    }
}

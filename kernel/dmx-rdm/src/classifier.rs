//! Incremental packet classification: given the bytes received so far,
//! decide whether this is a DMX frame, an RDM request/response, or an RDM
//! discovery response, and whether it is complete yet.

use crate::buffer::{rdm_checksum, RDM_DELIMITER, RDM_PREAMBLE, RDM_SC, RDM_SUB_SC};
use crate::error::DmxError;

/// What kind of packet the classifier has recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// A plain DMX512 frame (any start code, including `0x00`).
    Dmx,
    /// An RDM request or response (start code 0xCC, sub-start-code 0x01).
    Rdm,
    /// A Manchester-like encoded RDM discovery response.
    RdmDiscoveryResponse,
}

/// Result of classifying the bytes received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Whether the packet is complete and ready to hand to a reader.
    pub complete: bool,
    /// The packet kind recognized (best-effort while still arriving).
    pub kind: PacketKind,
    /// Set once `complete` is true, if the checksum (for `Rdm` /
    /// `RdmDiscoveryResponse`) failed to verify.
    pub error: Option<DmxError>,
}

/// Classifies the bytes received so far (`buf[..head]`), given a rolling
/// estimate `rx_size_hint` of a plain DMX frame's expected length (updated
/// by the caller at every BREAK).
#[must_use]
pub fn classify(buf: &[u8], head: usize, rx_size_hint: usize) -> Classification {
    if head == 0 {
        return Classification { complete: false, kind: PacketKind::Dmx, error: None };
    }

    if buf[0] == RDM_SC {
        if head < 2 {
            return Classification { complete: false, kind: PacketKind::Rdm, error: None };
        }
        if buf[1] != RDM_SUB_SC {
            // Not actually RDM after all — treat the start code as an
            // ordinary (non-standard) DMX start code.
            return classify_dmx(head, rx_size_hint);
        }
        if head < 3 {
            return Classification { complete: false, kind: PacketKind::Rdm, error: None };
        }
        let message_length = buf[2] as usize;
        let expected = message_length + 2;
        if head < expected {
            return Classification { complete: false, kind: PacketKind::Rdm, error: None };
        }
        let payload = &buf[..expected.min(buf.len())];
        let (body, checksum_bytes) = payload.split_at(payload.len().saturating_sub(2));
        let error = if checksum_bytes.len() < 2 {
            Some(DmxError::PacketSize)
        } else {
            let expected_checksum = u16::from_be_bytes([checksum_bytes[0], checksum_bytes[1]]);
            if rdm_checksum(body) == expected_checksum {
                None
            } else {
                Some(DmxError::InvalidCrc)
            }
        };
        return Classification { complete: true, kind: PacketKind::Rdm, error };
    }

    if buf[0] == RDM_PREAMBLE || buf[0] == RDM_DELIMITER {
        return classify_discovery_response(buf, head);
    }

    classify_dmx(head, rx_size_hint)
}

fn classify_dmx(head: usize, rx_size_hint: usize) -> Classification {
    let complete = rx_size_hint != 0 && head >= rx_size_hint;
    Classification { complete, kind: PacketKind::Dmx, error: None }
}

fn classify_discovery_response(buf: &[u8], head: usize) -> Classification {
    use crate::buffer::{decode_discovery_response, DISC_RESPONSE_MAX_PREAMBLE};

    let mut preamble_len = 0usize;
    while preamble_len < head && preamble_len <= DISC_RESPONSE_MAX_PREAMBLE && buf[preamble_len] == RDM_PREAMBLE {
        preamble_len += 1;
    }
    if preamble_len > DISC_RESPONSE_MAX_PREAMBLE {
        return Classification {
            complete: true,
            kind: PacketKind::RdmDiscoveryResponse,
            error: Some(DmxError::PacketSize),
        };
    }
    if preamble_len >= head {
        // Still only seen preamble bytes (or exhausted the buffer on them).
        return Classification { complete: false, kind: PacketKind::RdmDiscoveryResponse, error: None };
    }
    if buf[preamble_len] != RDM_DELIMITER {
        return Classification {
            complete: true,
            kind: PacketKind::RdmDiscoveryResponse,
            error: Some(DmxError::PacketSize),
        };
    }
    let needed = preamble_len + 1 + 16;
    if head < needed {
        return Classification { complete: false, kind: PacketKind::RdmDiscoveryResponse, error: None };
    }
    let error = match decode_discovery_response(&buf[..needed]) {
        Some(_) => None,
        None => Some(DmxError::InvalidCrc),
    };
    Classification { complete: true, kind: PacketKind::RdmDiscoveryResponse, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::encode_discovery_response;
    use crate::uid::Uid;

    #[test]
    fn dmx_frame_completes_at_expected_length() {
        let buf = [0u8; 10];
        let partial = classify(&buf, 5, 10);
        assert!(!partial.complete);
        let full = classify(&buf, 10, 10);
        assert!(full.complete);
        assert_eq!(full.kind, PacketKind::Dmx);
    }

    #[test]
    fn rdm_request_waits_for_message_length_byte() {
        let buf = [RDM_SC, RDM_SUB_SC];
        let c = classify(&buf, 2, 0);
        assert!(!c.complete);
        assert_eq!(c.kind, PacketKind::Rdm);
    }

    #[test]
    fn rdm_request_completes_and_verifies_checksum() {
        // start-code, sub-start-code, message-length=5 covers these 5 bytes,
        // plus a 2-byte checksum that must equal their sum.
        let mut buf = [RDM_SC, RDM_SUB_SC, 5, 0xAA, 0xBB, 0x00, 0x00];
        let sum = rdm_checksum(&buf[..5]);
        let bytes = sum.to_be_bytes();
        buf[5] = bytes[0];
        buf[6] = bytes[1];
        let c = classify(&buf, 7, 0);
        assert!(c.complete);
        assert_eq!(c.kind, PacketKind::Rdm);
        assert_eq!(c.error, None);
    }

    #[test]
    fn rdm_request_bad_checksum_is_flagged() {
        let buf = [RDM_SC, RDM_SUB_SC, 5, 0xAA, 0xBB, 0x00, 0x00];
        let c = classify(&buf, 7, 0);
        assert!(c.complete);
        assert_eq!(c.error, Some(DmxError::InvalidCrc));
    }

    #[test]
    fn discovery_response_classified_and_verified() {
        let uid = Uid::new(0x05E0, 1);
        let encoded = encode_discovery_response(uid, 3);
        let c = classify(&encoded, encoded.len(), 0);
        assert!(c.complete);
        assert_eq!(c.kind, PacketKind::RdmDiscoveryResponse);
        assert_eq!(c.error, None);
    }

    #[test]
    fn discovery_response_still_arriving_is_incomplete() {
        let uid = Uid::new(0x05E0, 1);
        let encoded = encode_discovery_response(uid, 0);
        let c = classify(&encoded, encoded.len() - 2, 0);
        assert!(!c.complete);
    }
}

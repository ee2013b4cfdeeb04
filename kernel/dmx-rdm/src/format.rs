//! RDM parameter wire serialization, driven by a small format-string DSL.
//!
//! Each character of a format string describes one field:
//!
//! | char | meaning |
//! |---|---|
//! | `b`/`B` | unsigned byte |
//! | `w`/`W` | 16-bit big-endian |
//! | `d`/`D` | 32-bit big-endian |
//! | `u`/`U` | 6-byte UID |
//! | `v`/`V` | optional UID (only legal at the end; absent when all-zero on encode) |
//! | `a`/`A` | ASCII, up to 32 bytes (only legal at the end) |
//! | `$` | anchor meaning "exactly one instance", suppressing repetition |
//!
//! Without a trailing `$`/`a`/`v`, a buffer whose length is a multiple of
//! the format's fixed field size is treated as a repeated list of that many
//! instances — this is how `SUPPORTED_PARAMETERS` (a list of `w`) and
//! `PROXIED_DEVICES` (a list of `u`) share one decoder with single-instance
//! parameters.

use crate::error::{DmxError, Result};
use crate::uid::Uid;

/// Maximum length of an ASCII (`a`) field.
pub const ASCII_MAX: usize = 32;

/// One parsed format character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Byte,
    Word,
    Dword,
    Uid,
    OptionalUid,
    Ascii,
}

impl Field {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'b' => Some(Self::Byte),
            'w' => Some(Self::Word),
            'd' => Some(Self::Dword),
            'u' => Some(Self::Uid),
            'v' => Some(Self::OptionalUid),
            'a' => Some(Self::Ascii),
            _ => None,
        }
    }

    /// Fixed wire size, or `None` for the variable-length tail fields.
    fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Byte => Some(1),
            Self::Word => Some(2),
            Self::Dword => Some(4),
            Self::Uid => Some(6),
            Self::OptionalUid | Self::Ascii => None,
        }
    }
}

/// A decoded format string.
///
/// Parses once (at `add_new`/`add_alias` time) so that repeated
/// serialize/deserialize calls don't re-walk the format text.
pub struct Format {
    fields: heapless::Vec<Field, 8>,
    single: bool,
}

impl Format {
    /// Parses a format string.
    ///
    /// `$` anywhere in the string forces single-instance mode (no implicit
    /// repetition on decode). Literal `#xx` constants are accepted and
    /// skipped — they describe bytes the encoder/decoder does not touch
    /// (the caller writes/expects the literal directly).
    pub fn parse(spec: &str) -> Result<Self> {
        let mut fields = heapless::Vec::new();
        let mut single = false;
        let mut chars = spec.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '$' => single = true,
                '#' => {
                    // Skip the following two hex digits (a literal byte).
                    for _ in 0..2 {
                        chars.next();
                    }
                },
                _ => {
                    let field = Field::from_char(c).ok_or(DmxError::InvalidArg)?;
                    if field.fixed_size().is_none() {
                        single = true;
                    }
                    fields.push(field).map_err(|_| DmxError::InvalidArg)?;
                },
            }
        }
        Ok(Self { fields, single })
    }

    /// Fixed per-instance size in bytes, or `None` if the format ends in a
    /// variable-length field.
    #[must_use]
    pub fn instance_size(&self) -> Option<usize> {
        self.fields.iter().try_fold(0usize, |acc, f| Some(acc + f.fixed_size()?))
    }

    /// Serializes one instance of the described fields into `out`, starting
    /// at offset 0, returning the number of bytes written.
    ///
    /// `values` supplies one [`Value`] per field in order.
    pub fn encode(&self, values: &[Value], out: &mut [u8]) -> Result<usize> {
        if values.len() != self.fields.len() {
            return Err(DmxError::InvalidArg);
        }
        let mut offset = 0usize;
        for (field, value) in self.fields.iter().zip(values) {
            offset += encode_one(*field, value, &mut out[offset..])?;
        }
        Ok(offset)
    }

    /// Decodes one instance from `data`, invoking `visit` once per field in
    /// order. Returns the number of bytes consumed.
    pub fn decode<'a>(&self, data: &'a [u8], mut visit: impl FnMut(Value<'a>)) -> Result<usize> {
        let mut offset = 0usize;
        for field in &self.fields {
            let (value, consumed) = decode_one(*field, &data[offset..])?;
            visit(value);
            offset += consumed;
        }
        Ok(offset)
    }

    /// Returns `true` when the format admits only one instance (ends in a
    /// variable-length field, or was parsed with a trailing `$`).
    #[must_use]
    pub const fn is_single(&self) -> bool {
        self.single
    }
}

/// A decoded or to-be-encoded field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    /// `b`/`B`
    Byte(u8),
    /// `w`/`W`
    Word(u16),
    /// `d`/`D`
    Dword(u32),
    /// `u`/`U`
    Uid(Uid),
    /// `v`/`V`; `None` encodes as all-zero, decodes from all-zero.
    OptionalUid(Option<Uid>),
    /// `a`/`A`
    Ascii(&'a str),
}

fn encode_one(field: Field, value: &Value<'_>, out: &mut [u8]) -> Result<usize> {
    match (field, value) {
        (Field::Byte, Value::Byte(b)) => {
            *out.first_mut().ok_or(DmxError::DataOverflow)? = *b;
            Ok(1)
        },
        (Field::Word, Value::Word(w)) => {
            let bytes = w.to_be_bytes();
            out.get_mut(..2).ok_or(DmxError::DataOverflow)?.copy_from_slice(&bytes);
            Ok(2)
        },
        (Field::Dword, Value::Dword(d)) => {
            let bytes = d.to_be_bytes();
            out.get_mut(..4).ok_or(DmxError::DataOverflow)?.copy_from_slice(&bytes);
            Ok(4)
        },
        (Field::Uid, Value::Uid(u)) => {
            let bytes = u.to_bytes();
            out.get_mut(..6).ok_or(DmxError::DataOverflow)?.copy_from_slice(&bytes);
            Ok(6)
        },
        (Field::OptionalUid, Value::OptionalUid(maybe)) => {
            let bytes = maybe.unwrap_or(Uid::new(0, 0)).to_bytes();
            out.get_mut(..6).ok_or(DmxError::DataOverflow)?.copy_from_slice(&bytes);
            Ok(6)
        },
        (Field::Ascii, Value::Ascii(s)) => {
            let bytes = s.as_bytes();
            let n = bytes.len().min(ASCII_MAX);
            out.get_mut(..n).ok_or(DmxError::DataOverflow)?.copy_from_slice(&bytes[..n]);
            Ok(n)
        },
        _ => Err(DmxError::InvalidArg),
    }
}

fn decode_one(field: Field, data: &[u8]) -> Result<(Value<'_>, usize)> {
    match field {
        Field::Byte => {
            let b = *data.first().ok_or(DmxError::PacketSize)?;
            Ok((Value::Byte(b), 1))
        },
        Field::Word => {
            let s = data.get(..2).ok_or(DmxError::PacketSize)?;
            Ok((Value::Word(u16::from_be_bytes([s[0], s[1]])), 2))
        },
        Field::Dword => {
            let s = data.get(..4).ok_or(DmxError::PacketSize)?;
            Ok((Value::Dword(u32::from_be_bytes([s[0], s[1], s[2], s[3]])), 4))
        },
        Field::Uid => {
            let s = data.get(..6).ok_or(DmxError::PacketSize)?;
            let mut b = [0u8; 6];
            b.copy_from_slice(s);
            Ok((Value::Uid(Uid::from_bytes(b)), 6))
        },
        Field::OptionalUid => {
            if data.len() < 6 {
                return Ok((Value::OptionalUid(None), data.len()));
            }
            let s = &data[..6];
            if s.iter().all(|b| *b == 0) {
                Ok((Value::OptionalUid(None), 6))
            } else {
                let mut b = [0u8; 6];
                b.copy_from_slice(s);
                Ok((Value::OptionalUid(Some(Uid::from_bytes(b))), 6))
            }
        },
        Field::Ascii => {
            let n = data.len().min(ASCII_MAX);
            let end = data[..n].iter().position(|b| *b == 0).unwrap_or(n);
            let s = core::str::from_utf8(&data[..end]).unwrap_or("");
            Ok((Value::Ascii(s), n))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_decodes_mixed_fields() {
        let fmt = Format::parse("wdu$").unwrap();
        assert!(fmt.is_single());
        let uid = Uid::new(0x05E0, 1);
        let values = [Value::Word(0x1234), Value::Dword(0xDEAD_BEEF), Value::Uid(uid)];
        let mut buf = [0u8; 12];
        let n = fmt.encode(&values, &mut buf).unwrap();
        assert_eq!(n, 12);

        let mut seen = heapless::Vec::<Value, 4>::new();
        let consumed = fmt.decode(&buf, |v| seen.push(v).unwrap()).unwrap();
        assert_eq!(consumed, 12);
        assert_eq!(seen[0], Value::Word(0x1234));
        assert_eq!(seen[1], Value::Dword(0xDEAD_BEEF));
        assert_eq!(seen[2], Value::Uid(uid));
    }

    #[test]
    fn repeated_list_of_words_has_no_fixed_single_instance() {
        let fmt = Format::parse("w").unwrap();
        assert!(!fmt.is_single());
        assert_eq!(fmt.instance_size(), Some(2));
    }

    #[test]
    fn optional_uid_round_trips_none() {
        let fmt = Format::parse("v").unwrap();
        let values = [Value::OptionalUid(None)];
        let mut buf = [0xFFu8; 6];
        fmt.encode(&values, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 6]);
    }

    #[test]
    fn rejects_unknown_format_characters() {
        assert!(Format::parse("z").is_err());
    }

    #[test]
    fn truncated_buffer_reports_packet_size() {
        let fmt = Format::parse("d").unwrap();
        let data = [0u8; 2];
        assert_eq!(fmt.decode(&data, |_| {}).unwrap_err(), DmxError::PacketSize);
    }
}

//! Tag-Length-Value codec
//!
//! Payloads are flat SIMPLE-TLV sequences: a one byte tag, a length of one
//! byte (`< 0xFF`) or `0xFF` followed by two bytes big endian, then the value.
//! Framing is delegated to [`iso7816_tlv::simple`]; this module adds the
//! card's static tag table, strict bounds checking and masked log output.

mod builder;
mod decoder;
mod tag;

use std::fmt;

use iso7816_tlv::simple::{Tag, Tlv as SimpleTlv};

pub use builder::TlvBuilder;
pub use decoder::{CardDate, TlvDecoder, TlvValue};
pub use tag::{TlvTag, TlvValueType};

use crate::{Error, Result};

/// Mask printed in place of sensitive values
pub const MASK: &str = "******";

/// Single TLV item
#[derive(Clone, PartialEq, Eq)]
pub struct Tlv {
    tag: TlvTag,
    code: u8,
    value: Vec<u8>,
}

impl Tlv {
    /// Create an item for a known tag
    pub fn new(tag: TlvTag, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            code: tag.code(),
            value: value.into(),
        }
    }

    /// Create an item from a raw wire code, preserving codes missing from the table
    pub fn from_raw(code: u8, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag: TlvTag::from_code(code),
            code,
            value: value.into(),
        }
    }

    /// Tag of the item
    pub const fn tag(&self) -> TlvTag {
        self.tag
    }

    /// Raw wire code of the tag
    pub const fn code(&self) -> u8 {
        self.code
    }

    /// Value bytes
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Consume the item and return its value
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// Encode the item to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        let tag = Tag::try_from(self.code).map_err(|_| Error::InvalidTag(self.code))?;
        let tlv = SimpleTlv::new(tag, self.value.clone())?;
        Ok(tlv.to_vec())
    }

    /// Encode a sequence of items in order
    pub fn encode_all(tlvs: &[Self]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for tlv in tlvs {
            out.extend_from_slice(&tlv.encode()?);
        }
        Ok(out)
    }

    /// Decode a complete buffer into a sequence of items
    ///
    /// Fails on a reserved tag byte, a truncated header or a declared length
    /// that runs past the end of the buffer. Trailing garbage is never
    /// silently dropped.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<Self>> {
        let mut tlvs = Vec::new();
        let mut remaining = bytes;

        while !remaining.is_empty() {
            let offset = bytes.len() - remaining.len();
            check_bounds(remaining, offset)?;

            let (parsed, rest) = SimpleTlv::parse(remaining);
            let tlv = parsed?;
            let code: u8 = tlv.tag().into();
            tlvs.push(Self::from_raw(code, tlv.value().to_vec()));
            remaining = rest;
        }

        Ok(tlvs)
    }
}

/// Validate the header at the start of `buf` before handing it to the parser
fn check_bounds(buf: &[u8], offset: usize) -> Result<()> {
    let code = buf[0];
    if code == 0x00 || code == 0xFF {
        return Err(Error::InvalidTag(code));
    }

    let (declared, header) = match buf.get(1) {
        None => return Err(Error::TruncatedHeader(offset)),
        Some(0xFF) => match buf.get(2..4) {
            Some(len) => (u16::from_be_bytes([len[0], len[1]]) as usize, 4),
            None => return Err(Error::TruncatedHeader(offset)),
        },
        Some(len) => (*len as usize, 2),
    };

    let available = buf.len() - header;
    if declared > available {
        return Err(Error::Truncated {
            tag: code,
            declared,
            available,
        });
    }
    Ok(())
}

impl fmt::Display for Tlv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [0x{:02X}:{}]: ",
            self.tag.name(),
            self.code,
            self.value.len()
        )?;
        if self.tag.is_sensitive() {
            f.write_str(MASK)
        } else {
            match self.tag.value_type() {
                TlvValueType::Utf8String | TlvValueType::EllipticCurve => {
                    write!(f, "{}", String::from_utf8_lossy(&self.value))
                }
                _ => f.write_str(&hex::encode_upper(&self.value)),
            }
        }
    }
}

impl fmt::Debug for Tlv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Display adapter printing one item per line
#[derive(Debug, Clone, Copy)]
pub struct TlvList<'a>(pub &'a [Tlv]);

impl fmt::Display for TlvList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tlv) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{tlv}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_decode_sequence() {
        let tlvs = Tlv::decode_all(&hex!("0102CB22 800634 2E3532 7200 0C00")).unwrap();
        assert_eq!(tlvs.len(), 3);
        assert_eq!(tlvs[0].tag(), TlvTag::CardId);
        assert_eq!(tlvs[0].value(), &hex!("CB22"));
        assert_eq!(tlvs[1].tag(), TlvTag::Firmware);
        assert_eq!(tlvs[1].value(), b"4.52r\0");
        assert_eq!(tlvs[2].tag(), TlvTag::CardData);
        assert!(tlvs[2].value().is_empty());
    }

    #[test]
    fn test_long_length_form() {
        let value = vec![0xAB; 300];
        let encoded = Tlv::new(TlvTag::FileData, value.clone()).encode().unwrap();
        assert_eq!(&encoded[..4], &hex!("71FF012C"));
        assert_eq!(encoded.len(), 304);

        let decoded = Tlv::decode_all(&encoded).unwrap();
        assert_eq!(decoded, vec![Tlv::new(TlvTag::FileData, value)]);
    }

    #[test]
    fn test_truncated_buffers() {
        assert_eq!(
            Tlv::decode_all(&hex!("0105AABB")).unwrap_err(),
            Error::Truncated {
                tag: 0x01,
                declared: 5,
                available: 2
            }
        );
        assert_eq!(
            Tlv::decode_all(&hex!("0101AA 80")).unwrap_err(),
            Error::TruncatedHeader(3)
        );
        assert_eq!(
            Tlv::decode_all(&hex!("71FF01")).unwrap_err(),
            Error::TruncatedHeader(0)
        );
        assert_eq!(
            Tlv::decode_all(&hex!("71FF0100AA")).unwrap_err(),
            Error::Truncated {
                tag: 0x71,
                declared: 256,
                available: 1
            }
        );
    }

    #[test]
    fn test_reserved_tags() {
        assert_eq!(
            Tlv::decode_all(&hex!("0001AA")).unwrap_err(),
            Error::InvalidTag(0x00)
        );
        assert_eq!(
            Tlv::decode_all(&hex!("FF01AA")).unwrap_err(),
            Error::InvalidTag(0xFF)
        );
    }

    #[test]
    fn test_unknown_tag_is_preserved() {
        let tlvs = Tlv::decode_all(&hex!("9901AA")).unwrap();
        assert_eq!(tlvs[0].tag(), TlvTag::Unknown);
        assert_eq!(tlvs[0].code(), 0x99);
        assert_eq!(Tlv::encode_all(&tlvs).unwrap(), hex!("9901AA"));
    }

    #[test]
    fn test_display_masks_sensitive_values() {
        let tlvs = [
            Tlv::new(TlvTag::Pin, hex!("0102").to_vec()),
            Tlv::new(TlvTag::Firmware, b"4.52r".to_vec()),
            Tlv::new(TlvTag::WalletIndex, vec![0x01]),
        ];
        assert_eq!(
            TlvList(&tlvs).to_string(),
            "Pin [0x10:2]: ******\nFirmware [0x80:5]: 4.52r\nWalletIndex [0x65:1]: 01"
        );
    }
}

//! Typed access to parsed TLV sequences

use std::fmt;

use tracing::{debug, trace};

use super::{Tlv, TlvTag, TlvValueType};
use crate::{Error, ResponseApdu, Result};

/// Conversion between a Rust type and the value bytes of a tag
///
/// The card decides the representation from the tag alone, so every
/// implementation states which [`TlvValueType`]s it can stand for. The
/// builder and decoder reject a tag whose declared type is not accepted.
pub trait TlvValue: Sized {
    /// Whether this type can represent values of `value_type`
    fn accepts(value_type: TlvValueType) -> bool;

    /// Encode the value for `tag`
    fn encode_value(&self, tag: TlvTag) -> Result<Vec<u8>>;

    /// Decode the value bytes of `tag`
    fn decode_value(tag: TlvTag, bytes: &[u8]) -> Result<Self>;

    /// Value to use when a mandatory tag is absent
    fn absent() -> Option<Self> {
        None
    }

    /// Whether the value is expressed by leaving the tag out
    fn is_omitted(&self) -> bool {
        false
    }
}

/// Read a big-endian unsigned integer, accepting encodings shorter than `width`
fn read_uint(tag: TlvTag, bytes: &[u8], width: usize) -> Result<u32> {
    let significant = bytes.iter().skip_while(|b| **b == 0).count();
    if bytes.is_empty() || significant > width {
        return Err(Error::Decoding {
            tag,
            reason: "integer out of range",
        });
    }
    Ok(bytes[bytes.len() - significant..]
        .iter()
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}

/// Encode an unsigned integer with the width declared by the tag
fn write_uint(tag: TlvTag, value: u32) -> Result<Vec<u8>> {
    let bytes = value.to_be_bytes();
    let width = match tag.value_type() {
        TlvValueType::Uint8 => 1,
        TlvValueType::Uint16 => 2,
        _ => 4,
    };
    if bytes[..4 - width].iter().any(|b| *b != 0) {
        return Err(Error::Encoding {
            tag,
            reason: "integer wider than tag",
        });
    }
    Ok(bytes[4 - width..].to_vec())
}

const fn is_uint(value_type: TlvValueType) -> bool {
    matches!(
        value_type,
        TlvValueType::Uint8 | TlvValueType::Uint16 | TlvValueType::Uint32
    )
}

impl TlvValue for u8 {
    fn accepts(value_type: TlvValueType) -> bool {
        matches!(value_type, TlvValueType::Uint8)
    }

    fn encode_value(&self, tag: TlvTag) -> Result<Vec<u8>> {
        write_uint(tag, u32::from(*self))
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> Result<Self> {
        read_uint(tag, bytes, 1).map(|v| v as Self)
    }
}

impl TlvValue for u16 {
    fn accepts(value_type: TlvValueType) -> bool {
        matches!(value_type, TlvValueType::Uint8 | TlvValueType::Uint16)
    }

    fn encode_value(&self, tag: TlvTag) -> Result<Vec<u8>> {
        write_uint(tag, u32::from(*self))
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> Result<Self> {
        read_uint(tag, bytes, 2).map(|v| v as Self)
    }
}

impl TlvValue for u32 {
    fn accepts(value_type: TlvValueType) -> bool {
        is_uint(value_type)
    }

    fn encode_value(&self, tag: TlvTag) -> Result<Vec<u8>> {
        write_uint(tag, *self)
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> Result<Self> {
        read_uint(tag, bytes, 4)
    }
}

impl TlvValue for bool {
    fn accepts(value_type: TlvValueType) -> bool {
        matches!(value_type, TlvValueType::BoolValue)
    }

    fn encode_value(&self, _tag: TlvTag) -> Result<Vec<u8>> {
        Ok(vec![u8::from(*self)])
    }

    // Presence is the value
    fn decode_value(_tag: TlvTag, _bytes: &[u8]) -> Result<Self> {
        Ok(true)
    }

    fn absent() -> Option<Self> {
        Some(false)
    }

    fn is_omitted(&self) -> bool {
        !*self
    }
}

impl TlvValue for String {
    fn accepts(value_type: TlvValueType) -> bool {
        matches!(
            value_type,
            TlvValueType::HexString | TlvValueType::Utf8String
        )
    }

    fn encode_value(&self, tag: TlvTag) -> Result<Vec<u8>> {
        match tag.value_type() {
            TlvValueType::HexString => hex::decode(self).map_err(|_| Error::Encoding {
                tag,
                reason: "invalid hex string",
            }),
            _ => Ok(self.as_bytes().to_vec()),
        }
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> Result<Self> {
        match tag.value_type() {
            TlvValueType::HexString => Ok(hex::encode_upper(bytes)),
            _ => {
                let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                String::from_utf8(bytes[..end].to_vec()).map_err(|_| Error::Decoding {
                    tag,
                    reason: "invalid utf-8",
                })
            }
        }
    }
}

impl TlvValue for Vec<u8> {
    fn accepts(value_type: TlvValueType) -> bool {
        matches!(value_type, TlvValueType::ByteArray)
    }

    fn encode_value(&self, _tag: TlvTag) -> Result<Vec<u8>> {
        Ok(self.clone())
    }

    fn decode_value(_tag: TlvTag, bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

/// Calendar date as stored by the card (year, month, day)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CardDate {
    /// Year
    pub year: u16,
    /// Month, 1 based
    pub month: u8,
    /// Day of month, 1 based
    pub day: u8,
}

impl CardDate {
    /// Create a new date
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }
}

impl fmt::Display for CardDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl TlvValue for CardDate {
    fn accepts(value_type: TlvValueType) -> bool {
        matches!(value_type, TlvValueType::DateTime)
    }

    fn encode_value(&self, _tag: TlvTag) -> Result<Vec<u8>> {
        let mut out = self.year.to_be_bytes().to_vec();
        out.push(self.month);
        out.push(self.day);
        Ok(out)
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::Decoding {
                tag,
                reason: "date shorter than a year",
            });
        }
        Ok(Self {
            year: u16::from_be_bytes([bytes[0], bytes[1]]),
            month: bytes.get(2).copied().unwrap_or(1),
            day: bytes.get(3).copied().unwrap_or(1),
        })
    }
}

/// Typed decoder over a parsed TLV sequence
#[derive(Debug, Clone, Default)]
pub struct TlvDecoder {
    tlvs: Vec<Tlv>,
}

impl TlvDecoder {
    /// Create a decoder over an already parsed sequence
    pub const fn new(tlvs: Vec<Tlv>) -> Self {
        Self { tlvs }
    }

    /// Parse `bytes` and create a decoder over the result
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Tlv::decode_all(bytes).map(Self::new)
    }

    /// Create a decoder over the payload of a response
    ///
    /// An empty payload is an error: every response that is decoded is
    /// expected to carry data.
    pub fn from_response(response: &ResponseApdu) -> Result<Self> {
        response
            .tlv_data()?
            .map(Self::new)
            .ok_or(Error::MalformedResponse("empty payload"))
    }

    /// Items in wire order
    pub fn tlvs(&self) -> &[Tlv] {
        &self.tlvs
    }

    /// Whether `tag` is present
    pub fn contains(&self, tag: TlvTag) -> bool {
        self.find(tag).is_some()
    }

    fn find(&self, tag: TlvTag) -> Option<&Tlv> {
        self.tlvs.iter().find(|tlv| tlv.tag() == tag)
    }

    fn convert<T: TlvValue>(tlv: &Tlv) -> Result<T> {
        let tag = tlv.tag();
        if !T::accepts(tag.value_type()) {
            return Err(Error::TypeMismatch {
                tag,
                value_type: tag.value_type(),
            });
        }
        let value = T::decode_value(tag, tlv.value())?;
        debug!(tlv = %tlv, "Decoded");
        Ok(value)
    }

    /// Decode a mandatory tag
    ///
    /// A missing tag fails with [`Error::MissingTag`], except for types that
    /// define an absent value (`bool` decodes absence as `false`).
    pub fn decode<T: TlvValue>(&self, tag: TlvTag) -> Result<T> {
        match self.find(tag) {
            Some(tlv) => Self::convert(tlv),
            None => {
                if !T::accepts(tag.value_type()) {
                    return Err(Error::TypeMismatch {
                        tag,
                        value_type: tag.value_type(),
                    });
                }
                T::absent().ok_or_else(|| {
                    debug!(%tag, "Mandatory tag not found");
                    Error::MissingTag(tag)
                })
            }
        }
    }

    /// Decode an optional tag
    pub fn decode_optional<T: TlvValue>(&self, tag: TlvTag) -> Result<Option<T>> {
        match self.find(tag) {
            Some(tlv) => Self::convert(tlv).map(Some),
            None => {
                trace!(%tag, "Optional tag not found");
                Ok(None)
            }
        }
    }

    /// Decode every occurrence of a repeated tag, in wire order
    pub fn decode_array<T: TlvValue>(&self, tag: TlvTag) -> Result<Vec<T>> {
        self.tlvs
            .iter()
            .filter(|tlv| tlv.tag() == tag)
            .map(Self::convert)
            .collect()
    }

    /// Decode a nested TLV block
    pub fn decode_nested(&self, tag: TlvTag) -> Result<Self> {
        let tlv = self.find(tag).ok_or(Error::MissingTag(tag))?;
        Self::from_bytes(tlv.value())
    }

    /// Decode an optional nested TLV block
    pub fn decode_nested_optional(&self, tag: TlvTag) -> Result<Option<Self>> {
        self.find(tag)
            .map(|tlv| Self::from_bytes(tlv.value()))
            .transpose()
    }

    /// Decode every occurrence of a repeated nested block
    pub fn decode_nested_array(&self, tag: TlvTag) -> Result<Vec<Self>> {
        self.tlvs
            .iter()
            .filter(|tlv| tlv.tag() == tag)
            .map(|tlv| Self::from_bytes(tlv.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::TlvBuilder;

    #[test]
    fn test_round_trip_every_value_type() {
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, "CB22000000027374".to_string())
            .unwrap()
            .append(TlvTag::Firmware, "4.52r".to_string())
            .unwrap()
            .append(TlvTag::WalletIndex, 3u8)
            .unwrap()
            .append(TlvTag::Offset, 0x1234u16)
            .unwrap()
            .append(TlvTag::MaxSignatures, 100_000u32)
            .unwrap()
            .append(TlvTag::IsActivated, true)
            .unwrap()
            .append(TlvTag::TerminalIsLinked, false)
            .unwrap()
            .append(TlvTag::CardPublicKey, hex!("04AABB").to_vec())
            .unwrap()
            .append(TlvTag::ManufactureDateTime, CardDate::new(2021, 7, 14))
            .unwrap();
        let decoder = TlvDecoder::from_bytes(&builder.build()).unwrap();

        assert_eq!(
            decoder.decode::<String>(TlvTag::CardId).unwrap(),
            "CB22000000027374"
        );
        assert_eq!(decoder.decode::<String>(TlvTag::Firmware).unwrap(), "4.52r");
        assert_eq!(decoder.decode::<u8>(TlvTag::WalletIndex).unwrap(), 3);
        assert_eq!(decoder.decode::<u16>(TlvTag::Offset).unwrap(), 0x1234);
        assert_eq!(
            decoder.decode::<u32>(TlvTag::MaxSignatures).unwrap(),
            100_000
        );
        assert!(decoder.decode::<bool>(TlvTag::IsActivated).unwrap());
        assert!(!decoder.decode::<bool>(TlvTag::TerminalIsLinked).unwrap());
        assert_eq!(
            decoder.decode::<Vec<u8>>(TlvTag::CardPublicKey).unwrap(),
            hex!("04AABB")
        );
        assert_eq!(
            decoder
                .decode::<CardDate>(TlvTag::ManufactureDateTime)
                .unwrap(),
            CardDate::new(2021, 7, 14)
        );
    }

    #[test]
    fn test_missing_and_optional() {
        let decoder = TlvDecoder::from_bytes(&hex!("8007342E353272 0000")).unwrap();
        assert_eq!(
            decoder.decode::<String>(TlvTag::CardId).unwrap_err(),
            Error::MissingTag(TlvTag::CardId)
        );
        assert_eq!(
            decoder.decode_optional::<u16>(TlvTag::Health).unwrap(),
            None
        );
        // Trailing NUL padding is stripped
        assert_eq!(decoder.decode::<String>(TlvTag::Firmware).unwrap(), "4.52r");
    }

    #[test]
    fn test_type_mismatch() {
        let decoder = TlvDecoder::from_bytes(&hex!("650101")).unwrap();
        assert_eq!(
            decoder.decode::<Vec<u8>>(TlvTag::WalletIndex).unwrap_err(),
            Error::TypeMismatch {
                tag: TlvTag::WalletIndex,
                value_type: TlvValueType::Uint8
            }
        );
    }

    #[test]
    fn test_short_and_oversized_integers() {
        // Uint32 tag carried in two bytes
        let decoder = TlvDecoder::from_bytes(&hex!("08020100 1C04000000FA")).unwrap();
        assert_eq!(decoder.decode::<u32>(TlvTag::MaxSignatures).unwrap(), 0x0100);
        assert_eq!(decoder.decode::<u16>(TlvTag::Pause).unwrap(), 0xFA);

        let decoder = TlvDecoder::from_bytes(&hex!("6502 0101")).unwrap();
        assert!(matches!(
            decoder.decode::<u8>(TlvTag::WalletIndex),
            Err(Error::Decoding { .. })
        ));
    }

    #[test]
    fn test_arrays_and_nested_blocks() {
        let mut wallet = TlvBuilder::new();
        wallet.append(TlvTag::WalletIndex, 0u8).unwrap();
        let mut other = TlvBuilder::new();
        other.append(TlvTag::WalletIndex, 1u8).unwrap();

        let mut builder = TlvBuilder::new();
        builder
            .append_nested(TlvTag::CardWallet, &wallet)
            .unwrap()
            .append_nested(TlvTag::CardWallet, &other)
            .unwrap()
            .append(TlvTag::FileIndex, 4u8)
            .unwrap()
            .append(TlvTag::FileIndex, 7u8)
            .unwrap();
        let decoder = TlvDecoder::from_bytes(&builder.build()).unwrap();

        let wallets = decoder.decode_nested_array(TlvTag::CardWallet).unwrap();
        let indices: Vec<u8> = wallets
            .iter()
            .map(|w| w.decode(TlvTag::WalletIndex).unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(
            decoder.decode_array::<u8>(TlvTag::FileIndex).unwrap(),
            vec![4, 7]
        );
        assert!(
            decoder
                .decode_nested_optional(TlvTag::CardData)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_empty_response_payload() {
        let response = ResponseApdu::new(Vec::new(), (0x90, 0x00));
        assert_eq!(
            TlvDecoder::from_response(&response).unwrap_err(),
            Error::MalformedResponse("empty payload")
        );
    }
}

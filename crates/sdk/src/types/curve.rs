use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tangem_core::{TlvTag, TlvValue, TlvValueType};

use crate::Error;

/// Elliptic curve of a wallet key
///
/// Travels on the wire as its name in UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EllipticCurve {
    /// secp256k1
    Secp256k1,
    /// Ed25519
    Ed25519,
    /// secp256r1 (P-256)
    Secp256r1,
    /// BLS12-381, G2 signatures
    #[serde(rename = "bls12381_G2")]
    Bls12381G2,
    /// BLS12-381, G2 signatures with message augmentation
    #[serde(rename = "bls12381_G2_AUG")]
    Bls12381G2Aug,
    /// BLS12-381, G2 signatures with proof of possession
    #[serde(rename = "bls12381_G2_POP")]
    Bls12381G2Pop,
    /// BIP-340 Schnorr over secp256k1
    Bip0340,
    /// Ed25519 with SLIP-0010 derivation
    Ed25519Slip0010,
}

impl EllipticCurve {
    /// Every curve known to multi-wallet firmware
    pub const ALL: [Self; 8] = [
        Self::Secp256k1,
        Self::Ed25519,
        Self::Secp256r1,
        Self::Bls12381G2,
        Self::Bls12381G2Aug,
        Self::Bls12381G2Pop,
        Self::Bip0340,
        Self::Ed25519Slip0010,
    ];

    /// Wire name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Secp256k1 => "secp256k1",
            Self::Ed25519 => "ed25519",
            Self::Secp256r1 => "secp256r1",
            Self::Bls12381G2 => "bls12381_G2",
            Self::Bls12381G2Aug => "bls12381_G2_AUG",
            Self::Bls12381G2Pop => "bls12381_G2_POP",
            Self::Bip0340 => "bip0340",
            Self::Ed25519Slip0010 => "ed25519_slip0010",
        }
    }
}

impl fmt::Display for EllipticCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EllipticCurve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or(Error::UnsupportedCurve)
    }
}

impl TlvValue for EllipticCurve {
    fn accepts(value_type: TlvValueType) -> bool {
        value_type == TlvValueType::EllipticCurve
    }

    fn encode_value(&self, _tag: TlvTag) -> tangem_core::Result<Vec<u8>> {
        Ok(self.name().as_bytes().to_vec())
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> tangem_core::Result<Self> {
        let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        std::str::from_utf8(&bytes[..end])
            .ok()
            .and_then(|name| name.parse().ok())
            .ok_or(tangem_core::Error::Decoding {
                tag,
                reason: "unknown curve",
            })
    }
}

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tangem_core::{TlvTag, TlvValue, TlvValueType};

use crate::Error;

const HARDENED: u32 = 0x8000_0000;

/// One node of a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivationNode {
    /// Hardened child index
    Hardened(u32),
    /// Normal child index
    NonHardened(u32),
}

impl DerivationNode {
    /// Index with the hardened bit applied
    pub const fn raw(self) -> u32 {
        match self {
            Self::Hardened(index) => index | HARDENED,
            Self::NonHardened(index) => index,
        }
    }

    const fn from_raw(raw: u32) -> Self {
        if raw & HARDENED != 0 {
            Self::Hardened(raw & !HARDENED)
        } else {
            Self::NonHardened(raw)
        }
    }
}

/// BIP-32 derivation path such as `m/44'/0'/0'/0/0`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationPath {
    nodes: Vec<DerivationNode>,
}

impl DerivationPath {
    /// Path made of the given nodes
    pub const fn new(nodes: Vec<DerivationNode>) -> Self {
        Self { nodes }
    }

    /// Nodes from the root
    pub fn nodes(&self) -> &[DerivationNode] {
        &self.nodes
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::EncodingFailed(format!("invalid derivation path {s:?}"));
        let mut parts = s.trim().split('/');
        if !matches!(parts.next(), Some("m" | "M")) {
            return Err(invalid());
        }

        let nodes = parts
            .map(|part| {
                let (digits, hardened) = match part.strip_suffix(['\'', 'h', 'H']) {
                    Some(digits) => (digits, true),
                    None => (part, false),
                };
                let index: u32 = digits.parse().map_err(|_| invalid())?;
                if index & HARDENED != 0 {
                    return Err(invalid());
                }
                Ok(if hardened {
                    DerivationNode::Hardened(index)
                } else {
                    DerivationNode::NonHardened(index)
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { nodes })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for node in &self.nodes {
            match node {
                DerivationNode::Hardened(index) => write!(f, "/{index}'")?,
                DerivationNode::NonHardened(index) => write!(f, "/{index}")?,
            }
        }
        Ok(())
    }
}

impl TlvValue for DerivationPath {
    fn accepts(value_type: TlvValueType) -> bool {
        value_type == TlvValueType::DerivationPath
    }

    fn encode_value(&self, _tag: TlvTag) -> tangem_core::Result<Vec<u8>> {
        Ok(self
            .nodes
            .iter()
            .flat_map(|node| node.raw().to_be_bytes())
            .collect())
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> tangem_core::Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(tangem_core::Error::Decoding {
                tag,
                reason: "path length is not a multiple of 4",
            });
        }
        let nodes = bytes
            .chunks_exact(4)
            .map(|c| DerivationNode::from_raw(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect();
        Ok(Self { nodes })
    }
}

/// Public key derived by the card, with what is needed to derive further
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtendedPublicKey {
    /// Path the key was derived along
    pub derivation_path: DerivationPath,
    /// Compressed public key
    pub public_key: Vec<u8>,
    /// BIP-32 chain code
    pub chain_code: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use tangem_core::{TlvBuilder, TlvDecoder};

    use super::*;

    #[test]
    fn test_parse_and_encode() {
        let path: DerivationPath = "m/44'/0'/0'/0/1".parse().unwrap();
        assert_eq!(path.nodes().len(), 5);
        assert_eq!(path.to_string(), "m/44'/0'/0'/0/1");

        let mut builder = TlvBuilder::new();
        builder.append(TlvTag::WalletHdPath, path.clone()).unwrap();
        assert_eq!(
            builder.build(),
            hex!("6A14 8000002C 80000000 80000000 00000000 00000001")
        );

        let decoder = TlvDecoder::from_bytes(&builder.build()).unwrap();
        assert_eq!(
            decoder.decode::<DerivationPath>(TlvTag::WalletHdPath).unwrap(),
            path
        );
    }

    #[test]
    fn test_invalid_paths() {
        assert!("44'/0'".parse::<DerivationPath>().is_err());
        assert!("m/abc".parse::<DerivationPath>().is_err());
        assert!("m/2147483648".parse::<DerivationPath>().is_err());
        assert_eq!("m".parse::<DerivationPath>().unwrap().nodes().len(), 0);
    }
}

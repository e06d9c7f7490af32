//! Command frames sent to the card
//!
//! Every Tangem command uses `CLA = 00` and `P2 = 00`; the operation is
//! selected by the instruction byte and all parameters travel as a TLV payload
//! behind an extended length field. `P1` is zero for plain frames and carries
//! the encryption mode otherwise.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use derive_more::Display;

/// Instruction byte of a card command
///
/// The values are fixed by the card firmware and must never be renumbered.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Instruction {
    /// Read card, wallet list or file list
    Read = 0xF2,
    /// Prove possession of the card key
    AttestCardKey = 0xF3,
    /// Create a wallet in a free slot
    CreateWallet = 0xF8,
    /// Change access code or passcode
    SetPin = 0xFA,
    /// Sign one or more hashes
    Sign = 0xFB,
    /// Purge a wallet slot
    PurgeWallet = 0xFC,
    /// Open an encrypted session
    OpenSession = 0xFF,
    /// Write, delete or change settings of a file
    WriteFileData = 0xD0,
    /// Read a file
    ReadFileData = 0xD1,
    /// Obtain the primary card linking key
    StartPrimaryCardLinking = 0xE8,
    /// Obtain a backup card linking key
    StartBackupCardLinking = 0xE9,
    /// Link backup cards to the primary card
    LinkBackupCards = 0xEA,
    /// Link a backup card to the primary card
    LinkPrimaryCard = 0xEB,
    /// Read encrypted wallet material from the primary card
    ReadBackupData = 0xEC,
    /// Write encrypted wallet material to a backup card
    WriteBackupData = 0xED,
    /// Drop the backup link on a card
    BackupReset = 0xEE,
    /// Confirm the backup data was read
    FinalizeReadBackupData = 0xEF,
}

impl Instruction {
    /// Wire value of the instruction
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<Instruction> for u8 {
    fn from(ins: Instruction) -> Self {
        ins.code()
    }
}

/// Command frame addressed to the card
#[derive(Clone, PartialEq, Eq)]
pub struct CommandApdu {
    cla: u8,
    ins: Instruction,
    p1: u8,
    p2: u8,
    data: Bytes,
    le: u16,
}

impl CommandApdu {
    /// Create a command with the given TLV payload
    pub fn new(ins: Instruction, data: impl Into<Bytes>) -> Self {
        Self {
            cla: 0x00,
            ins,
            p1: 0x00,
            p2: 0x00,
            data: data.into(),
            le: 0,
        }
    }

    /// Set the expected response length
    pub const fn with_le(mut self, le: u16) -> Self {
        self.le = le;
        self
    }

    /// Set the first parameter byte
    pub const fn with_p1(mut self, p1: u8) -> Self {
        self.p1 = p1;
        self
    }

    /// First parameter byte
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Expected response length
    pub const fn le(&self) -> u16 {
        self.le
    }

    /// Instruction byte
    pub const fn instruction(&self) -> u8 {
        self.ins.code()
    }

    /// Instruction of this command
    pub const fn ins(&self) -> Instruction {
        self.ins
    }

    /// TLV payload
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Length of the serialized frame
    pub fn command_length(&self) -> usize {
        let mut length = 4;
        if !self.data.is_empty() {
            length += 3 + self.data.len();
        }
        if self.le != 0 {
            length += 2;
        }
        length
    }

    /// Convert to wire bytes
    ///
    /// `CLA INS P1 P2`, then for a non-empty payload `00 Lh Ll` and the data,
    /// then `Le` as two bytes when it is non-zero.
    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins.code());
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if !self.data.is_empty() {
            buffer.put_u8(0x00);
            buffer.put_u16(self.data.len() as u16);
            buffer.put_slice(&self.data);
        }

        if self.le != 0 {
            buffer.put_u16(self.le);
        }

        buffer.freeze()
    }
}

impl fmt::Debug for CommandApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Payloads carry code hashes, so only the shape is shown
        f.debug_struct("CommandApdu")
            .field("ins", &self.ins)
            .field("p1", &self.p1)
            .field("len", &self.data.len())
            .field("le", &self.le)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::{Tlv, TlvTag};

    // SHA-256 of the default access code "000000"
    const DEFAULT_ACCESS_CODE: [u8; 32] =
        hex!("91b4d142823f7d20c5f08df69122de43f35f057a988d9619f6d3138485c9a203");

    #[test]
    fn test_read_with_default_access_code() {
        let payload = Tlv::new(TlvTag::Pin, DEFAULT_ACCESS_CODE.to_vec())
            .encode()
            .unwrap();
        let apdu = CommandApdu::new(Instruction::Read, payload);

        assert_eq!(
            apdu.to_bytes().as_ref(),
            &hex!(
                "00F20000 000022 1020"
                "91b4d142823f7d20c5f08df69122de43f35f057a988d9619f6d3138485c9a203"
            )
        );
    }

    #[test]
    fn test_read_with_terminal_key() {
        let terminal_key = hex!(
            "0450863ad64a87ae8a2fe83c1af1a8403cb53f53e486d8511dad8a04887e5b23"
            "522cd470243453a299fa9e77237716103abc11a1df38855ed6f2ee187e9c582ba6"
        );
        let payload = Tlv::encode_all(&[
            Tlv::new(TlvTag::Pin, DEFAULT_ACCESS_CODE.to_vec()),
            Tlv::new(TlvTag::TerminalPublicKey, terminal_key.to_vec()),
        ])
        .unwrap();
        let apdu = CommandApdu::new(Instruction::Read, payload);

        let bytes = apdu.to_bytes();
        assert_eq!(&bytes[..7], &hex!("00F20000000065"));
        assert_eq!(&bytes[41..43], &hex!("5C41"));
        assert_eq!(&bytes[43..], &terminal_key);
        assert_eq!(bytes.len(), apdu.command_length());
    }

    #[test]
    fn test_header_only_and_le() {
        let apdu = CommandApdu::new(Instruction::Sign, Vec::new());
        assert_eq!(apdu.to_bytes().as_ref(), &hex!("00FB0000"));

        let apdu = CommandApdu::new(Instruction::Sign, vec![0xAA]).with_le(0x0100);
        assert_eq!(apdu.to_bytes().as_ref(), &hex!("00FB0000 000001 AA 0100"));
    }

    #[test]
    fn test_encryption_mode_in_p1() {
        let apdu = CommandApdu::new(Instruction::OpenSession, vec![0x1A, 0x01, 0x55]).with_p1(0x02);
        assert_eq!(apdu.p1(), 0x02);
        assert_eq!(apdu.to_bytes().as_ref(), &hex!("00FF0200 000003 1A0155"));
    }
}

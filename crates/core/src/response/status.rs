//! Status word definitions for card responses

use std::fmt;

use tracing::Level;

/// Status Word (SW1-SW2) trailing every card response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Process completed (90 00)
    pub const PROCESS_COMPLETED: Self = Self::new(0x90, 0x00);
    /// Access code changed (90 01)
    pub const PIN1_CHANGED: Self = Self::new(0x90, 0x01);
    /// Passcode changed (90 02)
    pub const PIN2_CHANGED: Self = Self::new(0x90, 0x02);
    /// Access code and passcode changed (90 03)
    pub const PINS12_CHANGED: Self = Self::new(0x90, 0x03);
    /// PIN3 changed (90 04)
    pub const PIN3_CHANGED: Self = Self::new(0x90, 0x04);
    /// Access code and PIN3 changed (90 05)
    pub const PINS13_CHANGED: Self = Self::new(0x90, 0x05);
    /// Passcode and PIN3 changed (90 06)
    pub const PINS23_CHANGED: Self = Self::new(0x90, 0x06);
    /// All three codes changed (90 07)
    pub const PINS123_CHANGED: Self = Self::new(0x90, 0x07);
    /// Invalid parameters, also sent for a wrong passcode (6A 86)
    pub const INVALID_PARAMS: Self = Self::new(0x6A, 0x86);
    /// Error while processing the command (62 86)
    pub const ERROR_PROCESSING_COMMAND: Self = Self::new(0x62, 0x86);
    /// Card is in a state that forbids the command (69 85)
    pub const INVALID_STATE: Self = Self::new(0x69, 0x85);
    /// Instruction not supported by this firmware (6D 00)
    pub const INS_NOT_SUPPORTED: Self = Self::new(0x6D, 0x00);
    /// Card requires an encrypted channel (69 82)
    pub const NEED_ENCRYPTION: Self = Self::new(0x69, 0x82);
    /// Security delay in progress, resubmit (97 89)
    pub const NEED_PAUSE: Self = Self::new(0x97, 0x89);
    /// File not found (6A 82)
    pub const FILE_NOT_FOUND: Self = Self::new(0x6A, 0x82);
    /// Wallet not found (6A 88)
    pub const WALLET_NOT_FOUND: Self = Self::new(0x6A, 0x88);
    /// Wrong or missing access code (6A F1)
    pub const INVALID_ACCESS_CODE: Self = Self::new(0x6A, 0xF1);
    /// Wrong or missing passcode (6A F2)
    pub const INVALID_PASSCODE: Self = Self::new(0x6A, 0xF2);

    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create from a u16 value (SW1 | SW2)
    pub const fn from_u16(status: u16) -> Self {
        Self {
            sw1: (status >> 8) as u8,
            sw2: status as u8,
        }
    }

    /// Convert to a u16 value (SW1 | SW2)
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Check if this status word belongs to the success family (90 00 to 90 07)
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 <= 0x07
    }

    /// Check if the card asks the host to wait out a security delay (97 89)
    pub const fn is_need_pause(&self) -> bool {
        self.sw1 == 0x97 && self.sw2 == 0x89
    }

    /// Check if this status word is one the card firmware documents
    pub const fn is_known(&self) -> bool {
        self.is_success()
            || matches!(
                (self.sw1, self.sw2),
                (0x6A, 0x86)
                    | (0x62, 0x86)
                    | (0x69, 0x85)
                    | (0x6D, 0x00)
                    | (0x69, 0x82)
                    | (0x97, 0x89)
                    | (0x6A, 0x82)
                    | (0x6A, 0x88)
                    | (0x6A, 0xF1)
                    | (0x6A, 0xF2)
            )
    }

    /// Get the appropriate tracing level for this status word
    pub const fn tracing_level(&self) -> Level {
        if self.is_success() {
            Level::DEBUG
        } else if self.is_need_pause() {
            Level::TRACE
        } else if self.sw1 == 0x6A && (self.sw2 == 0xF1 || self.sw2 == 0xF2) {
            // Code prompts are part of the normal flow
            Level::INFO
        } else {
            Level::WARN
        }
    }

    /// Get a description of this status word
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Process completed",
            (0x90, 0x01) => "Access code changed",
            (0x90, 0x02) => "Passcode changed",
            (0x90, 0x03) => "Access code and passcode changed",
            (0x90, 0x04) => "PIN3 changed",
            (0x90, 0x05) => "Access code and PIN3 changed",
            (0x90, 0x06) => "Passcode and PIN3 changed",
            (0x90, 0x07) => "All codes changed",
            (0x6A, 0x86) => "Invalid parameters",
            (0x62, 0x86) => "Error processing command",
            (0x69, 0x85) => "Invalid state",
            (0x6D, 0x00) => "Instruction not supported",
            (0x69, 0x82) => "Encryption required",
            (0x97, 0x89) => "Security delay in progress",
            (0x6A, 0x82) => "File not found",
            (0x6A, 0x88) => "Wallet not found",
            (0x6A, 0xF1) => "Invalid access code",
            (0x6A, 0xF2) => "Invalid passcode",
            _ => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        Self::from_u16(status)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

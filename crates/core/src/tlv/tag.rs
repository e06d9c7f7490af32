//! Static tag table shared by every command and response payload

use std::fmt;

use derive_more::Display;

/// Kind of value carried under a tag
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlvValueType {
    /// Raw bytes shown as upper-case hex text
    HexString,
    /// UTF-8 text, trailing NUL padding stripped
    Utf8String,
    /// Unsigned 8-bit integer
    Uint8,
    /// Unsigned 16-bit big-endian integer
    Uint16,
    /// Unsigned 32-bit big-endian integer
    Uint32,
    /// Presence flag
    BoolValue,
    /// Opaque bytes
    ByteArray,
    /// Curve name as UTF-8 text
    EllipticCurve,
    /// Year (2 bytes), month, day
    DateTime,
    /// Product family bit mask
    ProductMask,
    /// Card or wallet settings bit mask
    SettingsMask,
    /// Card or wallet status byte
    Status,
    /// Signing method bit mask
    SigningMethod,
    /// Read mode or file operation mode
    InteractionMode,
    /// BIP-32 derivation path, 4 bytes per node
    DerivationPath,
    /// Backup status byte
    BackupStatus,
}

macro_rules! tlv_tags {
    (@sensitive masked) => { true };
    (@sensitive) => { false };
    ($(
        $(#[$doc:meta])*
        $name:ident = $code:literal, $ty:ident $(, $sensitive:ident)?;
    )*) => {
        /// Tag of a TLV item
        ///
        /// Wire codes are fixed by the card firmware and must never be
        /// renumbered.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum TlvTag {
            /// Tag code not present in the table
            Unknown,
            $(
                $(#[$doc])*
                $name,
            )*
        }

        impl TlvTag {
            /// One-byte wire code, `0x00` for [`TlvTag::Unknown`]
            pub const fn code(self) -> u8 {
                match self {
                    Self::Unknown => 0x00,
                    $(Self::$name => $code,)*
                }
            }

            /// Look up a tag by its wire code
            pub const fn from_code(code: u8) -> Self {
                match code {
                    $($code => Self::$name,)*
                    _ => Self::Unknown,
                }
            }

            /// Name of the tag
            pub const fn name(self) -> &'static str {
                match self {
                    Self::Unknown => "Unknown",
                    $(Self::$name => stringify!($name),)*
                }
            }

            /// Declared value type of the tag
            pub const fn value_type(self) -> TlvValueType {
                match self {
                    Self::Unknown => TlvValueType::ByteArray,
                    $(Self::$name => TlvValueType::$ty,)*
                }
            }

            /// Whether the value must be masked in logs
            pub const fn is_sensitive(self) -> bool {
                match self {
                    Self::Unknown => false,
                    $(Self::$name => tlv_tags!(@sensitive $($sensitive)?),)*
                }
            }
        }
    };
}

tlv_tags! {
    /// Card identifier
    CardId = 0x01, HexString, masked;
    /// Card or wallet status
    Status = 0x02, Status;
    /// Card public key
    CardPublicKey = 0x03, ByteArray, masked;
    /// Signature made with the card key
    CardSignature = 0x04, ByteArray, masked;
    /// Elliptic curve name
    CurveId = 0x05, EllipticCurve;
    /// Hash algorithm id
    HashAlgId = 0x06, ByteArray;
    /// Signing methods
    SigningMethod = 0x07, SigningMethod;
    /// Maximum signature count
    MaxSignatures = 0x08, Uint32;
    /// Security delay in 10 ms units
    PauseBeforePin2 = 0x09, Uint16;
    /// Card or wallet settings mask
    SettingsMask = 0x0A, SettingsMask;
    /// NFC UID
    Uid = 0x0B, ByteArray;
    /// Nested manufacturing data
    CardData = 0x0C, ByteArray, masked;
    /// NDEF record data
    NdefData = 0x0D, ByteArray;
    /// Wallet created during personalization
    CreateWalletAtPersonalize = 0x0E, BoolValue;
    /// Card health
    Health = 0x0F, Uint16;
    /// Access code hash
    Pin = 0x10, ByteArray, masked;
    /// Passcode hash
    Pin2 = 0x11, ByteArray, masked;
    /// New access code hash
    NewPin = 0x12, ByteArray, masked;
    /// New passcode hash
    NewPin2 = 0x13, ByteArray, masked;
    /// Public key challenge
    PublicKeyChallenge = 0x14, ByteArray, masked;
    /// Public key salt
    PublicKeySalt = 0x15, ByteArray, masked;
    /// Attestation challenge
    Challenge = 0x16, ByteArray, masked;
    /// Card generated salt
    Salt = 0x17, ByteArray, masked;
    /// Validation counter
    ValidationCounter = 0x18, ByteArray;
    /// Card verification code
    Cvc = 0x19, ByteArray, masked;
    /// Session key A
    SessionKeyA = 0x1A, ByteArray, masked;
    /// Session key B
    SessionKeyB = 0x1B, ByteArray, masked;
    /// Remaining security delay in 10 ms units
    Pause = 0x1C, Uint16;
    /// New PIN3
    NewPin3 = 0x1E, ByteArray, masked;
    /// Encryption exchange key
    CrExKey = 0x1F, ByteArray;
    /// Manufacturer name
    ManufacturerName = 0x20, Utf8String;
    /// Read mode or file operation mode
    InteractionMode = 0x23, InteractionMode;
    /// Data offset
    Offset = 0x24, Uint16;
    /// Data size
    Size = 0x25, Uint16;
    /// File index
    FileIndex = 0x26, Uint8;
    /// File settings
    FileSettings = 0x27, ByteArray;
    /// User data
    UserData = 0x2A, ByteArray;
    /// User protected data
    UserProtectedData = 0x2B, ByteArray;
    /// User counter
    UserCounter = 0x2C, Uint32;
    /// User protected counter
    UserProtectedCounter = 0x2D, Uint32;
    /// User settings mask
    UserSettingsMask = 0x2F, Uint32;
    /// Issuer public key
    IssuerPublicKey = 0x30, ByteArray, masked;
    /// Issuer transaction public key
    IssuerTransactionPublicKey = 0x31, ByteArray, masked;
    /// Issuer data, also backup payload
    IssuerData = 0x32, ByteArray, masked;
    /// Issuer data signature
    IssuerDataSignature = 0x33, ByteArray, masked;
    /// Issuer transaction signature
    IssuerTransactionSignature = 0x34, ByteArray, masked;
    /// Issuer data counter
    IssuerDataCounter = 0x35, Uint32;
    /// Reset PIN
    ResetPin = 0x36, ByteArray, masked;
    /// Acquirer public key
    AcquirerPublicKey = 0x37, ByteArray, masked;
    /// Card activation flag
    IsActivated = 0x3A, BoolValue;
    /// Activation seed
    ActivationSeed = 0x3B, ByteArray;
    /// Code page address
    CodePageAddress = 0x40, ByteArray;
    /// Code page count
    CodePageCount = 0x41, ByteArray;
    /// Hash of written code or data
    CodeHash = 0x42, ByteArray;
    /// Hashes to sign
    TransactionOutHash = 0x50, ByteArray, masked;
    /// Size of each hash to sign
    TransactionOutHashSize = 0x51, ByteArray;
    /// Raw transaction
    TransactionOutRaw = 0x52, ByteArray, masked;
    /// Payment flow version
    PaymentFlowVersion = 0x54, ByteArray;
    /// Certificate issued by the manufacturer
    Certificate = 0x55, ByteArray, masked;
    /// Terminal transaction signature
    TerminalTransactionSignature = 0x57, ByteArray, masked;
    /// Terminal is linked
    TerminalIsLinked = 0x58, BoolValue;
    /// Passcode is default
    Pin2IsDefault = 0x59, BoolValue;
    /// Access code is default
    PinIsDefault = 0x5A, BoolValue;
    /// Terminal public key
    TerminalPublicKey = 0x5C, ByteArray, masked;
    /// Wallet public key
    WalletPublicKey = 0x60, ByteArray, masked;
    /// Wallet signatures
    WalletSignature = 0x61, ByteArray, masked;
    /// Remaining signatures
    WalletRemainingSignatures = 0x62, Uint16;
    /// Total signed hashes
    WalletSignedHashes = 0x63, Uint16;
    /// Check wallet counter
    CheckWalletCounter = 0x64, Uint8;
    /// Wallet index
    WalletIndex = 0x65, Uint8;
    /// Wallet slot count
    WalletsCount = 0x66, Uint8;
    /// Wallet data
    WalletData = 0x67, ByteArray;
    /// Nested wallet block
    CardWallet = 0x68, ByteArray, masked;
    /// HD derivation path
    WalletHdPath = 0x6A, DerivationPath;
    /// HD chain code
    WalletHdChain = 0x6B, ByteArray, masked;
    /// Wallet private key
    WalletPrivateKey = 0x6F, ByteArray, masked;
    /// File type name
    FileTypeName = 0x70, Utf8String;
    /// File data
    FileData = 0x71, ByteArray, masked;
    /// File signature
    FileSignature = 0x73, ByteArray, masked;
    /// File counter
    FileCounter = 0x74, Uint8;
    /// File owner index
    FileOwnerIndex = 0x75, Uint8;
    /// Firmware version string
    Firmware = 0x80, Utf8String;
    /// Batch identifier
    BatchId = 0x81, HexString;
    /// Manufacture date
    ManufactureDateTime = 0x82, DateTime;
    /// Issuer name
    IssuerName = 0x83, Utf8String;
    /// Blockchain name
    BlockchainName = 0x84, Utf8String;
    /// Manufacturer public key
    ManufacturerPublicKey = 0x85, ByteArray;
    /// Manufacturer signature over the card id
    CardIdManufacturerSignature = 0x86, ByteArray, masked;
    /// Product mask
    ProductMask = 0x8A, ProductMask;
    /// Token symbol
    TokenSymbol = 0xA0, Utf8String;
    /// Token contract address
    TokenContractAddress = 0xA1, Utf8String;
    /// Token decimals
    TokenDecimal = 0xA2, Uint16;
    /// Token name
    TokenName = 0xA3, Utf8String;
    /// Denomination
    Denomination = 0xC0, ByteArray;
    /// Validated balance
    ValidatedBalance = 0xC1, ByteArray;
    /// Last sign date
    LastSignDate = 0xC2, ByteArray;
    /// Denomination text
    DenominationText = 0xC3, ByteArray;
    /// Backup status
    BackupStatus = 0xD0, BackupStatus;
    /// Number of linked backup cards
    BackupCount = 0xD1, Uint8;
    /// Primary card linking key
    PrimaryCardLinkingKey = 0xD2, ByteArray, masked;
    /// Backup card linking key
    BackupCardLinkingKey = 0xD3, ByteArray, masked;
    /// Nested backup card link block
    BackupCardLink = 0xD4, ByteArray, masked;
    /// Backup attestation signature
    BackupAttestSignature = 0xD5, ByteArray, masked;
    /// Backup card public key
    BackupCardPublicKey = 0xD6, ByteArray, masked;
}

impl fmt::Display for TlvTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! SDK error taxonomy
//!
//! Every variant carries a stable numeric code that hosts may persist or show
//! to users, and belongs to one [`ErrorCategory`] that tells the session
//! engine how to react to it.

use derive_more::Display;
use tangem_core::{StatusWord, TransportError};

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, Error>;

/// How an error is handled by the session engine
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed frame or payload, never retried
    Protocol,
    /// The card cannot serve the request in its current state
    CardState,
    /// Tag loss, retried within a bounded wait
    Transient,
    /// Drives a prompt or delay loop instead of failing
    Interactive,
    /// Signature or attestation verification failed
    Security,
    /// A host resource is unavailable
    Resource,
    /// Session lifecycle: cancellation, busy reader, missing read
    Session,
}

/// Error type for SDK operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    // Transport
    /// The tag left the field and did not come back in time
    #[error("Tag lost")]
    TagLost,
    /// The reader cannot send extended length frames
    #[error("Extended length is not supported")]
    ExtendedLengthNotSupported,

    // Codec
    /// A command could not be serialized
    #[error("Failed to serialize command: {0}")]
    SerializeCommandError(String),
    /// The response payload is malformed
    #[error("Failed to deserialize response: {0}")]
    DeserializeApduFailed(String),
    /// A value does not match the tag type while encoding
    #[error("Encoding failed, type mismatch: {0}")]
    EncodingFailedTypeMismatch(String),
    /// A value could not be encoded
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
    /// A mandatory tag is missing from the response
    #[error("Decoding failed, missing tag: {0}")]
    DecodingFailedMissingTag(String),
    /// A value does not match the tag type while decoding
    #[error("Decoding failed, type mismatch: {0}")]
    DecodingFailedTypeMismatch(String),
    /// A value could not be decoded
    #[error("Decoding failed: {0}")]
    DecodingFailed(String),
    /// The card answered something the protocol does not allow
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // Card status words
    /// Unrecognised status word
    #[error("Unknown status {0}")]
    UnknownStatus(StatusWord),
    /// The card failed to process the command
    #[error("Error processing command")]
    ErrorProcessingCommand,
    /// The card is in the wrong state for the command
    #[error("Invalid state")]
    InvalidState,
    /// Instruction is not supported by the card
    #[error("Instruction not supported")]
    InsNotSupported,
    /// The card rejected the command parameters
    #[error("Invalid parameters")]
    InvalidParams,
    /// The card requires an encrypted channel
    #[error("Encryption required")]
    NeedEncryption,
    /// The requested file does not exist
    #[error("File not found")]
    FileNotFound,
    /// The requested wallet does not exist
    #[error("Wallet not found")]
    WalletNotFound,

    // Card state
    /// The card was never personalized
    #[error("Card is not personalized")]
    NotPersonalized,
    /// The card must be activated first
    #[error("Card is not activated")]
    NotActivated,
    /// The card wallet was purged
    #[error("Wallet is purged")]
    WalletIsPurged,
    /// The card demands a passcode
    #[error("Passcode required")]
    PasscodeRequired,
    /// Card signature did not verify
    #[error("Card verification failed")]
    CardVerificationFailed,
    /// The entered access code was rejected
    #[error("Wrong access code")]
    WrongAccessCode,
    /// The entered passcode was rejected
    #[error("Wrong passcode")]
    WrongPasscode,
    /// The card demands an access code
    #[error("Access code required")]
    AccessCodeRequired,
    /// Wallets cannot be created on this card
    #[error("Wallet cannot be created")]
    WalletCannotBeCreated,
    /// Card claims wallets but reports none
    #[error("Card reports zero wallets")]
    CardWithMaxZeroWallets,
    /// Wallet slot is already in use
    #[error("Wallet already created")]
    WalletAlreadyCreated,
    /// The card does not support the curve
    #[error("Unsupported curve")]
    UnsupportedCurve,
    /// Every wallet slot is used
    #[error("Maximum number of wallets created")]
    MaxNumberOfWalletsCreated,
    /// Wallet cannot be purged
    #[error("Purging the wallet is prohibited")]
    PurgeWalletProhibited,
    /// The access code cannot be changed
    #[error("Access code cannot be changed")]
    AccessCodeCannotBeChanged,
    /// The passcode cannot be changed
    #[error("Passcode cannot be changed")]
    PasscodeCannotBeChanged,
    /// The default access code is not allowed
    #[error("Access code cannot be set to the default value")]
    AccessCodeCannotBeDefault,
    /// Wallet has no signatures left
    #[error("No remaining signatures")]
    NoRemainingSignatures,
    /// Nothing to sign
    #[error("Empty hashes")]
    EmptyHashes,
    /// Hashes of different sizes were passed together
    #[error("Hashes must be of the same size")]
    HashSizeMustBeEqual,
    /// The target wallet slot is empty
    #[error("Wallet is not created")]
    WalletIsNotCreated,
    /// Hash signing is disabled on this card
    #[error("Signing hashes is not available")]
    SignHashesNotAvailable,
    /// File settings are not supported
    #[error("File settings are not supported")]
    FileSettingsUnsupported,
    /// No files were passed
    #[error("Files list is empty")]
    FilesIsEmpty,
    /// Files are disabled on this card
    #[error("Files are disabled")]
    FilesDisabled,
    /// Payload exceeds what the card can store
    #[error("Data size too large")]
    DataSizeTooLarge,

    // Backup
    /// The card is not linked into a backup
    #[error("Backup failed, card not linked")]
    BackupFailedCardNotLinked,
    /// Backup is not allowed on this card
    #[error("Backup is not allowed")]
    BackupNotAllowed,
    /// The card was already added to the backup
    #[error("Backup card already added")]
    BackupCardAlreadyAdded,
    /// The primary card has not been read
    #[error("Primary card is missing")]
    MissingPrimaryCard,
    /// Primary card attestation signature is missing
    #[error("Primary card attestation signature is missing")]
    MissingPrimaryAttestSignature,
    /// More backup cards than allowed
    #[error("Too many backup cards")]
    TooMuchBackupCards,
    /// At least one backup card is needed
    #[error("Backup card required")]
    BackupCardRequired,
    /// No backup data was read for the card
    #[error("No backup data for card")]
    NoBackupDataForCard,
    /// The primary card has no wallets
    #[error("Backup failed, no wallets on the primary card")]
    BackupFailedEmptyWallets,
    /// The backup card already has wallets
    #[error("Backup failed, card {0} already has wallets")]
    BackupFailedNotEmptyWallets(String),
    /// A code must be set before finalizing
    #[error("Access code or passcode required")]
    AccessCodeOrPasscodeRequired,
    /// The card has no active backup
    #[error("No active backup")]
    NoActiveBackup,
    /// Backup reset refused because wallets are backed up
    #[error("Reset backup failed, wallets have a backup")]
    ResetBackupFailedHasBackedUpWallets,
    /// The backup service was driven out of order
    #[error("Backup service is in an invalid state")]
    BackupServiceInvalidState,
    /// No backup card at the requested position
    #[error("No backup card for index")]
    NoBackupCardForIndex,
    /// Backup finalization left no backup card
    #[error("Backup cards list is empty")]
    EmptyBackupCards,
    /// Backup card was issued by a different issuer
    #[error("Backup failed, wrong issuer")]
    BackupFailedWrongIssuer,
    /// Backup card misses a curve used by the primary
    #[error("Backup failed, not enough curves")]
    BackupFailedNotEnoughCurves,
    /// Backup card has fewer wallet slots than needed
    #[error("Backup failed, not enough wallets")]
    BackupFailedNotEnoughWallets,
    /// Firmware does not support backup
    #[error("Backup failed, firmware is not supported")]
    BackupFailedFirmware,
    /// Backup was already created for the card
    #[error("Backup failed, already created")]
    BackupFailedAlreadyCreated,

    // Session
    /// Anything that does not fit elsewhere
    #[error("Unknown error")]
    UnknownError,
    /// The user cancelled the session
    #[error("User cancelled")]
    UserCancelled,
    /// Another session holds the reader
    #[error("Reader is busy")]
    Busy,
    /// A command needed the card snapshot but none was read
    #[error("Missing preflight read")]
    MissingPreflightRead,
    /// The tapped card is not the expected one
    #[error("Wrong card, expected {0}")]
    WrongCardNumber(String),
    /// The tapped card is of an unexpected type
    #[error("Wrong card type")]
    WrongCardType,
    /// Firmware does not support the operation
    #[error("Firmware version is not supported")]
    NotSupportedFirmwareVersion,
    /// Cryptographic helper failed
    #[error("Crypto error: {0}")]
    CryptoUtilsError(String),
    /// Error from a host collaborator
    #[error("{0}")]
    Underlying(String),

    /// Multi-item task stopped part way
    #[error("Stopped after {} item(s): {source}", completed.len())]
    Partial {
        /// Indices of the items applied before the failure
        completed: Vec<usize>,
        /// Error of the failed item
        source: Box<Self>,
    },

    /// Error with context
    #[error("{context}: {source}")]
    Context {
        /// Description of what was being done
        context: String,
        /// Underlying error
        #[source]
        source: Box<Self>,
    },
}

impl Error {
    /// Stable numeric code
    pub fn code(&self) -> u32 {
        match self {
            Self::TagLost => 10001,
            Self::ExtendedLengthNotSupported => 10002,
            Self::SerializeCommandError(_) => 20001,
            Self::DeserializeApduFailed(_) => 20002,
            Self::EncodingFailedTypeMismatch(_) => 20003,
            Self::EncodingFailed(_) => 20004,
            Self::DecodingFailedMissingTag(_) => 20005,
            Self::DecodingFailedTypeMismatch(_) => 20006,
            Self::DecodingFailed(_) => 20007,
            Self::InvalidResponse(_) => 20008,
            Self::UnknownStatus(_) => 30001,
            Self::ErrorProcessingCommand => 30002,
            Self::InvalidState => 30003,
            Self::InsNotSupported => 30004,
            Self::InvalidParams => 30005,
            Self::NeedEncryption => 30006,
            Self::FileNotFound => 30007,
            Self::WalletNotFound => 30008,
            Self::NotPersonalized => 40001,
            Self::NotActivated => 40002,
            Self::WalletIsPurged => 40003,
            Self::PasscodeRequired => 40004,
            Self::DataSizeTooLarge => 40006,
            Self::CardVerificationFailed => 40011,
            Self::WrongAccessCode => 40012,
            Self::WrongPasscode => 40013,
            Self::AccessCodeRequired => 40401,
            Self::WalletCannotBeCreated => 40403,
            Self::CardWithMaxZeroWallets => 40404,
            Self::WalletAlreadyCreated => 40405,
            Self::UnsupportedCurve => 40502,
            Self::MaxNumberOfWalletsCreated => 40503,
            Self::PurgeWalletProhibited => 40601,
            Self::AccessCodeCannotBeChanged => 40801,
            Self::PasscodeCannotBeChanged => 40802,
            Self::AccessCodeCannotBeDefault => 40803,
            Self::NoRemainingSignatures => 40901,
            Self::EmptyHashes => 40902,
            Self::HashSizeMustBeEqual => 40903,
            Self::WalletIsNotCreated => 40904,
            Self::SignHashesNotAvailable => 40905,
            Self::BackupFailedCardNotLinked => 41201,
            Self::BackupNotAllowed => 41202,
            Self::BackupCardAlreadyAdded => 41203,
            Self::MissingPrimaryCard => 41204,
            Self::MissingPrimaryAttestSignature => 41205,
            Self::TooMuchBackupCards => 41206,
            Self::BackupCardRequired => 41207,
            Self::NoBackupDataForCard => 41208,
            Self::BackupFailedEmptyWallets => 41209,
            Self::BackupFailedNotEmptyWallets(_) => 41210,
            Self::AccessCodeOrPasscodeRequired => 41212,
            Self::NoActiveBackup => 41220,
            Self::ResetBackupFailedHasBackedUpWallets => 41221,
            Self::BackupServiceInvalidState => 41222,
            Self::NoBackupCardForIndex => 41223,
            Self::EmptyBackupCards => 41224,
            Self::BackupFailedWrongIssuer => 41225,
            Self::BackupFailedNotEnoughCurves => 41227,
            Self::BackupFailedNotEnoughWallets => 41228,
            Self::BackupFailedFirmware => 41230,
            Self::BackupFailedAlreadyCreated => 41234,
            Self::FileSettingsUnsupported => 42000,
            Self::FilesIsEmpty => 42001,
            Self::FilesDisabled => 42002,
            Self::UnknownError => 50001,
            Self::UserCancelled => 50002,
            Self::Busy => 50003,
            Self::MissingPreflightRead => 50004,
            Self::WrongCardNumber(_) => 50005,
            Self::WrongCardType => 50006,
            Self::NotSupportedFirmwareVersion => 50008,
            Self::CryptoUtilsError(_) => 50011,
            Self::Underlying(_) => 50012,
            Self::Partial { source, .. } | Self::Context { source, .. } => source.code(),
        }
    }

    /// Handling category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TagLost => ErrorCategory::Transient,
            Self::SerializeCommandError(_)
            | Self::DeserializeApduFailed(_)
            | Self::EncodingFailedTypeMismatch(_)
            | Self::EncodingFailed(_)
            | Self::DecodingFailedMissingTag(_)
            | Self::DecodingFailedTypeMismatch(_)
            | Self::DecodingFailed(_)
            | Self::InvalidResponse(_)
            | Self::UnknownStatus(_)
            | Self::InsNotSupported
            | Self::NeedEncryption => ErrorCategory::Protocol,
            Self::AccessCodeRequired
            | Self::PasscodeRequired
            | Self::WrongAccessCode
            | Self::WrongPasscode => ErrorCategory::Interactive,
            Self::CardVerificationFailed | Self::CryptoUtilsError(_) => ErrorCategory::Security,
            Self::ExtendedLengthNotSupported | Self::Underlying(_) => ErrorCategory::Resource,
            Self::UserCancelled
            | Self::Busy
            | Self::MissingPreflightRead
            | Self::UnknownError
            | Self::BackupServiceInvalidState => ErrorCategory::Session,
            Self::Partial { source, .. } | Self::Context { source, .. } => source.category(),
            _ => ErrorCategory::CardState,
        }
    }

    /// Add context to an error
    pub fn with_context<C: Into<String>>(self, context: C) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, unwrapping context and partial results
    pub fn root(&self) -> &Self {
        match self {
            Self::Partial { source, .. } | Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the user cancelled
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self.root(), Self::UserCancelled)
    }

    /// Whether a card status asked for a user code
    pub(crate) fn is_user_code_required(&self) -> bool {
        matches!(
            self.root(),
            Self::AccessCodeRequired | Self::PasscodeRequired
        )
    }
}

impl From<tangem_core::Error> for Error {
    fn from(error: tangem_core::Error) -> Self {
        use tangem_core::Error as Core;

        match error {
            Core::Transport(TransportError::TagLost) => Self::TagLost,
            Core::Transport(TransportError::Cancelled) => Self::UserCancelled,
            Core::Transport(other) => Self::Underlying(other.to_string()),
            Core::MissingTag(tag) => Self::DecodingFailedMissingTag(tag.to_string()),
            Core::TypeMismatch { tag, value_type } => {
                Self::DecodingFailedTypeMismatch(format!("{tag} must be {value_type}"))
            }
            Core::Encoding { tag, reason } => Self::EncodingFailed(format!("{tag}: {reason}")),
            Core::Decoding { tag, reason } => Self::DecodingFailed(format!("{tag}: {reason}")),
            Core::Context { context, source } => Self::from(*source).with_context(context),
            other if other.is_decoding() => Self::DeserializeApduFailed(other.to_string()),
            other => Self::Underlying(other.to_string()),
        }
    }
}

impl From<StatusWord> for Error {
    fn from(status: StatusWord) -> Self {
        match status {
            StatusWord::INVALID_PARAMS => Self::InvalidParams,
            StatusWord::ERROR_PROCESSING_COMMAND => Self::ErrorProcessingCommand,
            StatusWord::INVALID_STATE => Self::InvalidState,
            StatusWord::INS_NOT_SUPPORTED => Self::InsNotSupported,
            StatusWord::NEED_ENCRYPTION => Self::NeedEncryption,
            StatusWord::FILE_NOT_FOUND => Self::FileNotFound,
            StatusWord::WALLET_NOT_FOUND => Self::WalletNotFound,
            StatusWord::INVALID_ACCESS_CODE => Self::AccessCodeRequired,
            StatusWord::INVALID_PASSCODE => Self::PasscodeRequired,
            other => Self::UnknownStatus(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Underlying(format!("storage encoding: {error}"))
    }
}

/// Extension trait to add context to results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use tangem_core::TlvTag;

    use super::*;

    #[test]
    fn test_status_word_mapping() {
        assert_eq!(
            Error::from(StatusWord::INVALID_ACCESS_CODE),
            Error::AccessCodeRequired
        );
        assert_eq!(
            Error::from(StatusWord::INVALID_PASSCODE),
            Error::PasscodeRequired
        );
        assert_eq!(Error::from(StatusWord::FILE_NOT_FOUND).code(), 30007);
        assert_eq!(
            Error::from(StatusWord::new(0x6F, 0x00)),
            Error::UnknownStatus(StatusWord::new(0x6F, 0x00))
        );
    }

    #[test]
    fn test_core_error_mapping() {
        let missing = Error::from(tangem_core::Error::MissingTag(TlvTag::CardId));
        assert_eq!(missing.code(), 20005);
        assert_eq!(missing.category(), ErrorCategory::Protocol);

        let truncated = Error::from(tangem_core::Error::TruncatedHeader(3));
        assert!(matches!(truncated, Error::DeserializeApduFailed(_)));

        let lost = Error::from(tangem_core::Error::Transport(TransportError::TagLost));
        assert_eq!(lost, Error::TagLost);
        assert_eq!(lost.category(), ErrorCategory::Transient);
    }

    #[test]
    fn test_codes_follow_wrapped_errors() {
        let err = Error::Partial {
            completed: vec![0],
            source: Box::new(Error::DataSizeTooLarge),
        }
        .with_context("writing files");
        assert_eq!(err.code(), 40006);
        assert_eq!(err.root(), &Error::DataSizeTooLarge);
        assert!(Error::UserCancelled.with_context("scan").is_user_cancelled());
        assert_eq!(Error::WrongCardNumber("X".into()).code(), 50005);
    }
}

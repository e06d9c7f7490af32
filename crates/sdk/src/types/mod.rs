//! Card, wallet and file model

mod card;
mod card_id;
mod curve;
mod derivation;
mod file;
mod user_code;
mod version;
mod wallet;

pub use card::{
    BackupRawStatus, BackupStatus, Card, CardSettings, CardStatus, Issuer, LinkedTerminalStatus,
    Manufacturer, SettingsMask, SigningMethod,
};
pub use card_id::CardIdDisplayFormat;
pub use curve::EllipticCurve;
pub use derivation::{DerivationNode, DerivationPath, ExtendedPublicKey};
pub use file::{File, FileSettings, FileToWrite, FileVisibility};
pub use user_code::{DEFAULT_ACCESS_CODE, DEFAULT_PASSCODE, UserCode, UserCodeType};
pub use version::{FirmwareType, FirmwareVersion};
pub use wallet::{CardWallet, WalletIndex, WalletSettings, WalletStatus};

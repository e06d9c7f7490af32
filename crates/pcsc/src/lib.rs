//! PC/SC transport for Tangem cards
//!
//! NFC readers such as the ACR122U show a tapped Tangem card to the host as a
//! PC/SC card. [`PcscTransport`] implements `tangem_core::CardTransport` over
//! such a reader: the connection is opened lazily on the first frame, a
//! removed card surfaces as `TransportError::TagLost` so the session can wait
//! for the tag to come back, and the reader is released when the transport is
//! dropped.
//!
//! ```no_run
//! use tangem_transport_pcsc::PcscDeviceManager;
//!
//! # fn main() -> Result<(), tangem_transport_pcsc::PcscError> {
//! let devices = PcscDeviceManager::new()?;
//! let reader = devices.list_readers()?.into_iter().next();
//! if let Some(reader) = reader {
//!     let transport = devices.open_reader(reader.name())?;
//!     // hand `transport` to `tangem_sdk::reader::TransportReader::new`
//!     # drop(transport);
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transport::PcscTransport;

pub use pcsc::Protocols;

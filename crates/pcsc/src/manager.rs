//! Device manager for PC/SC operations

use pcsc::{Context, Scope};
use tracing::debug;

use crate::{
    config::PcscConfig,
    error::PcscError,
    reader::PcscReader,
    transport::PcscTransport,
};

/// Entry point for listing readers and opening transports
pub struct PcscDeviceManager {
    context: Context,
}

impl std::fmt::Debug for PcscDeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscDeviceManager").finish_non_exhaustive()
    }
}

impl PcscDeviceManager {
    /// Establish a user-scope PC/SC context
    pub fn new() -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let readers = self.context.list_readers_owned()?;
        if readers.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        let mut result = Vec::with_capacity(readers.len());
        for reader_name in readers {
            let mut states = vec![pcsc::ReaderState::new(
                reader_name.as_c_str(),
                pcsc::State::UNAWARE,
            )];
            match self.context.get_status_change(None, &mut states) {
                Ok(()) => result.push(PcscReader::from_reader_state(&states[0])),
                Err(error) => {
                    debug!(%error, reader = ?reader_name, "Reader status unavailable");
                    result.push(PcscReader::new(
                        reader_name.to_string_lossy().into_owned(),
                        false,
                        None,
                    ));
                }
            }
        }
        Ok(result)
    }

    /// Open a transport on a reader
    pub fn open_reader(&self, reader_name: &str) -> Result<PcscTransport, PcscError> {
        self.open_reader_with_config(reader_name, PcscConfig::default())
    }

    /// Open a transport on a reader with custom configuration
    pub fn open_reader_with_config(
        &self,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<PcscTransport, PcscError> {
        PcscTransport::new(self.context.clone(), reader_name, config)
    }
}

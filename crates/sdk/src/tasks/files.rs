use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    Error, Result,
    command::{CardSessionRunnable, Command, require_card},
    operations::{
        ChangeFileSettingsCommand, DeleteFileCommand, ReadFileCommand, SuccessResponse,
        WriteFileCommand,
    },
    session::CardSession,
    types::{File, FileToWrite, FileVisibility},
};

fn card_id(session: &CardSession) -> Result<String> {
    Ok(require_card(session.environment())?.card_id.clone())
}

/// Slots the files of a [`WriteFilesTask`] were written to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFilesResponse {
    /// Card id
    pub card_id: String,
    /// Slot of each written file, in request order
    pub file_indices: Vec<u8>,
}

/// Writes several files in one session
///
/// Files are written in order. When one fails the task stops and returns
/// [`Error::Partial`] listing the files already written.
#[derive(Debug, Clone)]
pub struct WriteFilesTask {
    files: Vec<FileToWrite>,
    overwrite_all: bool,
}

impl WriteFilesTask {
    /// Write `files` next to the existing ones
    pub const fn new(files: Vec<FileToWrite>) -> Self {
        Self {
            files,
            overwrite_all: false,
        }
    }

    /// Delete every existing file first
    pub const fn overwrite_all(mut self, overwrite_all: bool) -> Self {
        self.overwrite_all = overwrite_all;
        self
    }
}

#[async_trait]
impl CardSessionRunnable for WriteFilesTask {
    type Output = WriteFilesResponse;

    #[instrument(level = "debug", skip_all, fields(files = self.files.len()))]
    async fn execute(&mut self, session: &mut CardSession) -> Result<WriteFilesResponse> {
        if self.files.is_empty() {
            return Err(Error::FilesIsEmpty);
        }
        if self.overwrite_all {
            DeleteFilesTask::all().execute(session).await?;
        }

        let mut file_indices = Vec::with_capacity(self.files.len());
        for (position, file) in self.files.iter().enumerate() {
            match WriteFileCommand::new(file.clone()).run(session).await {
                Ok(response) => {
                    file_indices.extend(response.file_index);
                }
                Err(error) => {
                    warn!(position, %error, "File write failed");
                    return Err(Error::Partial {
                        completed: (0..position).collect(),
                        source: Box::new(error),
                    });
                }
            }
        }

        Ok(WriteFilesResponse {
            card_id: card_id(session)?,
            file_indices,
        })
    }
}

/// Deletes files in one session
#[derive(Debug, Clone)]
pub struct DeleteFilesTask {
    indices: Option<Vec<u8>>,
}

impl DeleteFilesTask {
    /// Delete every file on the card
    pub const fn all() -> Self {
        Self { indices: None }
    }

    /// Delete the files in the given slots
    pub const fn indices(indices: Vec<u8>) -> Self {
        Self {
            indices: Some(indices),
        }
    }
}

#[async_trait]
impl CardSessionRunnable for DeleteFilesTask {
    type Output = SuccessResponse;

    async fn execute(&mut self, session: &mut CardSession) -> Result<SuccessResponse> {
        match &self.indices {
            // Slots shift down after each delete, so slot 0 is deleted until
            // the card has nothing left to delete
            None => loop {
                match DeleteFileCommand::new(0).run(session).await {
                    Ok(_) => debug!("File deleted"),
                    Err(Error::ErrorProcessingCommand) => break,
                    Err(error) => return Err(error),
                }
            },
            Some(indices) => {
                let mut indices = indices.clone();
                indices.sort_unstable_by(|a, b| b.cmp(a));
                indices.dedup();
                for index in indices {
                    DeleteFileCommand::new(index).run(session).await?;
                    debug!(index, "File deleted");
                }
            }
        }
        Ok(SuccessResponse {
            card_id: card_id(session)?,
        })
    }
}

/// Reads several files in one session
#[derive(Debug, Clone, Default)]
pub struct ReadFilesTask {
    read_private: bool,
    indices: Option<Vec<u8>>,
    wallet_public_key: Option<Vec<u8>>,
}

impl ReadFilesTask {
    /// Read every file on the card
    pub const fn all() -> Self {
        Self {
            read_private: false,
            indices: None,
            wallet_public_key: None,
        }
    }

    /// Read the files in the given slots
    pub const fn indices(indices: Vec<u8>) -> Self {
        Self {
            read_private: false,
            indices: Some(indices),
            wallet_public_key: None,
        }
    }

    /// Also read private files, using the passcode
    pub const fn read_private_files(mut self, read_private: bool) -> Self {
        self.read_private = read_private;
        self
    }

    /// Only read files attached to this wallet
    pub fn with_wallet(mut self, public_key: impl Into<Vec<u8>>) -> Self {
        self.wallet_public_key = Some(public_key.into());
        self
    }

    fn command(&self, index: u8) -> ReadFileCommand {
        let command = ReadFileCommand::new(index).read_private_files(self.read_private);
        match &self.wallet_public_key {
            Some(key) => command.with_wallet(key.clone()),
            None => command,
        }
    }
}

#[async_trait]
impl CardSessionRunnable for ReadFilesTask {
    type Output = Vec<File>;

    async fn execute(&mut self, session: &mut CardSession) -> Result<Vec<File>> {
        let mut files = Vec::new();
        if let Some(indices) = &self.indices {
            for &index in indices {
                files.push(self.command(index).run(session).await?);
            }
            return Ok(files);
        }

        let mut index = 0u8;
        loop {
            let file = match self.command(index).run(session).await {
                Ok(file) => file,
                Err(Error::FileNotFound) => break,
                Err(error) => return Err(error),
            };
            let next = file.index.checked_add(1);
            if !file.data.is_empty() {
                files.push(file);
            }
            match next {
                Some(next) => index = next,
                None => break,
            }
        }
        debug!(count = files.len(), "Files read");
        Ok(files)
    }
}

/// Changes the visibility of several files
#[derive(Debug, Clone)]
pub struct ChangeFilesSettingsTask {
    changes: BTreeMap<u8, FileVisibility>,
}

impl ChangeFilesSettingsTask {
    /// Apply the visibility of each slot
    pub const fn new(changes: BTreeMap<u8, FileVisibility>) -> Self {
        Self { changes }
    }
}

#[async_trait]
impl CardSessionRunnable for ChangeFilesSettingsTask {
    type Output = SuccessResponse;

    async fn execute(&mut self, session: &mut CardSession) -> Result<SuccessResponse> {
        if self.changes.is_empty() {
            return Err(Error::FilesIsEmpty);
        }
        for (&index, &visibility) in &self.changes {
            ChangeFileSettingsCommand::new(index, visibility)
                .run(session)
                .await?;
        }
        Ok(SuccessResponse {
            card_id: card_id(session)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use tangem_core::{StatusWord, Tlv, TlvDecoder, TlvTag};

    use super::*;
    use crate::{
        CardManager,
        testing::{self, CardFixture, MockReader, ScriptedDelegate},
    };

    fn with_file_index(index: u8) -> Vec<Tlv> {
        let mut tlvs = testing::card_id_response();
        tlvs.push(Tlv::new(TlvTag::FileIndex, vec![index]));
        tlvs
    }

    fn file_page(index: u8, data: &[u8]) -> Vec<Tlv> {
        let mut tlvs = with_file_index(index);
        tlvs.push(Tlv::new(TlvTag::IssuerData, data.to_vec()));
        tlvs
    }

    fn file_indices(reader: &MockReader) -> Vec<u8> {
        reader
            .sent()
            .iter()
            .skip(2)
            .map(|apdu| {
                TlvDecoder::from_bytes(apdu.data())
                    .unwrap()
                    .decode::<u8>(TlvTag::FileIndex)
                    .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_write_stops_at_first_failure() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[]);
        // first file: initiate, one chunk, confirm
        reader.respond_tlvs(&with_file_index(0));
        reader.respond_tlvs(&testing::card_id_response());
        reader.respond_tlvs(&testing::card_id_response());
        // second file is refused
        reader.respond_status(StatusWord::INVALID_STATE);

        let files = (1..=3u8).map(|n| FileToWrite::new(vec![n; 10])).collect();
        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let error = manager
            .start_session(&mut WriteFilesTask::new(files), None)
            .await
            .unwrap_err();

        assert_eq!(
            error,
            Error::Partial {
                completed: vec![0],
                source: Box::new(Error::InvalidState),
            }
        );
        assert_eq!(reader.sent().len(), 6, "third file never attempted");
    }

    #[tokio::test]
    async fn test_delete_all_until_card_refuses() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[]);
        reader.respond_tlvs(&testing::card_id_response());
        reader.respond_tlvs(&testing::card_id_response());
        reader.respond_status(StatusWord::ERROR_PROCESSING_COMMAND);

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let response = manager
            .start_session(&mut DeleteFilesTask::all(), None)
            .await
            .unwrap();
        assert_eq!(response.card_id, testing::CARD_ID);
        assert_eq!(file_indices(&reader), [0, 0, 0]);
    }

    #[tokio::test]
    async fn test_delete_highest_slot_first() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[]);
        for _ in 0..3 {
            reader.respond_tlvs(&testing::card_id_response());
        }

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        manager
            .start_session(&mut DeleteFilesTask::indices(vec![1, 4, 2, 4]), None)
            .await
            .unwrap();
        assert_eq!(file_indices(&reader), [4, 2, 1]);
    }

    #[tokio::test]
    async fn test_read_all_skips_empty_files() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[]);
        reader.respond_tlvs(&file_page(0, b"first"));
        reader.respond_tlvs(&file_page(1, b""));
        reader.respond_tlvs(&file_page(2, b"third"));
        reader.respond_status(StatusWord::FILE_NOT_FOUND);

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let files = manager
            .start_session(&mut ReadFilesTask::all(), None)
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].data, b"first");
        assert_eq!(files[1].index, 2);
        assert_eq!(file_indices(&reader), [0, 1, 2, 3]);
    }
}

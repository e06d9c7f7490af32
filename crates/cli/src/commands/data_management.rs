use std::path::Path;

use anyhow::{Context, Result};
use tangem_core::{Tlv, TlvList};
use tangem_sdk::{
    CardManager,
    tasks::{DeleteFilesTask, ReadFilesTask, WriteFilesTask},
    types::{FileToWrite, FileVisibility},
};

use crate::utils::{self, display};

/// Read files from the card
pub async fn read_files_command(
    manager: &CardManager,
    card_id: Option<&str>,
    indices: Vec<u8>,
    private: bool,
) -> Result<()> {
    let task = if indices.is_empty() {
        ReadFilesTask::all()
    } else {
        ReadFilesTask::indices(indices)
    };
    let files = manager
        .start_session(&mut task.read_private_files(private), card_id)
        .await?;

    if files.is_empty() {
        println!("{}", display::info("No files"));
    }
    for file in files {
        let visibility = file
            .settings
            .map_or_else(|| "unknown".into(), |s| format!("{:?}", s.visibility));
        println!(
            "{}",
            display::key_value_box(
                &format!("File #{}", file.index),
                vec![
                    ("Visibility", visibility),
                    ("Size", file.data.len().to_string()),
                    ("Data", hex::encode(&file.data)),
                ],
            )
        );
    }
    Ok(())
}

/// Write a file from a path or a hex string
pub async fn write_file_command(
    manager: &CardManager,
    card_id: Option<&str>,
    data: &str,
    public: bool,
) -> Result<()> {
    let bytes = if Path::new(data).exists() {
        std::fs::read(data).with_context(|| format!("failed to read {data}"))?
    } else {
        utils::parse_hex(data)?
    };
    let visibility = if public {
        FileVisibility::Public
    } else {
        FileVisibility::Private
    };

    let mut task = WriteFilesTask::new(vec![FileToWrite::new(bytes).with_visibility(visibility)]);
    let response = manager.start_session(&mut task, card_id).await?;
    println!(
        "{}",
        display::success(&format!("File written to slot {:?}", response.file_indices))
    );
    Ok(())
}

/// Delete files from the card
pub async fn delete_files_command(
    manager: &CardManager,
    card_id: Option<&str>,
    indices: Vec<u8>,
) -> Result<()> {
    let mut task = if indices.is_empty() {
        DeleteFilesTask::all()
    } else {
        DeleteFilesTask::indices(indices)
    };
    manager.start_session(&mut task, card_id).await?;
    println!("{}", display::success("Files deleted"));
    Ok(())
}

/// Decode a TLV payload offline, masking sensitive values
pub fn decode_tlv_command(payload: &str) -> Result<()> {
    let tlvs = Tlv::decode_all(&utils::parse_hex(payload)?)?;
    println!("{}", TlvList(&tlvs));
    Ok(())
}

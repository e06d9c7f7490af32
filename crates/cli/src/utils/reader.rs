use anyhow::{Result, anyhow};
use tangem_transport_pcsc::{PcscDeviceManager, PcscReader};

/// Find a reader with a specific name
pub fn find_reader_by_name(manager: &PcscDeviceManager, reader_name: &str) -> Result<PcscReader> {
    manager
        .list_readers()?
        .into_iter()
        .find(|r| r.name() == reader_name)
        .ok_or_else(|| anyhow!("Reader '{reader_name}' not found"))
}

/// List all available readers
pub fn list_readers(manager: &PcscDeviceManager) -> Result<()> {
    let readers = manager.list_readers()?;

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = if reader.has_card() {
            "card present"
        } else {
            "no card"
        };
        println!("{}. {} ({})", i + 1, reader.name(), status);
    }
    Ok(())
}

/// Pick the reader to run sessions on
///
/// Contactless readers report no card until a tag is tapped, so without a
/// name the first reader holding a card is preferred and the first reader
/// is used otherwise.
pub fn pick_reader(manager: &PcscDeviceManager, reader_name: Option<&str>) -> Result<PcscReader> {
    if let Some(name) = reader_name {
        return find_reader_by_name(manager, name);
    }
    let readers = manager.list_readers()?;
    readers
        .iter()
        .find(|r| r.has_card())
        .or_else(|| readers.first())
        .cloned()
        .ok_or_else(|| anyhow!("No readers found"))
}

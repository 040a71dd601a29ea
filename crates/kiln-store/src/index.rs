//! Rebuilding the archive index from the artifacts on disk.

use crate::artifact::{classify, extract};
use crate::{fsync_dir, StoreError};
use kiln_schema::{ArchiveEntry, ArchiveIndex, PackageDescriptor, INDEX_FILE_NAME};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::debug;

/// Scan the regular files directly under `dir` and index every artifact
/// that yields a descriptor.
///
/// Artifacts without a readable descriptor are skipped. When several
/// artifacts describe the same package, the most recently modified one wins,
/// and a tie goes to the higher version.
pub fn build_index(dir: &Path) -> Result<ArchiveIndex, StoreError> {
    let mut best: HashMap<String, (SystemTime, PackageDescriptor)> = HashMap::new();
    let mut skipped = 0usize;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = match entry.path().symlink_metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if classify(&file_name).is_none() {
            continue;
        }
        let Some(desc) = extract(&entry.path()) else {
            skipped += 1;
            continue;
        };
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        let replace = match best.get(desc.name.as_str()) {
            None => true,
            Some((seen, existing)) => {
                mtime > *seen || (mtime == *seen && desc.version > existing.version)
            }
        };
        if replace {
            best.insert(desc.name.to_string(), (mtime, desc));
        }
    }

    debug!(
        "indexed {} packages in {} ({skipped} artifacts skipped)",
        best.len(),
        dir.display()
    );
    Ok(best
        .values()
        .map(|(_, desc)| ArchiveEntry::from(desc))
        .collect())
}

/// Rebuild the index for `dir` and atomically replace its `archive-contents`.
pub fn write_index(dir: &Path) -> Result<ArchiveIndex, StoreError> {
    let index = build_index(dir)?;
    let content = index.serialize();

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(INDEX_FILE_NAME))
        .map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;

    debug!("wrote {} entries to {}", index.len(), dir.display());
    Ok(index)
}

/// Read the index currently on disk in `dir`.
pub fn read_index(dir: &Path) -> Result<ArchiveIndex, StoreError> {
    let text = fs::read_to_string(dir.join(INDEX_FILE_NAME))?;
    Ok(ArchiveIndex::parse(&text)?)
}

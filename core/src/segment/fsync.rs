use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::buffer::BufferError;

/// Writes `bytes` to a sibling temp file and renames it over `path`,
/// creating the segment directory on first use. With `sync`, both the file
/// and its directory entry are flushed to disk before returning.
pub(super) fn write_file_atomically(
    path: &Path,
    bytes: &[u8],
    sync: bool,
) -> Result<(), BufferError> {
    let segment_dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = segment_dir {
        fs::create_dir_all(dir)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    if sync {
        file.sync_all()?;
    }
    drop(file);

    fs::rename(&temp_path, path)?;
    if let (true, Some(dir)) = (sync, segment_dir) {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

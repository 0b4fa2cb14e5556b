//! Zip archive source.
//!
//! The archive bytes are written to a uniquely named working file inside the
//! staging directory, every entry is extracted next to it, and the working
//! file is removed again whether extraction succeeded or not. The unique name
//! keeps an archive entry from ever overwriting the file being read.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::FetchError;
use crate::ingest::StagingArea;

/// Prefix of the transient working file inside the staging directory.
pub const WORKING_FILE_PREFIX: &str = ".upload-";
/// Suffix of the transient working file inside the staging directory.
pub const WORKING_FILE_SUFFIX: &str = ".zip";

/// Removes the working file when dropped.
struct WorkingFile(PathBuf);

impl Drop for WorkingFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.0.display(), error = %e, "failed to remove zip working file");
            }
        }
    }
}

/// Extract `bytes` (a zip archive) into the staging directory.
pub fn fetch_archive(bytes: &[u8], staging: &mut StagingArea<'_>) -> Result<(), FetchError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(WORKING_FILE_PREFIX)
        .suffix(WORKING_FILE_SUFFIX)
        .tempfile_in(staging.root())?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    let (_, zip_path) = tmp.keep().map_err(|e| FetchError::Io(e.error))?;
    let _working = WorkingFile(zip_path.clone());

    // The archive handle is closed at the end of this block, before the
    // working file is removed.
    let written = {
        let file = File::open(&zip_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(zip_error)?;

        let files: Vec<PathBuf> = (0..archive.len())
            .filter_map(|i| {
                let entry = archive.by_index(i).ok()?;
                if entry.is_dir() {
                    None
                } else {
                    entry.enclosed_name()
                }
            })
            .collect();

        archive.extract(staging.root()).map_err(zip_error)?;
        files
    };

    for rel in written {
        let path = staging.root().join(rel);
        staging.file_written(&path);
    }
    Ok(())
}

fn zip_error(e: zip::result::ZipError) -> FetchError {
    match e {
        zip::result::ZipError::Io(io) => FetchError::Io(io),
        other => FetchError::Transfer(format!("invalid zip archive: {}", other)),
    }
}

/// Whether `path` looks like an archive working file.
pub fn is_working_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(WORKING_FILE_PREFIX) && n.ends_with(WORKING_FILE_SUFFIX))
        .unwrap_or(false)
}

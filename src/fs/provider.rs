//! Metadata provider seam used by the walker and the snapshot engine.

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use super::attrs::EntryAttrs;
use super::error::{FsError, FsResult};

/// Source of directory listings and entry metadata.
///
/// Implementations must report a missing entry as [`FsError::NotFound`]
/// so callers can treat it as absent rather than fatal.
pub trait FileSystem: Send + Sync {
    /// Names of the direct children of `dir`, in no particular order.
    fn list(&self, dir: &Path) -> FsResult<Vec<OsString>>;

    /// Metadata of `path` without following a trailing symlink.
    fn stat(&self, path: &Path) -> FsResult<EntryAttrs>;
}

/// [`FileSystem`] backed by the host filesystem through `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }

    /// Fail with `UnsupportedOperation` on targets without a host filesystem.
    pub(crate) fn ensure_supported(operation: &'static str) -> FsResult<()> {
        if cfg!(any(unix, windows)) {
            Ok(())
        } else {
            Err(FsError::UnsupportedOperation { operation })
        }
    }
}

impl FileSystem for LocalFs {
    fn list(&self, dir: &Path) -> FsResult<Vec<OsString>> {
        Self::ensure_supported("list")?;

        let entries = fs::read_dir(dir).map_err(|e| FsError::io(dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => names.push(entry.file_name()),
                // The directory itself went away mid-iteration.
                Err(e) => return Err(FsError::io(dir, e)),
            }
        }
        Ok(names)
    }

    fn stat(&self, path: &Path) -> FsResult<EntryAttrs> {
        Self::ensure_supported("stat")?;

        let metadata = fs::symlink_metadata(path).map_err(|e| FsError::io(path, e))?;
        Ok(EntryAttrs::from_metadata(&metadata))
    }
}

//! Point-in-time metadata records used for change detection.
//!
//! Every field is a plain `i64` so two records compare with derived
//! equality. Values the platform cannot supply are stored as [`UNAVAILABLE`].

use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sentinel for a metadata field the platform does not provide.
pub const UNAVAILABLE: i64 = -1;

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Dir,
    File,
}

/// Metadata of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirAttrs {
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified: i64,
    pub owner: i64,
    pub group: i64,
    /// Permission bits.
    pub mode: i64,
}

/// Metadata of a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileAttrs {
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified: i64,
    pub owner: i64,
    pub group: i64,
    /// Permission bits.
    pub mode: i64,
    /// Length in bytes.
    pub size: i64,
}

/// Metadata of either kind of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryAttrs {
    Dir(DirAttrs),
    File(FileAttrs),
}

impl EntryAttrs {
    /// Build a record from `std` metadata.
    ///
    /// Anything that is not a directory (symlinks and special files
    /// included) is recorded as a file.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let (owner, group, mode) = ownership(metadata);
        let modified = metadata
            .modified()
            .map(nanos_since_epoch)
            .unwrap_or(UNAVAILABLE);

        if metadata.is_dir() {
            EntryAttrs::Dir(DirAttrs {
                modified,
                owner,
                group,
                mode,
            })
        } else {
            EntryAttrs::File(FileAttrs {
                modified,
                owner,
                group,
                mode,
                size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            })
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            EntryAttrs::Dir(_) => EntryKind::Dir,
            EntryAttrs::File(_) => EntryKind::File,
        }
    }

    pub fn modified(&self) -> i64 {
        match self {
            EntryAttrs::Dir(attrs) => attrs.modified,
            EntryAttrs::File(attrs) => attrs.modified,
        }
    }
}

fn nanos_since_epoch(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX),
        // Pre-epoch timestamps are rare enough to collapse onto the sentinel.
        Err(_) => UNAVAILABLE,
    }
}

#[cfg(unix)]
fn ownership(metadata: &Metadata) -> (i64, i64, i64) {
    use std::os::unix::fs::MetadataExt;

    (
        i64::from(metadata.uid()),
        i64::from(metadata.gid()),
        i64::from(metadata.mode() & 0o7777),
    )
}

#[cfg(not(unix))]
fn ownership(_metadata: &Metadata) -> (i64, i64, i64) {
    (UNAVAILABLE, UNAVAILABLE, UNAVAILABLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_attrs_from_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let attrs = EntryAttrs::from_metadata(&fs::metadata(&file).unwrap());
        match attrs {
            EntryAttrs::File(attrs) => {
                assert_eq!(attrs.size, 5);
                assert!(attrs.modified > 0);
            }
            EntryAttrs::Dir(_) => panic!("expected file attrs"),
        }

        let attrs = EntryAttrs::from_metadata(&fs::metadata(temp_dir.path()).unwrap());
        assert_eq!(attrs.kind(), EntryKind::Dir);
    }

    #[test]
    fn test_equality_covers_every_field() {
        let base = FileAttrs {
            modified: 10,
            owner: 1,
            group: 1,
            mode: 0o644,
            size: 3,
        };

        assert_eq!(base, base);
        assert_ne!(base, FileAttrs { size: 4, ..base });
        assert_ne!(base, FileAttrs { modified: 11, ..base });
        assert_ne!(base, FileAttrs { mode: 0o600, ..base });
    }
}

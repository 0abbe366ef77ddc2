//! Change events produced by the snapshot diff.

use std::fmt;

use crate::fs::{Dir, DirAttrs, EntryKind, File, FileAttrs, FsPath};

/// A single observed change below a watched root.
///
/// `old` and `now` on the modification variants are optional so that
/// sources unable to report prior metadata can still emit them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSystemEvent {
    DirCreated(Dir),
    DirDeleted(Dir),
    DirModified {
        dir: Dir,
        old: Option<DirAttrs>,
        now: Option<DirAttrs>,
    },
    FileCreated(File),
    FileDeleted(File),
    FileModified {
        file: File,
        old: Option<FileAttrs>,
        now: Option<FileAttrs>,
    },
}

/// What happened, independent of the entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Deleted,
    Modified,
}

impl FileSystemEvent {
    pub fn path(&self) -> &FsPath {
        match self {
            FileSystemEvent::DirCreated(dir)
            | FileSystemEvent::DirDeleted(dir)
            | FileSystemEvent::DirModified { dir, .. } => dir.path(),
            FileSystemEvent::FileCreated(file)
            | FileSystemEvent::FileDeleted(file)
            | FileSystemEvent::FileModified { file, .. } => file.path(),
        }
    }

    pub fn change(&self) -> ChangeKind {
        match self {
            FileSystemEvent::DirCreated(_) | FileSystemEvent::FileCreated(_) => ChangeKind::Created,
            FileSystemEvent::DirDeleted(_) | FileSystemEvent::FileDeleted(_) => ChangeKind::Deleted,
            FileSystemEvent::DirModified { .. } | FileSystemEvent::FileModified { .. } => {
                ChangeKind::Modified
            }
        }
    }

    pub fn entry_kind(&self) -> EntryKind {
        match self {
            FileSystemEvent::DirCreated(_)
            | FileSystemEvent::DirDeleted(_)
            | FileSystemEvent::DirModified { .. } => EntryKind::Dir,
            FileSystemEvent::FileCreated(_)
            | FileSystemEvent::FileDeleted(_)
            | FileSystemEvent::FileModified { .. } => EntryKind::File,
        }
    }

    /// Upper-case tag such as `FILE_CREATED`.
    pub fn tag(&self) -> &'static str {
        match self {
            FileSystemEvent::DirCreated(_) => "DIR_CREATED",
            FileSystemEvent::DirDeleted(_) => "DIR_DELETED",
            FileSystemEvent::DirModified { .. } => "DIR_MODIFIED",
            FileSystemEvent::FileCreated(_) => "FILE_CREATED",
            FileSystemEvent::FileDeleted(_) => "FILE_DELETED",
            FileSystemEvent::FileModified { .. } => "FILE_MODIFIED",
        }
    }
}

impl fmt::Display for FileSystemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tag(), self.path())
    }
}

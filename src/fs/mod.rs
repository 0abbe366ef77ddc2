//! Filesystem model: paths, metadata, traversal and directory operations.
//!
//! # Architecture
//!
//! ```text
//! FsPath ── Dir / File          (handles, one path each)
//!   |
//! FileSystem (LocalFs)          (list + stat, NotFound tolerant)
//!   |
//! walk()                        (breadth-first, sorted, iterative)
//!   |
//! Dir::delete / copy_to / move_to / find_*
//! ```

mod attrs;
mod dir;
mod error;
mod file;
mod options;
mod path;
mod provider;
mod walker;

pub use attrs::{DirAttrs, EntryAttrs, EntryKind, FileAttrs, UNAVAILABLE};
pub use dir::{Dir, Entry};
pub use error::{FsError, FsResult};
pub use file::File;
pub use options::{CopyListener, CopyOptions, TransferFlags};
pub use path::FsPath;
pub use provider::{FileSystem, LocalFs};
pub use walker::{WalkControl, walk, walk_files, walk_tolerant};

#[cfg(test)]
pub(crate) use walker::tests::FakeFs;

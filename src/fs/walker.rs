//! Breadth-first directory traversal with a deterministic visiting order.
//!
//! Children of every directory are sorted by name before they are visited,
//! so identical trees always produce identical sequences. The traversal
//! uses an explicit queue and never recurses.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::attrs::{DirAttrs, EntryAttrs, FileAttrs};
use super::error::{FsError, FsResult};
use super::provider::FileSystem;

/// Returned by the directory callback to control descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    /// Visit the directory's children.
    Descend,
    /// Prune the directory's subtree.
    Skip,
}

/// Walk the tree below `root`.
///
/// `on_dir` sees every directory before its children are queued; `on_file`
/// sees every non-directory entry. The root itself is not reported.
///
/// An entry that disappears between being listed and being visited is
/// skipped. A missing or non-directory `root` is an error, as is any other
/// failure to list or stat an entry.
pub fn walk<F, D>(fs: &dyn FileSystem, root: &Path, on_file: F, on_dir: D) -> FsResult<()>
where
    F: FnMut(&Path, FileAttrs),
    D: FnMut(&Path, DirAttrs) -> WalkControl,
{
    traverse(fs, root, on_file, on_dir, |_, e| Err(e))
}

/// Like [`walk`], but an entry below `root` that cannot be listed or
/// stat'ed is handed to `on_error` and skipped instead of ending the walk.
///
/// Failures on `root` itself are still returned.
pub fn walk_tolerant<F, D, E>(
    fs: &dyn FileSystem,
    root: &Path,
    on_file: F,
    on_dir: D,
    mut on_error: E,
) -> FsResult<()>
where
    F: FnMut(&Path, FileAttrs),
    D: FnMut(&Path, DirAttrs) -> WalkControl,
    E: FnMut(&Path, &FsError),
{
    traverse(fs, root, on_file, on_dir, |path, e| {
        on_error(path, &e);
        Ok(())
    })
}

fn traverse<F, D, E>(
    fs: &dyn FileSystem,
    root: &Path,
    mut on_file: F,
    mut on_dir: D,
    mut on_error: E,
) -> FsResult<()>
where
    F: FnMut(&Path, FileAttrs),
    D: FnMut(&Path, DirAttrs) -> WalkControl,
    E: FnMut(&Path, FsError) -> FsResult<()>,
{
    match fs.stat(root)? {
        EntryAttrs::Dir(_) => {}
        EntryAttrs::File(_) => {
            return Err(FsError::NotADirectory {
                path: root.to_path_buf(),
            });
        }
    }

    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(root.to_path_buf());
    let mut at_root = true;

    while let Some(dir) = queue.pop_front() {
        let mut names = match fs.list(&dir) {
            Ok(names) => names,
            Err(e) if at_root => return Err(e),
            Err(e) if is_vanished(&e) => {
                tracing::trace!("[walker] directory vanished: {}", dir.display());
                continue;
            }
            Err(e) => {
                on_error(&dir, e)?;
                continue;
            }
        };
        at_root = false;
        names.sort();

        for name in names {
            let path = dir.join(&name);
            match fs.stat(&path) {
                Ok(EntryAttrs::File(attrs)) => on_file(&path, attrs),
                Ok(EntryAttrs::Dir(attrs)) => {
                    if on_dir(&path, attrs) == WalkControl::Descend {
                        queue.push_back(path);
                    }
                }
                Err(e) if is_vanished(&e) => {
                    tracing::trace!("[walker] entry vanished: {}", path.display());
                }
                Err(e) => on_error(&path, e)?,
            }
        }
    }

    Ok(())
}

/// Walk every file below `root`, descending into all directories.
pub fn walk_files<F>(fs: &dyn FileSystem, root: &Path, on_file: F) -> FsResult<()>
where
    F: FnMut(&Path, FileAttrs),
{
    walk(fs, root, on_file, |_, _| WalkControl::Descend)
}

fn is_vanished(e: &FsError) -> bool {
    matches!(e, FsError::NotFound { .. } | FsError::NotADirectory { .. })
}

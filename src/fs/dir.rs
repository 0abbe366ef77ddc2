//! Directory handle and the tree operations built on the walker.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::attrs::{DirAttrs, EntryAttrs, EntryKind};
use super::error::{FsError, FsResult};
use super::file::File;
use super::options::{CopyOptions, TransferFlags};
use super::path::FsPath;
use super::provider::{FileSystem, LocalFs};
use super::walker::{WalkControl, walk};

/// A directory location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dir {
    path: FsPath,
}

/// A direct child returned by [`Dir::list`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entry {
    Dir(Dir),
    File(File),
}

impl Entry {
    pub fn path(&self) -> &FsPath {
        match self {
            Entry::Dir(dir) => dir.path(),
            Entry::File(file) => file.path(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Dir(_) => EntryKind::Dir,
            Entry::File(_) => EntryKind::File,
        }
    }
}

impl Dir {
    pub fn new(path: FsPath) -> Self {
        Self { path }
    }

    pub fn of(raw: &str) -> FsResult<Self> {
        Ok(Self::new(FsPath::of(raw)?))
    }

    pub fn from_path(raw: impl Into<PathBuf>) -> FsResult<Self> {
        Ok(Self::new(FsPath::from_path(raw)?))
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    pub fn into_path(self) -> FsPath {
        self.path
    }

    /// Whether a directory exists at this location.
    pub fn exists(&self) -> FsResult<bool> {
        self.path.is_dir()
    }

    pub fn attrs(&self) -> FsResult<DirAttrs> {
        match self.path.stat()? {
            EntryAttrs::Dir(attrs) => Ok(attrs),
            EntryAttrs::File(_) => Err(self.not_a_directory()),
        }
    }

    /// Create the directory and any missing ancestors.
    ///
    /// Returns `false` when the directory already existed.
    pub fn create(&self) -> FsResult<bool> {
        match self.path.kind()? {
            Some(EntryKind::Dir) => Ok(false),
            Some(EntryKind::File) => Err(self.not_a_directory()),
            None => {
                fs::create_dir_all(self.path.absolute())
                    .map_err(|e| FsError::io(self.path.absolute(), e))?;
                Ok(true)
            }
        }
    }

    /// Delete the directory.
    ///
    /// Returns `false` when nothing existed. A non-recursive delete of a
    /// non-empty directory fails with `NotEmpty`. A recursive delete removes
    /// all files first, then directories deepest first.
    pub fn delete(&self, recursive: bool) -> FsResult<bool> {
        let root = self.path.absolute();
        match self.path.kind()? {
            None => return Ok(false),
            Some(EntryKind::File) => return Err(self.not_a_directory()),
            Some(EntryKind::Dir) => {}
        }

        if !recursive {
            if !LocalFs.list(root)?.is_empty() {
                return Err(FsError::NotEmpty {
                    path: root.to_path_buf(),
                });
            }
            return remove_ignoring_missing(root, |p| fs::remove_dir(p));
        }

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let walked = walk(
            &LocalFs,
            root,
            |path, _| files.push(path.to_path_buf()),
            |path, _| {
                dirs.push(path.to_path_buf());
                WalkControl::Descend
            },
        );
        match walked {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        }

        for file in &files {
            remove_ignoring_missing(file, |p| fs::remove_file(p))?;
        }
        // Breadth-first order puts children after parents; reverse it so no
        // directory is removed while it still has children.
        for dir in dirs.iter().rev() {
            remove_ignoring_missing(dir, |p| fs::remove_dir(p))?;
        }
        let removed = remove_ignoring_missing(root, |p| fs::remove_dir(p))?;

        crate::debug_event!(
            "dir",
            "deleted",
            "{} ({} files, {} dirs)",
            root.display(),
            files.len(),
            dirs.len()
        );
        Ok(removed)
    }

    /// Direct children sorted by name.
    pub fn list(&self) -> FsResult<Vec<Entry>> {
        self.require_dir()?;

        let mut names = LocalFs.list(self.path.absolute())?;
        names.sort();

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let child = self.path.join(&name)?;
            match child.stat() {
                Ok(EntryAttrs::Dir(_)) => entries.push(Entry::Dir(Dir::new(child))),
                Ok(EntryAttrs::File(_)) => entries.push(Entry::File(File::new(child))),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    /// All files in the subtree accepted by `predicate`, in walk order.
    pub fn find_files<P>(&self, mut predicate: P) -> FsResult<Vec<File>>
    where
        P: FnMut(&File) -> bool,
    {
        self.require_dir()?;

        let mut found = Vec::new();
        let mut failure = None;
        walk(
            &LocalFs,
            self.path.absolute(),
            |path, _| match File::from_path(path) {
                Ok(file) if predicate(&file) => found.push(file),
                Ok(_) => {}
                Err(e) => {
                    failure.get_or_insert(e);
                }
            },
            |_, _| WalkControl::Descend,
        )?;
        match failure {
            Some(e) => Err(e),
            None => Ok(found),
        }
    }

    /// All directories in the subtree accepted by `predicate`, in walk order.
    pub fn find_dirs<P>(&self, mut predicate: P) -> FsResult<Vec<Dir>>
    where
        P: FnMut(&Dir) -> bool,
    {
        self.require_dir()?;

        let mut found = Vec::new();
        let mut failure = None;
        walk(
            &LocalFs,
            self.path.absolute(),
            |_, _| {},
            |path, _| {
                match Dir::from_path(path) {
                    Ok(dir) if predicate(&dir) => found.push(dir),
                    Ok(_) => {}
                    Err(e) => {
                        failure.get_or_insert(e);
                    }
                }
                WalkControl::Descend
            },
        )?;
        match failure {
            Some(e) => Err(e),
            None => Ok(found),
        }
    }

    /// Copy this directory tree to `target`.
    ///
    /// The source tree is collected before anything is written, so copying
    /// into a descendant of the source terminates.
    pub fn copy_to(&self, target: &FsPath, options: &CopyOptions) -> FsResult<Dir> {
        if self.path == *target {
            return Ok(self.clone());
        }
        self.require_dir()?;

        let source_root = self.path.absolute();
        let entries: RefCell<Vec<(PathBuf, EntryKind)>> = RefCell::new(Vec::new());
        walk(
            &LocalFs,
            source_root,
            |path, _| entries.borrow_mut().push((path.to_path_buf(), EntryKind::File)),
            |path, _| {
                entries.borrow_mut().push((path.to_path_buf(), EntryKind::Dir));
                WalkControl::Descend
            },
        )?;
        let entries = entries.into_inner();

        if let Some(kind) = target.kind()? {
            if !options.flags.allows_collision() {
                return Err(FsError::AlreadyExists {
                    path: target.absolute().to_path_buf(),
                });
            }
            if !options.flags.contains(TransferFlags::MERGE) || kind == EntryKind::File {
                reject_ancestor(&self.path, target, "overwrite")?;
                remove_any(target)?;
            }
        }

        let target_root = target.absolute();
        fs::create_dir_all(target_root).map_err(|e| FsError::io(target_root, e))?;
        options.dir_copied(source_root, target_root);

        let mut copied_files = 0usize;
        for (source, kind) in &entries {
            let relative = source.strip_prefix(source_root).unwrap_or(source);
            let destination = target_root.join(relative);
            match kind {
                EntryKind::Dir => {
                    if let Some(EntryKind::File) = FsPath::from_path(&destination)?.kind()? {
                        remove_ignoring_missing(&destination, |p| fs::remove_file(p))?;
                    }
                    fs::create_dir_all(&destination)
                        .map_err(|e| FsError::io(&destination, e))?;
                    options.dir_copied(source, &destination);
                }
                EntryKind::File => {
                    let destination_path = FsPath::from_path(&destination)?;
                    if let Some(EntryKind::Dir) = destination_path.kind()? {
                        Dir::new(destination_path).delete(true)?;
                    }
                    match copy_file_entry(source, &destination) {
                        Ok(()) => {
                            copied_files += 1;
                            options.file_copied(source, &destination);
                        }
                        Err(e)
                            if e.kind() == io::ErrorKind::NotFound
                                && fs::symlink_metadata(source).is_err() =>
                        {
                            tracing::debug!(
                                "[dir] source vanished during copy: {}",
                                source.display()
                            );
                        }
                        Err(e) => return Err(FsError::io(source, e)),
                    }
                }
            }
        }

        crate::debug_event!(
            "dir",
            "copied",
            "{} -> {} ({copied_files} files)",
            source_root.display(),
            target_root.display()
        );
        Ok(Dir::new(target.clone()))
    }

    /// Move this directory to `target`.
    ///
    /// Uses a rename when possible and falls back to copy then delete.
    pub fn move_to(&self, target: &FsPath, flags: TransferFlags) -> FsResult<Dir> {
        if self.path == *target {
            return Ok(self.clone());
        }
        self.require_dir()?;

        if target.absolute().starts_with(self.path.absolute()) {
            return Err(FsError::invalid(format!(
                "cannot move {} into itself",
                self.path
            )));
        }
        reject_ancestor(&self.path, target, "move")?;

        if let Some(kind) = target.kind()? {
            if !flags.allows_collision() {
                return Err(FsError::AlreadyExists {
                    path: target.absolute().to_path_buf(),
                });
            }
            if flags.contains(TransferFlags::MERGE) && kind == EntryKind::Dir {
                let merged = self.copy_to(target, &CopyOptions::from(flags))?;
                self.delete(true)?;
                return Ok(merged);
            }
            remove_any(target)?;
        }

        create_parent(target)?;
        if let Err(e) = fs::rename(self.path.absolute(), target.absolute()) {
            if e.kind() == io::ErrorKind::NotFound {
                return Err(FsError::io(self.path.absolute(), e));
            }
            tracing::debug!("[dir] rename failed ({e}), copying instead");
            self.copy_to(target, &CopyOptions::default())?;
            self.delete(true)?;
        }

        crate::debug_event!("dir", "moved", "{} -> {}", self.path, target);
        Ok(Dir::new(target.clone()))
    }

    /// Rename within the same parent directory.
    pub fn rename_to(&self, new_name: &str, flags: TransferFlags) -> FsResult<Dir> {
        let target = sibling(&self.path, new_name)?;
        self.move_to(&target, flags)
    }

    fn require_dir(&self) -> FsResult<()> {
        match self.path.kind()? {
            Some(EntryKind::Dir) => Ok(()),
            Some(EntryKind::File) => Err(self.not_a_directory()),
            None => Err(FsError::NotFound {
                path: self.path.absolute().to_path_buf(),
            }),
        }
    }

    fn not_a_directory(&self) -> FsError {
        FsError::NotADirectory {
            path: self.path.absolute().to_path_buf(),
        }
    }
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}

/// Resolve `new_name` next to `path`, rejecting names that would leave the
/// parent directory.
pub(crate) fn sibling(path: &FsPath, new_name: &str) -> FsResult<FsPath> {
    if new_name.trim().is_empty() {
        return Err(FsError::invalid("new name must not be empty"));
    }
    if new_name.chars().any(std::path::is_separator) {
        return Err(FsError::invalid(format!(
            "new name '{new_name}' must not contain a path separator"
        )));
    }
    if new_name == "." || new_name == ".." {
        return Err(FsError::invalid(format!("'{new_name}' is not a valid name")));
    }
    let parent = path
        .parent()
        .ok_or_else(|| FsError::invalid(format!("{path} has no parent to rename within")))?;
    parent.join(new_name)
}

/// Remove whatever is at `path`, recursing into directories.
pub(crate) fn remove_any(path: &FsPath) -> FsResult<()> {
    match path.kind()? {
        Some(EntryKind::Dir) => {
            Dir::new(path.clone()).delete(true)?;
        }
        Some(EntryKind::File) => {
            remove_ignoring_missing(path.absolute(), |p| fs::remove_file(p))?;
        }
        None => {}
    }
    Ok(())
}

/// Fail when `target` contains `source`: clearing it would destroy the source.
pub(crate) fn reject_ancestor(
    source: &FsPath,
    target: &FsPath,
    operation: &str,
) -> FsResult<()> {
    if source.absolute().starts_with(target.absolute()) {
        return Err(FsError::invalid(format!(
            "cannot {operation} {target} with its own descendant {source}"
        )));
    }
    Ok(())
}

/// Copy one file entry found by the walker. Symlinks are recreated, not followed.
fn copy_file_entry(source: &Path, destination: &Path) -> io::Result<()> {
    #[cfg(unix)]
    if fs::symlink_metadata(source)?.file_type().is_symlink() {
        let link = fs::read_link(source)?;
        match fs::remove_file(destination) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        return std::os::unix::fs::symlink(link, destination);
    }
    fs::copy(source, destination).map(|_| ())
}

pub(crate) fn create_parent(path: &FsPath) -> FsResult<()> {
    if let Some(parent) = path.absolute().parent() {
        fs::create_dir_all(parent).map_err(|e| FsError::io(parent, e))?;
    }
    Ok(())
}

/// Run a removal, treating an already-missing entry as success.
///
/// Returns whether the entry was actually removed.
fn remove_ignoring_missing<F>(path: &Path, remove: F) -> FsResult<bool>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    match remove(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FsError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(root: &Path) {
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/one.txt"), b"1").unwrap();
        fs::write(root.join("a/b/two.txt"), b"22").unwrap();
    }

    #[test]
    fn test_create_reports_whether_it_created() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Dir::from_path(temp_dir.path().join("x/y/z")).unwrap();

        assert!(dir.create().unwrap());
        assert!(!dir.create().unwrap());
        assert!(dir.exists().unwrap());
    }

    #[test]
    fn test_create_over_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("f");
        fs::write(&file, b"x").unwrap();

        let err = Dir::from_path(&file).unwrap().create().unwrap_err();
        assert!(matches!(err, FsError::NotADirectory { .. }));
    }

    #[test]
    fn test_delete_non_recursive() {
        let temp_dir = TempDir::new().unwrap();
        tree(temp_dir.path());

        let full = Dir::from_path(temp_dir.path().join("a")).unwrap();
        assert!(matches!(
            full.delete(false).unwrap_err(),
            FsError::NotEmpty { .. }
        ));

        let empty = Dir::from_path(temp_dir.path().join("empty")).unwrap();
        empty.create().unwrap();
        assert!(empty.delete(false).unwrap());
        assert!(!empty.delete(false).unwrap());
    }

    #[test]
    fn test_delete_recursive_removes_everything() {
        let temp_dir = TempDir::new().unwrap();
        tree(temp_dir.path());

        let dir = Dir::from_path(temp_dir.path().join("a")).unwrap();
        assert!(dir.delete(true).unwrap());
        assert!(!temp_dir.path().join("a").exists());
    }

    #[test]
    fn test_delete_file_path_is_not_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("f");
        fs::write(&file, b"x").unwrap();

        let err = Dir::from_path(&file).unwrap().delete(true).unwrap_err();
        assert!(matches!(err, FsError::NotADirectory { .. }));
    }

    #[test]
    fn test_list_is_sorted() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("c"), b"").unwrap();
        fs::create_dir(temp_dir.path().join("b")).unwrap();
        fs::write(temp_dir.path().join("a"), b"").unwrap();

        let entries = Dir::from_path(temp_dir.path()).unwrap().list().unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(entries[1].kind(), EntryKind::Dir);
    }

    #[test]
    fn test_find_files_and_dirs() {
        let temp_dir = TempDir::new().unwrap();
        tree(temp_dir.path());
        let root = Dir::from_path(temp_dir.path()).unwrap();

        let txt = root
            .find_files(|f| f.path().absolute().extension().is_some_and(|e| e == "txt"))
            .unwrap();
        assert_eq!(txt.len(), 2);

        let dirs = root.find_dirs(|_| true).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].path().absolute().ends_with("a"));
    }

    #[test]
    fn test_copy_to_same_path_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        tree(temp_dir.path());
        let dir = Dir::from_path(temp_dir.path().join("a")).unwrap();

        let copied = dir.copy_to(dir.path(), &CopyOptions::new()).unwrap();
        assert_eq!(copied, dir);
    }

    #[test]
    fn test_copy_into_own_subtree_terminates() {
        let temp_dir = TempDir::new().unwrap();
        tree(temp_dir.path());
        let dir = Dir::from_path(temp_dir.path().join("a")).unwrap();
        let target = FsPath::from_path(temp_dir.path().join("a/b/copy")).unwrap();

        dir.copy_to(&target, &CopyOptions::new()).unwrap();
        assert!(temp_dir.path().join("a/b/copy/b/two.txt").exists());
        assert!(!temp_dir.path().join("a/b/copy/b/copy").exists());
    }

    #[test]
    fn test_move_into_itself_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        tree(temp_dir.path());
        let dir = Dir::from_path(temp_dir.path().join("a")).unwrap();
        let target = FsPath::from_path(temp_dir.path().join("a/b/moved")).unwrap();

        assert!(matches!(
            dir.move_to(&target, TransferFlags::empty()).unwrap_err(),
            FsError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_sibling_validation() {
        let path = FsPath::of("/tmp/a").unwrap();
        assert!(sibling(&path, "").is_err());
        assert!(sibling(&path, "x/y").is_err());
        assert!(sibling(&path, "..").is_err());
        assert_eq!(sibling(&path, "b").unwrap(), FsPath::of("/tmp/b").unwrap());
    }
}

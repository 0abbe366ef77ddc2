//! Regular file handle.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use super::attrs::{EntryAttrs, EntryKind, FileAttrs};
use super::dir::{create_parent, reject_ancestor, remove_any, sibling};
use super::error::{FsError, FsResult};
use super::options::TransferFlags;
use super::path::FsPath;

/// A regular file location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct File {
    path: FsPath,
}

impl File {
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

    /// Whether a file (not a directory) exists at this location.
    pub fn exists(&self) -> FsResult<bool> {
        self.path.is_file()
    }

    pub fn attrs(&self) -> FsResult<FileAttrs> {
        match self.path.stat()? {
            EntryAttrs::File(attrs) => Ok(attrs),
            EntryAttrs::Dir(_) => Err(self.not_a_file()),
        }
    }

    /// Create an empty file, creating missing parent directories.
    ///
    /// Returns `false` when the file already existed.
    pub fn create(&self) -> FsResult<bool> {
        match self.path.kind()? {
            Some(EntryKind::File) => return Ok(false),
            Some(EntryKind::Dir) => return Err(self.not_a_file()),
            None => {}
        }

        create_parent(&self.path)?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path.absolute())
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(FsError::io(self.path.absolute(), e)),
        }
    }

    /// Delete the file. Returns `false` when nothing existed.
    pub fn delete(&self) -> FsResult<bool> {
        match self.path.kind()? {
            None => Ok(false),
            Some(EntryKind::Dir) => Err(self.not_a_file()),
            Some(EntryKind::File) => match fs::remove_file(self.path.absolute()) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(FsError::io(self.path.absolute(), e)),
            },
        }
    }

    /// Copy the file to `target`, creating missing parent directories.
    pub fn copy_to(&self, target: &FsPath, flags: TransferFlags) -> FsResult<File> {
        if self.path == *target {
            return Ok(self.clone());
        }
        self.require_file()?;
        self.clear_target(target, flags)?;

        create_parent(target)?;
        fs::copy(self.path.absolute(), target.absolute())
            .map_err(|e| FsError::io(self.path.absolute(), e))?;
        Ok(File::new(target.clone()))
    }

    /// Move the file to `target`, falling back to copy then delete when a
    /// rename is not possible.
    pub fn move_to(&self, target: &FsPath, flags: TransferFlags) -> FsResult<File> {
        if self.path == *target {
            return Ok(self.clone());
        }
        self.require_file()?;
        self.clear_target(target, flags)?;

        create_parent(target)?;
        if let Err(e) = fs::rename(self.path.absolute(), target.absolute()) {
            if e.kind() == io::ErrorKind::NotFound {
                return Err(FsError::io(self.path.absolute(), e));
            }
            fs::copy(self.path.absolute(), target.absolute())
                .map_err(|e| FsError::io(self.path.absolute(), e))?;
            self.delete()?;
        }
        Ok(File::new(target.clone()))
    }

    /// Rename within the same parent directory.
    pub fn rename_to(&self, new_name: &str, flags: TransferFlags) -> FsResult<File> {
        let target = sibling(&self.path, new_name)?;
        self.move_to(&target, flags)
    }

    fn clear_target(&self, target: &FsPath, flags: TransferFlags) -> FsResult<()> {
        if target.kind()?.is_some() {
            if !flags.allows_collision() {
                return Err(FsError::AlreadyExists {
                    path: target.absolute().to_path_buf(),
                });
            }
            reject_ancestor(&self.path, target, "overwrite")?;
            remove_any(target)?;
        }
        Ok(())
    }

    fn require_file(&self) -> FsResult<()> {
        match self.path.kind()? {
            Some(EntryKind::File) => Ok(()),
            Some(EntryKind::Dir) => Err(self.not_a_file()),
            None => Err(FsError::NotFound {
                path: self.path.absolute().to_path_buf(),
            }),
        }
    }

    fn not_a_file(&self) -> FsError {
        FsError::NotAFile {
            path: self.path.absolute().to_path_buf(),
        }
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}

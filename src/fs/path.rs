//! Immutable filesystem location.

use std::ffi::OsStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{self, Path, PathBuf};

use super::attrs::{EntryAttrs, EntryKind};
use super::error::{FsError, FsResult};
use super::provider::{FileSystem, LocalFs};

/// A filesystem location.
///
/// Construction never touches the filesystem. Two paths are equal when
/// their absolute forms are equal, whichever form they were built from.
#[derive(Debug, Clone)]
pub struct FsPath {
    raw: PathBuf,
    absolute: PathBuf,
}

impl FsPath {
    /// Build a path from a string, trimming surrounding whitespace.
    pub fn of(raw: &str) -> FsResult<Self> {
        Self::of_with(raw, true)
    }

    /// Build a path from a string, optionally keeping surrounding whitespace.
    pub fn of_with(raw: &str, trim_whitespace: bool) -> FsResult<Self> {
        let raw = if trim_whitespace { raw.trim() } else { raw };
        Self::from_path(raw)
    }

    /// Build a path from anything path-like.
    pub fn from_path(raw: impl Into<PathBuf>) -> FsResult<Self> {
        let raw = raw.into();
        if raw.as_os_str().is_empty() {
            return Err(FsError::invalid("path must not be empty"));
        }
        let absolute = path::absolute(&raw).map_err(|e| FsError::Io {
            path: raw.clone(),
            source: e,
        })?;
        Ok(Self { raw, absolute })
    }

    /// The path as it was given.
    pub fn as_path(&self) -> &Path {
        &self.raw
    }

    /// The lexically absolute form (no symlink resolution).
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    pub fn file_name(&self) -> Option<&OsStr> {
        self.absolute.file_name()
    }

    /// Parent location, `None` at a filesystem root.
    pub fn parent(&self) -> Option<FsPath> {
        let parent = self.absolute.parent()?;
        Some(Self {
            raw: parent.to_path_buf(),
            absolute: parent.to_path_buf(),
        })
    }

    /// Location of `child` below this path.
    pub fn join(&self, child: impl AsRef<Path>) -> FsResult<FsPath> {
        let child = child.as_ref();
        if child.as_os_str().is_empty() {
            return Err(FsError::invalid("child name must not be empty"));
        }
        Self::from_path(self.raw.join(child))
    }

    /// Location of `relative` below this path, for paths already known to
    /// be non-empty relative components (walker output).
    pub(crate) fn descendant(&self, relative: &Path) -> FsPath {
        Self {
            raw: self.raw.join(relative),
            absolute: self.absolute.join(relative),
        }
    }

    pub fn exists(&self) -> FsResult<bool> {
        Ok(self.kind()?.is_some())
    }

    pub fn is_file(&self) -> FsResult<bool> {
        Ok(self.kind()? == Some(EntryKind::File))
    }

    pub fn is_dir(&self) -> FsResult<bool> {
        Ok(self.kind()? == Some(EntryKind::Dir))
    }

    /// Current metadata of the entry.
    pub fn stat(&self) -> FsResult<EntryAttrs> {
        LocalFs.stat(&self.absolute)
    }

    /// Kind of the entry, `None` when nothing exists at this path.
    pub fn kind(&self) -> FsResult<Option<EntryKind>> {
        match self.stat() {
            Ok(attrs) => Ok(Some(attrs.kind())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl PartialEq for FsPath {
    fn eq(&self, other: &Self) -> bool {
        self.absolute == other.absolute
    }
}

impl Eq for FsPath {}

impl Hash for FsPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.absolute.hash(state);
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw.display())
    }
}

impl AsRef<Path> for FsPath {
    fn as_ref(&self) -> &Path {
        &self.absolute
    }
}

impl TryFrom<&str> for FsPath {
    type Error = FsError;

    fn try_from(raw: &str) -> FsResult<Self> {
        Self::of(raw)
    }
}

impl TryFrom<&Path> for FsPath {
    type Error = FsError;

    fn try_from(raw: &Path) -> FsResult<Self> {
        Self::from_path(raw)
    }
}

impl TryFrom<PathBuf> for FsPath {
    type Error = FsError;

    fn try_from(raw: PathBuf) -> FsResult<Self> {
        Self::from_path(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_path_is_invalid() {
        assert!(matches!(
            FsPath::of("   "),
            Err(FsError::InvalidArgument { .. })
        ));
        assert!(matches!(
            FsPath::from_path(""),
            Err(FsError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_trimming() {
        let trimmed = FsPath::of("  a/b  ").unwrap();
        assert_eq!(trimmed.as_path(), Path::new("a/b"));

        let kept = FsPath::of_with(" a", false).unwrap();
        assert_eq!(kept.as_path(), Path::new(" a"));
    }

    #[test]
    fn test_equality_uses_absolute_form() {
        let relative = FsPath::of("some/where").unwrap();
        assert!(relative.absolute().is_absolute());
        assert!(relative.absolute().ends_with("some/where"));

        let absolute = FsPath::from_path(relative.absolute()).unwrap();
        assert_eq!(relative, absolute);
        assert_ne!(relative.as_path(), absolute.as_path());
    }

    #[test]
    fn test_path_algebra_ignores_existence() {
        let path = FsPath::of("/does/not/exist").unwrap();
        let child = path.join("child.txt").unwrap();

        assert_eq!(child.file_name(), Some(OsStr::new("child.txt")));
        assert_eq!(child.parent().unwrap(), path);
        assert!(path.join("").is_err());
    }

    #[test]
    fn test_queries() {
        let temp_dir = TempDir::new().unwrap();
        let dir = FsPath::from_path(temp_dir.path()).unwrap();
        let file = dir.join("f.txt").unwrap();

        assert!(dir.is_dir().unwrap());
        assert!(!file.exists().unwrap());

        std::fs::write(file.absolute(), b"x").unwrap();
        assert!(file.is_file().unwrap());
        assert!(!file.is_dir().unwrap());
        assert!(matches!(file.stat().unwrap(), EntryAttrs::File(_)));
    }
}

//! Collision policies and listeners for copy, move and rename.

use std::fmt;
use std::path::Path;

use bitflags::bitflags;

bitflags! {
    /// How a transfer treats an entry that already exists at the target.
    ///
    /// With neither flag set a collision fails with `AlreadyExists`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransferFlags: u8 {
        /// Replace the existing target entirely.
        const OVERWRITE = 0b01;
        /// Overwrite colliding files but keep unrelated target entries.
        const MERGE = 0b10;
    }
}

impl TransferFlags {
    /// Whether an existing target may be touched at all.
    pub fn allows_collision(self) -> bool {
        self.intersects(TransferFlags::OVERWRITE | TransferFlags::MERGE)
    }
}

/// Callback receiving `(source, destination)` for each copied entry.
pub type CopyListener = Box<dyn Fn(&Path, &Path) + Send + Sync>;

/// Options for [`Dir::copy_to`](super::Dir::copy_to).
#[derive(Default)]
pub struct CopyOptions {
    pub flags: TransferFlags,
    on_file: Option<CopyListener>,
    on_dir: Option<CopyListener>,
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overwrite(mut self) -> Self {
        self.flags |= TransferFlags::OVERWRITE;
        self
    }

    pub fn merge(mut self) -> Self {
        self.flags |= TransferFlags::MERGE;
        self
    }

    /// Called after each file is copied.
    pub fn on_file(mut self, listener: impl Fn(&Path, &Path) + Send + Sync + 'static) -> Self {
        self.on_file = Some(Box::new(listener));
        self
    }

    /// Called after each directory is created at the destination.
    pub fn on_dir(mut self, listener: impl Fn(&Path, &Path) + Send + Sync + 'static) -> Self {
        self.on_dir = Some(Box::new(listener));
        self
    }

    pub(crate) fn file_copied(&self, source: &Path, destination: &Path) {
        if let Some(listener) = &self.on_file {
            listener(source, destination);
        }
    }

    pub(crate) fn dir_copied(&self, source: &Path, destination: &Path) {
        if let Some(listener) = &self.on_dir {
            listener(source, destination);
        }
    }
}

impl From<TransferFlags> for CopyOptions {
    fn from(flags: TransferFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }
}

impl fmt::Debug for CopyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyOptions")
            .field("flags", &self.flags)
            .field("on_file", &self.on_file.is_some())
            .field("on_dir", &self.on_dir.is_some())
            .finish()
    }
}

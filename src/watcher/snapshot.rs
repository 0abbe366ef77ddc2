//! Snapshots of a watched tree and the diff between two of them.
//!
//! A snapshot maps each entry's path relative to the watched root to its
//! metadata, in walker visiting order. Because the walk is breadth-first,
//! every parent precedes its descendants; walking the old snapshot backwards
//! therefore yields deletions child-first.
//!
//! Entries below the root that cannot be read are recorded as unreadable.
//! [`Snapshot::carry_over`] fills them in from the previous snapshot, so an
//! unreadable subtree reports nothing rather than a burst of deletions.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::fs::{Dir, EntryAttrs, File, FileSystem, FsPath, FsResult, WalkControl, walk_tolerant};

use super::event::FileSystemEvent;

/// Ordered `relative path -> metadata` map captured by one complete walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: IndexMap<PathBuf, EntryAttrs>,
    unreadable: Vec<PathBuf>,
}

impl Snapshot {
    /// Walk `root` and record every entry below it.
    ///
    /// Entries that vanish during the walk are left out. Entries that fail
    /// for any other reason are logged and recorded as unreadable; only a
    /// failure on `root` itself is an error.
    pub fn capture(fs: &dyn FileSystem, root: &Path) -> FsResult<Self> {
        let entries = RefCell::new(IndexMap::new());
        let mut unreadable = Vec::new();
        let relative = |path: &Path| path.strip_prefix(root).unwrap_or(path).to_path_buf();

        walk_tolerant(
            fs,
            root,
            |path, attrs| {
                entries
                    .borrow_mut()
                    .insert(relative(path), EntryAttrs::File(attrs));
            },
            |path, attrs| {
                entries
                    .borrow_mut()
                    .insert(relative(path), EntryAttrs::Dir(attrs));
                WalkControl::Descend
            },
            |path, e| {
                tracing::warn!("[snapshot] skipping unreadable entry: {e}");
                unreadable.push(relative(path));
            },
        )?;

        Ok(Self {
            entries: entries.into_inner(),
            unreadable,
        })
    }

    /// Paths, relative to the root, that could not be read during capture.
    pub fn unreadable(&self) -> &[PathBuf] {
        &self.unreadable
    }

    /// Keep `previous` entries at or below an unreadable path.
    ///
    /// Carried entries are appended after the captured ones.
    pub fn carry_over(&mut self, previous: &Snapshot) {
        if self.unreadable.is_empty() {
            return;
        }
        for (path, attrs) in &previous.entries {
            if self.entries.contains_key(path) {
                continue;
            }
            if self.unreadable.iter().any(|skipped| path.starts_with(skipped)) {
                self.entries.insert(path.clone(), *attrs);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, relative: &Path) -> Option<&EntryAttrs> {
        self.entries.get(relative)
    }

    /// Entries in visiting order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &EntryAttrs)> {
        self.entries.iter().map(|(path, attrs)| (path.as_path(), attrs))
    }

    /// Events turning `self` into `newer`, for a tree rooted at `root`.
    ///
    /// Deletions come first, deepest first; creations and modifications
    /// follow in visiting order. An entry whose kind changed is reported as
    /// deleted and then created.
    pub fn diff(&self, newer: &Snapshot, root: &FsPath) -> Vec<FileSystemEvent> {
        let mut events = Vec::new();

        for (relative, old) in self.entries.iter().rev() {
            let gone = match newer.entries.get(relative) {
                None => true,
                Some(now) => now.kind() != old.kind(),
            };
            if gone {
                events.push(deleted(root, relative, old));
            }
        }

        for (relative, now) in &newer.entries {
            match self.entries.get(relative) {
                Some(old) if old.kind() == now.kind() => {
                    if old != now {
                        events.push(modified(root, relative, old, now));
                    }
                }
                _ => events.push(created(root, relative, now)),
            }
        }

        events
    }

    /// Deletion events for every entry, deepest first.
    pub fn deletions(&self, root: &FsPath) -> Vec<FileSystemEvent> {
        self.diff(&Snapshot::default(), root)
    }

    /// Creation events for every entry, in visiting order.
    pub fn creations(&self, root: &FsPath) -> Vec<FileSystemEvent> {
        Snapshot::default().diff(self, root)
    }
}

fn deleted(root: &FsPath, relative: &Path, old: &EntryAttrs) -> FileSystemEvent {
    let path = root.descendant(relative);
    match old {
        EntryAttrs::Dir(_) => FileSystemEvent::DirDeleted(Dir::new(path)),
        EntryAttrs::File(_) => FileSystemEvent::FileDeleted(File::new(path)),
    }
}

fn created(root: &FsPath, relative: &Path, now: &EntryAttrs) -> FileSystemEvent {
    let path = root.descendant(relative);
    match now {
        EntryAttrs::Dir(_) => FileSystemEvent::DirCreated(Dir::new(path)),
        EntryAttrs::File(_) => FileSystemEvent::FileCreated(File::new(path)),
    }
}

fn modified(
    root: &FsPath,
    relative: &Path,
    old: &EntryAttrs,
    now: &EntryAttrs,
) -> FileSystemEvent {
    let path = root.descendant(relative);
    match (old, now) {
        (EntryAttrs::Dir(old), EntryAttrs::Dir(now)) => FileSystemEvent::DirModified {
            dir: Dir::new(path),
            old: Some(*old),
            now: Some(*now),
        },
        (EntryAttrs::File(old), EntryAttrs::File(now)) => FileSystemEvent::FileModified {
            file: File::new(path),
            old: Some(*old),
            now: Some(*now),
        },
        // Kind changes never reach here; diff() reports them as delete + create.
        (_, EntryAttrs::Dir(_)) => FileSystemEvent::DirCreated(Dir::new(path)),
        (_, EntryAttrs::File(_)) => FileSystemEvent::FileCreated(File::new(path)),
    }
}

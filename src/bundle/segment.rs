//! Partitioning of a file set into groups by extension.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::model::{ExtensionAliases, FileSet};

/// Files sharing one normalized extension, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub group: String,
    pub files: Vec<PathBuf>,
}

/// Groups in order of first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments {
    groups: Vec<Segment>,
}

impl Segments {
    pub fn get(&self, group: &str) -> Option<&Segment> {
        self.groups.iter().find(|s| s.group == group)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn push(&mut self, group: &str, file: PathBuf) {
        match self.groups.iter_mut().find(|s| s.group == group) {
            Some(segment) => segment.files.push(file),
            None => self.groups.push(Segment {
                group: group.to_string(),
                files: vec![file],
            }),
        }
    }
}

/// Text after the last `.` of the file name, empty if there is none.
///
/// Case is preserved. A leading dot (`.babelrc`) does not start an extension.
/// Bytes that are not UTF-8 are replaced with U+FFFD.
pub fn extension_of(path: &Path) -> Cow<'_, str> {
    path.extension()
        .map(|e| e.to_string_lossy())
        .unwrap_or(Cow::Borrowed(""))
}

/// Stable partition of `files` by extension after alias normalization.
pub fn segment(files: &FileSet, aliases: &ExtensionAliases) -> Segments {
    let mut segments = Segments::default();
    for file in files {
        let ext = extension_of(file);
        segments.push(aliases.normalize(&ext), file.clone());
    }
    segments
}

//! In-memory virtual filesystem — the `VirtualTree` component (spec §4.4).
//!
//! Holds the decompressed template archives under well-known prefixes
//! (`/template/main/…`, `/template/extends/<id>/…`). Implemented as a flat
//! hash map from normalized absolute path to an `Entry::{Dir, File}`, per
//! spec §9's explicit guidance — never a linked tree. Directory listings
//! are derived on demand by a longest-prefix scan over the map, not by
//! walking child pointers.

use std::collections::BTreeMap;
use std::fmt;

const MAIN_PREFIX: &str = "/template/main";
const EXTENDS_PREFIX: &str = "/template/extends";

/// Number of leading bytes inspected by the binary-content heuristic.
const BINARY_SNIFF_LEN: usize = 8000;

#[derive(Clone, Debug)]
enum Entry {
    Dir,
    File(Vec<u8>),
}

/// Errors raised by [`VirtualTree`] operations.
#[derive(Debug)]
pub enum VirtualTreeError {
    /// `mkdir` with `recursive: false` whose parent doesn't exist.
    ParentMissing { path: String },
    /// A path that should be a file is a directory, or vice versa.
    NotAFile { path: String },
    /// No entry exists at this path.
    NotFound { path: String },
}

impl fmt::Display for VirtualTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParentMissing { path } => write!(f, "parent directory of '{path}' does not exist"),
            Self::NotAFile { path } => write!(f, "'{path}' is not a file"),
            Self::NotFound { path } => write!(f, "no such path '{path}'"),
        }
    }
}

impl std::error::Error for VirtualTreeError {}

/// One entity yielded by [`VirtualTree::walk`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityInfo {
    /// Full normalized absolute path (e.g. `/template/main/src/lib.rs`).
    pub absolute_path: String,
    /// Final path segment.
    pub name: String,
    pub is_directory: bool,
    /// `true` for files whose leading bytes contain a NUL — the binary
    /// heuristic from spec §4.4. Always `false` for directories.
    pub is_binary: bool,
    /// Directory portion of the path, relative to the walked root (no
    /// leading or trailing slash; empty string for entries directly under
    /// the root).
    pub relative_directory_path: String,
}

/// An in-memory hierarchical filesystem.
#[derive(Clone, Debug, Default)]
pub struct VirtualTree {
    entries: BTreeMap<String, Entry>,
}

/// Normalize a path into `/`-separated, no trailing slash (except root
/// `""`), collapsing empty segments.
fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        Some("/".to_owned())
    } else {
        Some(trimmed[..idx].to_owned())
    }
}

fn is_binary_content(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    window.contains(&0)
}

impl VirtualTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Well-known prefix for the main template (`/template/main`).
    #[must_use]
    pub fn main_prefix() -> String {
        MAIN_PREFIX.to_owned()
    }

    /// Well-known prefix for an extend template (`/template/extends/<id>`).
    #[must_use]
    pub fn extend_prefix(id: &str) -> String {
        format!("{EXTENDS_PREFIX}/{id}")
    }

    /// Create a directory. When `recursive` is `false`, the parent must
    /// already exist as a directory.
    pub fn mkdir(&mut self, path: &str, recursive: bool) -> Result<(), VirtualTreeError> {
        let norm = normalize(path);
        if norm == "/" {
            return Ok(());
        }
        if recursive {
            let mut acc = String::new();
            for segment in norm.trim_start_matches('/').split('/') {
                acc.push('/');
                acc.push_str(segment);
                self.entries.entry(acc.clone()).or_insert(Entry::Dir);
            }
            return Ok(());
        }
        if let Some(parent) = parent_of(&norm) {
            let parent_ok = parent == "/" || matches!(self.entries.get(&parent), Some(Entry::Dir));
            if !parent_ok {
                return Err(VirtualTreeError::ParentMissing { path: norm });
            }
        }
        self.entries.insert(norm, Entry::Dir);
        Ok(())
    }

    /// Write file content, creating parent directories as needed.
    pub fn write_file(&mut self, path: &str, bytes: Vec<u8>) {
        let norm = normalize(path);
        if let Some(parent) = parent_of(&norm) {
            if parent != "/" {
                let _ = self.mkdir(&parent, true);
            }
        }
        self.entries.insert(norm, Entry::File(bytes));
    }

    /// Read file content.
    pub fn read_file(&self, path: &str) -> Result<&[u8], VirtualTreeError> {
        let norm = normalize(path);
        match self.entries.get(&norm) {
            Some(Entry::File(bytes)) => Ok(bytes),
            Some(Entry::Dir) => Err(VirtualTreeError::NotAFile { path: norm }),
            None => Err(VirtualTreeError::NotFound { path: norm }),
        }
    }

    /// `true` if the file at `path` trips the binary-content heuristic
    /// (spec §4.4). The same check [`Self::walk`] applies per entity,
    /// exposed standalone so callers that already hold a path don't need
    /// to re-walk the tree to ask.
    pub fn is_binary_at(&self, path: &str) -> Result<bool, VirtualTreeError> {
        self.read_file(path).map(is_binary_content)
    }

    /// Remove the entry at `path`, if any. Removing a directory does not
    /// recursively remove its descendants — callers that want a recursive
    /// delete should walk first and remove each entry (this mirrors how
    /// the orchestrator's delete-policy step already enumerates paths via
    /// [`Self::walk`] before acting on them).
    pub fn remove(&mut self, path: &str) {
        self.entries.remove(&normalize(path));
    }

    /// `true` if any entry (file or directory) exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize(path))
    }

    /// `true` if `path` names a file (not a directory).
    #[must_use]
    pub fn is_file(&self, path: &str) -> bool {
        matches!(self.entries.get(&normalize(path)), Some(Entry::File(_)))
    }

    /// `true` if `path` names a directory.
    #[must_use]
    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.entries.get(&normalize(path)), Some(Entry::Dir))
    }

    /// Recursively enumerate every entity strictly under `root`, in a
    /// deterministic, lexicographic order (sibling order is stable across
    /// calls — spec §5's ordering guarantee).
    #[must_use]
    pub fn walk(&self, root: &str) -> Vec<EntityInfo> {
        let root_norm = normalize(root);
        let prefix = if root_norm == "/" {
            String::new()
        } else {
            format!("{root_norm}/")
        };

        let mut out = Vec::new();
        for (path, entry) in &self.entries {
            let Some(relative) = path.strip_prefix(&prefix).filter(|r| !r.is_empty()) else {
                continue;
            };
            if relative.starts_with('/') {
                continue;
            }
            let (dir_part, name) = match relative.rfind('/') {
                Some(idx) => (&relative[..idx], &relative[idx + 1..]),
                None => ("", relative),
            };
            let is_directory = matches!(entry, Entry::Dir);
            let is_binary = match entry {
                Entry::File(bytes) => is_binary_content(bytes),
                Entry::Dir => false,
            };
            out.push(EntityInfo {
                absolute_path: path.clone(),
                name: name.to_owned(),
                is_directory,
                is_binary,
                relative_directory_path: dir_part.to_owned(),
            });
        }

        // `BTreeMap` iteration is already key-sorted; this sort is a no-op
        // safety net documenting the ordering guarantee explicitly.
        out.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path));
        out
    }

    /// Write every file under `root` to `dest_root` on the real filesystem.
    /// A convenience for tests and example tooling — not part of the core
    /// pipeline contract (see SPEC_FULL.md §E.2).
    #[cfg(test)]
    pub fn materialize(&self, root: &str, dest_root: &std::path::Path) -> std::io::Result<()> {
        for entity in self.walk(root) {
            if entity.is_directory {
                continue;
            }
            let relative = if entity.relative_directory_path.is_empty() {
                entity.name.clone()
            } else {
                format!("{}/{}", entity.relative_directory_path, entity.name)
            };
            let dest = dest_root.join(relative);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let bytes = self.read_file(&entity.absolute_path).map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;
            std::fs::write(dest, bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut tree = VirtualTree::new();
        tree.write_file("/template/main/a.txt", b"hello".to_vec());
        assert_eq!(tree.read_file("/template/main/a.txt").unwrap(), b"hello");
        assert!(tree.exists("/template/main"));
        assert!(tree.is_dir("/template/main"));
        assert!(tree.is_file("/template/main/a.txt"));
    }

    #[test]
    fn mkdir_non_recursive_requires_existing_parent() {
        let mut tree = VirtualTree::new();
        assert!(tree.mkdir("/a/b", false).is_err());
        tree.mkdir("/a", true).unwrap();
        assert!(tree.mkdir("/a/b", false).is_ok());
    }

    #[test]
    fn walk_is_scoped_and_sorted() {
        let mut tree = VirtualTree::new();
        tree.write_file("/template/main/z.txt", b"z".to_vec());
        tree.write_file("/template/main/a.txt", b"a".to_vec());
        tree.write_file("/template/main/sub/b.txt", b"b".to_vec());
        tree.write_file("/template/extends/x/other.txt", b"o".to_vec());

        let entries = tree.walk("/template/main");
        let names: Vec<_> = entries.iter().map(|e| e.absolute_path.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.iter().all(|n| n.starts_with("/template/main")));
        assert!(!names.iter().any(|n| n.contains("extends")));
    }

    #[test]
    fn binary_heuristic_detects_nul_bytes() {
        let mut tree = VirtualTree::new();
        tree.write_file("/template/main/bin.dat", vec![0u8, 1, 2]);
        tree.write_file("/template/main/text.txt", b"hello\n".to_vec());
        let entries = tree.walk("/template/main");
        let bin = entries.iter().find(|e| e.name == "bin.dat").unwrap();
        let txt = entries.iter().find(|e| e.name == "text.txt").unwrap();
        assert!(bin.is_binary);
        assert!(!txt.is_binary);
    }

    #[test]
    fn remove_drops_single_entry_only() {
        let mut tree = VirtualTree::new();
        tree.write_file("/template/main/a.txt", b"a".to_vec());
        tree.write_file("/template/main/sub/b.txt", b"b".to_vec());
        tree.remove("/template/main/a.txt");
        assert!(!tree.exists("/template/main/a.txt"));
        assert!(tree.exists("/template/main/sub/b.txt"));
    }

    #[test]
    fn relative_directory_path_is_correct() {
        let mut tree = VirtualTree::new();
        tree.write_file("/template/main/src/lib.rs", b"x".to_vec());
        let entries = tree.walk("/template/main");
        let entry = entries.iter().find(|e| e.name == "lib.rs").unwrap();
        assert_eq!(entry.relative_directory_path, "src");
    }
}

//! Local-root to remote-root mapping.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// One replicated tree: an absolute local root paired with the relative
/// path it lands at on the agent side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
  pub local_root: PathBuf,
  pub remote_root: String,
}

/// Errors from mapping construction.
#[derive(Debug, Error)]
pub enum MappingError {
  #[error("mapping is empty")]
  Empty,
  #[error("local root is not absolute: {0}")]
  NotAbsolute(PathBuf),
  #[error("local roots overlap: {0} and {1}")]
  Overlapping(PathBuf, PathBuf),
}

/// An ordered, immutable list of [`MapEntry`] with disjoint local roots.
#[derive(Debug, Clone)]
pub struct Mapping {
  entries: Vec<MapEntry>,
}

impl Mapping {
  /// Validate and freeze a mapping. Order is preserved and meaningful:
  /// scans and sync cycles process entries in this order.
  pub fn new(entries: Vec<MapEntry>) -> Result<Self, MappingError> {
    if entries.is_empty() {
      return Err(MappingError::Empty);
    }
    for entry in &entries {
      if !entry.local_root.is_absolute() {
        return Err(MappingError::NotAbsolute(entry.local_root.clone()));
      }
    }
    for (i, a) in entries.iter().enumerate() {
      for b in entries.iter().skip(i + 1) {
        if a.local_root.starts_with(&b.local_root) || b.local_root.starts_with(&a.local_root) {
          return Err(MappingError::Overlapping(a.local_root.clone(), b.local_root.clone()));
        }
      }
    }
    Ok(Self { entries })
  }

  pub fn entries(&self) -> &[MapEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// The entry owning `path`, plus the path relative to its local root.
  pub fn owner_of(&self, path: &Path) -> Option<(&MapEntry, PathBuf)> {
    self.entries.iter().find_map(|entry| {
      path
        .strip_prefix(&entry.local_root)
        .ok()
        .map(|sub| (entry, sub.to_path_buf()))
    })
  }

  /// The entry whose remote root is `base`, with its position.
  pub fn entry_for_remote(&self, base: &str) -> Option<(usize, &MapEntry)> {
    self
      .entries
      .iter()
      .enumerate()
      .find(|(_, entry)| entry.remote_root == base)
  }

  /// Remote roots in mapping order, as sent in the initial scan request.
  pub fn remote_roots(&self) -> Vec<String> {
    self.entries.iter().map(|e| e.remote_root.clone()).collect()
  }
}

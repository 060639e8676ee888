//! Filtered depth-first walk of a local root.

use std::path::{Path, PathBuf};

use tether_core::Signature;
use tracing::warn;

use super::{Skipper, signature_of};

/// Walk `root`, yielding `(sub_path, signature)` for every surviving entry.
///
/// Entries matching the skipper are pruned, and a pruned directory is not
/// descended into. Symlinks are reported as symlink entries and never
/// followed, so a symlink loop terminates. Entries that error mid-walk
/// (vanished files, permission problems) are logged and dropped; the walk
/// itself continues.
pub fn walk(root: &Path, skipper: &Skipper) -> Vec<(PathBuf, Signature)> {
  let mut out = Vec::new();
  walk_dir(root, Path::new(""), skipper, &mut out);
  out
}

fn walk_dir(root: &Path, sub: &Path, skipper: &Skipper, out: &mut Vec<(PathBuf, Signature)>) {
  let dir = root.join(sub);
  let entries = match std::fs::read_dir(&dir) {
    Ok(entries) => entries,
    Err(e) => {
      warn!(dir = %dir.display(), error = %e, "Failed to read directory during walk");
      return;
    }
  };

  let mut names: Vec<_> = entries
    .filter_map(|entry| match entry {
      Ok(entry) => Some(entry.file_name()),
      Err(e) => {
        warn!(dir = %dir.display(), error = %e, "Failed to read directory entry");
        None
      }
    })
    .collect();
  names.sort();

  for name in names {
    let entry_sub = sub.join(&name);
    let path = root.join(&entry_sub);

    let sig = match signature_of(&path) {
      Ok(Some(sig)) => sig,
      Ok(None) => continue,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Failed to stat entry during walk");
        continue;
      }
    };

    if skipper.skip(&entry_sub, sig.is_dir()) {
      continue;
    }

    let descend = sig.is_dir();
    out.push((entry_sub.clone(), sig));
    if descend {
      walk_dir(root, &entry_sub, skipper, out);
    }
  }
}

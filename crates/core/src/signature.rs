//! Filesystem node signatures.
//!
//! A [`Signature`] is a content-addressed fingerprint of a single filesystem
//! node, sufficient to detect any observable change: kind, permission bits,
//! symlink target, and for regular files the per-block digests of the
//! content. Absence at a path is represented as `Option::<Signature>::None`
//! by callers, not as a variant.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Fixed block size for file chunking and per-block hashing.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Truncated digest of one content block.
pub type BlockHash = [u8; 16];

/// Fingerprint of a filesystem node.
///
/// Two signatures are equal iff they have the same variant and all fields
/// compare equal; block-hash comparison is positional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signature {
  /// A directory with POSIX permission bits.
  Dir { perm: u32 },
  /// A regular file partitioned into [`BLOCK_SIZE`] blocks.
  File {
    perm: u32,
    block_hashes: Vec<BlockHash>,
    size: u64,
  },
  /// A symbolic link; the target is stored verbatim and never followed.
  Symlink { target: String },
}

impl Signature {
  /// Permission bits, where the variant carries them.
  pub fn perm(&self) -> Option<u32> {
    match self {
      Signature::Dir { perm } | Signature::File { perm, .. } => Some(*perm),
      Signature::Symlink { .. } => None,
    }
  }

  pub fn is_dir(&self) -> bool {
    matches!(self, Signature::Dir { .. })
  }

  /// Number of content blocks (zero for anything but a file).
  pub fn total_blocks(&self) -> u64 {
    match self {
      Signature::File { block_hashes, .. } => block_hashes.len() as u64,
      _ => 0,
    }
  }
}

/// Join a remote root and a sub-path into the wire representation.
///
/// Remote paths always use `/` separators regardless of the local platform.
pub fn remote_path(remote_root: &str, sub: &Path) -> String {
  let mut out = String::from(remote_root);
  for component in sub.components() {
    if !out.is_empty() {
      out.push('/');
    }
    out.push_str(&component.as_os_str().to_string_lossy());
  }
  out
}

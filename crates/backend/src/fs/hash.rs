//! Block hashing and signature computation.
//!
//! Files are fingerprinted per 64 KiB block with a Sha256 digest truncated
//! to 16 bytes. Signatures are computed from `symlink_metadata` so symlinks
//! are reported as themselves, never followed.

use std::{
  fs::File,
  io::{Read, Seek, SeekFrom},
  path::Path,
};

use sha2::{Digest, Sha256};
use tether_core::{BLOCK_SIZE, BlockHash, Signature};

fn block_digest(block: &[u8]) -> BlockHash {
  let digest = Sha256::digest(block);
  let mut out = [0u8; 16];
  out.copy_from_slice(&digest[..16]);
  out
}

/// Hash a file's content into per-block digests. An empty file has zero
/// blocks.
pub fn hash_file(path: &Path) -> std::io::Result<(Vec<BlockHash>, u64)> {
  let mut file = File::open(path)?;
  let mut hashes = Vec::new();
  let mut size = 0u64;
  let mut buf = vec![0u8; BLOCK_SIZE];

  loop {
    let mut filled = 0;
    // A block may arrive in several short reads.
    while filled < BLOCK_SIZE {
      let n = file.read(&mut buf[filled..])?;
      if n == 0 {
        break;
      }
      filled += n;
    }
    if filled == 0 {
      break;
    }
    hashes.push(block_digest(&buf[..filled]));
    size += filled as u64;
    if filled < BLOCK_SIZE {
      break;
    }
  }

  Ok((hashes, size))
}

/// Read the block at `index`, up to [`BLOCK_SIZE`] bytes.
pub fn read_block(path: &Path, index: u64) -> std::io::Result<Vec<u8>> {
  let mut file = File::open(path)?;
  file.seek(SeekFrom::Start(index * BLOCK_SIZE as u64))?;

  let mut buf = vec![0u8; BLOCK_SIZE];
  let mut filled = 0;
  while filled < BLOCK_SIZE {
    let n = file.read(&mut buf[filled..])?;
    if n == 0 {
      break;
    }
    filled += n;
  }
  buf.truncate(filled);
  Ok(buf)
}

/// Compute the current signature of the node at `path`.
///
/// `Ok(None)` means the path does not exist (including a file that
/// vanished mid-hash); any other I/O failure is surfaced.
pub fn signature_of(path: &Path) -> std::io::Result<Option<Signature>> {
  let metadata = match std::fs::symlink_metadata(path) {
    Ok(md) => md,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e),
  };

  let file_type = metadata.file_type();
  if file_type.is_symlink() {
    let target = std::fs::read_link(path)?;
    return Ok(Some(Signature::Symlink {
      target: target.to_string_lossy().into_owned(),
    }));
  }
  if file_type.is_dir() {
    return Ok(Some(Signature::Dir {
      perm: perm_bits(&metadata),
    }));
  }

  match hash_file(path) {
    Ok((block_hashes, size)) => Ok(Some(Signature::File {
      perm: perm_bits(&metadata),
      block_hashes,
      size,
    })),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}

#[cfg(unix)]
fn perm_bits(metadata: &std::fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn perm_bits(metadata: &std::fs::Metadata) -> u32 {
  if metadata.is_dir() { 0o755 } else { 0o644 }
}

//! Filesystem layer: signatures, block hashing, ignore rules, and the
//! filtered walk that feeds the initial scan.

mod hash;
mod skipper;
mod walk;

pub use hash::{hash_file, read_block, signature_of};
pub use skipper::Skipper;
pub use walk::walk;

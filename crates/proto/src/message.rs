//! Request and response vocabulary.

use serde::{Deserialize, Serialize};
use tether_core::Signature;

/// A request applied by the agent to its filesystem.
///
/// All paths are relative, `/`-separated, and interpreted under the agent's
/// working root. `WriteChunk` addresses a block by explicit byte offset so
/// a replayed write lands in the same place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rpc {
  /// Enumerate the given roots; the agent answers with a stream of
  /// `Scanned` responses followed by the request's ack.
  FullScan { paths: Vec<String> },
  MkDir { path: String, perm: u32 },
  RmDir { path: String },
  Delete { path: String },
  SetSymlink { path: String, target: String },
  SetPerm { path: String, perm: u32 },
  /// Create or truncate a file ahead of its chunk stream.
  PrepareFile { path: String, perm: u32, total_blocks: u64 },
  WriteChunk {
    dest: String,
    sub_path: String,
    offset: u64,
    #[serde(with = "b64")]
    data: Vec<u8>,
  },
  /// Barrier: acked only once everything before it has been applied.
  Complete,
}

/// A response read from the agent's stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
  /// In-order acknowledgement of one request.
  Ack,
  /// One entry of a `FullScan` result. `index` is a running count used
  /// for progress logging only.
  Scanned {
    base: String,
    sub: String,
    sig: Signature,
    index: u64,
  },
}

mod b64 {
  use base64::{Engine as _, engine::general_purpose::STANDARD};
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    STANDARD.decode(text).map_err(serde::de::Error::custom)
  }
}

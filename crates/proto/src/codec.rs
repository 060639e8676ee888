//! Newline-delimited JSON framing.
//!
//! One serialized message per line, in both directions. The codec is
//! generic over the message type so the agent side can reuse it with the
//! directions swapped.

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::ProtoError;

/// Write one frame and flush it.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), ProtoError>
where
  W: AsyncWrite + Unpin,
  T: Serialize,
{
  let mut line = serde_json::to_vec(msg)?;
  line.push(b'\n');
  writer.write_all(&line).await?;
  writer.flush().await?;
  Ok(())
}

/// Read the next frame, skipping blank lines. Returns `None` at EOF.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, ProtoError>
where
  R: AsyncBufRead + Unpin,
  T: DeserializeOwned,
{
  let mut line = String::new();
  loop {
    line.clear();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
      return Ok(None);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }
    return Ok(Some(serde_json::from_str(trimmed)?));
  }
}

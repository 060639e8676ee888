use thiserror::Error;

/// Errors from framing or decoding a protocol message.
#[derive(Debug, Error)]
pub enum ProtoError {
  #[error("i/o error on agent pipe: {0}")]
  Io(#[from] std::io::Error),
  #[error("malformed frame: {0}")]
  Decode(#[from] serde_json::Error),
}

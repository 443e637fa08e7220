// Error types for the LCU client and automation policy

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LcuError {
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("LCU returned {status} for {method} {endpoint}")]
  Status {
    method: String,
    endpoint: String,
    status: u16,
  },

  #[error("Failed to decode {endpoint}: {reason}")]
  Decode { endpoint: String, reason: String },

  #[error("Invalid lockfile: {0}")]
  Lockfile(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("No League client connection")]
  NotConnected,
}

impl LcuError {
  /// 404 on the champ select endpoints just means "not in champ select".
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Status { status: 404, .. })
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to parse automation config: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("Invalid delay bounds: min {min} > max {max}")]
  InvalidBounds { min: u32, max: u32 },
}

pub type LcuResult<T> = Result<T, LcuError>;

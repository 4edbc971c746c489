//! Error types for the sync cache and the remote client.

use std::path::PathBuf;
use thiserror::Error;

use crate::todoist::types::EntityRef;

/// Failures of the on-disk cache codec.
#[derive(Error, Debug)]
pub enum CacheError {
  /// No cache file yet. Callers bootstrap with a full sync.
  #[error("no cache file at {}", .path.display())]
  NotFound { path: PathBuf },

  /// The file exists but does not decode into a store.
  #[error("cache file {} is corrupted: {source}", .path.display())]
  Corrupted {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("cache I/O failed for {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Failures talking to the remote Sync API.
#[derive(Error, Debug)]
pub enum SyncError {
  #[error("network error: {0}")]
  Network(String),

  #[error("request timed out")]
  Timeout,

  #[error("authentication rejected: {0}")]
  Auth(String),

  #[error("this feature requires a premium account")]
  PremiumRequired,

  #[error("API returned {status}: {message}")]
  Api { status: u16, message: String },

  #[error("could not decode API response: {0}")]
  Decode(String),

  #[error("command {command} rejected: {reason}")]
  CommandRejected { command: String, reason: String },
}

/// A delta that cannot be applied. The store it was applied to is left untouched.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MergeError {
  #[error("delta carries no sync cursor")]
  MissingCursor,

  #[error("delta references invalid id for {0}")]
  InvalidId(EntityRef),
}

/// Errors surfaced by the cache lifecycle to command handlers.
#[derive(Error, Debug)]
pub enum CoreError {
  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error(transparent)]
  Sync(#[from] SyncError),

  #[error(transparent)]
  Merge(#[from] MergeError),

  #[error("{0} not found")]
  UnknownEntity(EntityRef),

  #[error("invalid change: {0}")]
  InvalidChange(String),
}

impl CoreError {
  /// Whether retrying the same command later can succeed without user action.
  pub fn is_recoverable(&self) -> bool {
    match self {
      CoreError::Sync(SyncError::Network(_) | SyncError::Timeout) => true,
      CoreError::Cache(CacheError::NotFound { .. } | CacheError::Corrupted { .. }) => true,
      _ => false,
    }
  }
}

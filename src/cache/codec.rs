//! Cache storage trait and JSON file implementation.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::CacheError;

use super::store::LocalStore;

/// Trait for cache storage backends.
pub trait CacheStorage {
  /// Load the persisted store.
  ///
  /// `CacheError::NotFound` means nothing was ever saved,
  /// `CacheError::Corrupted` means something was saved but is unreadable.
  fn load(&self) -> Result<LocalStore, CacheError>;

  /// Persist the store, replacing the previous content atomically.
  fn save(&self, store: &LocalStore) -> Result<(), CacheError>;
}

/// Single JSON file holding the whole store.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
  path: PathBuf,
}

impl JsonFileStorage {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl CacheStorage for JsonFileStorage {
  fn load(&self) -> Result<LocalStore, CacheError> {
    load(&self.path)
  }

  fn save(&self, store: &LocalStore) -> Result<(), CacheError> {
    save(store, &self.path)
  }
}

/// Read and decode the cache file at `path`.
pub fn load(path: &Path) -> Result<LocalStore, CacheError> {
  let bytes = fs::read(path).map_err(|source| match source.kind() {
    ErrorKind::NotFound => CacheError::NotFound {
      path: path.to_path_buf(),
    },
    _ => CacheError::Io {
      path: path.to_path_buf(),
      source,
    },
  })?;

  let store: LocalStore =
    serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupted {
      path: path.to_path_buf(),
      source,
    })?;

  debug!(
    path = %path.display(),
    cursor = store.sync_cursor().unwrap_or("<none>"),
    "cache loaded"
  );
  Ok(store)
}

/// Encode `store` and move it over `path`.
///
/// The content goes to a temporary file in the same directory first and is
/// renamed into place, so readers see either the old file or the new one.
pub fn save(store: &LocalStore, path: &Path) -> Result<(), CacheError> {
  let io_err = |source| CacheError::Io {
    path: path.to_path_buf(),
    source,
  };

  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  };
  fs::create_dir_all(&dir).map_err(io_err)?;

  let tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
  {
    let mut writer = BufWriter::new(tmp.as_file());
    serde_json::to_writer(&mut writer, store)
      .map_err(|e| io_err(std::io::Error::other(e)))?;
    writer.flush().map_err(io_err)?;
  }
  tmp.as_file().sync_all().map_err(io_err)?;

  tmp.persist(path).map_err(|e| io_err(e.error))?;
  sync_dir(&dir);

  debug!(
    path = %path.display(),
    cursor = store.sync_cursor().unwrap_or("<none>"),
    "cache saved"
  );
  Ok(())
}

/// Flush the directory entry so the rename survives a crash. Best effort.
fn sync_dir(dir: &Path) {
  #[cfg(unix)]
  if let Ok(handle) = File::open(dir) {
    let _ = handle.sync_all();
  }
  #[cfg(not(unix))]
  let _ = dir;
}

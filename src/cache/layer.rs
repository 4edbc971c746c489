//! Cache lifecycle: load on start, merge on sync, save after every change.

use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::{CacheError, CoreError};
use crate::todoist::commands::{self, Change};
use crate::todoist::types::{CompletedTask, Entity, EntityId, EntityKind, EntityRef};

use super::codec::CacheStorage;
use super::merge::{self, MergeStats};
use super::optimistic;
use super::store::LocalStore;
use super::traits::RemoteSync;

/// What was found on disk when the layer was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
  Loaded,
  /// No cache yet; the first read bootstraps with a full sync
  Missing,
  /// The cache was unreadable and has been replaced by an empty store
  Discarded,
}

/// Result of one successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
  pub full_sync: bool,
  pub cursor: String,
  pub stats: MergeStats,
}

/// Owns the store for one invocation and keeps disk and memory in step.
///
/// The in-memory store is only replaced after the new state has been
/// saved, so a failed step leaves both the previous store and the
/// previous cursor in place.
pub struct CacheLayer<R: RemoteSync, S: CacheStorage> {
  remote: R,
  storage: S,
  store: LocalStore,
}

impl<R: RemoteSync, S: CacheStorage> CacheLayer<R, S> {
  /// Load the persisted store. A missing or corrupted cache is not an
  /// error: the layer starts from an empty, unsynced store.
  pub fn open(remote: R, storage: S) -> Result<(Self, CacheStatus), CoreError> {
    let (store, status) = match storage.load() {
      Ok(store) => {
        debug!(empty = store.is_empty(), "cache opened");
        (store, CacheStatus::Loaded)
      }
      Err(CacheError::NotFound { path }) => {
        debug!(path = %path.display(), "no cache yet");
        (LocalStore::new(), CacheStatus::Missing)
      }
      Err(err @ CacheError::Corrupted { .. }) => {
        warn!(error = %err, "discarding unreadable cache");
        (LocalStore::new(), CacheStatus::Discarded)
      }
      Err(err) => return Err(err.into()),
    };

    let layer = Self {
      remote,
      storage,
      store,
    };
    Ok((layer, status))
  }

  #[cfg(test)]
  pub fn store(&self) -> &LocalStore {
    &self.store
  }

  #[cfg(test)]
  pub fn remote(&self) -> &R {
    &self.remote
  }

  /// Fetch changes since the stored cursor, merge and persist them.
  pub async fn sync(&mut self) -> Result<SyncSummary, CoreError> {
    let delta = self.remote.fetch_delta(self.store.sync_cursor()).await?;
    if delta.is_empty() && !delta.full_sync {
      debug!("server reported no changes");
    }

    // A store that was never synced holds nothing worth keeping. Full
    // answers are handled by the merge, kind by kind.
    let empty = LocalStore::new();
    let base = if self.store.is_synced() {
      &self.store
    } else {
      &empty
    };

    let (merged, stats) = merge::apply_with_stats(base, &delta)?;
    self.storage.save(&merged)?;
    self.store = merged;

    info!(
      cursor = %delta.new_cursor,
      full_sync = delta.full_sync,
      upserted = stats.upserted,
      removed = stats.removed,
      "sync complete"
    );
    for kind in EntityKind::ALL {
      debug!(kind = kind.as_str(), count = self.store.len(kind), "cached");
    }
    Ok(SyncSummary {
      full_sync: delta.full_sync,
      cursor: delta.new_cursor,
      stats,
    })
  }

  /// The store for read commands, bootstrapped with a full sync if it
  /// was never synced.
  pub async fn read(&mut self) -> Result<&LocalStore, CoreError> {
    if !self.store.is_synced() {
      info!("store never synced, bootstrapping");
      self.sync().await?;
    }
    Ok(&self.store)
  }

  /// All entities of `kind`, in display order.
  pub async fn get_all(&mut self, kind: EntityKind) -> Result<Vec<Entity>, CoreError> {
    Ok(self.read().await?.entities(kind))
  }

  /// Send `change` to the server and, once accepted, apply it locally and
  /// persist. Returns the key of the affected entity, with the server id
  /// for adds.
  pub async fn mutate(
    &mut self,
    kind: EntityKind,
    id: Option<EntityId>,
    change: Change,
  ) -> Result<EntityRef, CoreError> {
    let plan = commands::plan(kind, id, &change)?;

    let store = self.read().await?;
    if let Some(id) = id {
      let key = EntityRef::new(kind, id);
      if !store.contains(key) {
        return Err(CoreError::UnknownEntity(key));
      }
    }

    let receipt = self.remote.execute(&plan.commands).await?;

    let mut next = self.store.clone();
    let key = optimistic::apply_change(
      &mut next,
      kind,
      id,
      &change,
      plan.temp_id.as_deref(),
      &receipt,
      Local::now().date_naive(),
    )?;
    self.storage.save(&next)?;
    self.store = next;

    debug!(entity = %key, "mutation applied locally");
    Ok(key)
  }

  /// Create a task from quick-add text and cache the server's copy of it.
  pub async fn quick_add(
    &mut self,
    text: &str,
    auto_reminder: bool,
  ) -> Result<EntityRef, CoreError> {
    self.read().await?;
    let task = self.remote.quick_add(text, auto_reminder).await?;

    let mut next = self.store.clone();
    let key = EntityRef::new(EntityKind::Task, task.id);
    next.upsert(Entity::Task(task));
    self.storage.save(&next)?;
    self.store = next;

    debug!(entity = %key, "quick-added task cached");
    Ok(key)
  }

  /// Account karma, read live.
  pub async fn karma(&self) -> Result<f64, CoreError> {
    Ok(self.remote.karma().await?)
  }

  /// Completed-task history, straight from the server.
  pub async fn completed_tasks(&self) -> Result<Vec<CompletedTask>, CoreError> {
    Ok(self.remote.completed_tasks().await?)
  }
}

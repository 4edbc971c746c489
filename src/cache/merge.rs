//! Applying a remote delta to the local store.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use crate::error::MergeError;
use crate::todoist::types::{Entity, EntityId, EntityKind, EntityRef};

use super::store::LocalStore;

/// Changes reported by the remote service for one cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
  /// Cursor to present on the next sync
  pub new_cursor: String,
  /// The server answered with its complete state instead of a diff
  pub full_sync: bool,
  /// Adds and updates, each a full entity representation
  pub updated: Vec<Entity>,
  /// Explicit removals
  pub deleted: Vec<EntityRef>,
  /// Kinds whose list the server included. On a full sync these lists are
  /// complete; kinds missing here were not reported and are left alone.
  pub reported: BTreeSet<EntityKind>,
}

impl Delta {
  pub fn is_empty(&self) -> bool {
    self.updated.is_empty() && self.deleted.is_empty()
  }
}

/// Outcome counts of one merge, for logging and summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
  pub upserted: usize,
  pub removed: usize,
}

#[cfg(test)]
pub fn apply(store: &LocalStore, delta: &Delta) -> Result<LocalStore, MergeError> {
  apply_with_stats(store, delta).map(|(merged, _)| merged)
}

/// Apply `delta` to `store`, returning the merged store.
///
/// Updates overwrite whole entities, deletions of absent ids are ignored, and
/// an entity that is both updated and deleted ends up deleted. Kinds are
/// independent of each other. A full sync replaces the kinds it reports;
/// unreported kinds keep their entities. The input store is never modified,
/// so on error the caller still holds the previous state and cursor.
pub fn apply_with_stats(
  store: &LocalStore,
  delta: &Delta,
) -> Result<(LocalStore, MergeStats), MergeError> {
  validate(delta)?;

  let mut next = store.clone();
  let mut doomed: BTreeMap<EntityKind, HashSet<EntityId>> = BTreeMap::new();
  let mut stats = MergeStats::default();

  for entity in &delta.updated {
    if entity.is_deleted() {
      doomed.entry(entity.kind()).or_default().insert(entity.id());
    } else {
      next.upsert(entity.clone());
      stats.upserted += 1;
    }
  }

  for key in &delta.deleted {
    doomed.entry(key.kind).or_default().insert(key.id);
  }

  if delta.full_sync {
    for &kind in &delta.reported {
      let listed: HashSet<EntityId> = delta
        .updated
        .iter()
        .filter(|e| e.kind() == kind)
        .map(Entity::id)
        .collect();
      let stale = store.ids(kind).into_iter().filter(|id| !listed.contains(id));
      doomed.entry(kind).or_default().extend(stale);
    }
  }

  for (kind, ids) in &doomed {
    stats.removed += next.remove_all(*kind, ids);
  }
  stats.removed += next.purge_tombstones();

  next.set_sync_cursor(delta.new_cursor.clone());

  debug!(
    cursor = %delta.new_cursor,
    upserted = stats.upserted,
    removed = stats.removed,
    full_sync = delta.full_sync,
    "delta merged"
  );
  Ok((next, stats))
}

/// Reject deltas that could only come from a malformed server response.
fn validate(delta: &Delta) -> Result<(), MergeError> {
  if delta.new_cursor.trim().is_empty() {
    return Err(MergeError::MissingCursor);
  }

  let keys = delta
    .updated
    .iter()
    .map(Entity::key)
    .chain(delta.deleted.iter().copied());
  for key in keys {
    if key.id == 0 {
      return Err(MergeError::InvalidId(key));
    }
  }

  Ok(())
}
